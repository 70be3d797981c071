//! HTTP surface and whole-system wiring.
//!
//! [`router`] exposes the reminder check endpoint and thin task CRUD; every
//! mutation is published on a broadcast channel the reminder loops follow.
//! [`ReminderSystem`] assembles both contexts around one store and one
//! notification center, and [`serve`] runs everything until ctrl-c.

use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Deserialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::RecallConfig;
use crate::db;
use crate::reminder::bridge::{worker_channel, BridgePermission, ClientRegistry};
use crate::reminder::center::NotificationCenter;
use crate::reminder::clock::{Clock, SystemClock};
use crate::reminder::dispatch::{ChannelKind, Dispatcher};
use crate::reminder::foreground::ForegroundContext;
use crate::reminder::permission::{PermissionGate, PermissionState};
use crate::reminder::scheduler::ReminderLoop;
use crate::reminder::source::{HttpCandidateSource, StoreCandidateSource};
use crate::reminder::window::DueWindow;
use crate::reminder::worker::BackgroundWorker;
use crate::tasks::types::ChangeKind;
use crate::tasks::{store, NewTask, Task, TaskChange, TaskStatus};

const CHANGE_FEED_CAPACITY: usize = 64;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    db: Arc<Mutex<Connection>>,
    changes: broadcast::Sender<TaskChange>,
    check_window: DueWindow,
    clock: Arc<dyn Clock>,
}

impl AppState {
    pub fn new(db: Arc<Mutex<Connection>>, check_window: DueWindow) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self {
            db,
            changes,
            check_window,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TaskChange> {
        self.changes.subscribe()
    }

    fn publish(&self, change: TaskChange) {
        tracing::debug!(task_id = %change.task_id, kind = ?change.kind, "task changed");
        // no subscribers is fine
        let _ = self.changes.send(change);
    }

    async fn with_db<T, F>(&self, f: F) -> Result<T, ApiError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || {
            let conn = db
                .lock()
                .map_err(|e| anyhow::anyhow!("db lock poisoned: {e}"))?;
            f(&conn)
        })
        .await
        .map_err(|e| ApiError::internal(format!("db task failed: {e}")))?
        .map_err(ApiError::from)
    }
}

/// JSON error response: `{"error": "..."}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    fn not_found(id: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, format!("task not found: {id}"))
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        Self::internal(format!("{e:#}"))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = %self.status, error = %self.message, "request failed");
        }
        (self.status, Json(serde_json::json!({ "error": self.message }))).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/reminders/check", post(check_reminders))
        .route("/api/tasks", get(list_tasks).post(create_task))
        .route("/api/tasks/{id}", patch(update_task).delete(delete_task))
        .with_state(state)
}

/// Pending tasks inside the worker's window around now.
async fn check_reminders(State(state): State<AppState>) -> Result<Json<Vec<Task>>, ApiError> {
    let (from, to) = state.check_window.bounds(state.clock.now());
    let tasks = state
        .with_db(move |conn| store::fetch_in_window(conn, from, to))
        .await?;
    tracing::debug!(count = tasks.len(), "reminder check");
    Ok(Json(tasks))
}

#[derive(Debug, Deserialize)]
struct ListParams {
    status: Option<TaskStatus>,
}

async fn list_tasks(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Task>>, ApiError> {
    let tasks = state
        .with_db(move |conn| store::list_tasks(conn, params.status))
        .await?;
    Ok(Json(tasks))
}

async fn create_task(
    State(state): State<AppState>,
    Json(input): Json<NewTask>,
) -> Result<(StatusCode, Json<Task>), ApiError> {
    if input.title.trim().is_empty() {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "title must not be empty"));
    }
    let task = state
        .with_db(move |conn| store::create_task(conn, &input))
        .await?;
    state.publish(TaskChange::new(&task.id, ChangeKind::Created));
    Ok((StatusCode::CREATED, Json(task)))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPatch {
    pub status: Option<TaskStatus>,
    pub scheduled_at: Option<DateTime<Utc>>,
}

async fn update_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<TaskPatch>,
) -> Result<Json<Task>, ApiError> {
    let lookup = id.clone();
    let applied = state
        .with_db(move |conn| {
            if store::get_task(conn, &lookup)?.is_none() {
                return Ok(None);
            }
            let mut changes = Vec::new();
            if let Some(at) = patch.scheduled_at {
                changes.push(store::reschedule(conn, &lookup, at)?);
            }
            if let Some(status) = patch.status {
                changes.push(store::set_status(conn, &lookup, status)?);
            }
            let task = store::get_task(conn, &lookup)?;
            Ok(task.map(|task| (task, changes)))
        })
        .await?;

    let (task, changes) = applied.ok_or_else(|| ApiError::not_found(&id))?;
    for change in changes {
        state.publish(change);
    }
    Ok(Json(task))
}

async fn delete_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let lookup = id.clone();
    let change = state
        .with_db(move |conn| match store::get_task(conn, &lookup)? {
            Some(_) => store::delete_task(conn, &lookup).map(Some),
            None => Ok(None),
        })
        .await?
        .ok_or_else(|| ApiError::not_found(&id))?;
    state.publish(change);
    Ok(StatusCode::NO_CONTENT)
}

/// Both reminder contexts, wired around one store and one display surface.
pub struct ReminderSystem {
    pub foreground: Arc<ForegroundContext>,
    pub worker: Arc<BackgroundWorker>,
    pub clients: ClientRegistry,
    pub center: NotificationCenter,
    tasks: Vec<JoinHandle<()>>,
}

impl ReminderSystem {
    /// Build both contexts. `base_url` is where the worker reaches the check
    /// endpoint; `initial` seeds the foreground's permission mirror. Fails only
    /// if the worker's HTTP client cannot be built. Must be called inside a
    /// tokio runtime.
    pub fn assemble(
        config: &RecallConfig,
        db: Arc<Mutex<Connection>>,
        base_url: &str,
        center: NotificationCenter,
        initial: PermissionState,
    ) -> Result<Self> {
        let reminders = &config.reminders;
        let capabilities = config.platform.capabilities();

        let fg_gate = PermissionGate::new(initial);
        let fg_dispatcher = Dispatcher::new(fg_gate.clone(), capabilities)
            .with_persistent(center.channel(ChannelKind::Persistent))
            .with_direct(center.channel(ChannelKind::Direct))
            .with_reminders_url(&reminders.reminders_url);
        let fg_loop = ReminderLoop::builder(
            "foreground",
            Arc::new(StoreCandidateSource::new(Arc::clone(&db))),
            Arc::new(fg_gate.clone()),
            fg_dispatcher,
        )
        .interval(reminders.check_interval())
        .window(reminders.foreground_window())
        .retention(reminders.retention())
        .build();

        // the worker learns permission only through the bridge
        let clients = ClientRegistry::new();
        let wk_gate = PermissionGate::new(PermissionState::Default);
        let wk_permission =
            BridgePermission::new(clients.clone(), wk_gate.clone(), reminders.bridge_timeout());
        let wk_dispatcher = Dispatcher::new(wk_gate, capabilities)
            .with_persistent(center.channel(ChannelKind::Persistent))
            .with_reminders_url(&reminders.reminders_url);
        let wk_loop = ReminderLoop::builder(
            "worker",
            Arc::new(HttpCandidateSource::for_server(
                base_url,
                reminders.fetch_timeout(),
            )?),
            Arc::new(wk_permission),
            wk_dispatcher,
        )
        .interval(reminders.worker_interval())
        .window(reminders.worker_window())
        .retention(reminders.retention())
        .build();

        let worker = Arc::new(BackgroundWorker::new(
            Arc::new(wk_loop),
            &reminders.reminders_url,
        ));
        let (handle, inbox) = worker_channel();
        let foreground =
            Arc::new(ForegroundContext::new(fg_gate, Arc::new(fg_loop)).with_worker(handle));

        let tasks = vec![worker.run(inbox)];

        Ok(Self {
            foreground,
            worker,
            clients,
            center,
            tasks,
        })
    }

    /// Install the worker, connect the bridge, follow task changes, and let
    /// the foreground follow its permission gate.
    pub fn start(&mut self, state: &AppState) {
        self.tasks.push(self.foreground.serve_bridge(&self.clients));
        self.tasks
            .push(self.foreground.reminders().follow_changes(state.subscribe()));
        self.tasks
            .push(self.worker.reminders().follow_changes(state.subscribe()));
        self.worker.install();
        self.foreground.activate();
    }

    /// Mirror the stored permission into the foreground gate every `interval`.
    pub fn sync_permission_from(&mut self, db: Arc<Mutex<Connection>>, interval: std::time::Duration) {
        let gate = self.foreground.gate().clone();
        self.tasks.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let db = Arc::clone(&db);
                let loaded = tokio::task::spawn_blocking(move || {
                    let conn = db
                        .lock()
                        .map_err(|e| anyhow::anyhow!("db lock poisoned: {e}"))?;
                    db::prefs::load_permission(&conn)
                })
                .await;
                match loaded {
                    Ok(Ok(state)) => {
                        if gate.mirror(state) {
                            tracing::info!(permission = %state, "notification permission changed");
                        }
                    }
                    Ok(Err(e)) => tracing::warn!(error = %e, "failed to read stored permission"),
                    Err(e) => tracing::warn!(error = %e, "permission sync task failed"),
                }
            }
        }));
    }

    pub fn shutdown(&mut self) {
        self.foreground.deactivate();
        self.worker.reminders().stop();
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for ReminderSystem {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Run the HTTP surface and both reminder contexts until ctrl-c.
pub async fn serve(config: RecallConfig) -> Result<()> {
    let db_path = config.resolved_db_path();
    let conn = db::open_database(&db_path)?;
    let initial = db::prefs::load_permission(&conn)?;
    tracing::info!(db = %db_path.display(), permission = %initial, "database ready");
    let db = Arc::new(Mutex::new(conn));

    let bind_addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    let local = listener.local_addr()?;

    let state = AppState::new(Arc::clone(&db), config.reminders.worker_window());
    let center = NotificationCenter::new(&config.reminders.reminders_url).with_console_echo();
    let mut system = ReminderSystem::assemble(
        &config,
        Arc::clone(&db),
        &format!("http://{local}"),
        center,
        initial,
    )?;
    system.start(&state);
    system.sync_permission_from(Arc::clone(&db), config.reminders.permission_sync_interval());

    tracing::info!(addr = %local, "recall-mate listening at http://{local}");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
            tracing::info!("shutting down");
        })
        .await?;

    system.shutdown();
    Ok(())
}
