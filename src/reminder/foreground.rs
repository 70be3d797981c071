//! The foreground context: the page-side loop, its permission gate, and the
//! user-initiated actions that touch permission.
//!
//! The foreground loop only runs while the gate reads granted. A watcher
//! follows the gate and starts or stops the loop as the mirrored state
//! changes, and tells the worker to start checking on every grant.

use std::sync::{Arc, Mutex, PoisonError, Weak};

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::bridge::{answer_queries, ClientRegistry, WorkerCommand, WorkerHandle};
use super::dispatch::DispatchOutcome;
use super::permission::{PermissionGate, PermissionPrompter, PermissionState, UserGesture};
use super::scheduler::ReminderLoop;
use crate::error::Result;

pub const TEST_NOTIFICATION_TITLE: &str = "Test notification";
pub const TEST_NOTIFICATION_BODY: &str =
    "This is a test notification. If you can see it, notifications are working!";

pub struct ForegroundContext {
    gate: PermissionGate,
    reminders: Arc<ReminderLoop>,
    worker: Option<WorkerHandle>,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl ForegroundContext {
    /// `gate` must be the same gate the loop's dispatcher checks.
    pub fn new(gate: PermissionGate, reminders: Arc<ReminderLoop>) -> Self {
        Self {
            gate,
            reminders,
            worker: None,
            watcher: Mutex::new(None),
        }
    }

    pub fn with_worker(mut self, worker: WorkerHandle) -> Self {
        self.worker = Some(worker);
        self
    }

    pub fn gate(&self) -> &PermissionGate {
        &self.gate
    }

    pub fn reminders(&self) -> &Arc<ReminderLoop> {
        &self.reminders
    }

    pub fn post(&self, command: WorkerCommand) -> bool {
        self.worker.as_ref().is_some_and(|w| w.post(command))
    }

    fn apply(&self, state: PermissionState) {
        if state.is_granted() {
            if self.reminders.start() {
                self.post(WorkerCommand::StartReminderCheck);
            }
        } else if self.reminders.stop() {
            info!(permission = %state, "foreground reminder checks paused");
        }
    }

    /// Start following the gate. Applies the current state right away.
    pub fn activate(self: &Arc<Self>) {
        let mut watcher = self.watcher.lock().unwrap_or_else(PoisonError::into_inner);
        if watcher.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }

        let mut rx = self.gate.subscribe();
        let initial = *rx.borrow_and_update();
        self.apply(initial);

        let this: Weak<Self> = Arc::downgrade(self);
        *watcher = Some(tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let state = *rx.borrow_and_update();
                let Some(context) = this.upgrade() else { break };
                debug!(permission = %state, "foreground permission changed");
                context.apply(state);
            }
        }));
    }

    /// Stop following the gate and stop the loop.
    pub fn deactivate(&self) {
        if let Some(handle) = self.watcher.lock().unwrap_or_else(PoisonError::into_inner).take() {
            handle.abort();
        }
        self.reminders.stop();
    }

    /// The only path that may show the platform's permission dialog.
    pub async fn request_permission(
        &self,
        gesture: UserGesture,
        prompter: &dyn PermissionPrompter,
    ) -> Result<PermissionState> {
        self.gate.request(gesture, prompter).await
    }

    pub async fn clear_notified_task(&self, task_id: &str) -> bool {
        self.reminders.clear(task_id).await
    }

    pub async fn clear_all(&self) {
        self.reminders.clear_all().await;
    }

    /// Answer the worker's permission queries from this context's gate.
    pub fn serve_bridge(&self, clients: &ClientRegistry) -> JoinHandle<()> {
        answer_queries(clients.connect(), self.gate.clone())
    }

    /// Ask for permission if undecided, then send a one-off notification
    /// through the same dispatcher the reminders use.
    pub async fn send_test_notification(
        &self,
        gesture: UserGesture,
        prompter: &dyn PermissionPrompter,
    ) -> Result<DispatchOutcome> {
        self.request_permission(gesture, prompter).await?;
        let id = format!("test-{}", Utc::now().timestamp_millis());
        Ok(self
            .reminders
            .dispatcher()
            .dispatch(TEST_NOTIFICATION_TITLE, Some(TEST_NOTIFICATION_BODY), &id)
            .await)
    }
}

impl Drop for ForegroundContext {
    fn drop(&mut self) {
        if let Some(handle) = self.watcher.lock().unwrap_or_else(PoisonError::into_inner).take() {
            handle.abort();
        }
    }
}
