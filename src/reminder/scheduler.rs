//! The reminder loop: Idle ⇄ Running, one tick per interval.
//!
//! Each tick resolves permission, sweeps the ledger, fetches candidates, and
//! dispatches every due task not already in the ledger. Ticks of one loop are
//! serialized by the async mutex that owns the ledger, so a `check_now` racing
//! the timer cannot double-dispatch. Nothing in a tick propagates an error: the
//! outcome is a [`TickReport`].

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::clock::{Clock, SystemClock};
use super::dispatch::{DispatchOutcome, Dispatcher};
use super::ledger::NotificationLedger;
use super::permission::PermissionSource;
use super::source::CandidateSource;
use super::window::DueWindow;
use crate::tasks::TaskChange;

pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// What one tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub permission_granted: bool,
    /// This tick opened a denial streak and logged it.
    pub denial_reported: bool,
    pub fetch_failed: bool,
    pub fetched: usize,
    pub due: usize,
    pub already_notified: usize,
    pub delivered: Vec<String>,
    pub suppressed: Vec<String>,
    pub failed: Vec<String>,
    pub expired: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    Idle,
    Running,
}

struct TickState {
    ledger: NotificationLedger,
    /// Set while in a permission-denied streak so it is logged once.
    denial_logged: bool,
}

struct LoopInner {
    label: &'static str,
    interval: Duration,
    window: DueWindow,
    source: Arc<dyn CandidateSource>,
    permission: Arc<dyn PermissionSource>,
    dispatcher: Dispatcher,
    clock: Arc<dyn Clock>,
    tick_state: tokio::sync::Mutex<TickState>,
}

struct Runner {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// One context's scheduler. Owns its ledger for its whole lifetime.
pub struct ReminderLoop {
    inner: Arc<LoopInner>,
    runner: Mutex<Option<Runner>>,
}

pub struct ReminderLoopBuilder {
    label: &'static str,
    interval: Duration,
    window: DueWindow,
    ledger: NotificationLedger,
    source: Arc<dyn CandidateSource>,
    permission: Arc<dyn PermissionSource>,
    dispatcher: Dispatcher,
    clock: Arc<dyn Clock>,
}

impl ReminderLoopBuilder {
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn window(mut self, window: DueWindow) -> Self {
        self.window = window;
        self
    }

    pub fn retention(mut self, retention: chrono::Duration) -> Self {
        self.ledger = NotificationLedger::new(retention);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn build(self) -> ReminderLoop {
        ReminderLoop {
            inner: Arc::new(LoopInner {
                label: self.label,
                interval: self.interval,
                window: self.window,
                source: self.source,
                permission: self.permission,
                dispatcher: self.dispatcher,
                clock: self.clock,
                tick_state: tokio::sync::Mutex::new(TickState {
                    ledger: self.ledger,
                    denial_logged: false,
                }),
            }),
            runner: Mutex::new(None),
        }
    }
}

impl ReminderLoop {
    /// Start building a loop. Defaults: 30 s interval, symmetric window of the
    /// same size, 1 h retention, system clock.
    pub fn builder(
        label: &'static str,
        source: Arc<dyn CandidateSource>,
        permission: Arc<dyn PermissionSource>,
        dispatcher: Dispatcher,
    ) -> ReminderLoopBuilder {
        ReminderLoopBuilder {
            label,
            interval: DEFAULT_CHECK_INTERVAL,
            window: DueWindow::symmetric(chrono::Duration::seconds(
                DEFAULT_CHECK_INTERVAL.as_secs() as i64,
            )),
            ledger: NotificationLedger::default(),
            source,
            permission,
            dispatcher,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn label(&self) -> &'static str {
        self.inner.label
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    fn runner(&self) -> std::sync::MutexGuard<'_, Option<Runner>> {
        self.runner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> LoopState {
        match self.runner().as_ref() {
            Some(runner) if !runner.handle.is_finished() => LoopState::Running,
            _ => LoopState::Idle,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() == LoopState::Running
    }

    /// Idle → Running: check once now, then every interval. No-op when running.
    /// Returns `true` if this call started the loop. Must be called inside a
    /// tokio runtime.
    pub fn start(&self) -> bool {
        let mut runner = self.runner();
        if let Some(existing) = runner.as_ref() {
            if !existing.handle.is_finished() {
                debug!(context = self.inner.label, "reminder loop already running");
                return false;
            }
        }

        let (stop_tx, mut stop_rx) = watch::channel(false);
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(inner.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = stop_rx.changed() => break,
                }
                inner.tick().await;
                // an in-flight tick finishes, but a stopped loop never re-arms
                if *stop_rx.borrow() {
                    break;
                }
            }
            debug!(context = inner.label, "reminder loop exited");
        });

        info!(
            context = self.inner.label,
            interval_secs = self.inner.interval.as_secs(),
            "reminder loop started"
        );
        *runner = Some(Runner {
            stop: stop_tx,
            handle,
        });
        true
    }

    /// Running → Idle. Returns `true` if the loop was running.
    pub fn stop(&self) -> bool {
        let Some(runner) = self.runner().take() else {
            return false;
        };
        let was_running = !runner.handle.is_finished();
        // the receiver may be gone if the task already exited
        let _ = runner.stop.send(true);
        if was_running {
            info!(context = self.inner.label, "reminder loop stopped");
        }
        was_running
    }

    /// Run one check right away, outside the timer.
    pub async fn tick(&self) -> TickReport {
        self.inner.tick().await
    }

    /// Fire-and-forget [`tick`](Self::tick).
    pub fn check_now(&self) -> JoinHandle<TickReport> {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move { inner.tick().await })
    }

    pub async fn is_notified(&self, task_id: &str) -> bool {
        self.inner.tick_state.lock().await.ledger.has(task_id)
    }

    pub async fn notified_count(&self) -> usize {
        self.inner.tick_state.lock().await.ledger.len()
    }

    /// Forget a task so it can be notified again (completed, deleted, rescheduled).
    pub async fn clear(&self, task_id: &str) -> bool {
        self.inner.tick_state.lock().await.ledger.clear(task_id)
    }

    pub async fn clear_all(&self) {
        self.inner.tick_state.lock().await.ledger.clear_all();
    }

    /// Follow store mutations and clear ledger entries they invalidate.
    pub fn follow_changes(
        self: &Arc<Self>,
        mut changes: broadcast::Receiver<TaskChange>,
    ) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(change) if change.invalidates_notification() => {
                        if this.clear(&change.task_id).await {
                            debug!(
                                context = this.label(),
                                task_id = %change.task_id,
                                "cleared notification record"
                            );
                        }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(
                            context = this.label(),
                            missed, "task change feed lagged, clearing all notification records"
                        );
                        this.clear_all().await;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

impl Drop for ReminderLoop {
    fn drop(&mut self) {
        if let Some(runner) = self.runner().take() {
            let _ = runner.stop.send(true);
        }
    }
}

impl LoopInner {
    async fn tick(&self) -> TickReport {
        let mut state = self.tick_state.lock().await;
        let mut report = TickReport::default();

        let permission = self.permission.current().await;
        if !permission.is_granted() {
            if !state.denial_logged {
                info!(
                    context = self.label,
                    permission = %permission,
                    "notification permission not granted, skipping reminder checks until it is"
                );
                state.denial_logged = true;
                report.denial_reported = true;
            }
            return report;
        }
        state.denial_logged = false;
        report.permission_granted = true;

        let now = self.clock.now();
        report.expired = state.ledger.sweep_expired(now);

        let tasks = match self.source.fetch_due_candidates().await {
            Ok(tasks) => tasks,
            Err(e) => {
                warn!(context = self.label, error = %e, "failed to fetch reminders");
                report.fetch_failed = true;
                return report;
            }
        };
        report.fetched = tasks.len();

        for task in tasks {
            if !self.window.is_task_due(&task, now) {
                continue;
            }
            report.due += 1;

            if state.ledger.has(&task.id) {
                report.already_notified += 1;
                continue;
            }

            match self
                .dispatcher
                .dispatch(&task.title, task.description.as_deref(), &task.id)
                .await
            {
                DispatchOutcome::Delivered(via) => {
                    state.ledger.record(&task.id, now);
                    info!(
                        context = self.label,
                        task_id = %task.id,
                        title = %task.title,
                        via = %via,
                        "sent reminder"
                    );
                    report.delivered.push(task.id);
                }
                DispatchOutcome::Suppressed(reason) => {
                    debug!(context = self.label, task_id = %task.id, ?reason, "reminder suppressed");
                    report.suppressed.push(task.id);
                }
                DispatchOutcome::Failed(e) => {
                    error!(context = self.label, task_id = %task.id, error = %e, "failed to send reminder");
                    report.failed.push(task.id);
                }
            }
        }

        report
    }
}
