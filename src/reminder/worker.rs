//! The background worker: the context that outlives the page.
//!
//! Lifecycle is installing → waiting → active. Installing asks to skip the
//! waiting phase, and activation starts the worker's own reminder loop, which
//! learns permission over the bridge and delivers through the persistent
//! channel. Commands from the foreground arrive on an mpsc queue.

use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::bridge::WorkerCommand;
use super::dispatch::{
    DispatchOutcome, NotificationData, NotificationOptions, DEFAULT_BADGE, DEFAULT_ICON,
};
use super::scheduler::ReminderLoop;

pub const PUSH_DEFAULT_TITLE: &str = "Reminder";
pub const PUSH_DEFAULT_BODY: &str = "You have a new reminder";
pub const PUSH_DEFAULT_TAG: &str = "reminder";
const PUSH_VIBRATION: [u32; 3] = [200, 100, 200];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerPhase {
    Installing,
    Waiting,
    Active,
}

/// Fields a push payload may override. Anything absent keeps the default.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushPayload {
    pub title: Option<String>,
    pub body: Option<String>,
    pub icon: Option<String>,
    pub badge: Option<String>,
    pub tag: Option<String>,
    pub require_interaction: Option<bool>,
    pub vibrate: Option<Vec<u32>>,
    pub data: Option<NotificationData>,
}

impl PushPayload {
    /// Parse raw push bytes. Text that is not a JSON object becomes the body.
    pub fn parse(raw: &str) -> Self {
        serde_json::from_str::<PushPayload>(raw).unwrap_or_else(|_| PushPayload {
            body: Some(raw.to_owned()),
            ..Default::default()
        })
    }

    /// Merge over the default push notification.
    pub fn into_notification(self, reminders_url: &str) -> (String, NotificationOptions) {
        let title = self.title.unwrap_or_else(|| PUSH_DEFAULT_TITLE.to_owned());
        let options = NotificationOptions {
            body: self.body.unwrap_or_else(|| PUSH_DEFAULT_BODY.to_owned()),
            icon: self.icon.unwrap_or_else(|| DEFAULT_ICON.to_owned()),
            badge: self.badge.unwrap_or_else(|| DEFAULT_BADGE.to_owned()),
            tag: Some(self.tag.unwrap_or_else(|| PUSH_DEFAULT_TAG.to_owned())),
            renotify: false,
            require_interaction: self.require_interaction.unwrap_or(true),
            silent: false,
            vibrate: Some(self.vibrate.unwrap_or_else(|| PUSH_VIBRATION.to_vec())),
            data: self.data.unwrap_or_else(|| NotificationData {
                url: Some(reminders_url.to_owned()),
                ..Default::default()
            }),
            actions: Vec::new(),
        };
        (title, options)
    }
}

pub struct BackgroundWorker {
    phase: Mutex<WorkerPhase>,
    reminders: Arc<ReminderLoop>,
    reminders_url: String,
}

impl BackgroundWorker {
    pub fn new(reminders: Arc<ReminderLoop>, reminders_url: impl Into<String>) -> Self {
        Self {
            phase: Mutex::new(WorkerPhase::Installing),
            reminders,
            reminders_url: reminders_url.into(),
        }
    }

    pub fn phase(&self) -> WorkerPhase {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_phase(&self, phase: WorkerPhase) {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner) = phase;
    }

    pub fn reminders(&self) -> &Arc<ReminderLoop> {
        &self.reminders
    }

    /// Installed: go straight through waiting to active.
    pub fn install(&self) {
        self.installed();
        self.skip_waiting();
    }

    /// Installing → Waiting. The loop stays idle until `SkipWaiting`.
    pub fn installed(&self) {
        if self.phase() == WorkerPhase::Installing {
            info!("worker installed, waiting");
            self.set_phase(WorkerPhase::Waiting);
        }
    }

    pub fn skip_waiting(&self) {
        if self.phase() == WorkerPhase::Waiting {
            self.activate();
        }
    }

    fn activate(&self) {
        self.set_phase(WorkerPhase::Active);
        info!("worker active");
        self.reminders.start();
    }

    pub fn handle_command(&self, command: WorkerCommand) {
        debug!(?command, phase = ?self.phase(), "worker command");
        match command {
            WorkerCommand::SkipWaiting => self.skip_waiting(),
            WorkerCommand::CheckReminders => {
                self.reminders.check_now();
            }
            WorkerCommand::StartReminderCheck => {
                self.reminders.start();
            }
            WorkerCommand::StopReminderCheck => {
                self.reminders.stop();
            }
        }
    }

    /// Consume commands until every [`WorkerHandle`](super::bridge::WorkerHandle) is dropped.
    pub fn run(self: &Arc<Self>, mut inbox: mpsc::UnboundedReceiver<WorkerCommand>) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(command) = inbox.recv().await {
                this.handle_command(command);
            }
            this.reminders.stop();
            debug!("worker command queue closed");
        })
    }

    /// Show a pushed notification through the worker's dispatcher.
    pub async fn handle_push(&self, raw: Option<&str>) -> DispatchOutcome {
        let payload = raw.map(PushPayload::parse).unwrap_or_default();
        let (title, options) = payload.into_notification(&self.reminders_url);
        info!(title = %title, "push received");
        self.reminders.dispatcher().deliver(&title, &options).await
    }
}
