//! Notification delivery.
//!
//! [`Dispatcher::dispatch`] gates on permission, builds the reminder options for
//! the platform, and delivers through the persistent channel when it can,
//! falling back to the direct one. The stable `reminder-{id}` tag lets the
//! platform collapse a duplicate from the other context into a single
//! re-alerted notification.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::permission::PermissionGate;
use crate::error::Result;

pub const DEFAULT_ICON: &str = "/android-chrome-192x192.png";
pub const DEFAULT_BADGE: &str = "/favicon-32x32.png";
pub const DEFAULT_REMINDER_BODY: &str = "Reminder time!";
pub const REMINDER_TITLE_PREFIX: &str = "⏰ ";
pub const VIBRATION_PATTERN: [u32; 7] = [200, 100, 200, 100, 200, 100, 200];

/// What the current platform's notifications can reliably do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformCapabilities {
    /// "Stay until dismissed" notifications.
    pub supports_persistent_notification: bool,
    pub supports_vibration: bool,
}

impl Default for PlatformCapabilities {
    fn default() -> Self {
        Self {
            supports_persistent_notification: true,
            supports_vibration: true,
        }
    }
}

impl PlatformCapabilities {
    /// Heuristic detection for when nothing better is known: Apple desktop and
    /// mobile browsers handle persistent notifications poorly and never vibrate.
    pub fn from_user_agent(user_agent: &str) -> Self {
        let apple = ["Mac", "iPhone", "iPad", "iPod"]
            .iter()
            .any(|needle| user_agent.contains(needle));
        Self {
            supports_persistent_notification: !apple,
            supports_vibration: !apple,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
}

/// Payload carried with a notification and handed back on click.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationData {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reminder_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Options handed to a [`NotificationChannel`], in the platform's wire shape.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationOptions {
    pub body: String,
    pub icon: String,
    pub badge: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    /// Re-alert when replacing a notification with the same tag.
    pub renotify: bool,
    pub require_interaction: bool,
    pub silent: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vibrate: Option<Vec<u32>>,
    pub data: NotificationData,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<NotificationAction>,
}

/// The tag shared by every notification for one task, in both contexts.
pub fn reminder_tag(task_id: &str) -> String {
    format!("reminder-{task_id}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    /// Owned by the background worker; survives the page closing.
    Persistent,
    /// Shown from the page itself.
    Direct,
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Persistent => f.write_str("persistent"),
            Self::Direct => f.write_str("direct"),
        }
    }
}

#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn kind(&self) -> ChannelKind;

    /// Whether the channel can be used right now (e.g. the worker is registered).
    fn is_available(&self) -> bool {
        true
    }

    async fn show(&self, title: &str, options: &NotificationOptions) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SuppressReason {
    Unsupported,
    NotGranted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Delivered(ChannelKind),
    /// Not attempted. Never an error for the user.
    Suppressed(SuppressReason),
    /// Every available channel rejected the notification.
    Failed(String),
}

impl DispatchOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered(_))
    }
}

pub struct Dispatcher {
    gate: PermissionGate,
    capabilities: PlatformCapabilities,
    persistent: Option<Arc<dyn NotificationChannel>>,
    direct: Option<Arc<dyn NotificationChannel>>,
    reminders_url: String,
}

impl Dispatcher {
    pub fn new(gate: PermissionGate, capabilities: PlatformCapabilities) -> Self {
        Self {
            gate,
            capabilities,
            persistent: None,
            direct: None,
            reminders_url: "/reminders".into(),
        }
    }

    pub fn with_persistent(mut self, channel: Arc<dyn NotificationChannel>) -> Self {
        self.persistent = Some(channel);
        self
    }

    pub fn with_direct(mut self, channel: Arc<dyn NotificationChannel>) -> Self {
        self.direct = Some(channel);
        self
    }

    pub fn with_reminders_url(mut self, url: impl Into<String>) -> Self {
        self.reminders_url = url.into();
        self
    }

    pub fn gate(&self) -> &PermissionGate {
        &self.gate
    }

    pub fn capabilities(&self) -> PlatformCapabilities {
        self.capabilities
    }

    /// Options for a task reminder under this platform's policy.
    pub fn reminder_options(&self, body: Option<&str>, task_id: &str) -> NotificationOptions {
        let persistent = self.capabilities.supports_persistent_notification;
        NotificationOptions {
            body: body
                .filter(|b| !b.trim().is_empty())
                .unwrap_or(DEFAULT_REMINDER_BODY)
                .to_owned(),
            icon: DEFAULT_ICON.into(),
            badge: DEFAULT_BADGE.into(),
            tag: Some(reminder_tag(task_id)),
            renotify: true,
            require_interaction: persistent,
            silent: false,
            vibrate: self
                .capabilities
                .supports_vibration
                .then(|| VIBRATION_PATTERN.to_vec()),
            data: NotificationData {
                kind: Some("reminder".into()),
                reminder_id: Some(task_id.to_owned()),
                url: Some(self.reminders_url.clone()),
            },
            actions: vec![
                NotificationAction {
                    action: "open".into(),
                    title: "View details".into(),
                },
                NotificationAction {
                    action: "close".into(),
                    title: "Close".into(),
                },
            ],
        }
    }

    /// Deliver a reminder for one task. The caller records the ledger entry
    /// when this returns [`DispatchOutcome::Delivered`].
    pub async fn dispatch(&self, title: &str, body: Option<&str>, task_id: &str) -> DispatchOutcome {
        let options = self.reminder_options(body, task_id);
        let title = format!("{REMINDER_TITLE_PREFIX}{title}");
        self.deliver(&title, &options).await
    }

    /// Permission gate plus channel preference, for any notification.
    pub async fn deliver(&self, title: &str, options: &NotificationOptions) -> DispatchOutcome {
        if !self.gate.is_supported() {
            return DispatchOutcome::Suppressed(SuppressReason::Unsupported);
        }
        if !self.gate.is_granted() {
            return DispatchOutcome::Suppressed(SuppressReason::NotGranted);
        }

        let mut last_error = String::from("no notification channel available");
        for channel in [&self.persistent, &self.direct].into_iter().flatten() {
            if !channel.is_available() {
                tracing::debug!(channel = %channel.kind(), "channel unavailable, trying next");
                continue;
            }
            match channel.show(title, options).await {
                Ok(()) => return DispatchOutcome::Delivered(channel.kind()),
                Err(e) => {
                    tracing::warn!(channel = %channel.kind(), error = %e, "notification channel failed");
                    last_error = e.to_string();
                }
            }
        }

        DispatchOutcome::Failed(last_error)
    }
}
