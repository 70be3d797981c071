//! The platform's notification surface, as seen by this process.
//!
//! Notifications are keyed by tag: showing one whose tag is already on screen
//! replaces it (and re-alerts when `renotify` is set) instead of stacking a
//! second copy. This is what collapses a reminder that both contexts decided to
//! send. Clicking closes the notification and yields a [`ClickRoute`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde::Serialize;

use super::dispatch::{ChannelKind, NotificationChannel, NotificationOptions};
use crate::error::Result;

/// One notification currently on screen.
#[derive(Debug, Clone, Serialize)]
pub struct Displayed {
    pub title: String,
    pub options: NotificationOptions,
    pub via: ChannelKind,
    /// Number of times it alerted (sound/vibration). Starts at 1.
    pub alerts: u32,
}

/// An open application window the click router may reuse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowInfo {
    pub id: u32,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickRoute {
    /// The "close" action: dismiss only.
    Dismiss,
    Focus(u32),
    Open(String),
}

/// Decide where a notification click goes.
///
/// A window whose URL contains the target is focused; otherwise the target is
/// opened. A missing target means the reminders view.
pub fn route_click(
    action: Option<&str>,
    url: Option<&str>,
    fallback_url: &str,
    windows: &[WindowInfo],
) -> ClickRoute {
    if action == Some("close") {
        return ClickRoute::Dismiss;
    }
    let target = url.unwrap_or(fallback_url);
    windows
        .iter()
        .find(|w| w.url.contains(target))
        .map(|w| ClickRoute::Focus(w.id))
        .unwrap_or_else(|| ClickRoute::Open(target.to_owned()))
}

#[derive(Default)]
struct CenterState {
    by_tag: HashMap<String, Displayed>,
    untagged: u64,
}

/// Shared display surface. Clone freely; clones see the same notifications.
#[derive(Clone)]
pub struct NotificationCenter {
    state: Arc<Mutex<CenterState>>,
    reminders_url: String,
    echo: bool,
}

impl NotificationCenter {
    pub fn new(reminders_url: impl Into<String>) -> Self {
        Self {
            state: Arc::new(Mutex::new(CenterState::default())),
            reminders_url: reminders_url.into(),
            echo: false,
        }
    }

    /// Also print each alert to stdout.
    pub fn with_console_echo(mut self) -> Self {
        self.echo = true;
        self
    }

    /// A channel of the given kind that shows through this center.
    pub fn channel(&self, kind: ChannelKind) -> Arc<dyn NotificationChannel> {
        Arc::new(CenterChannel {
            center: self.clone(),
            kind,
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CenterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Show or replace. Returns the tag the notification is filed under.
    pub fn show(&self, via: ChannelKind, title: &str, options: &NotificationOptions) -> String {
        let mut state = self.lock();
        let tag = match &options.tag {
            Some(tag) => tag.clone(),
            None => {
                state.untagged += 1;
                format!("untagged-{}", state.untagged)
            }
        };

        let replaced = state.by_tag.contains_key(&tag);
        let alerts = match state.by_tag.get(&tag) {
            Some(existing) if options.renotify => existing.alerts + 1,
            Some(existing) => existing.alerts,
            None => 1,
        };

        state.by_tag.insert(
            tag.clone(),
            Displayed {
                title: title.to_owned(),
                options: options.clone(),
                via,
                alerts,
            },
        );
        drop(state);

        tracing::info!(tag = %tag, via = %via, replaced, "notification shown");
        if self.echo {
            println!("[{via}] {title}: {}", options.body);
        }
        tag
    }

    pub fn get(&self, tag: &str) -> Option<Displayed> {
        self.lock().by_tag.get(tag).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().by_tag.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn close(&self, tag: &str) -> Option<Displayed> {
        self.lock().by_tag.remove(tag)
    }

    /// Close the notification and route the user. `None` if nothing has that tag.
    pub fn click(&self, tag: &str, action: Option<&str>, windows: &[WindowInfo]) -> Option<ClickRoute> {
        let displayed = self.close(tag)?;
        let route = route_click(
            action,
            displayed.options.data.url.as_deref(),
            &self.reminders_url,
            windows,
        );
        tracing::debug!(tag = %tag, ?route, "notification clicked");
        Some(route)
    }
}

struct CenterChannel {
    center: NotificationCenter,
    kind: ChannelKind,
}

#[async_trait]
impl NotificationChannel for CenterChannel {
    fn kind(&self) -> ChannelKind {
        self.kind
    }

    async fn show(&self, title: &str, options: &NotificationOptions) -> Result<()> {
        self.center.show(self.kind, title, options);
        Ok(())
    }
}
