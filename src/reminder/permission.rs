//! Notification permission: the tri-state, the per-context gate that mirrors
//! it, and the only path that may ask the user for it.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::error::{ReminderError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionState {
    /// The user has not decided yet.
    #[default]
    Default,
    Granted,
    Denied,
}

impl PermissionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Granted => "granted",
            Self::Denied => "denied",
        }
    }

    pub fn is_granted(&self) -> bool {
        matches!(self, Self::Granted)
    }
}

impl std::fmt::Display for PermissionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PermissionState {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "default" => Ok(Self::Default),
            "granted" => Ok(Self::Granted),
            "denied" => Ok(Self::Denied),
            _ => Err(format!("unknown permission state: {s}")),
        }
    }
}

/// Proof that the caller is running inside a direct user interaction.
///
/// Only interaction handlers (CLI commands, prompt buttons) construct one;
/// timers and scheduler ticks never do, so they cannot reach
/// [`PermissionGate::request`].
#[derive(Debug)]
pub struct UserGesture(());

impl UserGesture {
    pub fn from_interaction() -> Self {
        Self(())
    }
}

/// The platform's permission dialog.
#[async_trait]
pub trait PermissionPrompter: Send + Sync {
    async fn prompt(&self) -> PermissionState;
}

/// Where a scheduler tick learns whether it may deliver.
#[async_trait]
pub trait PermissionSource: Send + Sync {
    async fn current(&self) -> PermissionState;
}

/// One context's mirror of the platform permission flag.
///
/// Cheap to clone; clones share the mirror. Subscribers are woken on every
/// change, which is how the foreground loop follows grants and revocations.
#[derive(Clone)]
pub struct PermissionGate {
    state: Arc<watch::Sender<PermissionState>>,
    supported: bool,
}

impl PermissionGate {
    pub fn new(initial: PermissionState) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self {
            state: Arc::new(tx),
            supported: true,
        }
    }

    /// A platform with no notification support: always reports `Denied`.
    pub fn unsupported() -> Self {
        Self {
            supported: false,
            ..Self::new(PermissionState::Denied)
        }
    }

    pub fn is_supported(&self) -> bool {
        self.supported
    }

    pub fn state(&self) -> PermissionState {
        if !self.supported {
            return PermissionState::Denied;
        }
        *self.state.borrow()
    }

    pub fn is_granted(&self) -> bool {
        self.state().is_granted()
    }

    /// Copy the platform's current value into this context. Returns `true` if it changed.
    pub fn mirror(&self, state: PermissionState) -> bool {
        if !self.supported {
            return false;
        }
        self.state.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        })
    }

    pub fn subscribe(&self) -> watch::Receiver<PermissionState> {
        self.state.subscribe()
    }

    /// Ask the user. A decided state (granted or denied) is returned as-is
    /// without prompting again.
    pub async fn request(
        &self,
        _gesture: UserGesture,
        prompter: &dyn PermissionPrompter,
    ) -> Result<PermissionState> {
        if !self.supported {
            return Err(ReminderError::PermissionUnavailable);
        }

        let current = self.state();
        if current != PermissionState::Default {
            return Ok(current);
        }

        let decided = prompter.prompt().await;
        self.mirror(decided);
        tracing::info!(permission = %decided, "notification permission decided");
        Ok(decided)
    }
}

#[async_trait]
impl PermissionSource for PermissionGate {
    async fn current(&self) -> PermissionState {
        self.state()
    }
}

impl std::fmt::Debug for PermissionGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionGate")
            .field("state", &self.state())
            .field("supported", &self.supported)
            .finish()
    }
}

/// A prompter that answers with a fixed decision. Backs the CLI's explicit
/// `permission grant|deny` commands.
pub struct FixedPrompter(pub PermissionState);

#[async_trait]
impl PermissionPrompter for FixedPrompter {
    async fn prompt(&self) -> PermissionState {
        self.0
    }
}
