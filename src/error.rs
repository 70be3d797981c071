//! Error taxonomy for the reminder engine.
//!
//! None of these escape a scheduler tick: the loop turns them into
//! [`TickReport`](crate::reminder::scheduler::TickReport) fields and the dispatcher into a
//! [`DispatchOutcome`](crate::reminder::dispatch::DispatchOutcome).

use std::time::Duration;

use thiserror::Error;

use crate::reminder::permission::PermissionState;

#[derive(Debug, Error)]
pub enum ReminderError {
    #[error("notifications are not supported on this platform")]
    PermissionUnavailable,

    #[error("notification permission not granted (state: {0})")]
    PermissionNotGranted(PermissionState),

    #[error("failed to fetch reminder candidates: {0}")]
    FetchFailed(String),

    #[error("notification dispatch failed: {0}")]
    DispatchFailed(String),

    #[error("permission query timed out after {0:?}")]
    BridgeTimeout(Duration),

    #[error("no foreground context reachable")]
    NoForeground,

    #[error("foreground context dropped the permission query")]
    Disconnected,

    #[error("storage error: {0}")]
    Storage(String),
}

impl ReminderError {
    /// Bridge failures all collapse to "not granted"; this says which ones count.
    pub fn is_bridge_failure(&self) -> bool {
        matches!(
            self,
            Self::BridgeTimeout(_) | Self::NoForeground | Self::Disconnected
        )
    }
}

pub type Result<T> = std::result::Result<T, ReminderError>;
