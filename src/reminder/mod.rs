//! The reminder engine: due-window evaluation, per-context dedup ledgers,
//! permission gating, delivery, and the two scheduler contexts joined by the
//! bridge.

pub mod bridge;
pub mod center;
pub mod clock;
pub mod dispatch;
pub mod foreground;
pub mod ledger;
pub mod permission;
pub mod prompt;
pub mod scheduler;
pub mod source;
pub mod window;
pub mod worker;

pub use dispatch::{DispatchOutcome, Dispatcher, PlatformCapabilities};
pub use ledger::NotificationLedger;
pub use permission::{PermissionGate, PermissionState};
pub use scheduler::{ReminderLoop, TickReport};
pub use window::DueWindow;
