//! Personal task reminders that fire once, on time, from whichever context is alive.
//!
//! recall-mate keeps tasks in SQLite and runs two independent reminder
//! contexts over them: a foreground loop that follows the user's permission
//! grant, and a background worker that outlives the foreground and learns
//! permission by asking it over a bridge. Each context keeps its own dedup
//! ledger so a task is notified at most once per due window; a shared
//! notification tag collapses the rare case where both fire.
//!
//! # Architecture
//!
//! - **Storage**: SQLite (WAL) with forward-only migrations
//! - **Scheduling**: `tokio` interval loops, one tick at a time per context
//! - **Delivery**: persistent channel first, direct channel as fallback, gated on permission
//! - **Transport**: axum HTTP for the worker's check endpoint and task CRUD
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from TOML files and environment variables
//! - [`db`]: SQLite initialization, schema, migrations, preferences and health checks
//! - [`error`]: The reminder engine's error taxonomy
//! - [`reminder`]: Due windows, ledgers, permission, dispatch, loops and the bridge
//! - [`server`]: HTTP surface and whole-system wiring
//! - [`tasks`]: Task types and the task store

pub mod config;
pub mod db;
pub mod error;
pub mod reminder;
pub mod server;
pub mod tasks;
