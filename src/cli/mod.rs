//! Command-line subcommands. Each prints to stdout; logs go to stderr.

pub mod check;
pub mod permission;
pub mod status;
pub mod tasks;

pub use check::{check, test_notify};
pub use status::status;
