//! Task type definitions.
//!
//! Defines [`TaskStatus`], [`Priority`], [`Task`] (a full record) and
//! [`TaskChange`] (what a mutation did, used to invalidate reminder ledgers).

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a task. Only `Pending` tasks are ever reminded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Completed,
    Cancelled,
    Snoozed,
}

impl TaskStatus {
    /// SQL-compatible string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Snoozed => "snoozed",
        }
    }

    pub const ALL: [TaskStatus; 4] = [
        Self::Pending,
        Self::Completed,
        Self::Cancelled,
        Self::Snoozed,
    ];
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            "snoozed" => Ok(Self::Snoozed),
            _ => Err(format!("unknown task status: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "urgent" => Ok(Self::Urgent),
            _ => Err(format!("unknown priority: {s}")),
        }
    }
}

/// A task record, matching the `tasks` table schema.
///
/// Serialized in camelCase because the check endpoint's consumers expect
/// `scheduledAt`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// UUID v7 (time-sortable) primary key.
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    #[serde(default)]
    pub priority: Priority,
    /// When the user wants to be reminded. `None` means never.
    pub scheduled_at: Option<DateTime<Utc>>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Pending and scheduled: the only shape the reminder engine looks at.
    pub fn is_reminder_candidate(&self) -> bool {
        self.status == TaskStatus::Pending && self.scheduled_at.is_some()
    }
}

/// Input for creating a task.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    pub scheduled_at: Option<DateTime<Utc>>,
}

/// What a store mutation did to a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Created,
    StatusChanged(TaskStatus),
    Rescheduled,
    Deleted,
}

/// Emitted by every store mutation so reminder ledgers can forget the task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskChange {
    pub task_id: String,
    pub kind: ChangeKind,
}

impl TaskChange {
    pub fn new(task_id: impl Into<String>, kind: ChangeKind) -> Self {
        Self {
            task_id: task_id.into(),
            kind,
        }
    }

    /// Whether a ledger entry for this task must be dropped.
    ///
    /// Anything that moves a task away from "pending at the old time" does; a
    /// rescheduled task has to be able to fire again at its new time.
    pub fn invalidates_notification(&self) -> bool {
        match self.kind {
            ChangeKind::Created => false,
            ChangeKind::StatusChanged(TaskStatus::Pending) => false,
            ChangeKind::StatusChanged(_) | ChangeKind::Rescheduled | ChangeKind::Deleted => true,
        }
    }
}

/// Format an instant the way the store persists it: UTC, millisecond precision,
/// `Z` suffix, so lexical order equals time order.
pub fn to_db_time(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a stored instant.
pub fn from_db_time(value: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(value).map(|dt| dt.with_timezone(&Utc))
}
