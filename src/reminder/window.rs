//! Due-window evaluation.
//!
//! A task is due when `scheduled_at - now` lies in `[-grace, lead]`, both ends
//! inclusive. The foreground loop uses a symmetric window sized to its poll
//! interval, so every task is seen by at least one poll around its due instant.
//! The background worker leans early (+60 s / −30 s).

use chrono::{DateTime, Duration, Utc};

use crate::tasks::Task;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DueWindow {
    lead: Duration,
    grace: Duration,
}

impl DueWindow {
    /// `lead`: how far ahead of the scheduled time a task becomes due.
    /// `grace`: how long after it stays due.
    pub fn new(lead: Duration, grace: Duration) -> Self {
        Self {
            lead: lead.max(Duration::zero()),
            grace: grace.max(Duration::zero()),
        }
    }

    pub fn symmetric(interval: Duration) -> Self {
        Self::new(interval, interval)
    }

    pub fn lead(&self) -> Duration {
        self.lead
    }

    pub fn grace(&self) -> Duration {
        self.grace
    }

    /// `(lower, upper)` bounds on `scheduled_at` for a task to be due at `now`.
    pub fn bounds(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        (now - self.grace, now + self.lead)
    }

    pub fn is_due(&self, now: DateTime<Utc>, scheduled_at: Option<DateTime<Utc>>) -> bool {
        let Some(scheduled_at) = scheduled_at else {
            return false;
        };
        let diff = scheduled_at - now;
        diff <= self.lead && diff >= -self.grace
    }

    /// Status-aware check: only pending tasks are ever due.
    pub fn is_task_due(&self, task: &Task, now: DateTime<Utc>) -> bool {
        task.is_reminder_candidate() && self.is_due(now, task.scheduled_at)
    }
}
