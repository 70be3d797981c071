//! Where a scheduler tick gets its candidate tasks.
//!
//! The foreground reads the store directly; the background worker goes through
//! the HTTP check endpoint, which already narrows to the worker's window.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{ReminderError, Result};
use crate::tasks::{store, Task};

#[async_trait]
pub trait CandidateSource: Send + Sync {
    /// Pending tasks worth evaluating. May include tasks that are not due yet.
    async fn fetch_due_candidates(&self) -> Result<Vec<Task>>;
}

/// Reads pending scheduled tasks straight from SQLite.
pub struct StoreCandidateSource {
    db: Arc<Mutex<rusqlite::Connection>>,
}

impl StoreCandidateSource {
    pub fn new(db: Arc<Mutex<rusqlite::Connection>>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CandidateSource for StoreCandidateSource {
    async fn fetch_due_candidates(&self) -> Result<Vec<Task>> {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || {
            let conn = db
                .lock()
                .map_err(|e| ReminderError::Storage(format!("db lock poisoned: {e}")))?;
            store::fetch_due_candidates(&conn).map_err(|e| ReminderError::Storage(e.to_string()))
        })
        .await
        .map_err(|e| ReminderError::FetchFailed(format!("db task failed: {e}")))?
        .map_err(|e| ReminderError::FetchFailed(e.to_string()))
    }
}

pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// POSTs to `/api/reminders/check` and decodes the task list.
///
/// Every request is bounded by the client timeout, so a server that accepts
/// and never answers fails the tick instead of holding the ledger lock.
pub struct HttpCandidateSource {
    client: reqwest::Client,
    url: String,
}

impl HttpCandidateSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ReminderError::FetchFailed(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// Point at a server's check endpoint, e.g. `http://127.0.0.1:3417`.
    pub fn for_server(base: &str, timeout: Duration) -> Result<Self> {
        Self::new(
            format!("{}/api/reminders/check", base.trim_end_matches('/')),
            timeout,
        )
    }
}

#[async_trait]
impl CandidateSource for HttpCandidateSource {
    async fn fetch_due_candidates(&self) -> Result<Vec<Task>> {
        let response = self
            .client
            .post(&self.url)
            .header("content-type", "application/json")
            .send()
            .await
            .map_err(|e| ReminderError::FetchFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ReminderError::FetchFailed(format!("HTTP {status}")));
        }

        response
            .json::<Vec<Task>>()
            .await
            .map_err(|e| ReminderError::FetchFailed(format!("bad response body: {e}")))
    }
}
