#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use recall_mate::db;
use recall_mate::error::{ReminderError, Result};
use recall_mate::reminder::dispatch::{ChannelKind, NotificationChannel, NotificationOptions};
use recall_mate::reminder::source::CandidateSource;
use recall_mate::tasks::{store, NewTask, Priority, Task, TaskStatus};
use rusqlite::Connection;

/// Open a fresh in-memory database with schema and migrations applied.
pub fn test_db() -> Connection {
    db::open_memory_database().unwrap()
}

pub fn shared_db() -> Arc<Mutex<Connection>> {
    Arc::new(Mutex::new(test_db()))
}

/// A fixed reference instant so window arithmetic is readable.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap()
}

/// Insert a pending task via the store module. Returns the task ID.
pub fn insert_task(conn: &Connection, title: &str, scheduled_at: Option<DateTime<Utc>>) -> String {
    store::create_task(
        conn,
        &NewTask {
            title: title.into(),
            description: None,
            priority: Priority::Medium,
            scheduled_at,
        },
    )
    .unwrap()
    .id
}

/// An in-memory task record, never persisted.
pub fn task(id: &str, scheduled_at: Option<DateTime<Utc>>) -> Task {
    Task {
        id: id.into(),
        title: format!("task {id}"),
        description: None,
        status: TaskStatus::Pending,
        priority: Priority::Medium,
        scheduled_at,
        created_at: t0(),
        updated_at: t0(),
        completed_at: None,
    }
}

/// Candidate source backed by a mutable list. Can be told to fail.
#[derive(Default)]
pub struct ListSource {
    tasks: Mutex<Vec<Task>>,
    failing: AtomicBool,
    pub fetches: AtomicUsize,
}

impl ListSource {
    pub fn new(tasks: Vec<Task>) -> Arc<Self> {
        Arc::new(Self {
            tasks: Mutex::new(tasks),
            ..Default::default()
        })
    }

    pub fn set(&self, tasks: Vec<Task>) {
        *self.tasks.lock().unwrap() = tasks;
    }

    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CandidateSource for ListSource {
    async fn fetch_due_candidates(&self) -> Result<Vec<Task>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(ReminderError::FetchFailed("store offline".into()));
        }
        Ok(self.tasks.lock().unwrap().clone())
    }
}

/// Records every notification shown. Can be told to reject a task's tag.
pub struct RecordingChannel {
    kind: ChannelKind,
    shown: Mutex<Vec<(String, NotificationOptions)>>,
    reject_tag: Mutex<Option<String>>,
}

impl RecordingChannel {
    pub fn new(kind: ChannelKind) -> Arc<Self> {
        Arc::new(Self {
            kind,
            shown: Mutex::new(Vec::new()),
            reject_tag: Mutex::new(None),
        })
    }

    pub fn reject(&self, tag: &str) {
        *self.reject_tag.lock().unwrap() = Some(tag.into());
    }

    pub fn count(&self) -> usize {
        self.shown.lock().unwrap().len()
    }

    pub fn tags(&self) -> Vec<String> {
        self.shown
            .lock()
            .unwrap()
            .iter()
            .filter_map(|(_, o)| o.tag.clone())
            .collect()
    }

    pub fn titles(&self) -> Vec<String> {
        self.shown.lock().unwrap().iter().map(|(t, _)| t.clone()).collect()
    }
}

#[async_trait]
impl NotificationChannel for RecordingChannel {
    fn kind(&self) -> ChannelKind {
        self.kind
    }

    async fn show(&self, title: &str, options: &NotificationOptions) -> Result<()> {
        if options.tag.is_some() && *self.reject_tag.lock().unwrap() == options.tag {
            return Err(ReminderError::DispatchFailed("rejected by platform".into()));
        }
        self.shown
            .lock()
            .unwrap()
            .push((title.to_owned(), options.clone()));
        Ok(())
    }
}
