//! SQLite task store: the persistence collaborator behind the reminder engine.
//!
//! The engine only ever reads through [`fetch_due_candidates`] and
//! [`fetch_in_window`]; everything else is CRUD used by the HTTP surface and the
//! CLI. Every mutation returns a [`TaskChange`] for ledger invalidation.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::types::{
    from_db_time, to_db_time, ChangeKind, NewTask, Task, TaskChange, TaskStatus,
};

const TASK_COLUMNS: &str =
    "id, title, description, status, priority, scheduled_at, created_at, updated_at, completed_at";

/// Insert a new pending task.
pub fn create_task(conn: &Connection, input: &NewTask) -> Result<Task> {
    let title = input.title.trim();
    if title.is_empty() {
        bail!("title must not be empty");
    }

    let id = uuid::Uuid::now_v7().to_string();
    let now = Utc::now();

    conn.execute(
        "INSERT INTO tasks (id, title, description, status, priority, scheduled_at, created_at, updated_at) \
         VALUES (?1, ?2, ?3, 'pending', ?4, ?5, ?6, ?6)",
        params![
            id,
            title,
            input.description,
            input.priority.as_str(),
            input.scheduled_at.map(to_db_time),
            to_db_time(now),
        ],
    )?;

    get_task(conn, &id)?.with_context(|| format!("task vanished after insert: {id}"))
}

pub fn get_task(conn: &Connection, id: &str) -> Result<Option<Task>> {
    let task = conn
        .query_row(
            &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"),
            params![id],
            row_to_task,
        )
        .optional()?;
    Ok(task)
}

/// All tasks, newest first, optionally filtered by status.
pub fn list_tasks(conn: &Connection, status: Option<TaskStatus>) -> Result<Vec<Task>> {
    let tasks = match status {
        Some(status) => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {TASK_COLUMNS} FROM tasks WHERE status = ?1 ORDER BY created_at DESC"
            ))?;
            let rows = stmt.query_map(params![status.as_str()], row_to_task)?;
            rows.collect::<Result<Vec<_>, _>>()?
        }
        None => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {TASK_COLUMNS} FROM tasks ORDER BY created_at DESC"
            ))?;
            let rows = stmt.query_map([], row_to_task)?;
            rows.collect::<Result<Vec<_>, _>>()?
        }
    };
    Ok(tasks)
}

/// Pending tasks that have a scheduled time. The caller narrows by time.
pub fn fetch_due_candidates(conn: &Connection) -> Result<Vec<Task>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {TASK_COLUMNS} FROM tasks \
         WHERE status = 'pending' AND scheduled_at IS NOT NULL \
         ORDER BY scheduled_at"
    ))?;
    let tasks = stmt
        .query_map([], row_to_task)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(tasks)
}

/// Pending tasks scheduled within `[from, to]` (both inclusive).
pub fn fetch_in_window(
    conn: &Connection,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<Vec<Task>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {TASK_COLUMNS} FROM tasks \
         WHERE status = 'pending' AND scheduled_at >= ?1 AND scheduled_at <= ?2 \
         ORDER BY scheduled_at"
    ))?;
    let tasks = stmt
        .query_map(params![to_db_time(from), to_db_time(to)], row_to_task)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(tasks)
}

/// Move a task to a new status. Completing stamps `completed_at`.
pub fn set_status(conn: &Connection, id: &str, status: TaskStatus) -> Result<TaskChange> {
    let now = to_db_time(Utc::now());
    let completed_at = (status == TaskStatus::Completed).then(|| now.clone());

    let rows = conn.execute(
        "UPDATE tasks SET status = ?1, updated_at = ?2, completed_at = ?3 WHERE id = ?4",
        params![status.as_str(), now, completed_at, id],
    )?;
    if rows == 0 {
        bail!("task not found: {id}");
    }

    Ok(TaskChange::new(id, ChangeKind::StatusChanged(status)))
}

/// Give a task a new scheduled time. Snoozing is a reschedule: the task goes
/// back to pending so it can fire again at `at`.
pub fn reschedule(conn: &Connection, id: &str, at: DateTime<Utc>) -> Result<TaskChange> {
    let rows = conn.execute(
        "UPDATE tasks SET scheduled_at = ?1, status = 'pending', completed_at = NULL, updated_at = ?2 \
         WHERE id = ?3",
        params![to_db_time(at), to_db_time(Utc::now()), id],
    )?;
    if rows == 0 {
        bail!("task not found: {id}");
    }

    Ok(TaskChange::new(id, ChangeKind::Rescheduled))
}

pub fn delete_task(conn: &Connection, id: &str) -> Result<TaskChange> {
    let rows = conn.execute("DELETE FROM tasks WHERE id = ?1", params![id])?;
    if rows == 0 {
        bail!("task not found: {id}");
    }
    Ok(TaskChange::new(id, ChangeKind::Deleted))
}

/// Count tasks per status, in [`TaskStatus::ALL`] order.
pub fn count_by_status(conn: &Connection) -> Result<Vec<(TaskStatus, u64)>> {
    TaskStatus::ALL
        .iter()
        .map(|status| -> Result<(TaskStatus, u64)> {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM tasks WHERE status = ?1",
                params![status.as_str()],
                |row| row.get(0),
            )?;
            Ok((*status, count as u64))
        })
        .collect()
}

fn row_to_task(row: &Row<'_>) -> rusqlite::Result<Task> {
    let status: String = row.get(3)?;
    let priority: String = row.get(4)?;
    Ok(Task {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        status: status.parse().map_err(|_| rusqlite::Error::InvalidQuery)?,
        priority: priority.parse().map_err(|_| rusqlite::Error::InvalidQuery)?,
        scheduled_at: parse_opt_time(row, 5)?,
        created_at: parse_time(row, 6)?,
        updated_at: parse_time(row, 7)?,
        completed_at: parse_opt_time(row, 8)?,
    })
}

fn parse_time(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    from_db_time(&raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn parse_opt_time(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|value| {
        from_db_time(&value).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
    })
    .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::types::Priority;
    use chrono::Duration;

    fn test_db() -> Connection {
        crate::db::open_memory_database().unwrap()
    }

    fn new_task(title: &str, at: Option<DateTime<Utc>>) -> NewTask {
        NewTask {
            title: title.into(),
            description: None,
            priority: Priority::Medium,
            scheduled_at: at,
        }
    }

    #[test]
    fn create_and_get() {
        let conn = test_db();
        let at = Utc::now() + Duration::minutes(5);
        let task = create_task(&conn, &new_task("Water plants", Some(at))).unwrap();

        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.title, "Water plants");
        // millisecond storage precision
        assert_eq!(
            task.scheduled_at.unwrap().timestamp_millis(),
            at.timestamp_millis()
        );

        let fetched = get_task(&conn, &task.id).unwrap().unwrap();
        assert_eq!(fetched, task);
    }

    #[test]
    fn empty_title_is_rejected() {
        let conn = test_db();
        let err = create_task(&conn, &new_task("   ", None)).unwrap_err();
        assert!(err.to_string().contains("title must not be empty"));
    }

    #[test]
    fn due_candidates_skip_unscheduled_and_finished() {
        let conn = test_db();
        let at = Utc::now();
        let scheduled = create_task(&conn, &new_task("scheduled", Some(at))).unwrap();
        create_task(&conn, &new_task("unscheduled", None)).unwrap();
        let done = create_task(&conn, &new_task("done", Some(at))).unwrap();
        set_status(&conn, &done.id, TaskStatus::Completed).unwrap();

        let candidates = fetch_due_candidates(&conn).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].id, scheduled.id);
    }

    #[test]
    fn window_bounds_are_inclusive() {
        let conn = test_db();
        let now = from_db_time("2026-10-17T10:00:00.000Z").unwrap();
        let early = create_task(&conn, &new_task("early", Some(now - Duration::seconds(30)))).unwrap();
        let late = create_task(&conn, &new_task("late", Some(now + Duration::seconds(60)))).unwrap();
        create_task(&conn, &new_task("too late", Some(now + Duration::seconds(61)))).unwrap();
        create_task(&conn, &new_task("too early", Some(now - Duration::seconds(31)))).unwrap();

        let ids: Vec<String> = fetch_in_window(
            &conn,
            now - Duration::seconds(30),
            now + Duration::seconds(60),
        )
        .unwrap()
        .into_iter()
        .map(|t| t.id)
        .collect();
        assert_eq!(ids, vec![early.id, late.id]);
    }

    #[test]
    fn reschedule_returns_task_to_pending() {
        let conn = test_db();
        let task = create_task(&conn, &new_task("stretch", Some(Utc::now()))).unwrap();
        set_status(&conn, &task.id, TaskStatus::Snoozed).unwrap();

        let later = Utc::now() + Duration::minutes(10);
        let change = reschedule(&conn, &task.id, later).unwrap();
        assert!(change.invalidates_notification());

        let task = get_task(&conn, &task.id).unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(
            task.scheduled_at.unwrap().timestamp_millis(),
            later.timestamp_millis()
        );
    }

    #[test]
    fn complete_stamps_completed_at() {
        let conn = test_db();
        let task = create_task(&conn, &new_task("pay rent", None)).unwrap();
        set_status(&conn, &task.id, TaskStatus::Completed).unwrap();
        let task = get_task(&conn, &task.id).unwrap().unwrap();
        assert!(task.completed_at.is_some());
    }

    #[test]
    fn mutations_on_missing_task_fail() {
        let conn = test_db();
        assert!(set_status(&conn, "nope", TaskStatus::Completed).is_err());
        assert!(reschedule(&conn, "nope", Utc::now()).is_err());
        assert!(delete_task(&conn, "nope").is_err());
    }

    #[test]
    fn counts_by_status() {
        let conn = test_db();
        create_task(&conn, &new_task("a", None)).unwrap();
        let b = create_task(&conn, &new_task("b", None)).unwrap();
        set_status(&conn, &b.id, TaskStatus::Cancelled).unwrap();

        let counts = count_by_status(&conn).unwrap();
        assert!(counts.contains(&(TaskStatus::Pending, 1)));
        assert!(counts.contains(&(TaskStatus::Cancelled, 1)));
        assert!(counts.contains(&(TaskStatus::Completed, 0)));
    }
}
