//! CLI task commands.
//!
//! When a server is running, mutations go through its HTTP API so both
//! reminder loops see the change and forget the task. Otherwise the store is
//! written directly.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration, Local, Utc};
use rusqlite::Connection;

use recall_mate::config::RecallConfig;
use recall_mate::db;
use recall_mate::tasks::{store, NewTask, Priority, Task, TaskStatus};

enum Backend {
    Http { client: reqwest::Client, base: String },
    Local(Connection),
}

impl Backend {
    async fn connect(config: &RecallConfig) -> Result<Self> {
        let base = format!("http://{}", config.bind_addr());
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(2))
            .build()?;
        match client.get(format!("{base}/api/tasks?status=pending")).send().await {
            Ok(resp) if resp.status().is_success() => {
                tracing::debug!(server = %base, "using running server");
                Ok(Self::Http { client, base })
            }
            _ => {
                let conn = db::open_database(config.resolved_db_path())?;
                Ok(Self::Local(conn))
            }
        }
    }

    async fn create(&self, input: NewTask) -> Result<Task> {
        match self {
            Self::Http { client, base } => {
                let body = serde_json::json!({
                    "title": input.title,
                    "description": input.description,
                    "priority": input.priority,
                    "scheduledAt": input.scheduled_at,
                });
                let resp = client.post(format!("{base}/api/tasks")).json(&body).send().await?;
                decode(resp).await
            }
            Self::Local(conn) => store::create_task(conn, &input),
        }
    }

    async fn list(&self, status: Option<TaskStatus>) -> Result<Vec<Task>> {
        match self {
            Self::Http { client, base } => {
                let url = match status {
                    Some(status) => format!("{base}/api/tasks?status={status}"),
                    None => format!("{base}/api/tasks"),
                };
                decode(client.get(url).send().await?).await
            }
            Self::Local(conn) => store::list_tasks(conn, status),
        }
    }

    async fn set_status(&self, id: &str, status: TaskStatus) -> Result<()> {
        match self {
            Self::Http { client, base } => {
                let resp = client
                    .patch(format!("{base}/api/tasks/{id}"))
                    .json(&serde_json::json!({ "status": status }))
                    .send()
                    .await?;
                decode::<Task>(resp).await.map(|_| ())
            }
            Self::Local(conn) => store::set_status(conn, id, status).map(|_| ()),
        }
    }

    async fn reschedule(&self, id: &str, at: DateTime<Utc>) -> Result<()> {
        match self {
            Self::Http { client, base } => {
                let resp = client
                    .patch(format!("{base}/api/tasks/{id}"))
                    .json(&serde_json::json!({ "scheduledAt": at }))
                    .send()
                    .await?;
                decode::<Task>(resp).await.map(|_| ())
            }
            Self::Local(conn) => store::reschedule(conn, id, at).map(|_| ()),
        }
    }

    async fn delete(&self, id: &str) -> Result<()> {
        match self {
            Self::Http { client, base } => {
                let resp = client.delete(format!("{base}/api/tasks/{id}")).send().await?;
                if !resp.status().is_success() {
                    bail!("{}", error_message(resp).await);
                }
                Ok(())
            }
            Self::Local(conn) => store::delete_task(conn, id).map(|_| ()),
        }
    }
}

async fn decode<T: serde::de::DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
    if !resp.status().is_success() {
        bail!("{}", error_message(resp).await);
    }
    resp.json().await.context("failed to decode server response")
}

async fn error_message(resp: reqwest::Response) -> String {
    let status = resp.status();
    match resp.json::<serde_json::Value>().await {
        Ok(body) => body["error"]
            .as_str()
            .map(str::to_owned)
            .unwrap_or_else(|| format!("HTTP {status}")),
        Err(_) => format!("HTTP {status}"),
    }
}

/// Resolve `--at` / `--in` into an instant. `--at` accepts RFC 3339 or a
/// local `YYYY-MM-DD HH:MM`.
pub fn parse_when(at: Option<&str>, in_minutes: Option<i64>) -> Result<Option<DateTime<Utc>>> {
    match (at, in_minutes) {
        (Some(_), Some(_)) => bail!("use either --at or --in, not both"),
        (Some(raw), None) => {
            if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
                return Ok(Some(dt.with_timezone(&Utc)));
            }
            let naive = chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M")
                .with_context(|| format!("unrecognized time: {raw}"))?;
            let local = naive
                .and_local_timezone(Local)
                .single()
                .with_context(|| format!("ambiguous local time: {raw}"))?;
            Ok(Some(local.with_timezone(&Utc)))
        }
        (None, Some(minutes)) => Ok(Some(Utc::now() + Duration::minutes(minutes))),
        (None, None) => Ok(None),
    }
}

pub async fn add(
    config: &RecallConfig,
    title: &str,
    description: Option<String>,
    priority: Priority,
    scheduled_at: Option<DateTime<Utc>>,
) -> Result<()> {
    let backend = Backend::connect(config).await?;
    let task = backend
        .create(NewTask {
            title: title.to_owned(),
            description,
            priority,
            scheduled_at,
        })
        .await?;

    println!("Created {}", task.id);
    if let Some(at) = task.scheduled_at {
        println!("  Remind at: {}", at.with_timezone(&Local).format("%Y-%m-%d %H:%M"));
    }
    Ok(())
}

pub async fn list(config: &RecallConfig, status: Option<TaskStatus>) -> Result<()> {
    let backend = Backend::connect(config).await?;
    let tasks = backend.list(status).await?;

    if tasks.is_empty() {
        println!("No tasks.");
        return Ok(());
    }

    for task in &tasks {
        let when = task
            .scheduled_at
            .map(|at| at.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".into());
        println!(
            "{}  {:<10} {:<7} {:<16} {}",
            task.id,
            task.status.as_str(),
            task.priority.as_str(),
            when,
            task.title
        );
    }
    Ok(())
}

pub async fn set_status(config: &RecallConfig, id: &str, status: TaskStatus) -> Result<()> {
    let backend = Backend::connect(config).await?;
    backend.set_status(id, status).await?;
    println!("Task {id} is now {status}");
    Ok(())
}

pub async fn snooze(config: &RecallConfig, id: &str, minutes: i64) -> Result<()> {
    let at = Utc::now() + Duration::minutes(minutes);
    let backend = Backend::connect(config).await?;
    backend.reschedule(id, at).await?;
    println!(
        "Task {id} snoozed until {}",
        at.with_timezone(&Local).format("%Y-%m-%d %H:%M")
    );
    Ok(())
}

pub async fn delete(config: &RecallConfig, id: &str) -> Result<()> {
    let backend = Backend::connect(config).await?;
    backend.delete(id).await?;
    println!("Deleted {id}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_when_accepts_rfc3339_and_offsets() {
        let at = parse_when(Some("2025-03-01T09:00:00Z"), None).unwrap().unwrap();
        assert_eq!(at.to_rfc3339(), "2025-03-01T09:00:00+00:00");

        let soon = parse_when(None, Some(10)).unwrap().unwrap();
        assert!(soon > Utc::now() + Duration::minutes(9));

        assert!(parse_when(None, None).unwrap().is_none());
        assert!(parse_when(Some("x"), Some(1)).is_err());
        assert!(parse_when(Some("next tuesday"), None).is_err());
    }
}
