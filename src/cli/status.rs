//! CLI `status` command: database health, task counts, and permission state.

use anyhow::{Context, Result};
use chrono::Utc;

use recall_mate::config::RecallConfig;
use recall_mate::db;
use recall_mate::reminder::prompt::PromptPolicy;
use recall_mate::tasks::store;

pub fn status(config: &RecallConfig) -> Result<()> {
    let db_path = config.resolved_db_path();

    if !db_path.exists() {
        println!("Database: not found at {}", db_path.display());
        println!("Run `recall-mate add` or `recall-mate serve` to initialize.");
        return Ok(());
    }

    let file_size = std::fs::metadata(&db_path).map(|m| m.len()).unwrap_or(0);

    let conn = db::open_database(&db_path).context("failed to open database (may be corrupt)")?;
    let report = db::check_database_health(&conn).context("failed to run health check")?;
    let permission = db::prefs::load_permission(&conn)?;
    let dismissal = db::prefs::load_dismissal(&conn)?;
    let prompt = PromptPolicy::from_hours(config.prompt.reshow_after_hours)
        .decide(permission, dismissal, Utc::now());

    println!("recall-mate Status");
    println!("==================");
    println!();
    println!("Database:          {}", db_path.display());
    println!("File size:         {}", format_bytes(file_size));
    println!("Schema version:    {}", report.schema_version);
    println!();
    println!("Tasks:             {}", report.task_count);
    for (status, count) in store::count_by_status(&conn)? {
        println!("  {:<16} {count}", format!("{status}:"));
    }
    println!("  scheduled:       {}", report.pending_scheduled);
    println!();
    println!("Notifications:");
    println!("  Permission:      {permission}");
    println!(
        "  Prompt:          {}",
        if prompt.shows() { "would be shown" } else { "hidden" }
    );
    let caps = config.platform.capabilities();
    println!(
        "  Persistent:      {}",
        if caps.supports_persistent_notification { "supported" } else { "unsupported" }
    );
    println!(
        "  Vibration:       {}",
        if caps.supports_vibration { "supported" } else { "unsupported" }
    );
    println!();
    if report.integrity_ok {
        println!("Integrity check:   PASSED");
    } else {
        println!("Integrity check:   FAILED ({})", report.integrity_details);
        println!();
        println!("Recovery: restore from a backup, e.g. cp backup.db {}", db_path.display());
    }

    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
