//! CLI `permission` commands.
//!
//! The stored preference plays the platform's part: `grant` and `deny` are the
//! user changing the setting, which a running server picks up on its next
//! permission sync.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::Connection;

use recall_mate::config::RecallConfig;
use recall_mate::db::{self, prefs};
use recall_mate::reminder::permission::{PermissionPrompter, PermissionState};
use recall_mate::reminder::prompt::{PromptDecision, PromptPolicy};

/// Asks on the terminal. Anything but "y"/"yes" is a denial.
pub struct TerminalPrompter;

#[async_trait]
impl PermissionPrompter for TerminalPrompter {
    async fn prompt(&self) -> PermissionState {
        let answer = tokio::task::spawn_blocking(|| {
            use std::io::Write;
            print!("Allow recall-mate to show notifications? [y/N] ");
            std::io::stdout().flush().ok();
            let mut line = String::new();
            std::io::stdin().read_line(&mut line).map(|_| line)
        })
        .await;

        match answer {
            Ok(Ok(line)) if matches!(line.trim().to_lowercase().as_str(), "y" | "yes") => {
                PermissionState::Granted
            }
            _ => PermissionState::Denied,
        }
    }
}

fn open(config: &RecallConfig) -> Result<Connection> {
    db::open_database(config.resolved_db_path())
}

/// Apply a prompt decision's side effect on the dismissal record.
pub fn settle_prompt(conn: &Connection, policy: &PromptPolicy) -> Result<PromptDecision> {
    let permission = prefs::load_permission(conn)?;
    let dismissal = prefs::load_dismissal(conn)?;
    let decision = policy.decide(permission, dismissal, Utc::now());
    if decision.clears_dismissal() {
        prefs::clear_dismissal(conn)?;
    }
    Ok(decision)
}

pub fn status(config: &RecallConfig) -> Result<()> {
    let conn = open(config)?;
    let policy = PromptPolicy::from_hours(config.prompt.reshow_after_hours);
    let decision = settle_prompt(&conn, &policy)?;
    let permission = prefs::load_permission(&conn)?;

    println!("Permission: {permission}");
    match decision {
        PromptDecision::Show | PromptDecision::ClearAndShow => {
            println!("Notifications are off. Run `recall-mate test-notify` to enable them,");
            println!("or `recall-mate permission dismiss` to stop asking for a while.");
        }
        PromptDecision::Hidden | PromptDecision::ClearAndHide => {}
    }
    Ok(())
}

pub fn set(config: &RecallConfig, state: PermissionState) -> Result<()> {
    let conn = open(config)?;
    prefs::store_permission(&conn, state)?;
    if state.is_granted() {
        prefs::clear_dismissal(&conn)?;
    }
    tracing::info!(permission = %state, "stored notification permission");
    println!("Permission: {state}");
    Ok(())
}

pub fn reset(config: &RecallConfig) -> Result<()> {
    let conn = open(config)?;
    prefs::store_permission(&conn, PermissionState::Default)?;
    prefs::clear_dismissal(&conn)?;
    println!("Permission reset to default.");
    Ok(())
}

pub fn dismiss(config: &RecallConfig) -> Result<()> {
    let conn = open(config)?;
    prefs::store_dismissal(&conn, Utc::now())?;
    println!(
        "Prompt dismissed for {} hours.",
        config.prompt.reshow_after_hours
    );
    Ok(())
}
