//! CLI `check` and `test-notify`: one-shot runs of the foreground context
//! against the local store, showing notifications on the console.

use std::sync::{Arc, Mutex};

use anyhow::Result;

use recall_mate::config::RecallConfig;
use recall_mate::db::{self, prefs};
use recall_mate::reminder::center::NotificationCenter;
use recall_mate::reminder::dispatch::{ChannelKind, DispatchOutcome, Dispatcher};
use recall_mate::reminder::foreground::ForegroundContext;
use recall_mate::reminder::permission::{PermissionGate, UserGesture};
use recall_mate::reminder::scheduler::ReminderLoop;
use recall_mate::reminder::source::StoreCandidateSource;

use super::permission::TerminalPrompter;

fn foreground(config: &RecallConfig) -> Result<(ForegroundContext, Arc<Mutex<rusqlite::Connection>>)> {
    let conn = db::open_database(config.resolved_db_path())?;
    let gate = PermissionGate::new(prefs::load_permission(&conn)?);
    let db = Arc::new(Mutex::new(conn));

    let center = NotificationCenter::new(&config.reminders.reminders_url).with_console_echo();
    let dispatcher = Dispatcher::new(gate.clone(), config.platform.capabilities())
        .with_direct(center.channel(ChannelKind::Direct))
        .with_reminders_url(&config.reminders.reminders_url);
    let reminders = ReminderLoop::builder(
        "foreground",
        Arc::new(StoreCandidateSource::new(Arc::clone(&db))),
        Arc::new(gate.clone()),
        dispatcher,
    )
    .window(config.reminders.foreground_window())
    .retention(config.reminders.retention())
    .build();

    Ok((ForegroundContext::new(gate, Arc::new(reminders)), db))
}

/// Run a single reminder check now.
pub async fn check(config: &RecallConfig) -> Result<()> {
    let (context, _db) = foreground(config)?;
    let report = context.reminders().tick().await;

    if !report.permission_granted {
        println!(
            "Notification permission is {}; nothing was checked.",
            context.gate().state()
        );
        return Ok(());
    }
    if report.fetch_failed {
        anyhow::bail!("failed to fetch reminder candidates (see log)");
    }

    println!(
        "Checked {} scheduled task(s): {} due, {} sent, {} failed",
        report.fetched,
        report.due,
        report.delivered.len(),
        report.failed.len()
    );
    Ok(())
}

/// Ask for permission if it is undecided, then send a test notification.
pub async fn test_notify(config: &RecallConfig) -> Result<()> {
    let (context, db) = foreground(config)?;
    let before = context.gate().state();

    let outcome = context
        .send_test_notification(UserGesture::from_interaction(), &TerminalPrompter)
        .await?;

    let after = context.gate().state();
    if after != before {
        let conn = db.lock().map_err(|e| anyhow::anyhow!("db lock poisoned: {e}"))?;
        prefs::store_permission(&conn, after)?;
        if after.is_granted() {
            prefs::clear_dismissal(&conn)?;
        }
    }

    match outcome {
        DispatchOutcome::Delivered(via) => println!("Test notification sent ({via})."),
        DispatchOutcome::Suppressed(_) => {
            println!("Notification permission is {after}. Run `recall-mate permission grant` to allow notifications.")
        }
        DispatchOutcome::Failed(e) => anyhow::bail!("failed to send test notification: {e}"),
    }
    Ok(())
}
