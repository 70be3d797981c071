mod cli;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use recall_mate::config::RecallConfig;
use recall_mate::reminder::permission::PermissionState;
use recall_mate::tasks::{Priority, TaskStatus};

#[derive(Parser)]
#[command(name = "recall-mate", version, about = "Task reminders that fire once, on time")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API and both reminder contexts
    Serve,
    /// Add a task
    Add {
        title: String,
        #[arg(short, long)]
        description: Option<String>,
        /// When to remind: RFC 3339 or local "YYYY-MM-DD HH:MM"
        #[arg(long)]
        at: Option<String>,
        /// Remind in this many minutes
        #[arg(long = "in", value_name = "MINUTES")]
        in_minutes: Option<i64>,
        #[arg(short, long, default_value = "medium")]
        priority: Priority,
    },
    /// List tasks
    List {
        #[arg(short, long)]
        status: Option<TaskStatus>,
    },
    /// Mark a task completed
    Complete { id: String },
    /// Cancel a task
    Cancel { id: String },
    /// Push a task's reminder back
    Snooze {
        id: String,
        #[arg(short, long, default_value_t = 10)]
        minutes: i64,
    },
    /// Delete a task
    Delete { id: String },
    /// Run one reminder check now
    Check,
    /// Send a test notification (asks for permission if undecided)
    TestNotify,
    /// Show or change notification permission
    Permission {
        #[command(subcommand)]
        action: PermissionAction,
    },
    /// Database health, task counts and permission state
    Status,
}

#[derive(Subcommand)]
enum PermissionAction {
    Status,
    Grant,
    Deny,
    /// Back to undecided
    Reset,
    /// Dismiss the enable-notifications prompt for now
    Dismiss,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = RecallConfig::load()?;

    // Log to stderr so stdout stays clean for command output.
    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Serve => recall_mate::server::serve(config).await?,
        Command::Add {
            title,
            description,
            at,
            in_minutes,
            priority,
        } => {
            let scheduled_at = cli::tasks::parse_when(at.as_deref(), in_minutes)?;
            cli::tasks::add(&config, &title, description, priority, scheduled_at).await?;
        }
        Command::List { status } => cli::tasks::list(&config, status).await?,
        Command::Complete { id } => {
            cli::tasks::set_status(&config, &id, TaskStatus::Completed).await?
        }
        Command::Cancel { id } => {
            cli::tasks::set_status(&config, &id, TaskStatus::Cancelled).await?
        }
        Command::Snooze { id, minutes } => cli::tasks::snooze(&config, &id, minutes).await?,
        Command::Delete { id } => cli::tasks::delete(&config, &id).await?,
        Command::Check => cli::check(&config).await?,
        Command::TestNotify => cli::test_notify(&config).await?,
        Command::Permission { action } => match action {
            PermissionAction::Status => cli::permission::status(&config)?,
            PermissionAction::Grant => cli::permission::set(&config, PermissionState::Granted)?,
            PermissionAction::Deny => cli::permission::set(&config, PermissionState::Denied)?,
            PermissionAction::Reset => cli::permission::reset(&config)?,
            PermissionAction::Dismiss => cli::permission::dismiss(&config)?,
        },
        Command::Status => cli::status(&config)?,
    }

    Ok(())
}
