use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::reminder::dispatch::PlatformCapabilities;
use crate::reminder::window::DueWindow;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct RecallConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub reminders: ReminderConfig,
    pub platform: PlatformConfig,
    pub prompt: PromptConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ReminderConfig {
    /// Foreground poll interval; also the half-width of the foreground due window.
    pub check_interval_secs: u64,
    pub worker_interval_secs: u64,
    pub worker_lead_secs: u64,
    pub worker_grace_secs: u64,
    pub retention_secs: u64,
    pub bridge_timeout_ms: u64,
    /// Upper bound on one worker fetch; never longer than the worker interval.
    pub fetch_timeout_ms: u64,
    pub reminders_url: String,
    pub permission_sync_secs: u64,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct PlatformConfig {
    /// Used only to derive capabilities when no explicit override is set.
    pub user_agent: Option<String>,
    pub supports_persistent_notification: Option<bool>,
    pub supports_vibration: Option<bool>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PromptConfig {
    pub reshow_after_hours: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 3417,
            log_level: "info".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let db_path = default_recall_dir()
            .join("tasks.db")
            .to_string_lossy()
            .into_owned();
        Self { db_path }
    }
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: 30,
            worker_interval_secs: 30,
            worker_lead_secs: 60,
            worker_grace_secs: 30,
            retention_secs: 3600,
            bridge_timeout_ms: 3000,
            fetch_timeout_ms: 10_000,
            reminders_url: "/reminders".into(),
            permission_sync_secs: 5,
        }
    }
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            reshow_after_hours: 24,
        }
    }
}

impl ReminderConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs.max(1))
    }

    pub fn worker_interval(&self) -> Duration {
        Duration::from_secs(self.worker_interval_secs.max(1))
    }

    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.retention_secs as i64)
    }

    pub fn bridge_timeout(&self) -> Duration {
        Duration::from_millis(self.bridge_timeout_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms.max(1)).min(self.worker_interval())
    }

    pub fn permission_sync_interval(&self) -> Duration {
        Duration::from_secs(self.permission_sync_secs.max(1))
    }

    /// Symmetric ±interval window used by the foreground loop.
    pub fn foreground_window(&self) -> DueWindow {
        DueWindow::symmetric(chrono::Duration::seconds(
            self.check_interval().as_secs() as i64,
        ))
    }

    /// Early-biased window used by the background worker and the check endpoint.
    pub fn worker_window(&self) -> DueWindow {
        DueWindow::new(
            chrono::Duration::seconds(self.worker_lead_secs as i64),
            chrono::Duration::seconds(self.worker_grace_secs as i64),
        )
    }
}

impl PlatformConfig {
    /// Resolve the capability descriptor: explicit overrides win over user-agent detection.
    pub fn capabilities(&self) -> PlatformCapabilities {
        let detected = match self.user_agent.as_deref() {
            Some(ua) => PlatformCapabilities::from_user_agent(ua),
            None => PlatformCapabilities::default(),
        };
        PlatformCapabilities {
            supports_persistent_notification: self
                .supports_persistent_notification
                .unwrap_or(detected.supports_persistent_notification),
            supports_vibration: self.supports_vibration.unwrap_or(detected.supports_vibration),
        }
    }
}

/// Returns `~/.recall-mate/`
pub fn default_recall_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".recall-mate")
}

/// Returns the default config file path: `~/.recall-mate/config.toml`
pub fn default_config_path() -> PathBuf {
    default_recall_dir().join("config.toml")
}

impl RecallConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            RecallConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides (RECALL_DB, RECALL_LOG_LEVEL, RECALL_PORT).
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("RECALL_DB") {
            self.storage.db_path = val;
        }
        if let Ok(val) = std::env::var("RECALL_LOG_LEVEL") {
            self.server.log_level = val;
        }
        if let Ok(val) = std::env::var("RECALL_PORT") {
            match val.parse() {
                Ok(port) => self.server.port = port,
                Err(_) => tracing::warn!(value = %val, "ignoring invalid RECALL_PORT"),
            }
        }
    }

    /// Resolve the database path, expanding `~` if needed.
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}
