//! # Service Configuration
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     KASSA_DATABASE_PATH=/var/lib/kassa/kassa.db                        │
//! │     KASSA_SWEEPER_ABANDON_AFTER_SECS=900                               │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/kassa/kassa.toml (Linux)                                 │
//! │     ~/Library/Application Support/com.kassa.kassa/kassa.toml (macOS)   │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [database]
//! path = "/var/lib/kassa/kassa.db"
//! max_connections = 5
//! busy_timeout_ms = 5000
//!
//! [retry]
//! initial_backoff_ms = 10
//! max_backoff_ms = 200
//! max_elapsed_ms = 3000
//!
//! [sweeper]
//! abandon_after_secs = 1800
//!
//! [notifications]
//! drawer_opened = true
//! drawer_closed = true
//! payment_completed = true
//! buffer = 64
//!
//! [logging]
//! filter = "info,kassa=debug,sqlx=warn"
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{ServiceError, ServiceResult};
use kassa_db::DbConfig;

// =============================================================================
// Database Settings
// =============================================================================

/// Where the store lives and how the pool is sized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite file. Defaults to `kassa.db` in the platform data directory.
    #[serde(default = "default_database_path")]
    pub path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// How long a writer waits on a locked database (milliseconds).
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,
}

fn default_database_path() -> PathBuf {
    directories::ProjectDirs::from("com", "kassa", "kassa")
        .map(|dirs| dirs.data_dir().join("kassa.db"))
        .unwrap_or_else(|| PathBuf::from("kassa.db"))
}

fn default_max_connections() -> u32 {
    5
}

fn default_busy_timeout() -> u64 {
    5000
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_database_path(),
            max_connections: default_max_connections(),
            busy_timeout_ms: default_busy_timeout(),
        }
    }
}

impl DatabaseSettings {
    /// Pool configuration for these settings.
    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(&self.path)
            .max_connections(self.max_connections)
            .busy_timeout(Duration::from_millis(self.busy_timeout_ms))
    }
}

// =============================================================================
// Retry Settings
// =============================================================================

/// Backoff for write conflicts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,

    /// Total time an operation may spend retrying before it reports a
    /// transient failure.
    #[serde(default = "default_max_elapsed")]
    pub max_elapsed_ms: u64,
}

fn default_initial_backoff() -> u64 {
    10
}

fn default_max_backoff() -> u64 {
    200
}

fn default_max_elapsed() -> u64 {
    3000
}

impl Default for RetrySettings {
    fn default() -> Self {
        RetrySettings {
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
            max_elapsed_ms: default_max_elapsed(),
        }
    }
}

// =============================================================================
// Sweeper Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweeperSettings {
    /// A pending transaction older than this is considered abandoned.
    #[serde(default = "default_abandon_after")]
    pub abandon_after_secs: u64,
}

fn default_abandon_after() -> u64 {
    30 * 60
}

impl Default for SweeperSettings {
    fn default() -> Self {
        SweeperSettings {
            abandon_after_secs: default_abandon_after(),
        }
    }
}

// =============================================================================
// Notification Settings
// =============================================================================

/// Per-event toggles for the notification sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationSettings {
    #[serde(default = "default_true")]
    pub drawer_opened: bool,

    #[serde(default = "default_true")]
    pub drawer_closed: bool,

    #[serde(default = "default_true")]
    pub payment_completed: bool,

    /// Capacity of the channel sink.
    #[serde(default = "default_buffer")]
    pub buffer: usize,
}

fn default_true() -> bool {
    true
}

fn default_buffer() -> usize {
    64
}

impl Default for NotificationSettings {
    fn default() -> Self {
        NotificationSettings {
            drawer_opened: true,
            drawer_closed: true,
            payment_completed: true,
            buffer: default_buffer(),
        }
    }
}

// =============================================================================
// Logging Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    #[serde(default = "default_filter")]
    pub filter: String,
}

fn default_filter() -> String {
    "info,kassa=debug,sqlx=warn".to_string()
}

impl Default for LoggingSettings {
    fn default() -> Self {
        LoggingSettings {
            filter: default_filter(),
        }
    }
}

// =============================================================================
// Main Configuration
// =============================================================================

/// Complete service configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KassaConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub retry: RetrySettings,

    #[serde(default)]
    pub sweeper: SweeperSettings,

    #[serde(default)]
    pub notifications: NotificationSettings,

    #[serde(default)]
    pub logging: LoggingSettings,
}

impl KassaConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (kassa.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> ServiceResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> ServiceResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| ServiceError::InvalidConfig("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> ServiceResult<()> {
        if self.database.path.as_os_str().is_empty() {
            return Err(ServiceError::InvalidConfig(
                "database.path must not be empty".into(),
            ));
        }
        if self.database.max_connections == 0 {
            return Err(ServiceError::InvalidConfig(
                "database.max_connections must be greater than 0".into(),
            ));
        }
        if self.retry.initial_backoff_ms == 0 || self.retry.max_backoff_ms < self.retry.initial_backoff_ms {
            return Err(ServiceError::InvalidConfig(
                "retry.max_backoff_ms must be at least retry.initial_backoff_ms (> 0)".into(),
            ));
        }
        if self.notifications.buffer == 0 {
            return Err(ServiceError::InvalidConfig(
                "notifications.buffer must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// Applies `KASSA_*` overrides read through `var`.
    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(path) = var("KASSA_DATABASE_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        if let Some(max) = var("KASSA_DATABASE_MAX_CONNECTIONS") {
            match max.parse() {
                Ok(n) => self.database.max_connections = n,
                Err(_) => warn!(value = %max, "Ignoring invalid KASSA_DATABASE_MAX_CONNECTIONS"),
            }
        }

        if let Some(ms) = var("KASSA_RETRY_MAX_ELAPSED_MS") {
            match ms.parse() {
                Ok(n) => self.retry.max_elapsed_ms = n,
                Err(_) => warn!(value = %ms, "Ignoring invalid KASSA_RETRY_MAX_ELAPSED_MS"),
            }
        }

        if let Some(secs) = var("KASSA_SWEEPER_ABANDON_AFTER_SECS") {
            match secs.parse() {
                Ok(n) => self.sweeper.abandon_after_secs = n,
                Err(_) => warn!(value = %secs, "Ignoring invalid KASSA_SWEEPER_ABANDON_AFTER_SECS"),
            }
        }

        for (key, flag) in [
            ("KASSA_NOTIFY_DRAWER_OPENED", &mut self.notifications.drawer_opened),
            ("KASSA_NOTIFY_DRAWER_CLOSED", &mut self.notifications.drawer_closed),
            ("KASSA_NOTIFY_PAYMENT_COMPLETED", &mut self.notifications.payment_completed),
        ] {
            if let Some(value) = var(key) {
                match value.to_lowercase().as_str() {
                    "1" | "true" | "on" => *flag = true,
                    "0" | "false" | "off" => *flag = false,
                    _ => warn!(key, value = %value, "Ignoring invalid notification toggle"),
                }
            }
        }

        if let Some(filter) = var("KASSA_LOG") {
            self.logging.filter = filter;
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "kassa", "kassa")
            .map(|dirs| dirs.config_dir().join("kassa.toml"))
    }

    /// Age after which a pending transaction is swept.
    pub fn abandon_after(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.sweeper.abandon_after_secs).unwrap_or(i64::MAX))
    }
}
