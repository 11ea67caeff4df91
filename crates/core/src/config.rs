//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Whether a PENDING-only mapping makes a file count as "tagged".
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaggedPolicy {
    /// Only CURRENT mappings count.
    #[default]
    CurrentOnly,
    /// CURRENT or PENDING mappings count.
    CurrentOrPending,
}

/// Tag store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Database file path, or `:memory:` for a throwaway store.
    #[serde(default = "default_path")]
    pub path: PathBuf,
    /// How long SQLite waits on a locked database before failing.
    #[serde(default = "default_busy_timeout_secs")]
    pub busy_timeout_secs: u64,
    /// Capacity of the single-writer work queue.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Capacity of the change notification and failure channels.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
    /// Maximum number of autocomplete results returned per query.
    #[serde(default = "default_autocomplete_limit")]
    pub autocomplete_limit: usize,
    /// Policy for counting tagged files.
    #[serde(default)]
    pub tagged_policy: TaggedPolicy,
}

fn default_path() -> PathBuf {
    PathBuf::from("./data/tags.db")
}

fn default_busy_timeout_secs() -> u64 {
    5
}

fn default_queue_capacity() -> usize {
    256
}

fn default_event_capacity() -> usize {
    1024
}

fn default_autocomplete_limit() -> usize {
    100
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
            busy_timeout_secs: default_busy_timeout_secs(),
            queue_capacity: default_queue_capacity(),
            event_capacity: default_event_capacity(),
            autocomplete_limit: default_autocomplete_limit(),
            tagged_policy: TaggedPolicy::default(),
        }
    }
}

impl StoreConfig {
    /// In-memory store with default limits.
    ///
    /// **For testing only.**
    pub fn for_testing() -> Self {
        Self {
            path: PathBuf::from(":memory:"),
            ..Self::default()
        }
    }

    /// Whether this configuration opens an in-memory database.
    pub fn is_in_memory(&self) -> bool {
        self.path.as_os_str() == ":memory:"
    }

    /// Busy timeout as a Duration.
    pub fn busy_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.busy_timeout_secs)
    }

    /// Validate store configuration invariants.
    pub fn validate(&self) -> crate::Result<()> {
        if self.queue_capacity == 0 {
            return Err(crate::Error::InvalidConfig(
                "store.queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.event_capacity == 0 {
            return Err(crate::Error::InvalidConfig(
                "store.event_capacity must be at least 1".to_string(),
            ));
        }
        if self.autocomplete_limit == 0 {
            return Err(crate::Error::InvalidConfig(
                "store.autocomplete_limit must be at least 1".to_string(),
            ));
        }
        if self.path.as_os_str().is_empty() {
            return Err(crate::Error::InvalidConfig(
                "store.path must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Logging configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default `tracing` filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

fn default_log_filter() -> String {
    "info,sqlx=warn".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Tag store configuration.
    #[serde(default)]
    pub store: StoreConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Create a test configuration backed by an in-memory store.
    ///
    /// **For testing only.**
    pub fn for_testing() -> Self {
        Self {
            store: StoreConfig::for_testing(),
            logging: LoggingConfig::default(),
        }
    }

    /// Validate the whole configuration.
    pub fn validate(&self) -> crate::Result<()> {
        self.store.validate()
    }
}
