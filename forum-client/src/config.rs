//! Synchronizer configuration.
//!
//! Usually embedded as the `[sync]` table of a larger TOML file. Every field
//! has a default, so an empty table is valid.

use forum_core::FeedSettings;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Polling and paging settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Seconds between timer-driven poll cycles (default: 10).
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Limit for incremental public polls (default: 20).
    #[serde(default = "default_public_limit")]
    pub public_limit: u32,
    /// Limit for incremental private polls (default: 10).
    #[serde(default = "default_private_limit")]
    pub private_limit: u32,
    /// Public messages fetched by an initial load or refresh (default: 20).
    #[serde(default = "default_initial_limit")]
    pub initial_public_limit: u32,
    /// Private messages fetched by an initial load or refresh (default: 20).
    #[serde(default = "default_initial_limit")]
    pub initial_private_limit: u32,
    /// Page size when loading older messages (default: 10).
    #[serde(default = "default_older_page_limit")]
    pub older_page_limit: u32,
    /// How far below the watermark poll queries start, in ms (default: 2000).
    #[serde(default = "default_overlap_ms")]
    pub overlap_ms: u64,
    /// Delay between a local send and the poll it triggers, in ms (default: 1000).
    #[serde(default = "default_send_poll_delay_ms")]
    pub send_poll_delay_ms: u64,
    /// Polled messages older than this are not counted as unread (default: 60).
    #[serde(default = "default_unread_window_secs")]
    pub unread_window_secs: u64,
}

// Default value functions
fn default_poll_interval_secs() -> u64 {
    10
}

fn default_public_limit() -> u32 {
    20
}

fn default_private_limit() -> u32 {
    10
}

fn default_initial_limit() -> u32 {
    20
}

fn default_older_page_limit() -> u32 {
    10
}

fn default_overlap_ms() -> u64 {
    2_000
}

fn default_send_poll_delay_ms() -> u64 {
    1_000
}

fn default_unread_window_secs() -> u64 {
    60
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            public_limit: default_public_limit(),
            private_limit: default_private_limit(),
            initial_public_limit: default_initial_limit(),
            initial_private_limit: default_initial_limit(),
            older_page_limit: default_older_page_limit(),
            overlap_ms: default_overlap_ms(),
            send_poll_delay_ms: default_send_poll_delay_ms(),
            unread_window_secs: default_unread_window_secs(),
        }
    }
}

impl SyncConfig {
    /// Load a standalone sync configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Interval between timer-driven cycles.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    /// Delay before the poll that follows a local send.
    pub fn send_poll_delay(&self) -> Duration {
        Duration::from_millis(self.send_poll_delay_ms)
    }

    /// Limits and windows for the feed state machine.
    pub fn feed_settings(&self) -> FeedSettings {
        FeedSettings {
            public_limit: self.public_limit,
            private_limit: self.private_limit,
            initial_public_limit: self.initial_public_limit,
            initial_private_limit: self.initial_private_limit,
            older_page_limit: self.older_page_limit,
            overlap_ms: self.overlap_ms,
            unread_window_ms: self.unread_window_secs.saturating_mul(1_000),
        }
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_forum_behaviour() {
        let config = SyncConfig::default();
        assert_eq!(config.poll_interval(), Duration::from_secs(10));
        assert_eq!(config.public_limit, 20);
        assert_eq!(config.private_limit, 10);
        assert_eq!(config.send_poll_delay(), Duration::from_secs(1));
        assert_eq!(config.feed_settings(), FeedSettings::default());
    }

    #[test]
    fn empty_table_uses_defaults() {
        let config: SyncConfig = toml::from_str("").unwrap();
        assert_eq!(config, SyncConfig::default());
    }

    #[test]
    fn partial_toml_overrides() {
        let config: SyncConfig = toml::from_str(
            r#"
poll_interval_secs = 3
overlap_ms = 0
"#,
        )
        .unwrap();

        assert_eq!(config.poll_interval_secs, 3);
        assert_eq!(config.overlap_ms, 0);
        assert_eq!(config.public_limit, 20);
    }

    #[test]
    fn zero_interval_is_clamped() {
        let config = SyncConfig {
            poll_interval_secs: 0,
            ..SyncConfig::default()
        };
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
    }

    #[test]
    fn from_file_reads_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "private_limit = 5").unwrap();

        let config = SyncConfig::from_file(file.path()).unwrap();
        assert_eq!(config.private_limit, 5);
    }

    #[test]
    fn from_file_reports_errors() {
        let missing = SyncConfig::from_file(Path::new("/nonexistent/forum.toml"));
        assert!(matches!(missing, Err(ConfigError::ReadError { .. })));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "public_limit = \"lots\"").unwrap();
        let bad = SyncConfig::from_file(file.path());
        assert!(matches!(bad, Err(ConfigError::ParseError { .. })));
    }
}
