//! Configuration management for the forum CLI.
//!
//! Two files live in the data directory:
//! - `forum.toml`: sync settings and the database location
//! - `profile.json`: who is posting (created by `forum init`)

use anyhow::{Context, Result};
use forum_client::{ConfigError, SyncConfig};
use forum_core::Viewer;
use forum_types::{RoleTag, UserId};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const CONFIG_FILE: &str = "forum.toml";
const PROFILE_FILE: &str = "profile.json";

/// Root configuration (`forum.toml`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Polling and paging settings.
    #[serde(default)]
    pub sync: SyncConfig,
    /// Storage configuration.
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database, relative to the data directory unless absolute.
    #[serde(default = "default_database_path")]
    pub database: PathBuf,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("forum.db")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: default_database_path(),
        }
    }
}

impl Config {
    /// Load `forum.toml` from the data directory, or defaults if it is absent.
    pub fn load(data_dir: &Path) -> Result<Self, ConfigError> {
        let path = data_dir.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::ReadError {
            path: path.clone(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError { path, source: e })
    }

    /// Write `forum.toml` unless one already exists.
    pub async fn save_default_if_missing(data_dir: &Path) -> Result<bool> {
        let path = data_dir.join(CONFIG_FILE);
        if path.exists() {
            return Ok(false);
        }

        let contents = toml::to_string_pretty(&Self::default())
            .context("Failed to serialize default configuration")?;
        tokio::fs::write(&path, contents)
            .await
            .context("Failed to write forum.toml")?;
        Ok(true)
    }

    /// Resolved database location.
    pub fn database_path(&self, data_dir: &Path) -> PathBuf {
        if self.storage.database.is_absolute() {
            self.storage.database.clone()
        } else {
            data_dir.join(&self.storage.database)
        }
    }
}

/// Local identity (`profile.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileConfig {
    /// Account identifier (UUID v4).
    pub user_id: String,
    /// Name shown next to messages and matched by mentions.
    pub display_name: String,
    /// Role badge.
    #[serde(default)]
    pub role: RoleTag,
    /// When the profile was created (Unix seconds).
    pub created_at: u64,
}

impl ProfileConfig {
    /// Create a new profile with a fresh user id.
    pub fn new(name: &str, role: RoleTag) -> Self {
        Self {
            user_id: UserId::random().to_string(),
            display_name: name.to_string(),
            role,
            created_at: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
        }
    }

    /// Load the profile from a directory.
    pub async fn load(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(PROFILE_FILE);
        let contents = tokio::fs::read_to_string(&path)
            .await
            .context("Profile not initialized. Run 'forum init' first.")?;
        serde_json::from_str(&contents).context("Invalid profile")
    }

    /// Save the profile to a directory.
    pub async fn save(&self, data_dir: &Path) -> Result<()> {
        let path = data_dir.join(PROFILE_FILE);
        let contents = serde_json::to_string_pretty(self)?;
        tokio::fs::write(&path, contents)
            .await
            .context("Failed to save profile")?;
        set_file_permissions_0600(&path).await?;
        Ok(())
    }

    /// Check if a profile exists.
    pub fn exists(data_dir: &Path) -> bool {
        data_dir.join(PROFILE_FILE).exists()
    }

    /// The viewer this profile reads and posts as.
    pub fn viewer(&self) -> Viewer {
        Viewer::new(
            UserId::new(self.user_id.as_str()),
            &self.display_name,
            self.role,
        )
    }
}

/// Set file permissions to 0600 (owner read/write only) on Unix.
/// No-op on non-Unix platforms.
async fn set_file_permissions_0600(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .await
            .context("Failed to set file permissions")?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}

/// Set directory permissions to 0700 (owner only) on Unix.
/// No-op on non-Unix platforms.
pub async fn set_dir_permissions_0700(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
            .await
            .context("Failed to set directory permissions")?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_config_uses_defaults() {
        let dir = tempdir().unwrap();
        let config = Config::load(dir.path()).unwrap();

        assert_eq!(config.sync, SyncConfig::default());
        assert_eq!(config.database_path(dir.path()), dir.path().join("forum.db"));
    }

    #[test]
    fn config_from_toml() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("forum.toml"),
            r#"
[sync]
poll_interval_secs = 5

[storage]
database = "/var/lib/forum/messages.db"
"#,
        )
        .unwrap();

        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.sync.poll_interval_secs, 5);
        assert_eq!(config.sync.public_limit, 20);
        assert_eq!(
            config.database_path(dir.path()),
            PathBuf::from("/var/lib/forum/messages.db")
        );
    }

    #[test]
    fn malformed_config_is_an_error() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("forum.toml"), "[sync\n").unwrap();

        assert!(matches!(
            Config::load(dir.path()),
            Err(ConfigError::ParseError { .. })
        ));
    }

    #[tokio::test]
    async fn default_config_written_once() {
        let dir = tempdir().unwrap();

        assert!(Config::save_default_if_missing(dir.path()).await.unwrap());
        assert!(!Config::save_default_if_missing(dir.path()).await.unwrap());

        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.sync, SyncConfig::default());
    }

    #[tokio::test]
    async fn profile_roundtrip() {
        let dir = tempdir().unwrap();
        let profile = ProfileConfig::new("Alice", RoleTag::Doctor);
        profile.save(dir.path()).await.unwrap();

        let loaded = ProfileConfig::load(dir.path()).await.unwrap();
        assert_eq!(loaded.user_id, profile.user_id);
        assert_eq!(loaded.display_name, "Alice");
        assert_eq!(loaded.role, RoleTag::Doctor);

        let viewer = loaded.viewer();
        assert_eq!(viewer.user_id.as_str(), profile.user_id);
    }

    #[tokio::test]
    async fn profile_without_role_defaults_to_user() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("profile.json"),
            r#"{"user_id":"u1","display_name":"Old","created_at":0}"#,
        )
        .unwrap();

        let loaded = ProfileConfig::load(dir.path()).await.unwrap();
        assert_eq!(loaded.role, RoleTag::User);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn profile_file_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempdir().unwrap();
        ProfileConfig::new("Alice", RoleTag::User)
            .save(dir.path())
            .await
            .unwrap();

        let path = dir.path().join("profile.json");
        let perms = tokio::fs::metadata(&path).await.unwrap().permissions();
        assert_eq!(perms.mode() & 0o777, 0o600, "file should be 0600");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn data_dir_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempdir().unwrap();
        let data_dir = dir.path().join("forum-data");
        tokio::fs::create_dir_all(&data_dir).await.unwrap();
        set_dir_permissions_0700(&data_dir).await.unwrap();

        let perms = tokio::fs::metadata(&data_dir).await.unwrap().permissions();
        assert_eq!(perms.mode() & 0o777, 0o700, "dir should be 0700");
    }
}
