//! CLI command implementations.

pub mod feed;
pub mod init;
pub mod moderate;
pub mod post;
pub mod status;
pub mod watch;

use anyhow::{Context, Result};
use forum_client::Synchronizer;
use forum_store::SqliteStore;
use std::path::Path;
use std::sync::Arc;

use crate::config::{Config, ProfileConfig};
use crate::render::TerminalRenderer;

/// Everything a command needs once the profile exists.
pub struct Session {
    pub config: Config,
    pub profile: ProfileConfig,
    pub store: SqliteStore,
}

impl Session {
    /// Load profile and configuration and open the message database.
    pub async fn open(data_dir: &Path) -> Result<Self> {
        let profile = ProfileConfig::load(data_dir).await?;
        let config = Config::load(data_dir)?;
        let database = config.database_path(data_dir);
        let store = SqliteStore::open(&database)
            .await
            .with_context(|| format!("Failed to open message database {}", database.display()))?;

        Ok(Self {
            config,
            profile,
            store,
        })
    }

    /// Build a synchronizer over the session's store with a terminal renderer.
    pub fn synchronizer(&self) -> Arc<Synchronizer<SqliteStore, Arc<TerminalRenderer>>> {
        let viewer = self.profile.viewer();
        let renderer = Arc::new(TerminalRenderer::new(viewer.user_id.clone()));
        Arc::new(Synchronizer::new(
            self.store.clone(),
            renderer,
            viewer,
            self.config.sync.clone(),
        ))
    }
}
