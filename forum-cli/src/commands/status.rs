//! Show profile, configuration and store status.

use anyhow::Result;
use forum_store::SqliteStore;
use std::path::Path;

use crate::config::{Config, ProfileConfig};

/// Run the status command.
pub async fn run(data_dir: &Path) -> Result<()> {
    println!("=== forum status ===");
    println!();

    match ProfileConfig::load(data_dir).await {
        Ok(profile) => {
            println!("Profile:");
            println!("  User ID: {}", profile.user_id);
            println!("  Name:    {}", profile.display_name);
            println!("  Role:    {}", profile.role);
            println!("  Init:    {}", format_timestamp(profile.created_at));
        }
        Err(_) => {
            println!("Profile: NOT INITIALIZED");
            println!();
            println!("Run 'forum init --name <name>' to initialize.");
            return Ok(());
        }
    }

    println!();

    let config = Config::load(data_dir)?;
    println!("Polling:");
    println!("  Interval:      {}s", config.sync.poll_interval_secs);
    println!(
        "  Page sizes:    {} public, {} private, {} older",
        config.sync.public_limit, config.sync.private_limit, config.sync.older_page_limit
    );
    println!("  Overlap:       {}ms", config.sync.overlap_ms);

    println!();

    let database = config.database_path(data_dir);
    println!("Store:");
    println!("  Database: {}", database.display());
    if !database.exists() {
        println!("  Messages: none yet (database not created)");
        return Ok(());
    }
    let store = SqliteStore::open(&database).await?;
    println!("  Messages: {}", store.count().await?);

    Ok(())
}

/// Format a Unix timestamp as a human-readable string.
fn format_timestamp(ts: u64) -> String {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let diff = now.saturating_sub(ts);

    if diff < 60 {
        "just now".to_string()
    } else if diff < 3600 {
        format!("{} minutes ago", diff / 60)
    } else if diff < 86400 {
        format!("{} hours ago", diff / 3600)
    } else {
        format!("{} days ago", diff / 86400)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forum_types::RoleTag;
    use tempfile::tempdir;

    #[tokio::test]
    async fn status_without_init() {
        let dir = tempdir().unwrap();
        assert!(run(dir.path()).await.is_ok());
    }

    #[tokio::test]
    async fn status_with_profile_and_store() {
        let dir = tempdir().unwrap();
        ProfileConfig::new("Alice", RoleTag::User)
            .save(dir.path())
            .await
            .unwrap();

        // Before and after the database exists
        assert!(run(dir.path()).await.is_ok());
        SqliteStore::open(&dir.path().join("forum.db")).await.unwrap();
        assert!(run(dir.path()).await.is_ok());
    }

    #[test]
    fn format_timestamp_works() {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs();

        assert_eq!(format_timestamp(now), "just now");
        assert!(format_timestamp(now - 120).contains("minutes"));
        assert!(format_timestamp(now - 7200).contains("hours"));
        assert!(format_timestamp(now - 172800).contains("days"));
    }
}
