//! Initialize the local profile.

use anyhow::Result;
use forum_types::RoleTag;
use std::path::Path;

use crate::config::{Config, ProfileConfig};

/// Run the init command.
pub async fn run(data_dir: &Path, name: &str, role: RoleTag) -> Result<()> {
    if ProfileConfig::exists(data_dir) {
        anyhow::bail!(
            "Profile already initialized. Delete {} to reinitialize.",
            data_dir.join("profile.json").display()
        );
    }
    if name.trim().is_empty() {
        anyhow::bail!("Display name must not be empty");
    }

    let profile = ProfileConfig::new(name.trim(), role);
    profile.save(data_dir).await?;
    let wrote_config = Config::save_default_if_missing(data_dir).await?;

    println!("Profile initialized successfully!");
    println!();
    println!("  User ID:  {}", profile.user_id);
    println!("  Name:     {}", profile.display_name);
    println!("  Role:     {}", profile.role);
    println!("  Data dir: {}", data_dir.display());
    if wrote_config {
        println!("  Config:   {}", data_dir.join("forum.toml").display());
    }
    println!();
    println!("Next steps:");
    println!("  1. Post a message: forum post \"hello everyone\"");
    println!("  2. Follow the feed: forum watch");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn init_creates_profile_and_config() {
        let dir = tempdir().unwrap();
        run(dir.path(), "Alice", RoleTag::Doctor).await.unwrap();

        assert!(dir.path().join("profile.json").exists());
        assert!(dir.path().join("forum.toml").exists());

        let profile = ProfileConfig::load(dir.path()).await.unwrap();
        assert_eq!(profile.display_name, "Alice");
        assert_eq!(profile.role, RoleTag::Doctor);
        assert_eq!(profile.user_id.len(), 36);
    }

    #[tokio::test]
    async fn init_fails_if_already_initialized() {
        let dir = tempdir().unwrap();

        run(dir.path(), "Alice", RoleTag::User).await.unwrap();

        let result = run(dir.path(), "Alice again", RoleTag::User).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn init_rejects_blank_name() {
        let dir = tempdir().unwrap();
        assert!(run(dir.path(), "   ", RoleTag::User).await.is_err());
        assert!(!ProfileConfig::exists(dir.path()));
    }
}
