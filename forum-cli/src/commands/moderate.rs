//! Flag and delete messages.

use anyhow::{Context, Result};
use forum_types::MessageId;
use std::path::Path;

use super::Session;

/// Run the flag command.
pub async fn flag(data_dir: &Path, id: &str) -> Result<()> {
    let session = Session::open(data_dir).await?;
    let sync = session.synchronizer();
    let id = MessageId::new(id);

    sync.flag(&id)
        .await
        .with_context(|| format!("Failed to flag message {}", id))?;

    println!("Message {} flagged for moderation.", id);
    Ok(())
}

/// Run the delete command.
///
/// Only the author of a message may delete it.
pub async fn delete(data_dir: &Path, id: &str) -> Result<()> {
    let session = Session::open(data_dir).await?;
    let id = MessageId::new(id);

    let message = session
        .store
        .get(&id)
        .await?
        .with_context(|| format!("Message {} not found", id))?;
    if message.author_id.as_str() != session.profile.user_id {
        anyhow::bail!(
            "Message {} was posted by {}; you can only delete your own messages",
            id,
            message.author_name
        );
    }

    let sync = session.synchronizer();
    sync.delete(&id)
        .await
        .with_context(|| format!("Failed to delete message {}", id))?;

    println!("Message {} deleted.", id);
    Ok(())
}
