//! Post a message.

use anyhow::{Context, Result};
use forum_core::Draft;
use forum_types::{ImageRef, MessageId, UserId};
use std::path::Path;

use super::Session;

/// What to post.
#[derive(Debug, Default)]
pub struct PostArgs {
    /// Message text.
    pub body: String,
    /// Whisper recipient user id.
    pub to: Option<String>,
    /// Whisper recipient display name (defaults to the id).
    pub to_name: Option<String>,
    /// Id of the message being replied to.
    pub reply_to: Option<String>,
    /// Image files or http(s) URLs.
    pub images: Vec<String>,
}

/// Run the post command.
pub async fn run(data_dir: &Path, args: PostArgs) -> Result<()> {
    let session = Session::open(data_dir).await?;
    let sync = session.synchronizer();

    let mut draft = Draft::new(&args.body);

    if let Some(to) = args.to {
        let name = args.to_name.unwrap_or_else(|| to.clone());
        draft = draft.whisper_to(UserId::new(to), &name);
    }

    if let Some(reply_to) = args.reply_to {
        let id = MessageId::new(reply_to);
        let original = session
            .store
            .get(&id)
            .await?
            .with_context(|| format!("Cannot reply: message {} not found", id))?;
        draft = draft.reply_to(id, &original.author_name);
    }

    for image in &args.images {
        draft = draft.with_image(load_image(image).await?);
    }

    let stored = sync.send(draft).await?;

    if stored.is_private {
        println!("Whisper sent: {}", stored.id);
    } else {
        println!("Message posted: {}", stored.id);
    }
    if !stored.mentions.is_empty() {
        println!("  Mentions: {}", stored.mentions.join(", "));
    }

    Ok(())
}

/// Turn a command-line image argument into an attachment.
///
/// URLs are attached as hosted images; anything else is read from disk and
/// embedded as a data URL.
pub async fn load_image(arg: &str) -> Result<ImageRef> {
    if arg.starts_with("http://") || arg.starts_with("https://") {
        return Ok(ImageRef::hosted(arg));
    }

    let path = Path::new(arg);
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read image {}", path.display()))?;
    let mime = mime_for(path)
        .with_context(|| format!("Unsupported image type: {}", path.display()))?;
    Ok(ImageRef::inline(mime, &bytes))
}

fn mime_for(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}
