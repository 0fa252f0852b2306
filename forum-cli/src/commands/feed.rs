//! Print the current feed once.

use anyhow::Result;
use std::path::Path;

use super::Session;

/// Run the feed command.
///
/// Loads the newest public and private messages, plus `older_pages` pages
/// of older public messages, and prints them oldest first.
pub async fn run(data_dir: &Path, older_pages: u32) -> Result<()> {
    let session = Session::open(data_dir).await?;
    let sync = session.synchronizer();

    sync.load_initial().await?;
    for _ in 0..older_pages {
        if sync.load_older().await? == 0 {
            break;
        }
    }

    sync.renderer().print_feed();

    let status = sync.status().await;
    println!();
    println!(
        "{} messages shown, {} mentioning you",
        status.rendered, status.tagged
    );
    if status.older_available {
        println!("Older messages available: forum feed --older <pages>");
    }

    Ok(())
}
