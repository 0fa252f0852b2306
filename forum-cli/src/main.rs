//! # forum
//!
//! Terminal client for forum-sync.
//!
//! ## Commands
//!
//! - `init`: Create the local profile
//! - `post`: Post a public message or a whisper
//! - `feed`: Print the newest messages once
//! - `watch`: Follow the feed live
//! - `flag` / `delete`: Moderate a message
//! - `status`: Show profile, settings and store status
//!
//! ## Example
//!
//! ```bash
//! forum init --name Alice --role doctor
//! forum post "hello @bob"
//! forum post --to <user-id> --to-name Bob "just between us"
//! forum watch
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use forum_types::RoleTag;
use std::path::PathBuf;

mod commands;
mod config;
mod render;

use commands::post::PostArgs;
use commands::{feed, init, moderate, post, status, watch};

/// Terminal client for forum-sync.
#[derive(Parser, Debug)]
#[command(name = "forum")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Data directory for the profile, configuration and database
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Log synchronizer activity to stderr
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the local profile
    Init {
        /// Display name
        #[arg(long, short)]
        name: String,

        /// Role badge: doctor, student, enthusiast or user
        #[arg(long, short, default_value = "user")]
        role: RoleTag,
    },

    /// Post a message
    Post {
        /// Message text
        body: String,

        /// Whisper to this user id instead of posting publicly
        #[arg(long)]
        to: Option<String>,

        /// Display name of the whisper recipient
        #[arg(long, requires = "to")]
        to_name: Option<String>,

        /// Reply to the message with this id
        #[arg(long)]
        reply_to: Option<String>,

        /// Attach an image file or URL (repeatable, at most 4)
        #[arg(long = "image", short = 'i')]
        images: Vec<String>,
    },

    /// Print the newest messages
    Feed {
        /// Also load this many pages of older messages
        #[arg(long, default_value = "0")]
        older: u32,
    },

    /// Follow the feed live
    Watch,

    /// Flag a message for moderation
    Flag {
        /// Message id
        id: String,
    },

    /// Delete one of your own messages
    Delete {
        /// Message id
        id: String,
    },

    /// Show profile, settings and store status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    // Determine data directory
    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => default_data_dir()?,
    };

    // Ensure data directory exists
    tokio::fs::create_dir_all(&data_dir)
        .await
        .context("Failed to create data directory")?;
    config::set_dir_permissions_0700(&data_dir).await?;

    match cli.command {
        Commands::Init { name, role } => {
            init::run(&data_dir, &name, role).await?;
        }
        Commands::Post {
            body,
            to,
            to_name,
            reply_to,
            images,
        } => {
            post::run(
                &data_dir,
                PostArgs {
                    body,
                    to,
                    to_name,
                    reply_to,
                    images,
                },
            )
            .await?;
        }
        Commands::Feed { older } => {
            feed::run(&data_dir, older).await?;
        }
        Commands::Watch => {
            watch::run(&data_dir).await?;
        }
        Commands::Flag { id } => {
            moderate::flag(&data_dir, &id).await?;
        }
        Commands::Delete { id } => {
            moderate::delete(&data_dir, &id).await?;
        }
        Commands::Status => {
            status::run(&data_dir).await?;
        }
    }

    Ok(())
}

/// Initialise the tracing subscriber (stderr, `RUST_LOG` wins over `--verbose`).
fn init_logging(verbose: bool) {
    let default = if verbose {
        "forum=debug,forum_sync_client=debug,forum_sync_store=debug"
    } else {
        "warn"
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .init();
}

/// Get the default data directory for the forum CLI.
fn default_data_dir() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("io", "forum-sync", "forum")
        .context("Could not determine home directory")?;
    Ok(dirs.data_dir().to_path_buf())
}
