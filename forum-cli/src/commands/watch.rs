//! Follow the feed live.
//!
//! Loads the feed, starts the background poller and reads stdin until
//! `/q`, end of input or Ctrl-C. Lines starting with `/` are commands;
//! anything else is posted (`//` posts a line that starts with `/`).

use anyhow::Result;
use forum_client::{MessageStore, Poller, PollerHandle, Synchronizer};
use forum_core::Draft;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

use super::Session;
use crate::render::TerminalRenderer;

const HELP: &str = "Commands: /r refresh, /p poll now, /o older messages, \
                    /t jump to mention, /q quit, /h help. Other lines are posted.";

/// One line of user input.
#[derive(Debug, PartialEq, Eq)]
enum Input {
    Refresh,
    PollNow,
    Older,
    JumpToTagged,
    Quit,
    Help,
    Unknown(String),
    Post(String),
    Empty,
}

impl Input {
    fn parse(line: &str) -> Self {
        let text = line.trim();
        if text.is_empty() {
            return Input::Empty;
        }
        let Some(command) = text.strip_prefix('/') else {
            return Input::Post(text.to_string());
        };
        if command.starts_with('/') {
            return Input::Post(command.to_string());
        }
        match command {
            "r" => Input::Refresh,
            "p" => Input::PollNow,
            "o" => Input::Older,
            "t" => Input::JumpToTagged,
            "q" => Input::Quit,
            "h" | "?" => Input::Help,
            other => Input::Unknown(other.to_string()),
        }
    }
}

/// Run the watch command.
pub async fn run(data_dir: &Path) -> Result<()> {
    let session = Session::open(data_dir).await?;
    let sync = session.synchronizer();

    sync.load_initial().await?;
    sync.renderer().go_live();

    let poller = Poller::spawn(Arc::clone(&sync));
    println!();
    println!(
        "Watching as {} (polling every {}s). {}",
        session.profile.display_name, session.config.sync.poll_interval_secs, HELP
    );

    let stdin = BufReader::new(tokio::io::stdin());
    let result = command_loop(&sync, &poller, stdin).await;

    poller.shutdown().await;
    result
}

async fn command_loop<S, I>(
    sync: &Arc<Synchronizer<S, Arc<TerminalRenderer>>>,
    poller: &PollerHandle,
    input: I,
) -> Result<()>
where
    S: MessageStore + 'static,
    I: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();

    loop {
        let line = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            break;
        };

        match Input::parse(&line) {
            Input::Empty => {}
            Input::Quit => break,
            Input::Help => println!("{}", HELP),
            Input::Unknown(command) => println!("Unknown command /{}. {}", command, HELP),
            Input::Refresh => match poller.refresh().await {
                Ok(count) => println!("({} messages reloaded)", count),
                Err(e) => eprintln!("Refresh failed: {}", e),
            },
            Input::PollNow => poller.poll_now().await?,
            Input::Older => match sync.load_older().await {
                Ok(_) => {
                    if sync.renderer().print_history() == 0 {
                        println!("(no older messages)");
                    }
                }
                Err(e) => eprintln!("Loading older messages failed: {}", e),
            },
            Input::JumpToTagged => {
                if sync.jump_to_tagged().await.is_none() {
                    println!("(no messages mention you)");
                }
            }
            Input::Post(text) => match sync.send(Draft::new(&text)).await {
                Ok(_) => poller.notify_sent(),
                Err(e) => eprintln!("Send failed: {}", e),
            },
        }
    }

    Ok(())
}
