//! Terminal renderer.
//!
//! A terminal scrolls the other way from a web feed: the newest line is at
//! the bottom. Records are kept in feed order (newest first) and printed
//! oldest first. Until [`TerminalRenderer::go_live`] nothing is printed;
//! afterwards polled records (inserted at the top of the feed) print as they
//! arrive and older pages are held back until
//! [`TerminalRenderer::print_history`].

use forum_client::Renderer;
use forum_core::{FeedEvent, Position};
use forum_types::{ImageKind, Message, MessageId, Timestamp, UserId};
use std::collections::VecDeque;
use std::io::Write;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Renderer printing to stdout.
pub struct TerminalRenderer {
    viewer: UserId,
    inner: Mutex<TerminalInner>,
}

#[derive(Default)]
struct TerminalInner {
    /// Feed model, newest first.
    feed: VecDeque<Message>,
    live: bool,
    /// Older records inserted while live, not yet printed.
    history: Vec<Message>,
    last_printed: Option<MessageId>,
}

impl TerminalRenderer {
    /// Create a renderer for `viewer` (used to mark their own messages).
    pub fn new(viewer: UserId) -> Self {
        Self {
            viewer,
            inner: Mutex::new(TerminalInner::default()),
        }
    }

    fn inner(&self) -> MutexGuard<'_, TerminalInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Print the whole feed, oldest first.
    pub fn print_feed(&self) {
        let mut inner = self.inner();
        let now = Timestamp::now();
        let lines: Vec<String> = inner
            .feed
            .iter()
            .rev()
            .map(|m| format_message(m, &self.viewer, now))
            .collect();
        let newest = inner.feed.front().map(|m| m.id.clone());
        inner.last_printed = newest;
        drop(inner);

        if lines.is_empty() {
            println!("(no messages yet)");
        }
        print_lines(&lines);
    }

    /// Print the current feed and start printing new records as they arrive.
    pub fn go_live(&self) {
        self.print_feed();
        self.inner().live = true;
    }

    /// Print older records inserted since the last call, oldest first.
    ///
    /// Returns how many were printed.
    pub fn print_history(&self) -> usize {
        let history = std::mem::take(&mut self.inner().history);
        let now = Timestamp::now();
        let lines: Vec<String> = history
            .iter()
            .rev()
            .map(|m| format_message(m, &self.viewer, now))
            .collect();
        if !lines.is_empty() {
            println!("--- older messages ---");
            print_lines(&lines);
            println!("--- end of older messages ---");
        }
        lines.len()
    }

    /// Records currently in the feed, newest first.
    pub fn feed(&self) -> Vec<Message> {
        self.inner().feed.iter().cloned().collect()
    }
}

impl Renderer for TerminalRenderer {
    fn insert(&self, message: &Message, position: Position) {
        let mut inner = self.inner();
        match position {
            Position::Top => inner.feed.push_front(message.clone()),
            Position::Bottom => inner.feed.push_back(message.clone()),
        }
        if !inner.live {
            return;
        }
        match position {
            Position::Top => {
                inner.last_printed = Some(message.id.clone());
                drop(inner);
                print_lines(&[format_message(message, &self.viewer, Timestamp::now())]);
            }
            Position::Bottom => inner.history.push(message.clone()),
        }
    }

    fn mark_rendered(&self, id: &MessageId) {
        tracing::trace!(%id, "Rendered");
    }

    fn highlight(&self, id: &MessageId) {
        let inner = self.inner();
        if !inner.live || inner.last_printed.as_ref() == Some(id) {
            return;
        }
        let line = inner
            .feed
            .iter()
            .find(|m| &m.id == id)
            .map(|m| format_message(m, &self.viewer, Timestamp::now()));
        drop(inner);

        if let Some(line) = line {
            print_lines(&[format!(">> {}", line)]);
        }
    }

    fn remove(&self, id: &MessageId) {
        let mut inner = self.inner();
        inner.feed.retain(|m| &m.id != id);
        if inner.live {
            println!("(message {} deleted)", id);
        }
    }

    fn clear(&self) {
        let mut inner = self.inner();
        inner.feed.clear();
        inner.history.clear();
        inner.last_printed = None;
        if inner.live {
            println!("--- feed refreshed ---");
        }
    }

    fn notify(&self, event: &FeedEvent) {
        if !self.inner().live {
            return;
        }
        match event {
            FeedEvent::Tagged { total, .. } => {
                println!("[@] You were mentioned ({} tagged, 't' to jump)", total);
            }
            FeedEvent::WhisperReceived { from, .. } => {
                println!("[whisper] New private message from {}", from);
            }
            FeedEvent::Unread { count } => {
                tracing::trace!(count, "Unread counter");
            }
        }
    }
}

fn print_lines(lines: &[String]) {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for line in lines {
        let _ = writeln!(out, "{}", line);
    }
    let _ = out.flush();
}

/// Two-line rendering of a record: header, then indented body.
pub fn format_message(message: &Message, viewer: &UserId, now: Timestamp) -> String {
    let mut header = format!("{} [{}]", message.author_name, message.author_role);
    if &message.author_id == viewer {
        header.push_str(" (you)");
    }
    if message.is_private {
        let to = message
            .recipient_name
            .as_deref()
            .or(message.recipient_id.as_ref().map(|r| r.as_str()))
            .unwrap_or("?");
        header.push_str(&format!(" -> {} (whisper)", to));
    }
    if let Some(reply) = &message.reply_to_name {
        header.push_str(&format!(" replying to {}", reply));
    }
    let when = message
        .created_at
        .map(|ts| format_age(ts, now))
        .unwrap_or_else(|| "pending".to_string());
    header.push_str(&format!(" | {} | {}", when, message.id));
    if message.flagged {
        header.push_str(" | flagged");
    }

    let mut text = format!("{}\n  {}", header, message.body.replace('\n', "\n  "));
    if !message.images.is_empty() {
        let hosted = message
            .images
            .iter()
            .filter(|i| i.kind == ImageKind::Hosted)
            .count();
        let inline = message.images.len() - hosted;
        text.push_str(&format!("\n  [images: {} hosted, {} inline]", hosted, inline));
        for image in message.images.iter().filter(|i| i.kind == ImageKind::Hosted) {
            text.push_str(&format!("\n  {}", image.url));
        }
    }
    text
}

/// Relative age of a timestamp.
fn format_age(ts: Timestamp, now: Timestamp) -> String {
    let secs = ts.millis_until(now) / 1_000;

    if secs < 60 {
        "just now".to_string()
    } else if secs < 3600 {
        format!("{} minutes ago", secs / 60)
    } else if secs < 86400 {
        format!("{} hours ago", secs / 3600)
    } else {
        format!("{} days ago", secs / 86400)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forum_types::{ImageRef, NewMessage, RoleTag};

    const NOW: i64 = 1_700_000_000_000;

    fn message(id: &str, body: &str, minutes_ago: i64) -> Message {
        Message::from_new(
            MessageId::new(id),
            Timestamp::from_millis(NOW - minutes_ago * 60_000),
            NewMessage {
                author_id: UserId::new("uid-alice"),
                author_name: "Alice".into(),
                author_role: RoleTag::Doctor,
                body: body.into(),
                recipient_id: None,
                recipient_name: None,
                reply_to_id: None,
                reply_to_name: None,
                mentions: vec![],
                images: vec![],
            },
        )
    }

    #[test]
    fn formats_public_message() {
        let text = format_message(
            &message("m1", "hello", 5),
            &UserId::new("uid-bob"),
            Timestamp::from_millis(NOW),
        );

        assert_eq!(text, "Alice [doctor] | 5 minutes ago | m1\n  hello");
    }

    #[test]
    fn formats_whisper_reply_and_images() {
        let mut m = message("m2", "line one\nline two", 0);
        m.is_private = true;
        m.recipient_id = Some(UserId::new("uid-bob"));
        m.recipient_name = Some("Bob".into());
        m.reply_to_name = Some("Carol".into());
        m.flagged = true;
        m.images = vec![
            ImageRef::hosted("https://img.example/a.png"),
            ImageRef::inline("image/png", b"png"),
        ];

        let text = format_message(&m, &UserId::new("uid-alice"), Timestamp::from_millis(NOW));

        assert!(text.starts_with(
            "Alice [doctor] (you) -> Bob (whisper) replying to Carol | just now | m2 | flagged"
        ));
        assert!(text.contains("\n  line one\n  line two"));
        assert!(text.contains("[images: 1 hosted, 1 inline]"));
        assert!(text.contains("https://img.example/a.png"));
        assert!(!text.contains("base64"));
    }

    #[test]
    fn age_buckets() {
        let now = Timestamp::from_millis(NOW);
        assert_eq!(format_age(Timestamp::from_millis(NOW - 30_000), now), "just now");
        assert_eq!(format_age(Timestamp::from_millis(NOW - 120_000), now), "2 minutes ago");
        assert_eq!(format_age(Timestamp::from_millis(NOW - 7_200_000), now), "2 hours ago");
        assert_eq!(format_age(Timestamp::from_millis(NOW - 172_800_000), now), "2 days ago");
    }

    #[test]
    fn feed_model_follows_positions() {
        let renderer = TerminalRenderer::new(UserId::new("uid-bob"));
        renderer.insert(&message("b", "b", 2), Position::Bottom);
        renderer.insert(&message("c", "c", 1), Position::Top);
        renderer.insert(&message("a", "a", 3), Position::Bottom);

        let ids: Vec<_> = renderer.feed().iter().map(|m| m.id.to_string()).collect();
        assert_eq!(ids, vec!["c", "b", "a"]);

        renderer.remove(&MessageId::new("b"));
        assert_eq!(renderer.feed().len(), 2);

        renderer.clear();
        assert!(renderer.feed().is_empty());
    }

    #[test]
    fn older_pages_held_until_printed() {
        let renderer = TerminalRenderer::new(UserId::new("uid-bob"));
        renderer.go_live();

        renderer.insert(&message("old1", "x", 60), Position::Bottom);
        renderer.insert(&message("old2", "y", 61), Position::Bottom);

        assert_eq!(renderer.print_history(), 2);
        assert_eq!(renderer.print_history(), 0);
    }
}
