//! Mention extraction.
//!
//! A mention is an `@` followed by a run of non-whitespace characters.
//! The token is everything after the `@` up to the next whitespace, so
//! `"hi @bob, see @@carol"` yields `["bob,", "@carol"]`.

use std::ops::Range;

use crate::Viewer;

/// Byte ranges of every mention in `text`, each including its leading `@`.
pub fn mention_spans(text: &str) -> Vec<Range<usize>> {
    let mut spans = Vec::new();
    let mut chars = text.char_indices().peekable();

    while let Some((start, c)) = chars.next() {
        if c != '@' {
            continue;
        }

        let mut end = start + 1;
        while let Some(&(idx, next)) = chars.peek() {
            if next.is_whitespace() {
                break;
            }
            end = idx + next.len_utf8();
            chars.next();
        }

        // A bare "@" is not a mention
        if end > start + 1 {
            spans.push(start..end);
        }
    }

    spans
}

/// Mention tokens in `text`, without the leading `@`, in order of appearance.
pub fn extract_mentions(text: &str) -> Vec<String> {
    mention_spans(text)
        .into_iter()
        .map(|span| text[span.start + 1..span.end].to_string())
        .collect()
}

/// Whether any token refers to the viewer.
///
/// A token matches the viewer's user id exactly, or the display name
/// ignoring ASCII case. Trailing punctuation (`@bob,`) is ignored.
pub fn mentions_viewer(mentions: &[String], viewer: &Viewer) -> bool {
    mentions.iter().any(|token| {
        let trimmed = token.trim_end_matches(|c: char| c.is_ascii_punctuation());
        [token.as_str(), trimmed].iter().any(|candidate| {
            *candidate == viewer.user_id.as_str()
                || (!viewer.display_name.is_empty()
                    && candidate.eq_ignore_ascii_case(&viewer.display_name))
        })
    })
}
