use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::traits::{MessageSink, OutgoingMessage};
use crate::config::{Config, DeliveryPolicy};
use crate::constants::MESSAGE_CHUNK_LIMIT;

const EMPHASIS_OPEN: &str = "<b>";
const EMPHASIS_CLOSE: &str = "</b>";

/// Outcome of sending one message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub sent: usize,
    pub failed: usize,
}

impl DeliveryReport {
    /// Whether the post behind this message should be recorded as processed.
    #[must_use]
    pub fn satisfies(&self, policy: DeliveryPolicy) -> bool {
        match policy {
            DeliveryPolicy::Always => true,
            DeliveryPolicy::AnyChunk => self.sent > 0,
            DeliveryPolicy::AllChunks => self.failed == 0,
        }
    }
}

/// Sends messages to one chat, chunked to the transport limit.
pub struct Dispatcher {
    sink: Arc<dyn MessageSink>,
    chat_id: String,
    thread_id: Option<i64>,
    link_preview: bool,
    chunk_delay: Duration,
    chunk_limit: usize,
}

impl Dispatcher {
    pub fn new(sink: Arc<dyn MessageSink>, chat_id: impl Into<String>, thread_id: Option<i64>) -> Self {
        Self {
            sink,
            chat_id: chat_id.into(),
            thread_id,
            link_preview: true,
            chunk_delay: Duration::from_millis(200),
            chunk_limit: MESSAGE_CHUNK_LIMIT,
        }
    }

    pub fn from_config(sink: Arc<dyn MessageSink>, config: &Config) -> Self {
        Self::new(sink, config.chat_id.clone(), config.thread_id)
            .with_link_preview(config.link_preview)
            .with_chunk_delay(config.chunk_delay)
    }

    #[must_use]
    pub fn with_link_preview(mut self, enabled: bool) -> Self {
        self.link_preview = enabled;
        self
    }

    #[must_use]
    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = delay;
        self
    }

    /// Send `text` chunk by chunk, silently and with link previews.
    ///
    /// A failed chunk is logged and the remaining chunks are still sent.
    pub async fn send(&self, text: &str) -> DeliveryReport {
        let chunks = split_chunks(text, self.chunk_limit);
        let total = chunks.len();
        let mut report = DeliveryReport::default();

        for (index, chunk) in chunks.into_iter().enumerate() {
            let message = OutgoingMessage {
                chat_id: &self.chat_id,
                text: chunk,
                thread_id: self.thread_id,
                disable_notification: true,
                disable_link_preview: !self.link_preview,
            };

            match self.sink.send(&message).await {
                Ok(()) => {
                    debug!(chunk = index + 1, total, "Chunk delivered");
                    report.sent += 1;
                }
                Err(e) => {
                    warn!(chunk = index + 1, total, "Failed to send chunk: {e:#}");
                    report.failed += 1;
                }
            }

            tokio::time::sleep(self.chunk_delay).await;
        }

        report
    }
}

/// Cut `text` into pieces of at most `limit` characters.
///
/// Cuts fall at raw character counts, moved back when they would split an
/// HTML entity, a tag or an emphasized span. The remainder is trimmed
/// before the next piece is measured.
#[must_use]
pub fn split_chunks(text: &str, limit: usize) -> Vec<&str> {
    let limit = limit.max(1);
    let mut chunks = Vec::new();
    let mut remaining = text.trim();

    while !remaining.is_empty() {
        let cut = match remaining.char_indices().nth(limit) {
            Some((raw, _)) => markup_safe_cut(&remaining[..raw]),
            None => remaining.len(),
        };
        chunks.push(remaining[..cut].trim_end());
        remaining = remaining[cut..].trim();
    }

    chunks
}

/// Byte offset at which `piece` can end without breaking markup.
///
/// Falls back to the full piece when no safe point exists.
fn markup_safe_cut(piece: &str) -> usize {
    let mut cut = piece.len();

    if let Some(open) = piece.rfind('<').filter(|&i| !piece[i..].contains('>')) {
        cut = open;
    }
    if let Some(amp) = piece[..cut].rfind('&').filter(|&i| !piece[i..cut].contains(';')) {
        cut = amp;
    }
    if let Some(open) = piece[..cut].rfind(EMPHASIS_OPEN) {
        let closed = piece[..cut]
            .rfind(EMPHASIS_CLOSE)
            .is_some_and(|close| close > open);
        if !closed {
            cut = open;
        }
    }

    if cut == 0 {
        piece.len()
    } else {
        cut
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_9000_into_three() {
        let text: String = (0..9000).map(|i| if i % 10 == 9 { ' ' } else { 'x' }).collect();
        let chunks = split_chunks(&text, 4096);

        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.chars().count() <= 4096));

        let squash = |s: &str| s.split_whitespace().collect::<String>();
        assert_eq!(squash(&chunks.concat()), squash(&text));
    }

    #[test]
    fn test_split_counts_characters_not_bytes() {
        let text = "я".repeat(5000);
        let chunks = split_chunks(&text, 4096);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].chars().count(), 4096);
        assert_eq!(chunks[1].chars().count(), 904);
    }

    #[test]
    fn test_split_short_and_empty() {
        assert_eq!(split_chunks("  hello  ", 4096), vec!["hello"]);
        assert!(split_chunks("   ", 4096).is_empty());
        assert!(split_chunks("", 4096).is_empty());
    }

    #[test]
    fn test_split_trims_remainder() {
        assert_eq!(split_chunks("abc   def", 3), vec!["abc", "def"]);
    }

    #[test]
    fn test_split_keeps_entities_whole() {
        let text = format!("{}&amp;tail", "x".repeat(8));
        let chunks = split_chunks(&text, 10);
        assert_eq!(chunks, vec!["xxxxxxxx", "&amp;tail"]);
    }

    #[test]
    fn test_split_keeps_emphasis_whole() {
        // Limit lands inside the closing tag
        let text = "abc <b><u>word</u></b> rest";
        let chunks = split_chunks(text, 18);
        assert_eq!(chunks, vec!["abc", "<b><u>word</u></b>", "rest"]);

        // Limit lands between the opening tags
        let chunks = split_chunks(text, 7);
        assert_eq!(chunks[0], "abc");
        assert!(chunks[1].starts_with("<b><u>"));
    }

    #[test]
    fn test_split_falls_back_to_raw_cut() {
        let text = format!("&{}", "x".repeat(20));
        let chunks = split_chunks(&text, 10);
        assert_eq!(chunks[0].chars().count(), 10);
    }

    #[test]
    fn test_report_policy() {
        let partial = DeliveryReport { sent: 1, failed: 1 };
        let none = DeliveryReport { sent: 0, failed: 2 };
        let full = DeliveryReport { sent: 2, failed: 0 };

        assert!(none.satisfies(DeliveryPolicy::Always));
        assert!(partial.satisfies(DeliveryPolicy::AnyChunk));
        assert!(!none.satisfies(DeliveryPolicy::AnyChunk));
        assert!(!partial.satisfies(DeliveryPolicy::AllChunks));
        assert!(full.satisfies(DeliveryPolicy::AllChunks));
    }
}
