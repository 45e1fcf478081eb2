//! Keyword admission rules.
//!
//! Matching is plain case-insensitive substring containment over the post
//! body, reposts and attachment captions. Word stems like `vologd` therefore
//! catch every inflected form, and the exclude list exists to claw back the
//! false positives that brings.

use chrono::{DateTime, Local};
use tracing::debug;

use super::format::build_body;
use crate::config::Config;
use crate::storage::Storage;
use crate::vk::Post;

const PREVIEW_CHARS: usize = 80;

#[derive(Debug, Clone)]
pub struct KeywordFilter {
    include: Vec<String>,
    exclude: Vec<String>,
}

impl KeywordFilter {
    #[must_use]
    pub fn new<S: AsRef<str>>(include: &[S], exclude: &[S]) -> Self {
        Self {
            include: lowercase_terms(include),
            exclude: lowercase_terms(exclude),
        }
    }

    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.include_words.as_slice(), config.exclude_words.as_slice())
    }

    /// True if `text` (already lowercased) has an include term and no exclude term.
    #[must_use]
    pub fn matches(&self, text: &str) -> bool {
        self.has_include(text) && !self.has_exclude(text)
    }

    /// A post is admissible when it was never relayed and its text matches.
    #[must_use]
    pub fn is_admissible(&self, post: &Post, storage: &Storage) -> bool {
        if storage.has(&post.key()) {
            return false;
        }

        let text = build_body(post).to_lowercase();
        let has_include = self.has_include(&text);
        let has_exclude = self.has_exclude(&text);

        debug!(
            post_id = %post.key(),
            date = %format_date(post.date),
            text = %preview(&text),
            has_include,
            has_exclude,
            "Checked post"
        );

        has_include && !has_exclude
    }

    fn has_include(&self, text: &str) -> bool {
        self.include.iter().any(|term| text.contains(term.as_str()))
    }

    fn has_exclude(&self, text: &str) -> bool {
        self.exclude.iter().any(|term| text.contains(term.as_str()))
    }
}

fn lowercase_terms<S: AsRef<str>>(terms: &[S]) -> Vec<String> {
    terms
        .iter()
        .map(|t| t.as_ref().trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

fn preview(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

fn format_date(epoch_seconds: i64) -> String {
    DateTime::from_timestamp(epoch_seconds, 0).map_or_else(
        || epoch_seconds.to_string(),
        |d| d.with_timezone(&Local).format("%d.%m.%Y %H:%M").to_string(),
    )
}
