//! Message text for a relayed post.
//!
//! Rendering is two passes over the composed plain text: keyword matches are
//! first cut into [`Span`]s, then every span is HTML-escaped and emphasized
//! spans are wrapped in `<b><u>` tags. The tags are only ever produced by the
//! renderer, so text that merely looks like markup is always escaped.

use std::ops::Range;

use crate::vk::Post;

/// A piece of message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Span<'a> {
    Plain(&'a str),
    Emphasized(&'a str),
}

/// Renders posts into Telegram HTML with highlighted keywords.
#[derive(Debug, Clone)]
pub struct MessageFormatter {
    /// Longest first, lowercased.
    terms: Vec<String>,
}

impl MessageFormatter {
    #[must_use]
    pub fn new<S: AsRef<str>>(terms: &[S]) -> Self {
        Self {
            terms: sort_terms(terms),
        }
    }

    /// Full HTML message for `post` from the group named `group_name`.
    #[must_use]
    pub fn render(&self, group_name: &str, post: &Post) -> String {
        render_html(&highlight_sorted(&compose_message(group_name, post), &self.terms))
    }
}

/// Concatenate a post's own text, repost texts and attachment captions,
/// one per line. Empty pieces are skipped.
#[must_use]
pub fn build_body(post: &Post) -> String {
    let reposts = post.reposts.iter().map(|r| r.text.as_str());
    let captions = post.attachments.iter().filter_map(|a| a.caption.as_deref());

    std::iter::once(post.text.as_str())
        .chain(reposts)
        .chain(captions)
        .filter(|piece| !piece.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Collapse whitespace runs inside each line and trim lines and the result.
#[must_use]
pub fn normalize_whitespace(text: &str) -> String {
    text.split('\n')
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Plain-text message: group, normalized body, link. Empty blocks are dropped.
#[must_use]
pub fn compose_message(group_name: &str, post: &Post) -> String {
    let body = normalize_whitespace(&build_body(post));

    let blocks = [
        format!("Group: {group_name}"),
        if body.is_empty() {
            String::new()
        } else {
            format!("Text:\n{body}")
        },
        format!("Link: {}", post.link()),
    ];

    blocks
        .into_iter()
        .filter(|block| !block.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Split `text` into plain and emphasized spans.
///
/// Terms are matched case-insensitively, longest first; a match never
/// overlaps an earlier (longer or equal) one.
#[must_use]
pub fn highlight<'a, S: AsRef<str>>(text: &'a str, terms: &[S]) -> Vec<Span<'a>> {
    highlight_sorted(text, &sort_terms(terms))
}

/// Escape `text` for Telegram HTML and emphasize every term occurrence.
#[must_use]
pub fn highlight_and_escape<S: AsRef<str>>(text: &str, terms: &[S]) -> String {
    render_html(&highlight(text, terms))
}

#[must_use]
pub fn render_html(spans: &[Span<'_>]) -> String {
    let mut out = String::new();
    for span in spans {
        match span {
            Span::Plain(text) => out.push_str(&escape_html(text)),
            Span::Emphasized(text) => {
                out.push_str("<b><u>");
                out.push_str(&escape_html(text));
                out.push_str("</u></b>");
            }
        }
    }
    out
}

#[must_use]
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

fn sort_terms<S: AsRef<str>>(terms: &[S]) -> Vec<String> {
    let mut sorted: Vec<String> = terms
        .iter()
        .map(|t| t.as_ref().trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect();
    sorted.sort_by(|a, b| b.chars().count().cmp(&a.chars().count()).then_with(|| a.cmp(b)));
    sorted.dedup();
    sorted
}

fn highlight_sorted<'a>(text: &'a str, terms: &[String]) -> Vec<Span<'a>> {
    let mut marks: Vec<Range<usize>> = Vec::new();

    for term in terms {
        let mut pos = 0;
        while pos < text.len() {
            if let Some(mark) = marks.iter().find(|m| m.contains(&pos)) {
                pos = mark.end;
                continue;
            }
            if let Some(len) = match_len(&text[pos..], term) {
                let candidate = pos..pos + len;
                if !marks.iter().any(|m| overlaps(m, &candidate)) {
                    marks.push(candidate);
                    pos += len;
                    continue;
                }
            }
            pos += text[pos..].chars().next().map_or(1, char::len_utf8);
        }
    }

    marks.sort_by_key(|m| m.start);

    let mut spans = Vec::with_capacity(marks.len() * 2 + 1);
    let mut cursor = 0;
    for mark in marks {
        if mark.start > cursor {
            spans.push(Span::Plain(&text[cursor..mark.start]));
        }
        spans.push(Span::Emphasized(&text[mark.clone()]));
        cursor = mark.end;
    }
    if cursor < text.len() {
        spans.push(Span::Plain(&text[cursor..]));
    }
    spans
}

/// Byte length of the prefix of `text` whose lowercase form equals `term`.
fn match_len(text: &str, term: &str) -> Option<usize> {
    let mut expected = term.chars();
    let mut consumed = 0;

    for c in text.chars() {
        for lower in c.to_lowercase() {
            if expected.next() != Some(lower) {
                return None;
            }
        }
        consumed += c.len_utf8();
        if expected.as_str().is_empty() {
            return Some(consumed);
        }
    }
    None
}

fn overlaps(a: &Range<usize>, b: &Range<usize>) -> bool {
    a.start < b.end && b.start < a.end
}
