//! On-disk shape of the storage snapshot.
//!
//! ```json
//! {
//!   "processedPosts": [["56468672_1042", 1718000000]],
//!   "groups": { "56468672": "Some community" }
//! }
//! ```

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default)]
    pub processed_posts: Vec<ProcessedEntry>,
    #[serde(default)]
    pub groups: BTreeMap<String, String>,
}

/// One processed-post entry.
///
/// Older snapshots stored bare ids without a timestamp; those still load.
#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProcessedEntry {
    Seen(RawId, i64),
    Bare(RawId),
}

impl ProcessedEntry {
    pub fn into_parts(self) -> (RawId, i64) {
        match self {
            Self::Seen(id, seen_at) => (id, seen_at),
            Self::Bare(id) => (id, 0),
        }
    }
}

/// An id as written by whatever produced the snapshot: string or number.
#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawId {
    Text(String),
    Number(i64),
}

impl fmt::Display for RawId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Number(n) => write!(f, "{n}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_both_entry_shapes() {
        let json = r#"{"processedPosts": [["1_2", 10], "1_3", [7, 5]], "groups": {"1": "One"}}"#;
        let snapshot: Snapshot = serde_json::from_str(json).unwrap();

        let parts: Vec<(String, i64)> = snapshot
            .processed_posts
            .into_iter()
            .map(|e| {
                let (id, seen_at) = e.into_parts();
                (id.to_string(), seen_at)
            })
            .collect();
        assert_eq!(
            parts,
            vec![
                ("1_2".to_string(), 10),
                ("1_3".to_string(), 0),
                ("7".to_string(), 5)
            ]
        );
        assert_eq!(snapshot.groups.get("1").map(String::as_str), Some("One"));
    }

    #[test]
    fn test_missing_sections_default_to_empty() {
        let snapshot: Snapshot = serde_json::from_str("{}").unwrap();
        assert!(snapshot.processed_posts.is_empty());
        assert!(snapshot.groups.is_empty());
    }
}
