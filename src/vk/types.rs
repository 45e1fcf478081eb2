use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

use crate::constants::WALL_POST_URL;
use crate::storage::{FeedId, PostKey};

/// A wall post as returned by `wall.get`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Post {
    pub id: u64,
    pub owner_id: i64,
    /// Unix seconds.
    pub date: i64,
    #[serde(default, deserialize_with = "nullable_string")]
    pub text: String,
    #[serde(default, rename = "copy_history")]
    pub reposts: Vec<Repost>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default, deserialize_with = "int_flag")]
    pub is_pinned: bool,
}

impl Post {
    /// Dedup key of this post.
    #[must_use]
    pub fn key(&self) -> PostKey {
        PostKey::new(FeedId::from_signed(self.owner_id), self.id)
    }

    /// Public URL of this post.
    #[must_use]
    pub fn link(&self) -> String {
        format!("{WALL_POST_URL}{}_{}", self.owner_id, self.id)
    }
}

/// One entry of a post's `copy_history`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Repost {
    #[serde(default, deserialize_with = "nullable_string")]
    pub text: String,
}

/// A post attachment. Only the caption matters here.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "RawAttachment")]
pub struct Attachment {
    pub kind: String,
    pub caption: Option<String>,
}

#[derive(Deserialize)]
struct RawAttachment {
    #[serde(rename = "type")]
    kind: String,
    #[serde(flatten)]
    fields: Map<String, Value>,
}

impl From<RawAttachment> for Attachment {
    fn from(raw: RawAttachment) -> Self {
        // The payload sits under a key named after the attachment type.
        let caption = raw
            .fields
            .get(&raw.kind)
            .and_then(|payload| payload.get("text"))
            .and_then(Value::as_str)
            .filter(|text| !text.is_empty())
            .map(ToString::to_string);

        Self {
            kind: raw.kind,
            caption,
        }
    }
}

/// Resolved community metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupInfo {
    pub id: FeedId,
    pub name: String,
    pub activity: Option<String>,
    pub is_closed: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GroupRecord {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub activity: Option<String>,
    #[serde(default)]
    pub is_closed: i64,
}

impl From<GroupRecord> for GroupInfo {
    fn from(record: GroupRecord) -> Self {
        Self {
            id: FeedId::from_signed(record.id),
            name: record.name,
            activity: record.activity,
            is_closed: record.is_closed != 0,
        }
    }
}

/// `groups.getById` answers with `{"groups": [...]}` since 5.139 and a bare
/// array before that.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum GroupsResponse {
    Wrapped { groups: Vec<GroupRecord> },
    List(Vec<GroupRecord>),
}

impl GroupsResponse {
    pub fn into_groups(self) -> Vec<GroupRecord> {
        match self {
            Self::Wrapped { groups } | Self::List(groups) => groups,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct WallResponse {
    #[serde(default)]
    pub items: Vec<Post>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
    pub response: Option<T>,
    pub error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorBody {
    pub error_code: i64,
    #[serde(default)]
    pub error_msg: String,
}

/// VK encodes flags as `0`/`1`.
fn int_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<i64>::deserialize(deserializer)?.is_some_and(|v| v != 0))
}

fn nullable_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_post_deserialize_full() {
        let json = r#"{
            "id": 1042,
            "owner_id": -56468672,
            "date": 1718000000,
            "text": "Main text",
            "copy_history": [{"id": 5, "owner_id": -1, "date": 1, "text": "Repost text"}],
            "attachments": [
                {"type": "photo", "photo": {"id": 1, "text": "Photo caption"}},
                {"type": "link", "link": {"url": "https://example.com"}},
                {"type": "doc", "doc": {"text": ""}}
            ]
        }"#;

        let post: Post = serde_json::from_str(json).unwrap();
        assert_eq!(post.id, 1042);
        assert_eq!(post.text, "Main text");
        assert_eq!(post.reposts[0].text, "Repost text");
        assert_eq!(post.attachments.len(), 3);
        assert_eq!(post.attachments[0].caption.as_deref(), Some("Photo caption"));
        assert_eq!(post.attachments[1].kind, "link");
        assert_eq!(post.attachments[1].caption, None);
        assert_eq!(post.attachments[2].caption, None);
        assert_eq!(post.key(), PostKey::new(FeedId::new(56_468_672), 1042));
        assert_eq!(post.link(), "https://vk.com/wall-56468672_1042");
    }

    #[test]
    fn test_post_deserialize_sparse() {
        let json = r#"{"id": 1, "owner_id": -2, "date": 3, "text": null}"#;
        let post: Post = serde_json::from_str(json).unwrap();
        assert!(post.text.is_empty());
        assert!(post.reposts.is_empty());
        assert!(post.attachments.is_empty());
        assert!(!post.is_pinned);

        let pinned: Post =
            serde_json::from_str(r#"{"id": 1, "owner_id": -2, "date": 3, "is_pinned": 1}"#).unwrap();
        assert!(pinned.is_pinned);
    }

    #[test]
    fn test_groups_response_shapes() {
        let wrapped: GroupsResponse =
            serde_json::from_str(r#"{"groups": [{"id": 1, "name": "One", "is_closed": 1}], "profiles": []}"#)
                .unwrap();
        let groups = wrapped.into_groups();
        assert_eq!(groups.len(), 1);
        assert!(GroupInfo::from(groups.into_iter().next().unwrap()).is_closed);

        let list: GroupsResponse =
            serde_json::from_str(r#"[{"id": 2, "name": "Two", "activity": "Media"}]"#).unwrap();
        let info = GroupInfo::from(list.into_groups().into_iter().next().unwrap());
        assert_eq!(info.id, FeedId::new(2));
        assert_eq!(info.activity.as_deref(), Some("Media"));
        assert!(!info.is_closed);
    }
}
