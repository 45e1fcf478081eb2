use anyhow::Result;
use async_trait::async_trait;

use crate::storage::FeedId;
use crate::vk::{GroupInfo, Post};

/// Where posts come from.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Community metadata; `Ok(None)` when the community does not exist or
    /// is not visible.
    async fn group_info(&self, id: FeedId) -> Result<Option<GroupInfo>>;

    /// One page of a wall, most recent first.
    ///
    /// # Arguments
    ///
    /// * `owner_id` - Signed owner id (negative for communities)
    /// * `offset` - Number of posts to skip
    /// * `count` - Page size
    async fn wall_page(&self, owner_id: i64, offset: u32, count: u32) -> Result<Vec<Post>>;
}

/// One text message as handed to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage<'a> {
    pub chat_id: &'a str,
    /// HTML-formatted text, at most one chunk long.
    pub text: &'a str,
    pub thread_id: Option<i64>,
    pub disable_notification: bool,
    pub disable_link_preview: bool,
}

/// Where messages go.
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn send(&self, message: &OutgoingMessage<'_>) -> Result<()>;
}
