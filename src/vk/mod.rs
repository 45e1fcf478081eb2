//! Minimal VK API client: community metadata and wall pages.

pub mod error;
pub mod types;

pub use error::{Result, VkError};
pub use types::{Attachment, GroupInfo, Post, Repost};

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::Config;
use crate::constants::USER_AGENT;
use crate::relay::FeedSource;
use crate::storage::FeedId;
use types::{Envelope, GroupsResponse, WallResponse};

pub struct VkClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
    version: String,
}

impl VkClient {
    /// Create a client for the API rooted at `base_url` (e.g. `https://api.vk.com/method`).
    #[must_use]
    pub fn new(base_url: &str, token: &str, version: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            version: version.to_string(),
        }
    }

    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.vk_api_url, &config.vk_token, &config.vk_api_version)
    }

    /// Look up a community. `Ok(None)` means VK returned no such group.
    pub async fn get_group(&self, id: FeedId) -> Result<Option<GroupInfo>> {
        let response: GroupsResponse = self
            .call(
                "groups.getById",
                &[
                    ("group_id", id.to_string()),
                    ("fields", "name,screen_name,is_closed,activity".to_string()),
                ],
            )
            .await?;

        Ok(response
            .into_groups()
            .into_iter()
            .next()
            .map(GroupInfo::from))
    }

    /// Fetch one page of a wall, most recent first.
    pub async fn get_wall(&self, owner_id: i64, offset: u32, count: u32) -> Result<Vec<Post>> {
        let response: WallResponse = self
            .call(
                "wall.get",
                &[
                    ("owner_id", owner_id.to_string()),
                    ("offset", offset.to_string()),
                    ("count", count.to_string()),
                    ("filter", "all".to_string()),
                ],
            )
            .await?;

        Ok(response.items)
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: &[(&str, String)]) -> Result<T> {
        let url = format!("{}/{}", self.base_url, method);
        debug!(method, "Calling VK API");

        let resp = self
            .client
            .get(&url)
            .query(params)
            .query(&[("access_token", &self.token), ("v", &self.version)])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(VkError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = resp.bytes().await?;
        let envelope: Envelope<T> = serde_json::from_slice(&bytes)?;

        if let Some(err) = envelope.error {
            return Err(VkError::Api {
                code: err.error_code,
                message: err.error_msg,
            });
        }

        envelope
            .response
            .ok_or_else(|| VkError::Parse(format!("{method}: response field missing")))
    }
}

#[async_trait]
impl FeedSource for VkClient {
    async fn group_info(&self, id: FeedId) -> anyhow::Result<Option<GroupInfo>> {
        Ok(self.get_group(id).await?)
    }

    async fn wall_page(&self, owner_id: i64, offset: u32, count: u32) -> anyhow::Result<Vec<Post>> {
        Ok(self.get_wall(owner_id, offset, count).await?)
    }
}
