//! Wall pagination and community metadata lookup.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Days, NaiveTime, TimeDelta, TimeZone};
use tracing::{debug, warn};

use super::traits::FeedSource;
use crate::config::Config;
use crate::constants::MAX_PAGE_SIZE;
use crate::storage::FeedId;
use crate::vk::{GroupInfo, Post};

/// Start of the collection window in Unix seconds: local midnight
/// `days_shift - 1` days before `now`.
///
/// `days_shift = 1` covers today only, `2` covers today and yesterday.
pub fn window_start<Tz: TimeZone>(now: &DateTime<Tz>, days_shift: u32) -> i64 {
    let back = u64::from(days_shift.max(1) - 1);
    let today = now.date_naive();
    let first_day = today.checked_sub_days(Days::new(back)).unwrap_or(today);
    let midnight = first_day.and_time(NaiveTime::MIN);
    let tz = now.timezone();

    // Midnight can fall into a DST gap; the first valid instant after it is an hour on.
    tz.from_local_datetime(&midnight)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(midnight + TimeDelta::hours(1))).earliest())
        .map_or_else(|| midnight.and_utc().timestamp(), |start| start.timestamp())
}

/// Reads walls and community metadata from a [`FeedSource`].
pub struct Collector {
    source: Arc<dyn FeedSource>,
    page_size: u32,
    page_delay: Duration,
    attempts: u32,
    retry_delay: Duration,
}

impl Collector {
    pub fn from_config(source: Arc<dyn FeedSource>, config: &Config) -> Self {
        Self {
            source,
            page_size: config.posts_per_page.clamp(1, MAX_PAGE_SIZE),
            page_delay: config.page_delay,
            attempts: config.retry_count.max(1),
            retry_delay: config.retry_delay,
        }
    }

    /// Collect the posts of `feed` dated at or after `since`, newest first.
    ///
    /// Pages are read until a post older than `since` shows up, a short page
    /// signals the end of the wall, or a fetch fails. A failed fetch ends the
    /// collection with whatever was gathered so far.
    ///
    /// Old pinned posts are the one exception to the cutoff: they are skipped
    /// without ending the collection, since a pinned post heads the wall
    /// regardless of its date.
    pub async fn collect(&self, feed: FeedId, since: i64) -> Vec<Post> {
        let mut collected = Vec::new();
        let mut offset = 0u32;

        loop {
            let page = match self
                .source
                .wall_page(feed.owner_id(), offset, self.page_size)
                .await
            {
                Ok(page) => page,
                Err(e) => {
                    warn!(feed_id = %feed, offset, "Failed to fetch wall page: {e:#}");
                    break;
                }
            };

            let fetched = page.len();
            let mut reached_cutoff = false;

            for post in page {
                if post.date >= since {
                    collected.push(post);
                } else if post.is_pinned {
                    debug!(feed_id = %feed, post_id = post.id, "Skipping old pinned post");
                } else {
                    reached_cutoff = true;
                    break;
                }
            }

            offset = offset.saturating_add(u32::try_from(fetched).unwrap_or(u32::MAX));
            if reached_cutoff || fetched < self.page_size as usize {
                break;
            }

            tokio::time::sleep(self.page_delay).await;
        }

        debug!(feed_id = %feed, posts = collected.len(), "Collected posts in window");
        collected
    }

    /// Resolve community metadata, retrying with a fixed delay.
    ///
    /// Both an error and a "not found" answer count as a failed attempt.
    pub async fn resolve(&self, feed: FeedId) -> Option<GroupInfo> {
        for attempt in 1..=self.attempts {
            if attempt > 1 {
                tokio::time::sleep(self.retry_delay).await;
            }

            match self.source.group_info(feed).await {
                Ok(Some(group)) => return Some(group),
                Ok(None) => warn!(feed_id = %feed, "Group not found or access denied"),
                Err(e) => warn!(feed_id = %feed, "Group lookup failed: {e:#}"),
            }

            debug!(feed_id = %feed, attempt, attempts = self.attempts, "Group lookup attempt failed");
        }

        None
    }
}
