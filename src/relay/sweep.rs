//! Periodic sweeps over all configured groups.
//!
//! A sweep evicts expired dedup entries, then walks the groups one at a time:
//! resolve metadata, collect the window, filter, relay, record, persist. A
//! second, slower loop re-resolves groups still carrying a placeholder name.
//! Both loops share the storage behind one mutex; every load-modify-persist
//! step happens under that lock.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local, TimeZone};
use futures_util::FutureExt;
use tokio::sync::Mutex;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::collector::{window_start, Collector};
use super::dispatcher::Dispatcher;
use super::filter::KeywordFilter;
use super::format::MessageFormatter;
use super::traits::{FeedSource, MessageSink};
use crate::config::Config;
use crate::constants::SECONDS_PER_DAY;
use crate::storage::{
    display_name, is_placeholder, is_private, placeholder_name, FeedId, Storage,
};

pub type SharedStorage = Arc<Mutex<Storage>>;

/// What happened to one group during a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedOutcome {
    /// Metadata lookup failed; the group keeps or gets a placeholder.
    Unresolved,
    /// The group is closed and was skipped.
    Private,
    Checked { collected: usize, relayed: usize },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub evicted: usize,
    pub checked: usize,
    pub skipped: usize,
    pub failed: usize,
    pub relayed: usize,
}

pub struct Relay {
    config: Config,
    collector: Collector,
    filter: KeywordFilter,
    formatter: MessageFormatter,
    dispatcher: Dispatcher,
    storage: SharedStorage,
}

impl Relay {
    pub fn new(
        config: Config,
        source: Arc<dyn FeedSource>,
        sink: Arc<dyn MessageSink>,
        storage: SharedStorage,
    ) -> Self {
        Self {
            collector: Collector::from_config(source, &config),
            filter: KeywordFilter::from_config(&config),
            formatter: MessageFormatter::new(config.include_words.as_slice()),
            dispatcher: Dispatcher::from_config(sink, &config),
            storage,
            config,
        }
    }

    pub fn storage(&self) -> &SharedStorage {
        &self.storage
    }

    /// Run the main sweep forever, starting immediately.
    pub async fn run_sweep_loop(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.config.check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            self.sweep().await;
        }
    }

    /// Run the metadata refresh forever, first after one full period.
    pub async fn run_refresh_loop(self: Arc<Self>) {
        let period = self.config.refresh_interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            self.refresh_names().await;
        }
    }

    /// One full sweep at the current local time.
    pub async fn sweep(&self) -> SweepStats {
        self.sweep_at(&Local::now()).await
    }

    /// One full sweep as if the clock read `now`.
    pub async fn sweep_at<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> SweepStats
    where
        Tz::Offset: Send + Sync,
    {
        info!(groups = self.config.group_ids.len(), "Sweep started");

        let now_ts = now.timestamp();
        let since = window_start(now, self.config.days_shift);
        let mut stats = SweepStats {
            evicted: self.evict_expired(now_ts).await,
            ..SweepStats::default()
        };

        for &feed in &self.config.group_ids {
            // Each group is its own unit of work: a panic stops only this group.
            let outcome = AssertUnwindSafe(self.check_feed(feed, since))
                .catch_unwind()
                .await;

            match outcome {
                Ok(Ok(FeedOutcome::Checked { relayed, .. })) => {
                    stats.checked += 1;
                    stats.relayed += relayed;
                }
                Ok(Ok(FeedOutcome::Private | FeedOutcome::Unresolved)) => stats.skipped += 1,
                Ok(Err(e)) => {
                    error!(feed_id = %feed, "Failed to process group: {e:#}");
                    stats.failed += 1;
                }
                Err(panic) => {
                    error!(feed_id = %feed, "Group processing panicked: {}", panic_message(&*panic));
                    stats.failed += 1;
                }
            }

            tokio::time::sleep(self.config.request_delay).await;
        }

        info!(
            evicted = stats.evicted,
            checked = stats.checked,
            skipped = stats.skipped,
            failed = stats.failed,
            relayed = stats.relayed,
            "Sweep finished"
        );
        stats
    }

    /// Drop processed entries older than the retention window.
    async fn evict_expired(&self, now_ts: i64) -> usize {
        let cutoff = now_ts - i64::from(self.config.retention_days) * SECONDS_PER_DAY;
        let mut storage = self.storage.lock().await;

        let removed = storage.evict_older_than(cutoff);
        if removed > 0 {
            info!(removed, "Evicted expired processed posts");
            persist(&storage).await;
        }
        removed
    }

    /// Process one group: resolve, collect, filter, relay, record.
    ///
    /// A group without a resolved name (unknown or still a placeholder) is
    /// looked up first and skipped for this sweep if the lookup fails.
    ///
    /// # Errors
    ///
    /// Returns an error if the group id cannot be addressed or the final
    /// snapshot write fails. Every relayed post is still recorded in memory.
    pub async fn check_feed(&self, feed: FeedId, since: i64) -> Result<FeedOutcome> {
        if !feed.is_addressable() {
            bail!("group id {feed} is out of range");
        }

        let mut storage = self.storage.lock().await;
        let stored = storage.feed(feed).map(ToString::to_string);

        let name = if let Some(name) = stored.clone().filter(|name| !is_placeholder(name)) {
            name
        } else {
            let Some(group) = self.collector.resolve(feed).await else {
                if stored.is_none() {
                    warn!(feed_id = %feed, "Could not resolve group, storing placeholder");
                    storage.put_feed(feed, placeholder_name(feed));
                    persist(&storage).await;
                } else {
                    warn!(feed_id = %feed, "Group still unresolved, skipping");
                }
                return Ok(FeedOutcome::Unresolved);
            };

            let name = display_name(&group.name, group.is_closed);
            if group.is_closed {
                info!(feed_id = %feed, name = %group.name, "Found private group");
            } else {
                info!(feed_id = %feed, name = %group.name, "Registered group");
            }
            storage.put_feed(feed, name.clone());
            persist(&storage).await;
            name
        };

        if is_private(&name) {
            info!(feed_id = %feed, "Skipping private group");
            return Ok(FeedOutcome::Private);
        }

        let posts = self.collector.collect(feed, since).await;
        let collected = posts.len();
        let fresh: Vec<_> = posts
            .into_iter()
            .filter(|post| self.filter.is_admissible(post, &storage))
            .collect();

        info!(feed_id = %feed, collected, new_posts = fresh.len(), "Checked group");

        let mut relayed = 0;
        for post in &fresh {
            let text = self.formatter.render(&name, post);
            let report = self.dispatcher.send(&text).await;

            if report.satisfies(self.config.delivery_policy) {
                storage.put(post.key(), post.date);
                relayed += 1;
                debug!(post_id = %post.key(), sent = report.sent, failed = report.failed, "Post relayed");
            } else {
                warn!(
                    post_id = %post.key(),
                    sent = report.sent,
                    failed = report.failed,
                    "Delivery incomplete, post left for the next sweep"
                );
            }
        }

        storage
            .save()
            .await
            .with_context(|| format!("Failed to save storage after group {feed}"))?;

        Ok(FeedOutcome::Checked { collected, relayed })
    }

    /// Re-resolve every group still named by a placeholder.
    ///
    /// Returns how many names were replaced.
    pub async fn refresh_names(&self) -> usize {
        info!("Refreshing group names");
        let mut storage = self.storage.lock().await;
        let mut updated = 0;

        for feed in storage.placeholder_feeds() {
            if let Some(group) = self.collector.resolve(feed).await {
                info!(feed_id = %feed, name = %group.name, "Group name refreshed");
                storage.put_feed(feed, display_name(&group.name, group.is_closed));
                updated += 1;
            }
        }

        persist(&storage).await;
        updated
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

/// Save the snapshot; a failure is logged and the in-memory state kept.
async fn persist(storage: &Storage) {
    if let Err(e) = storage.save().await {
        warn!(path = %storage.path().display(), "Failed to save storage: {e}");
    }
}
