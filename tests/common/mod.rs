//! In-memory collaborators for pipeline tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use vk_wall_relay::relay::{FeedSource, MessageSink, OutgoingMessage};
use vk_wall_relay::storage::FeedId;
use vk_wall_relay::vk::{GroupInfo, Post};

pub fn post(owner_id: i64, id: u64, date: i64, text: &str) -> Post {
    Post {
        id,
        owner_id,
        date,
        text: text.to_string(),
        reposts: Vec::new(),
        attachments: Vec::new(),
        is_pinned: false,
    }
}

pub fn group(id: u64, name: &str, is_closed: bool) -> GroupInfo {
    GroupInfo {
        id: FeedId::new(id),
        name: name.to_string(),
        activity: None,
        is_closed,
    }
}

/// A feed source backed by maps.
///
/// Groups missing from `groups` fail with an error; walls are served in
/// slices of the stored vector.
#[derive(Default)]
pub struct FakeSource {
    groups: Mutex<HashMap<FeedId, Option<GroupInfo>>>,
    walls: Mutex<HashMap<i64, Vec<Post>>>,
    /// Offset at which `wall_page` starts failing.
    fail_wall_at: Mutex<Option<u32>>,
    /// Walls whose fetch panics.
    panicking_walls: Mutex<Vec<i64>>,
    pub group_calls: AtomicUsize,
    pub wall_calls: AtomicUsize,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_group(self, info: GroupInfo) -> Self {
        self.groups.lock().unwrap().insert(info.id, Some(info));
        self
    }

    pub fn set_group(&self, info: GroupInfo) {
        self.groups.lock().unwrap().insert(info.id, Some(info));
    }

    pub fn with_missing_group(self, id: u64) -> Self {
        self.groups.lock().unwrap().insert(FeedId::new(id), None);
        self
    }

    pub fn with_wall(self, owner_id: i64, posts: Vec<Post>) -> Self {
        self.walls.lock().unwrap().insert(owner_id, posts);
        self
    }

    pub fn fail_wall_at(self, offset: u32) -> Self {
        *self.fail_wall_at.lock().unwrap() = Some(offset);
        self
    }

    pub fn panic_on_wall(self, owner_id: i64) -> Self {
        self.panicking_walls.lock().unwrap().push(owner_id);
        self
    }

    pub fn wall_calls(&self) -> usize {
        self.wall_calls.load(Ordering::SeqCst)
    }

    pub fn group_calls(&self) -> usize {
        self.group_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FeedSource for FakeSource {
    async fn group_info(&self, id: FeedId) -> Result<Option<GroupInfo>> {
        self.group_calls.fetch_add(1, Ordering::SeqCst);
        self.groups
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| anyhow!("group {id} unavailable"))
    }

    async fn wall_page(&self, owner_id: i64, offset: u32, count: u32) -> Result<Vec<Post>> {
        self.wall_calls.fetch_add(1, Ordering::SeqCst);
        if self.panicking_walls.lock().unwrap().contains(&owner_id) {
            panic!("wall {owner_id} exploded");
        }
        if let Some(fail_at) = *self.fail_wall_at.lock().unwrap() {
            if offset >= fail_at {
                return Err(anyhow!("wall fetch failed at offset {offset}"));
            }
        }

        let walls = self.walls.lock().unwrap();
        let posts = walls.get(&owner_id).map(Vec::as_slice).unwrap_or_default();
        let start = (offset as usize).min(posts.len());
        let end = (start + count as usize).min(posts.len());
        Ok(posts[start..end].to_vec())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub chat_id: String,
    pub text: String,
    pub thread_id: Option<i64>,
    pub disable_notification: bool,
    pub disable_link_preview: bool,
}

/// A message sink that records what it was given.
#[derive(Default)]
pub struct FakeSink {
    pub sent: Mutex<Vec<SentMessage>>,
    failing: AtomicBool,
    /// Fail every call whose 1-based index is listed.
    fail_calls: Mutex<Vec<usize>>,
    calls: AtomicUsize,
}

impl FakeSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let sink = Self::default();
        sink.failing.store(true, Ordering::SeqCst);
        sink
    }

    pub fn failing_calls(calls: &[usize]) -> Self {
        let sink = Self::default();
        *sink.fail_calls.lock().unwrap() = calls.to_vec();
        sink
    }

    pub fn texts(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|m| m.text.clone()).collect()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageSink for FakeSink {
    async fn send(&self, message: &OutgoingMessage<'_>) -> Result<()> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.failing.load(Ordering::SeqCst) || self.fail_calls.lock().unwrap().contains(&call) {
            return Err(anyhow!("transport refused call {call}"));
        }

        self.sent.lock().unwrap().push(SentMessage {
            chat_id: message.chat_id.to_string(),
            text: message.text.to_string(),
            thread_id: message.thread_id,
            disable_notification: message.disable_notification,
            disable_link_preview: message.disable_link_preview,
        });
        Ok(())
    }
}
