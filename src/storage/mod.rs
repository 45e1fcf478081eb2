//! Persistent relay state: processed posts and known group names.
//!
//! The whole state is written as one JSON snapshot after every mutating
//! step. All keys are normalized integer ids, so a snapshot reloads into
//! exactly the state that wrote it.
//!
//! Snapshots written by the earlier relay still load: their bare post ids
//! are kept as wall-agnostic dedup entries until they age out, and their
//! Russian name markers are rewritten to the current ones.

pub mod snapshot;

use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::num::ParseIntError;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::constants::{
    LEGACY_PLACEHOLDER_PREFIX, LEGACY_PRIVATE_MARKER, PLACEHOLDER_PREFIX, PRIVATE_MARKER,
};
use snapshot::{ProcessedEntry, RawId, Snapshot};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Positive id of a VK community.
///
/// The wall API addresses communities with the negated id; this type always
/// holds the absolute value. Ids parsed from text never exceed `i64::MAX`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FeedId(u64);

impl FeedId {
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Normalize a possibly negative owner id.
    #[must_use]
    pub const fn from_signed(id: i64) -> Self {
        Self(id.unsigned_abs())
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Whether the negated id fits the API's signed owner id.
    #[must_use]
    pub const fn is_addressable(self) -> bool {
        self.0 <= i64::MAX as u64
    }

    /// The negative owner id used by `wall.get` for communities.
    ///
    /// Saturates at `i64::MIN` for ids that are not addressable.
    #[must_use]
    pub const fn owner_id(self) -> i64 {
        0i64.saturating_sub_unsigned(self.0)
    }
}

impl fmt::Display for FeedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for FeedId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let id = s.parse::<i64>()?;
        if id == i64::MIN {
            // The magnitude overflows i64; parse it again for the overflow error.
            return s[1..].parse::<i64>().map(Self::from_signed);
        }
        Ok(Self::from_signed(id))
    }
}

/// Key of a processed post: post ids are only unique within one wall.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PostKey {
    pub feed: FeedId,
    pub post: u64,
}

impl PostKey {
    #[must_use]
    pub const fn new(feed: FeedId, post: u64) -> Self {
        Self { feed, post }
    }
}

impl fmt::Display for PostKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.feed, self.post)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid post key: {0}")]
pub struct ParsePostKeyError(String);

impl FromStr for PostKey {
    type Err = ParsePostKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParsePostKeyError(s.to_string());
        let (feed, post) = s.trim().split_once('_').ok_or_else(err)?;
        Ok(Self {
            feed: feed.parse().map_err(|_| err())?,
            post: post.parse().map_err(|_| err())?,
        })
    }
}

/// Relay state plus the file it persists to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Storage {
    path: PathBuf,
    processed_posts: BTreeMap<PostKey, i64>,
    /// Post ids from older snapshots that did not record the wall.
    legacy_posts: BTreeMap<u64, i64>,
    groups: BTreeMap<FeedId, String>,
}

impl Storage {
    /// Empty state bound to `path`. Nothing is written.
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            processed_posts: BTreeMap::new(),
            legacy_posts: BTreeMap::new(),
            groups: BTreeMap::new(),
        }
    }

    /// Load the snapshot at `path`.
    ///
    /// A missing or unreadable snapshot yields an empty state, which is
    /// persisted right away. This never fails.
    pub async fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();

        let loaded = match tokio::fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice::<Snapshot>(&bytes) {
                Ok(snapshot) => Some(Self::from_snapshot(path.clone(), snapshot)),
                Err(e) => {
                    warn!(path = %path.display(), "Storage snapshot is corrupt: {e}");
                    None
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!(path = %path.display(), "Failed to read storage snapshot: {e}");
                None
            }
        };

        if let Some(storage) = loaded {
            info!(
                processed_posts = storage.processed_count(),
                groups = storage.groups.len(),
                "Storage loaded"
            );
            return storage;
        }

        let storage = Self::empty(path);
        if let Err(e) = storage.save().await {
            warn!(path = %storage.path.display(), "Failed to persist fresh storage: {e}");
        }
        info!("Initialized new storage");
        storage
    }

    /// Write the full snapshot, replacing the previous file atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or any file operation fails.
    pub async fn save(&self) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec_pretty(&self.to_snapshot())?;
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || write_atomic(&path, &bytes))
            .await
            .map_err(std::io::Error::other)??;

        debug!(path = %self.path.display(), "Storage saved");
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn has(&self, key: &PostKey) -> bool {
        self.processed_posts.contains_key(key) || self.legacy_posts.contains_key(&key.post)
    }

    pub fn put(&mut self, key: PostKey, seen_at: i64) {
        self.processed_posts.insert(key, seen_at);
    }

    pub fn delete(&mut self, key: &PostKey) -> bool {
        let removed = self.processed_posts.remove(key).is_some();
        self.legacy_posts.remove(&key.post).is_some() || removed
    }

    #[must_use]
    pub fn feed(&self, id: FeedId) -> Option<&str> {
        self.groups.get(&id).map(String::as_str)
    }

    pub fn put_feed(&mut self, id: FeedId, name: impl Into<String>) {
        self.groups.insert(id, name.into());
    }

    /// Remove processed entries seen before `cutoff`. Returns how many went.
    pub fn evict_older_than(&mut self, cutoff: i64) -> usize {
        let before = self.processed_count();
        self.processed_posts.retain(|_, seen_at| *seen_at >= cutoff);
        self.legacy_posts.retain(|_, seen_at| *seen_at >= cutoff);
        before - self.processed_count()
    }

    /// Feeds whose name is still the unresolved placeholder.
    #[must_use]
    pub fn placeholder_feeds(&self) -> Vec<FeedId> {
        self.groups
            .iter()
            .filter(|(_, name)| is_placeholder(name))
            .map(|(id, _)| *id)
            .collect()
    }

    #[must_use]
    pub fn processed_count(&self) -> usize {
        self.processed_posts.len() + self.legacy_posts.len()
    }

    #[must_use]
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    fn to_snapshot(&self) -> Snapshot {
        Snapshot {
            processed_posts: self
                .processed_posts
                .iter()
                .map(|(key, seen_at)| (key.to_string(), *seen_at))
                .chain(self.legacy_posts.iter().map(|(id, seen_at)| (id.to_string(), *seen_at)))
                .map(|(id, seen_at)| ProcessedEntry::Seen(RawId::Text(id), seen_at))
                .collect(),
            groups: self
                .groups
                .iter()
                .map(|(id, name)| (id.to_string(), name.clone()))
                .collect(),
        }
    }

    fn from_snapshot(path: PathBuf, snapshot: Snapshot) -> Self {
        let mut storage = Self::empty(path);

        for entry in snapshot.processed_posts {
            let (raw, seen_at) = entry.into_parts();
            let raw = raw.to_string();
            if raw.contains('_') {
                match raw.parse::<PostKey>() {
                    Ok(key) => storage.put(key, seen_at),
                    Err(e) => warn!("Dropping processed entry: {e}"),
                }
            } else {
                match raw.trim().parse::<u64>() {
                    Ok(post) => {
                        storage.legacy_posts.insert(post, seen_at);
                    }
                    Err(_) => warn!(key = %raw, "Dropping processed entry"),
                }
            }
        }

        for (raw, name) in snapshot.groups {
            match raw.parse::<FeedId>() {
                Ok(id) => {
                    let name = migrate_name(id, name);
                    storage.put_feed(id, name);
                }
                Err(e) => warn!(key = %raw, "Dropping group entry: {e}"),
            }
        }

        storage
    }
}

/// Placeholder display name for a group that could not be resolved.
#[must_use]
pub fn placeholder_name(id: FeedId) -> String {
    format!("{PLACEHOLDER_PREFIX}{id}")
}

/// True for names of the form `Group <digits>`.
#[must_use]
pub fn is_placeholder(name: &str) -> bool {
    name.strip_prefix(PLACEHOLDER_PREFIX)
        .is_some_and(|rest| !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()))
}

/// Display name for a resolved group, tagged when the group is closed.
#[must_use]
pub fn display_name(name: &str, is_private: bool) -> String {
    if is_private {
        format!("{PRIVATE_MARKER}{name}")
    } else {
        name.to_string()
    }
}

#[must_use]
pub fn is_private(name: &str) -> bool {
    name.starts_with(PRIVATE_MARKER)
}

/// Rewrite the earlier relay's name markers to the current ones.
fn migrate_name(id: FeedId, name: String) -> String {
    if name.contains(LEGACY_PRIVATE_MARKER) {
        let bare = name.replace(LEGACY_PRIVATE_MARKER, "");
        return display_name(bare.trim(), true);
    }
    match name.strip_prefix(LEGACY_PLACEHOLDER_PREFIX) {
        Some(rest) if rest.trim() == id.to_string() => placeholder_name(id),
        _ => name,
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feed_id_normalizes_sign() {
        assert_eq!(FeedId::from_signed(-42), FeedId::new(42));
        assert_eq!("-42".parse::<FeedId>().unwrap(), FeedId::new(42));
        assert_eq!(" 42 ".parse::<FeedId>().unwrap(), FeedId::new(42));
        assert_eq!(FeedId::new(42).owner_id(), -42);
        assert!("forty-two".parse::<FeedId>().is_err());
    }

    #[test]
    fn test_feed_id_bounds() {
        assert!("-9223372036854775808".parse::<FeedId>().is_err());
        assert!("9223372036854775808".parse::<FeedId>().is_err());
        assert_eq!(
            "-9223372036854775807".parse::<FeedId>().unwrap().owner_id(),
            -i64::MAX
        );

        let huge = FeedId::new(u64::MAX);
        assert!(!huge.is_addressable());
        assert_eq!(huge.owner_id(), i64::MIN);
        assert!(FeedId::new(i64::MAX as u64).is_addressable());
    }

    #[test]
    fn test_post_key_format_and_parse() {
        let key = PostKey::new(FeedId::new(56_468_672), 1042);
        assert_eq!(key.to_string(), "56468672_1042");
        assert_eq!("56468672_1042".parse::<PostKey>().unwrap(), key);
        assert_eq!("-56468672_1042".parse::<PostKey>().unwrap(), key);
        assert!("1042".parse::<PostKey>().is_err());
        assert!("a_b".parse::<PostKey>().is_err());
    }

    #[test]
    fn test_evict_older_than() {
        let now = 1_700_000_000;
        let day = 86_400;
        let mut storage = Storage::empty("unused.json");
        storage.put(PostKey::new(FeedId::new(1), 1), now - 3 * day);
        storage.put(PostKey::new(FeedId::new(1), 2), now - day);

        let removed = storage.evict_older_than(now - 2 * day);

        assert_eq!(removed, 1);
        assert!(!storage.has(&PostKey::new(FeedId::new(1), 1)));
        assert!(storage.has(&PostKey::new(FeedId::new(1), 2)));
    }

    #[test]
    fn test_name_markers() {
        let id = FeedId::new(7);
        assert_eq!(placeholder_name(id), "Group 7");
        assert!(is_placeholder(&placeholder_name(id)));
        assert!(!is_placeholder("Groupies of Vologda"));
        assert!(!is_placeholder("Group chat of Vologda"));

        assert_eq!(display_name("Club", true), "[PRIVATE] Club");
        assert!(is_private(&display_name("Club", true)));
        assert!(!is_private(&display_name("Club", false)));
    }

    #[test]
    fn test_placeholder_feeds() {
        let mut storage = Storage::empty("unused.json");
        storage.put_feed(FeedId::new(1), "Resolved");
        storage.put_feed(FeedId::new(2), placeholder_name(FeedId::new(2)));

        assert_eq!(storage.placeholder_feeds(), vec![FeedId::new(2)]);
    }

    #[test]
    fn test_migrate_legacy_names() {
        let id = FeedId::new(10);
        assert_eq!(migrate_name(id, "Группа 10".to_string()), "Group 10");
        assert_eq!(migrate_name(id, "[ПРИВАТНАЯ] Клуб".to_string()), "[PRIVATE] Клуб");
        assert_eq!(migrate_name(id, "Группа поддержки".to_string()), "Группа поддержки");
        assert_eq!(migrate_name(id, "Club".to_string()), "Club");
    }

    #[test]
    fn test_legacy_post_ids_match_any_wall() {
        let mut storage = Storage::empty("unused.json");
        storage.legacy_posts.insert(42, 100);

        assert!(storage.has(&PostKey::new(FeedId::new(1), 42)));
        assert!(storage.has(&PostKey::new(FeedId::new(2), 42)));
        assert_eq!(storage.processed_count(), 1);
        assert_eq!(storage.evict_older_than(101), 1);
        assert!(!storage.has(&PostKey::new(FeedId::new(1), 42)));
    }

    #[test]
    fn test_delete() {
        let key = PostKey::new(FeedId::new(1), 1);
        let mut storage = Storage::empty("unused.json");
        storage.put(key, 5);
        assert!(storage.delete(&key));
        assert!(!storage.delete(&key));
        assert!(!storage.has(&key));
    }
}
