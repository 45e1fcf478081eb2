//! Shared constants used across the application.

/// User agent string sent with VK and Telegram API requests.
pub const USER_AGENT: &str = concat!("vk-wall-relay/", env!("CARGO_PKG_VERSION"));

/// Maximum number of posts `wall.get` returns per call.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Telegram rejects message texts longer than this many characters.
pub const MESSAGE_CHUNK_LIMIT: usize = 4096;

/// Prefix of the display name stored when a group could not be resolved.
///
/// A stored name starting with this prefix marks the record for the
/// periodic metadata refresh.
pub const PLACEHOLDER_PREFIX: &str = "Group ";

/// Prefix of the display name stored for closed (private) groups.
///
/// Feeds carrying this marker are skipped by every sweep until it is
/// removed from the snapshot by hand.
pub const PRIVATE_MARKER: &str = "[PRIVATE] ";

/// Public URL prefix of a single wall post.
pub const WALL_POST_URL: &str = "https://vk.com/wall";

/// Seconds in one day, for retention and window arithmetic.
pub const SECONDS_PER_DAY: i64 = 86_400;

/// Placeholder prefix written by the earlier relay; migrated on load.
pub const LEGACY_PLACEHOLDER_PREFIX: &str = "Группа ";

/// Private marker written by the earlier relay; migrated on load.
pub const LEGACY_PRIVATE_MARKER: &str = "[ПРИВАТНАЯ]";
