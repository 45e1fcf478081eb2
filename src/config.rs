use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::constants::MAX_PAGE_SIZE;
use crate::storage::FeedId;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },
    #[error("failed to parse {name} as integer: {source}")]
    ParseInt {
        name: String,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("failed to parse {name} as boolean: {value}")]
    ParseBool { name: String, value: String },
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // VK
    pub vk_token: String,
    pub vk_api_url: String,
    pub vk_api_version: String,
    pub group_ids: Vec<FeedId>,

    // Keyword rules
    pub include_words: Vec<String>,
    pub exclude_words: Vec<String>,

    // Telegram
    pub telegram_token: String,
    pub telegram_api_url: String,
    pub chat_id: String,
    pub thread_id: Option<i64>,
    pub link_preview: bool,

    // Scheduling
    pub check_interval: Duration,
    pub refresh_interval: Duration,
    pub posts_per_page: u32,
    pub retry_count: u32,
    pub retry_delay: Duration,
    pub request_delay: Duration,
    pub page_delay: Duration,
    pub chunk_delay: Duration,

    // State
    pub storage_file: PathBuf,
    pub days_shift: u32,
    pub retention_days: u32,
    pub delivery_policy: DeliveryPolicy,
}

/// When a dispatched post is recorded as processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryPolicy {
    /// Record the post whatever happened to its chunks
    Always,
    /// Record the post once at least one chunk was delivered
    AnyChunk,
    /// Record the post only when every chunk was delivered
    AllChunks,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        let days_shift = parse_env_u32("DAYS_SHIFT", 2)?;

        Ok(Self {
            // VK
            vk_token: required_env("VK_TOKEN")?,
            vk_api_url: env_or_default("VK_API_URL", "https://api.vk.com/method"),
            vk_api_version: env_or_default("VK_API_VERSION", "5.199"),
            group_ids: parse_group_ids(&required_env("VK_GROUP_IDS")?)?,

            // Keyword rules
            include_words: parse_list(&required_env("INCLUDE_WORDS")?),
            exclude_words: optional_env("EXCLUDE_WORDS")
                .map(|v| parse_list(&v))
                .unwrap_or_default(),

            // Telegram
            telegram_token: required_env("TELEGRAM_TOKEN")?,
            telegram_api_url: env_or_default("TELEGRAM_API_URL", "https://api.telegram.org"),
            chat_id: required_env("TELEGRAM_CHAT_ID")?,
            thread_id: parse_optional_env_i64("TELEGRAM_THREAD_ID")?,
            link_preview: parse_env_bool("TELEGRAM_LINK_PREVIEW", true)?,

            // Scheduling
            check_interval: Duration::from_secs(parse_env_u64("CHECK_INTERVAL_SECS", 7200)?),
            refresh_interval: Duration::from_secs(parse_env_u64("REFRESH_INTERVAL_SECS", 86_400)?),
            posts_per_page: parse_env_u32("POSTS_PER_PAGE", MAX_PAGE_SIZE)?,
            retry_count: parse_env_u32("RETRY_COUNT", 5)?,
            retry_delay: Duration::from_millis(parse_env_u64("RETRY_DELAY_MS", 2000)?),
            request_delay: Duration::from_millis(parse_env_u64("REQUEST_DELAY_MS", 3000)?),
            page_delay: Duration::from_millis(parse_env_u64("PAGE_DELAY_MS", 500)?),
            chunk_delay: Duration::from_millis(parse_env_u64("CHUNK_DELAY_MS", 200)?),

            // State
            storage_file: PathBuf::from(env_or_default("STORAGE_FILE", "./storage.json")),
            days_shift,
            retention_days: parse_env_u32("RETENTION_DAYS", days_shift)?,
            delivery_policy: parse_delivery_policy(&env_or_default("DELIVERY_POLICY", "always"))?,
        })
    }

    /// Configuration with sane values and no delays, for tests.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            vk_token: "test-vk-token".to_string(),
            vk_api_url: "http://127.0.0.1:1/method".to_string(),
            vk_api_version: "5.199".to_string(),
            group_ids: vec![FeedId::new(1)],
            include_words: vec!["test".to_string()],
            exclude_words: Vec::new(),
            telegram_token: "test-telegram-token".to_string(),
            telegram_api_url: "http://127.0.0.1:1".to_string(),
            chat_id: "-1001".to_string(),
            thread_id: None,
            link_preview: true,
            check_interval: Duration::from_secs(7200),
            refresh_interval: Duration::from_secs(86_400),
            posts_per_page: MAX_PAGE_SIZE,
            retry_count: 3,
            retry_delay: Duration::ZERO,
            request_delay: Duration::ZERO,
            page_delay: Duration::ZERO,
            chunk_delay: Duration::ZERO,
            storage_file: PathBuf::from("./storage.json"),
            days_shift: 2,
            retention_days: 2,
            delivery_policy: DeliveryPolicy::Always,
        }
    }

    /// Validate that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.group_ids.is_empty() {
            return Err(invalid("VK_GROUP_IDS", "must list at least one group"));
        }
        if let Some(id) = self.group_ids.iter().find(|id| !id.is_addressable()) {
            return Err(invalid("VK_GROUP_IDS", &format!("group id {id} is out of range")));
        }
        if self.include_words.is_empty() {
            return Err(invalid("INCLUDE_WORDS", "must list at least one word"));
        }
        if self.posts_per_page == 0 || self.posts_per_page > MAX_PAGE_SIZE {
            return Err(invalid(
                "POSTS_PER_PAGE",
                &format!("must be between 1 and {MAX_PAGE_SIZE}"),
            ));
        }
        if self.retry_count == 0 {
            return Err(invalid("RETRY_COUNT", "must be at least 1"));
        }
        if self.days_shift == 0 {
            return Err(invalid("DAYS_SHIFT", "must be at least 1"));
        }
        if self.retention_days < self.days_shift {
            return Err(invalid(
                "RETENTION_DAYS",
                "must be at least DAYS_SHIFT, or posts still in the window get relayed again",
            ));
        }
        if self.chat_id.is_empty() {
            return Err(invalid("TELEGRAM_CHAT_ID", "cannot be empty"));
        }
        if self.check_interval.is_zero() {
            return Err(invalid("CHECK_INTERVAL_SECS", "must be at least 1"));
        }
        if self.refresh_interval.is_zero() {
            return Err(invalid("REFRESH_INTERVAL_SECS", "must be at least 1"));
        }
        for (name, value) in [
            ("VK_API_URL", &self.vk_api_url),
            ("TELEGRAM_API_URL", &self.telegram_api_url),
        ] {
            if let Err(e) = url::Url::parse(value) {
                return Err(invalid(name, &e.to_string()));
            }
        }
        Ok(())
    }
}

fn invalid(name: &str, message: &str) -> ConfigError {
    ConfigError::InvalidValue {
        name: name.to_string(),
        message: message.to_string(),
    }
}

fn required_env(name: &str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::MissingEnvVar(name.to_string()))
}

fn optional_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_or_default(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_env_u64(name: &str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.trim().parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_u32(name: &str, default: u32) -> Result<u32, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.trim().parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_optional_env_i64(name: &str) -> Result<Option<i64>, ConfigError> {
    optional_env(name)
        .map(|val| {
            val.trim().parse().map_err(|e| ConfigError::ParseInt {
                name: name.to_string(),
                source: e,
            })
        })
        .transpose()
}

fn parse_env_bool(name: &str, default: bool) -> Result<bool, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => match val.to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::ParseBool {
                name: name.to_string(),
                value: val,
            }),
        },
        _ => Ok(default),
    }
}

/// Split a comma-separated list, dropping blank items.
fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Parse group ids, accepting the negative owner-id form as well.
fn parse_group_ids(value: &str) -> Result<Vec<FeedId>, ConfigError> {
    let mut ids = Vec::new();
    for item in parse_list(value) {
        let id = item.parse::<FeedId>().map_err(|e| ConfigError::ParseInt {
            name: "VK_GROUP_IDS".to_string(),
            source: e,
        })?;
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    Ok(ids)
}

fn parse_delivery_policy(value: &str) -> Result<DeliveryPolicy, ConfigError> {
    match value.to_lowercase().as_str() {
        "always" => Ok(DeliveryPolicy::Always),
        "any-chunk" | "any" => Ok(DeliveryPolicy::AnyChunk),
        "all-chunks" | "all" => Ok(DeliveryPolicy::AllChunks),
        _ => Err(ConfigError::InvalidValue {
            name: "DELIVERY_POLICY".to_string(),
            message: format!("must be 'always', 'any-chunk' or 'all-chunks', got '{value}'"),
        }),
    }
}
