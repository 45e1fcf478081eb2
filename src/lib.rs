//! VK wall relay library.
//!
//! Polls VK community walls on a fixed interval, keeps posts that match
//! keyword rules and have not been relayed yet, and forwards them to a
//! Telegram chat.

pub mod config;
pub mod constants;
pub mod relay;
pub mod storage;
pub mod telegram;
pub mod vk;
