//! The polling pipeline: collect, filter, format, dispatch, record.

pub mod collector;
pub mod dispatcher;
pub mod filter;
pub mod format;
pub mod sweep;
pub mod traits;

pub use collector::{window_start, Collector};
pub use dispatcher::{split_chunks, DeliveryReport, Dispatcher};
pub use filter::KeywordFilter;
pub use format::MessageFormatter;
pub use sweep::{FeedOutcome, Relay, SharedStorage, SweepStats};
pub use traits::{FeedSource, MessageSink, OutgoingMessage};
