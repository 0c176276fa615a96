//! OpenPass Indexer
//!
//! Follows the EntryPoint's `UserOperationEvent` logs and records the
//! operations of known OpenPass wallets as transaction records. Processing is
//! idempotent on the user operation hash, so replaying a block range is safe.

pub mod config;
pub mod error;
pub mod event;
pub mod processor;
pub mod source;
pub mod worker;

pub use config::IndexerConfig;
pub use error::IndexerError;
pub use event::{user_operation_event_topic, UserOperationEvent};
pub use processor::{seed_wallets, IndexOutcome, UserOperationProcessor};
pub use source::{HttpLogSource, LogPoller, LogSource};
pub use worker::{IndexerPool, IndexerStats};
