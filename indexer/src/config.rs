//! Indexer configuration.

use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use openpass_state::{Network, NetworkConfig};

use crate::error::IndexerError;
use crate::source::{DEFAULT_BATCH_SIZE, DEFAULT_CONFIRMATIONS};

const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;
const DEFAULT_WORKERS: usize = 4;

/// Indexer configuration.
#[derive(Clone, Debug)]
pub struct IndexerConfig {
    /// Chain being indexed; `rpc_url` and `entry_point` are used.
    pub network: NetworkConfig,
    /// First block to fetch.
    pub start_block: u64,
    /// Blocks behind the head considered final.
    pub confirmations: u64,
    /// Blocks per `eth_getLogs` window.
    pub batch_size: u64,
    pub poll_interval: Duration,
    pub workers: usize,
    /// JSON array of wallet documents loaded into the registry at startup.
    pub wallets_file: Option<PathBuf>,
    /// Emit logs as JSON lines.
    pub log_json: bool,
}

impl IndexerConfig {
    pub fn new(network: NetworkConfig) -> Self {
        Self {
            network,
            start_block: 0,
            confirmations: DEFAULT_CONFIRMATIONS,
            batch_size: DEFAULT_BATCH_SIZE,
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            workers: DEFAULT_WORKERS,
            wallets_file: None,
            log_json: false,
        }
    }

    /// Load configuration from environment variables, reading `.env` first.
    pub fn from_env() -> Result<Self, IndexerError> {
        dotenvy::dotenv().ok();

        let environment = env::var("OPENPASS_ENV").unwrap_or_else(|_| "development".to_string());
        let mut network = Network::for_environment(&environment).config();
        if let Ok(url) = env::var("OPENPASS_RPC_URL") {
            network = network.with_rpc_url(url);
        }

        let config = Self {
            network,
            start_block: parse_var("INDEXER_START_BLOCK", 0)?,
            confirmations: parse_var("INDEXER_CONFIRMATIONS", DEFAULT_CONFIRMATIONS)?,
            batch_size: parse_var("INDEXER_BATCH_SIZE", DEFAULT_BATCH_SIZE)?,
            poll_interval: Duration::from_secs(parse_var(
                "INDEXER_POLL_INTERVAL_SECS",
                DEFAULT_POLL_INTERVAL_SECS,
            )?),
            workers: parse_var("INDEXER_WORKERS", DEFAULT_WORKERS)?,
            wallets_file: env::var("INDEXER_WALLETS_FILE").ok().map(PathBuf::from),
            log_json: log_json_enabled(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), IndexerError> {
        if self.network.rpc_url.trim().is_empty() {
            return Err(IndexerError::Config("rpc url is empty".into()));
        }
        if self.batch_size == 0 {
            return Err(IndexerError::Config("INDEXER_BATCH_SIZE must be at least 1".into()));
        }
        if self.workers == 0 {
            return Err(IndexerError::Config("INDEXER_WORKERS must be at least 1".into()));
        }
        if self.poll_interval.is_zero() {
            return Err(IndexerError::Config(
                "INDEXER_POLL_INTERVAL_SECS must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// `OPENPASS_LOG_JSON=1` (or `true`)
pub fn log_json_enabled() -> bool {
    env::var("OPENPASS_LOG_JSON")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

fn parse_var<T>(name: &str, default: T) -> Result<T, IndexerError>
where
    T: FromStr,
    T::Err: Display,
{
    match env::var(name) {
        Ok(raw) => parse_value(name, &raw),
        Err(_) => Ok(default),
    }
}

fn parse_value<T>(name: &str, raw: &str) -> Result<T, IndexerError>
where
    T: FromStr,
    T::Err: Display,
{
    raw.trim()
        .parse()
        .map_err(|e| IndexerError::Config(format!("{name}={raw}: {e}")))
}
