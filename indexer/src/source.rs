use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ethers_core::types::{Address, Log, H256, U64};
use openpass_sdk::rpc::JsonRpcClient;
use serde_json::json;
use tracing::{debug, error, warn};

use crate::error::IndexerError;
use crate::event::{user_operation_event_topic, UserOperationEvent};
use crate::worker::IndexerPool;

pub const DEFAULT_CONFIRMATIONS: u64 = 2;
pub const DEFAULT_BATCH_SIZE: u64 = 500;

/// Where event logs come from.
#[async_trait]
pub trait LogSource: Send + Sync {
    async fn latest_block(&self) -> Result<u64, IndexerError>;

    /// Logs emitted by `address` with `topic0 == topic` in `[from, to]`
    async fn logs(
        &self,
        address: Address,
        topic: H256,
        from: u64,
        to: u64,
    ) -> Result<Vec<Log>, IndexerError>;
}

/// [`LogSource`] over a node's `eth_blockNumber` / `eth_getLogs`
pub struct HttpLogSource {
    rpc: JsonRpcClient,
}

impl HttpLogSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            rpc: JsonRpcClient::new(url),
        }
    }
}

#[async_trait]
impl LogSource for HttpLogSource {
    async fn latest_block(&self) -> Result<u64, IndexerError> {
        let block: U64 = self.rpc.request("eth_blockNumber", json!([])).await?;
        Ok(block.as_u64())
    }

    async fn logs(
        &self,
        address: Address,
        topic: H256,
        from: u64,
        to: u64,
    ) -> Result<Vec<Log>, IndexerError> {
        let filter = json!({
            "address": address,
            "topics": [topic],
            "fromBlock": U64::from(from),
            "toBlock": U64::from(to),
        });
        Ok(self.rpc.request("eth_getLogs", json!([filter])).await?)
    }
}

/// Walks the EntryPoint's logs forward in confirmed block windows.
///
/// The cursor only advances after a window was fetched, so a failed poll is
/// retried on the next tick. Restarting from an earlier block replays events;
/// the store's hash uniqueness turns those into duplicates.
pub struct LogPoller {
    source: Arc<dyn LogSource>,
    entry_point: Address,
    next_block: u64,
    confirmations: u64,
    batch_size: u64,
}

impl LogPoller {
    pub fn new(source: Arc<dyn LogSource>, entry_point: Address, start_block: u64) -> Self {
        Self {
            source,
            entry_point,
            next_block: start_block,
            confirmations: DEFAULT_CONFIRMATIONS,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_confirmations(mut self, confirmations: u64) -> Self {
        self.confirmations = confirmations;
        self
    }

    pub fn with_batch_size(mut self, batch_size: u64) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// First block not yet fetched
    pub fn next_block(&self) -> u64 {
        self.next_block
    }

    /// Fetch the next confirmed window. Logs that fail to decode are skipped.
    pub async fn poll_once(&mut self) -> Result<Vec<UserOperationEvent>, IndexerError> {
        let latest = self.source.latest_block().await?;
        let Some(confirmed) = latest.checked_sub(self.confirmations) else {
            return Ok(Vec::new());
        };
        if confirmed < self.next_block {
            return Ok(Vec::new());
        }

        let from = self.next_block;
        let to = confirmed.min(from.saturating_add(self.batch_size - 1));
        let logs = self
            .source
            .logs(self.entry_point, user_operation_event_topic(), from, to)
            .await?;

        let mut events = Vec::with_capacity(logs.len());
        for log in &logs {
            match UserOperationEvent::from_log(log) {
                Ok(event) => events.push(event),
                Err(e) => warn!(tx = ?log.transaction_hash, error = %e, "skipping undecodable log"),
            }
        }

        debug!(from, to, events = events.len(), "fetched log window");
        self.next_block = to + 1;
        Ok(events)
    }

    /// Poll until the cursor reaches the confirmed head, feeding `pool`.
    /// Returns the number of events queued.
    pub async fn catch_up(&mut self, pool: &IndexerPool) -> Result<usize, IndexerError> {
        let mut queued = 0;
        loop {
            let before = self.next_block;
            for event in self.poll_once().await? {
                pool.submit(event).await?;
                queued += 1;
            }
            if self.next_block == before {
                return Ok(queued);
            }
        }
    }

    /// Poll forever at `interval`. Node errors are logged and retried; only a
    /// closed pool ends the loop.
    pub async fn run(&mut self, pool: &IndexerPool, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match self.catch_up(pool).await {
                Ok(0) => {}
                Ok(queued) => debug!(queued, next_block = self.next_block, "events queued"),
                Err(IndexerError::Shutdown) => {
                    error!("indexer pool closed, stopping poller");
                    return;
                }
                Err(e) => warn!(error = %e, next_block = self.next_block, "log poll failed"),
            }
        }
    }
}
