use openpass_sdk::rpc::RpcError;
use openpass_state::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexerError {
    /// Log did not decode as a `UserOperationEvent`
    #[error("Malformed event log: {0}")]
    Decode(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Node error: {0}")]
    Rpc(#[from] RpcError),

    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The worker pool stopped accepting events
    #[error("Indexer pool is shut down")]
    Shutdown,
}
