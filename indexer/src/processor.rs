use std::sync::Arc;

use openpass_state::{
    TransactionKind, TransactionRecord, TransactionStatus, TransactionStore, Wallet,
    WalletRegistry,
};
use tracing::{debug, error, info, warn};

use crate::error::IndexerError;
use crate::event::UserOperationEvent;

/// What happened to one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOutcome {
    Inserted,
    /// Already recorded; replays and duplicate deliveries land here
    Duplicate,
    /// Sender is not an OpenPass wallet on this chain
    UnknownSender,
}

/// Turns `UserOperationEvent`s of known wallets into transaction records.
///
/// Safe to share between workers: the store's hash uniqueness is the only
/// coordination needed.
pub struct UserOperationProcessor {
    wallets: Arc<dyn WalletRegistry>,
    store: Arc<dyn TransactionStore>,
}

impl UserOperationProcessor {
    pub fn new(wallets: Arc<dyn WalletRegistry>, store: Arc<dyn TransactionStore>) -> Self {
        Self { wallets, store }
    }

    pub async fn process(
        &self,
        event: &UserOperationEvent,
        chain_id: u64,
    ) -> Result<IndexOutcome, IndexerError> {
        if self
            .wallets
            .find_by_address(event.sender, chain_id)
            .await?
            .is_none()
        {
            warn!(sender = %event.sender, user_op_hash = ?event.user_op_hash, "event from unknown wallet, skipping");
            return Ok(IndexOutcome::UnknownSender);
        }

        let record = TransactionRecord::new(
            event.user_op_hash,
            event.sender,
            chain_id,
            TransactionKind::UserOperation,
            TransactionStatus::from_success(event.success),
        )
        .with_metadata("paymaster", format!("{:#x}", event.paymaster))
        .with_metadata("nonce", event.nonce)
        .with_metadata("actualGasCost", event.actual_gas_cost)
        .with_metadata("actualGasUsed", event.actual_gas_used);
        let status = record.status;

        match self.store.insert(record).await {
            Ok(()) => {
                info!(
                    sender = %event.sender,
                    user_op_hash = ?event.user_op_hash,
                    %status,
                    "user operation indexed"
                );
                Ok(IndexOutcome::Inserted)
            }
            Err(e) if e.is_duplicate() => {
                debug!(user_op_hash = ?event.user_op_hash, "user operation already indexed");
                Ok(IndexOutcome::Duplicate)
            }
            Err(e) => {
                error!(user_op_hash = ?event.user_op_hash, error = %e, "failed to persist user operation");
                Err(e.into())
            }
        }
    }
}

/// Load wallet documents (a JSON array) into `registry`. Wallets already
/// present are left alone. Returns how many were added.
pub async fn seed_wallets(registry: &dyn WalletRegistry, json: &str) -> Result<usize, IndexerError> {
    let wallets: Vec<Wallet> = serde_json::from_str(json)
        .map_err(|e| IndexerError::Config(format!("wallet seed file: {e}")))?;

    let mut added = 0;
    for wallet in wallets {
        match registry.create(wallet).await {
            Ok(()) => added += 1,
            Err(e) if e.is_duplicate() => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(added)
}
