use async_trait::async_trait;
use ethers_core::types::{Address, Bytes, H256, U256};
use openpass_state::GasLimits;
use std::error::Error;
use thiserror::Error as ThisError;

use crate::advanced::user_operation::UserOperation;
use crate::types::{FeeData, UserOperationReceipt};

/// Read access to an EVM chain.
#[async_trait]
pub trait ChainConnection: Send + Sync {
    async fn chain_id(&self) -> Result<u64, Box<dyn Error + Send + Sync>>;

    /// `eth_call` against the latest block
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, Box<dyn Error + Send + Sync>>;

    async fn get_code(&self, address: Address) -> Result<Bytes, Box<dyn Error + Send + Sync>>;

    async fn get_balance(&self, address: Address) -> Result<U256, Box<dyn Error + Send + Sync>>;

    async fn fee_data(&self) -> Result<FeeData, Box<dyn Error + Send + Sync>>;

    /// Timestamp of the latest block, unix seconds
    async fn block_timestamp(&self) -> Result<u64, Box<dyn Error + Send + Sync>>;
}

/// Failure talking to the relay. A rejection means the relay answered and
/// refused; a transport failure means no answer was obtained.
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum RelayError {
    #[error("{0}")]
    Rejected(String),

    #[error("relay unreachable: {0}")]
    Transport(String),
}

/// ERC-4337 bundler surface.
#[async_trait]
pub trait RelayConnection: Send + Sync {
    async fn supported_entry_points(&self) -> Result<Vec<Address>, RelayError>;

    async fn estimate_user_operation_gas(
        &self,
        op: &UserOperation,
        entry_point: Address,
    ) -> Result<GasLimits, RelayError>;

    /// Broadcast a signed operation; returns its user operation hash
    async fn send_user_operation(
        &self,
        op: &UserOperation,
        entry_point: Address,
    ) -> Result<H256, RelayError>;

    /// `None` while the operation has not been included
    async fn get_user_operation_receipt(
        &self,
        hash: H256,
    ) -> Result<Option<UserOperationReceipt>, RelayError>;
}
