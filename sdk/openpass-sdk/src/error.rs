use ethers_core::types::U256;
use openpass_state::{StateError, StoreError};
use thiserror::Error;

use crate::core::connection::RelayError;

/// SDK-specific error types for OpenPass operations
#[derive(Debug, Error)]
pub enum SdkError {
    /// Authenticator failure, malformed key material or key mismatch on login
    #[error("Credential error: {0}")]
    Credential(String),

    /// Chain or relay unreachable
    #[error("Network error: {0}")]
    Network(String),

    /// Requested value (plus fee) exceeds the known balance
    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance { required: U256, available: U256 },

    /// Destination failed address validation
    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),

    /// Relay rejected the signed operation, with its reason
    #[error("Submission rejected: {0}")]
    Submission(String),

    /// Illegal recovery transition; nothing was signed or sent
    #[error("Recovery state error: {0}")]
    RecoveryState(String),

    /// ABI or signature encoding/decoding failure
    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Fee arithmetic or invalid values read back from chain
    #[error("State error: {0}")]
    State(#[from] StateError),
}

impl SdkError {
    pub fn network(err: impl std::fmt::Display) -> Self {
        SdkError::Network(err.to_string())
    }

    pub fn credential(err: impl std::fmt::Display) -> Self {
        SdkError::Credential(err.to_string())
    }
}

impl From<RelayError> for SdkError {
    fn from(err: RelayError) -> Self {
        match err {
            RelayError::Rejected(reason) => SdkError::Submission(reason),
            RelayError::Transport(reason) => SdkError::Network(reason),
        }
    }
}

impl From<ethers_core::abi::Error> for SdkError {
    fn from(err: ethers_core::abi::Error) -> Self {
        SdkError::Encoding(err.to_string())
    }
}

/// Result type alias for SDK operations
pub type Result<T> = std::result::Result<T, SdkError>;
