pub mod advanced;
pub mod basic;
pub mod config;
pub mod core;
pub mod error;
pub mod rpc;
pub mod types;
pub mod utils;

pub use crate::basic::account::{AccountCreator, SmartAccount};
pub use crate::basic::actions::{build_call, validate_recipient, TransactionEngine, TransferRequest};
pub use crate::basic::recovery::{validate_password_strength, RecoveryManager};
pub use crate::basic::session::Session;
pub use crate::config::SdkConfig;
pub use crate::core::connection::{ChainConnection, RelayConnection, RelayError};
pub use crate::core::signer::{Authenticator, CredentialAdapter, LocalAuthenticator};
pub use crate::error::{Result, SdkError};
pub use crate::rpc::{HttpChain, HttpRelay, JsonRpcClient};
pub use crate::types::{Call, FeeData, OperationOutcome, PasswordStrength, SubmissionReceipt};
pub use crate::utils::{
    coordinates_from_public_key, derive_address, derive_salt, recover_public_key, wallet_id,
};

pub mod state {
    pub use openpass_state::*;
}
