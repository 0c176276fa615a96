//! OpenPass State Module
//!
//! Data model shared by the SDK and the indexer: passkey credentials, the
//! counterfactual wallet document, fee quotes, transaction records and the
//! recovery state read back from the wallet contract.

pub mod error;
pub mod fee;
pub mod network;
pub mod record;
pub mod recovery;
pub mod store;

use ethers_core::types::{Address, U256};
use serde::{Deserialize, Serialize};

pub use error::{StateError, StoreError};
pub use fee::{FeeModel, FeeQuote, GasLimits};
pub use network::{Network, NetworkConfig};
pub use record::{TransactionKind, TransactionRecord, TransactionStatus};
pub use recovery::{RecoveryCountdown, RecoveryState, RecoveryStatus};
pub use store::{MemoryStore, TransactionStore, WalletRegistry};

/// Affine coordinates of a P-256 public key, as stored by the wallet contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublicKey {
    #[serde(with = "decimal")]
    pub x: U256,
    #[serde(with = "decimal")]
    pub y: U256,
}

impl PublicKey {
    pub fn new(x: U256, y: U256) -> Self {
        Self { x, y }
    }

    /// SEC1 uncompressed encoding: `0x04 || x || y`
    pub fn to_uncompressed(&self) -> [u8; 65] {
        let mut out = [0u8; 65];
        out[0] = 0x04;
        self.x.to_big_endian(&mut out[1..33]);
        self.y.to_big_endian(&mut out[33..65]);
        out
    }
}

/// A passkey enrolled on a platform authenticator.
///
/// Lives only as long as the local session that created it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    /// Raw credential id as returned by the authenticator
    pub id: Vec<u8>,

    /// The credential's public key
    pub public_key: PublicKey,
}

impl Credential {
    pub fn new(id: Vec<u8>, public_key: PublicKey) -> Self {
        Self { id, public_key }
    }
}

/// Wallet registry document.
///
/// `address` is the CREATE2 address derived from the first signer key and never
/// changes; `x`, `y` and `credential_id` follow the signer across reclaims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Wallet {
    pub address: Address,
    #[serde(with = "decimal")]
    pub x: U256,
    #[serde(with = "decimal")]
    pub y: U256,
    /// base64url credential id of the current signer
    pub credential_id: String,
    pub chain_id: u64,
}

impl Wallet {
    pub fn signer(&self) -> PublicKey {
        PublicKey::new(self.x, self.y)
    }
}

/// Serde adapter storing `U256` as a decimal string, the way the documents
/// keep big integers without precision loss.
pub mod decimal {
    use ethers_core::types::U256;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        let raw = String::deserialize(deserializer)?;
        U256::from_dec_str(&raw).map_err(|e| D::Error::custom(format!("{raw}: {e}")))
    }
}
