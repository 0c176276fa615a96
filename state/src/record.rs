use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use ethers_core::types::{Address, H256};
use serde::{Deserialize, Serialize};

use crate::error::StateError;

/// Kind of activity a record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Transfer,
    UserOperation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Success,
    Failed,
}

impl TransactionStatus {
    pub fn from_success(success: bool) -> Self {
        if success {
            TransactionStatus::Success
        } else {
            TransactionStatus::Failed
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Success => "success",
            TransactionStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = StateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TransactionStatus::Pending),
            "success" => Ok(TransactionStatus::Success),
            "failed" => Ok(TransactionStatus::Failed),
            other => Err(StateError::InvalidValue {
                field: "status",
                value: other.to_string(),
            }),
        }
    }
}

/// Durable record of a confirmed on-chain operation.
///
/// Written once by the indexer and never updated. `hash` is the unique key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    pub hash: H256,
    pub wallet_address: Address,
    pub chain_id: u64,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub metadata: BTreeMap<String, String>,
    pub status: TransactionStatus,
    /// Decimal string, wei
    pub value: String,
    pub timestamp: DateTime<Utc>,
}

impl TransactionRecord {
    pub fn new(
        hash: H256,
        wallet_address: Address,
        chain_id: u64,
        kind: TransactionKind,
        status: TransactionStatus,
    ) -> Self {
        Self {
            hash,
            wallet_address,
            chain_id,
            kind,
            metadata: BTreeMap::new(),
            status,
            value: "0".to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_value(mut self, value: impl ToString) -> Self {
        self.value = value.to_string();
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.metadata.insert(key.into(), value.to_string());
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Store key; lowercase 0x-prefixed hex of the hash.
    pub fn key(&self) -> String {
        format!("{:#x}", self.hash)
    }
}
