use ethers_core::types::{Address, Bytes, H256, U256};
use serde::{Deserialize, Serialize};

/// A single call executed by the smart account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Call {
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
}

impl Call {
    pub fn new(to: Address, value: U256, data: impl Into<Bytes>) -> Self {
        Self {
            to,
            value,
            data: data.into(),
        }
    }

    /// Plain value transfer with empty calldata
    pub fn value(to: Address, value: U256) -> Self {
        Self::new(to, value, Bytes::new())
    }
}

/// Fee market data read from the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FeeData {
    /// Base fee of the latest block, absent on pre-London chains
    pub base_fee_per_gas: Option<U256>,
    /// `eth_maxPriorityFeePerGas`, absent when the node does not support it
    pub max_priority_fee_per_gas: Option<U256>,
    pub gas_price: U256,
}

/// Returned by a successful submission: the operation was broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionReceipt {
    pub user_op_hash: H256,
}

/// Receipt as reported by the relay once the operation was included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserOperationReceipt {
    pub user_op_hash: H256,
    pub success: bool,
    pub reason: Option<String>,
    pub transaction_hash: Option<H256>,
}

/// Outcome of a broadcast operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationOutcome {
    /// Not yet included
    Pending,
    Executed { transaction_hash: Option<H256> },
    Reverted { reason: String },
}

impl From<Option<UserOperationReceipt>> for OperationOutcome {
    fn from(receipt: Option<UserOperationReceipt>) -> Self {
        match receipt {
            None => OperationOutcome::Pending,
            Some(r) if r.success => OperationOutcome::Executed {
                transaction_hash: r.transaction_hash,
            },
            Some(r) => OperationOutcome::Reverted {
                reason: r.reason.unwrap_or_else(|| "execution reverted".to_string()),
            },
        }
    }
}

/// Result of a recovery password check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordStrength {
    /// Number of satisfied rules, 0..=4
    pub score: u8,
    pub feedback: Vec<String>,
    pub is_valid: bool,
}
