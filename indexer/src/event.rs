use ethers_core::abi::{self, ParamType, Token};
use ethers_core::types::{Address, Bytes, Log, H256, U256, U64};
use ethers_core::utils::keccak256;

use crate::error::IndexerError;

pub const USER_OPERATION_EVENT: &str =
    "UserOperationEvent(bytes32,address,address,uint256,bool,uint256,uint256)";

/// `topic0` of every `UserOperationEvent` log
pub fn user_operation_event_topic() -> H256 {
    H256(keccak256(USER_OPERATION_EVENT.as_bytes()))
}

/// One executed user operation, as emitted by the EntryPoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserOperationEvent {
    pub user_op_hash: H256,
    pub sender: Address,
    pub paymaster: Address,
    pub nonce: U256,
    pub success: bool,
    pub actual_gas_cost: U256,
    pub actual_gas_used: U256,

    pub block_number: Option<u64>,
    pub transaction_hash: Option<H256>,
}

impl UserOperationEvent {
    pub fn from_log(log: &Log) -> Result<Self, IndexerError> {
        let [signature, user_op_hash, sender, paymaster] = log.topics.as_slice() else {
            return Err(IndexerError::Decode(format!(
                "expected 4 topics, got {}",
                log.topics.len()
            )));
        };
        if *signature != user_operation_event_topic() {
            return Err(IndexerError::Decode(format!(
                "unexpected event signature {signature:?}"
            )));
        }

        let tokens = abi::decode(
            &[
                ParamType::Uint(256),
                ParamType::Bool,
                ParamType::Uint(256),
                ParamType::Uint(256),
            ],
            &log.data,
        )
        .map_err(|e| IndexerError::Decode(e.to_string()))?;

        let [Token::Uint(nonce), Token::Bool(success), Token::Uint(actual_gas_cost), Token::Uint(actual_gas_used)] =
            tokens.as_slice()
        else {
            return Err(IndexerError::Decode("unexpected data layout".into()));
        };

        Ok(Self {
            user_op_hash: *user_op_hash,
            sender: topic_address(sender),
            paymaster: topic_address(paymaster),
            nonce: *nonce,
            success: *success,
            actual_gas_cost: *actual_gas_cost,
            actual_gas_used: *actual_gas_used,
            block_number: log.block_number.map(|n| n.as_u64()),
            transaction_hash: log.transaction_hash,
        })
    }

    /// Log as the EntryPoint at `entry_point` would emit it
    pub fn to_log(&self, entry_point: Address) -> Log {
        let data = abi::encode(&[
            Token::Uint(self.nonce),
            Token::Bool(self.success),
            Token::Uint(self.actual_gas_cost),
            Token::Uint(self.actual_gas_used),
        ]);
        Log {
            address: entry_point,
            topics: vec![
                user_operation_event_topic(),
                self.user_op_hash,
                address_topic(self.sender),
                address_topic(self.paymaster),
            ],
            data: Bytes::from(data),
            block_number: self.block_number.map(U64::from),
            transaction_hash: self.transaction_hash,
            ..Default::default()
        }
    }
}

fn topic_address(topic: &H256) -> Address {
    Address::from_slice(&topic.as_bytes()[12..])
}

fn address_topic(address: Address) -> H256 {
    let mut topic = [0u8; 32];
    topic[12..].copy_from_slice(address.as_bytes());
    H256(topic)
}
