use ethers_core::abi::{encode, Token};
use ethers_core::types::{Address, Bytes, H256, U256};
use ethers_core::utils::keccak256;
use openpass_state::{FeeModel, GasLimits};
use serde::{Deserialize, Serialize};

/// ERC-4337 v0.7 user operation in the unpacked form bundlers accept over
/// JSON-RPC. No paymaster is used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperation {
    pub sender: Address,
    pub nonce: U256,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub factory: Option<Address>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub factory_data: Option<Bytes>,
    pub call_data: Bytes,
    pub call_gas_limit: U256,
    pub verification_gas_limit: U256,
    pub pre_verification_gas: U256,
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
    pub signature: Bytes,
}

impl UserOperation {
    pub fn new(sender: Address, nonce: U256, call_data: Bytes) -> Self {
        Self {
            sender,
            nonce,
            factory: None,
            factory_data: None,
            call_data,
            call_gas_limit: U256::zero(),
            verification_gas_limit: U256::zero(),
            pre_verification_gas: U256::zero(),
            max_fee_per_gas: U256::zero(),
            max_priority_fee_per_gas: U256::zero(),
            signature: Bytes::new(),
        }
    }

    /// Deploy the account through `factory` as part of this operation
    pub fn with_factory(mut self, factory: Address, factory_data: Bytes) -> Self {
        self.factory = Some(factory);
        self.factory_data = Some(factory_data);
        self
    }

    pub fn with_gas_limits(mut self, limits: &GasLimits) -> Self {
        self.pre_verification_gas = limits.pre_verification_gas;
        self.verification_gas_limit = limits.verification_gas_limit;
        self.call_gas_limit = limits.call_gas_limit;
        self
    }

    pub fn with_fee(mut self, fee: &FeeModel) -> Self {
        let (max_fee, max_priority) = fee.user_operation_fields();
        self.max_fee_per_gas = max_fee;
        self.max_priority_fee_per_gas = max_priority;
        self
    }

    pub fn with_signature(mut self, signature: Bytes) -> Self {
        self.signature = signature;
        self
    }

    pub fn gas_limits(&self) -> GasLimits {
        GasLimits {
            pre_verification_gas: self.pre_verification_gas,
            verification_gas_limit: self.verification_gas_limit,
            call_gas_limit: self.call_gas_limit,
        }
    }

    /// `factory || factoryData`, empty for deployed accounts
    pub fn init_code(&self) -> Bytes {
        match (&self.factory, &self.factory_data) {
            (Some(factory), Some(data)) => {
                let mut code = factory.as_bytes().to_vec();
                code.extend_from_slice(data);
                code.into()
            }
            _ => Bytes::new(),
        }
    }

    /// `verificationGasLimit << 128 | callGasLimit`
    pub fn account_gas_limits(&self) -> [u8; 32] {
        pack_u128_pair(self.verification_gas_limit, self.call_gas_limit)
    }

    /// `maxPriorityFeePerGas << 128 | maxFeePerGas`
    pub fn gas_fees(&self) -> [u8; 32] {
        pack_u128_pair(self.max_priority_fee_per_gas, self.max_fee_per_gas)
    }

    /// Packed encoding hashed by the EntryPoint; excludes the signature.
    pub fn pack(&self) -> Vec<u8> {
        encode(&[
            Token::Address(self.sender),
            Token::Uint(self.nonce),
            Token::FixedBytes(keccak256(self.init_code()).to_vec()),
            Token::FixedBytes(keccak256(&self.call_data).to_vec()),
            Token::FixedBytes(self.account_gas_limits().to_vec()),
            Token::Uint(self.pre_verification_gas),
            Token::FixedBytes(self.gas_fees().to_vec()),
            // no paymaster
            Token::FixedBytes(keccak256(b"").to_vec()),
        ])
    }

    /// User operation hash as computed by `EntryPoint.getUserOpHash`
    pub fn hash(&self, entry_point: Address, chain_id: u64) -> H256 {
        H256(keccak256(encode(&[
            Token::FixedBytes(keccak256(self.pack()).to_vec()),
            Token::Address(entry_point),
            Token::Uint(U256::from(chain_id)),
        ])))
    }
}

/// Two values into one word, 128 bits each; higher bits are dropped.
fn pack_u128_pair(high: U256, low: U256) -> [u8; 32] {
    let mut out = [0u8; 32];
    let mut word = [0u8; 32];
    high.to_big_endian(&mut word);
    out[..16].copy_from_slice(&word[16..]);
    low.to_big_endian(&mut word);
    out[16..].copy_from_slice(&word[16..]);
    out
}
