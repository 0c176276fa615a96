use ethers_core::types::U256;
use serde::{Deserialize, Serialize};

use crate::error::StateError;

/// Gas limits for a single user operation, as estimated by the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GasLimits {
    pub pre_verification_gas: U256,
    pub verification_gas_limit: U256,
    pub call_gas_limit: U256,
}

impl GasLimits {
    pub fn new(
        pre_verification_gas: impl Into<U256>,
        verification_gas_limit: impl Into<U256>,
        call_gas_limit: impl Into<U256>,
    ) -> Self {
        Self {
            pre_verification_gas: pre_verification_gas.into(),
            verification_gas_limit: verification_gas_limit.into(),
            call_gas_limit: call_gas_limit.into(),
        }
    }

    /// Sum of the three limits
    pub fn total(&self) -> Result<U256, StateError> {
        self.pre_verification_gas
            .checked_add(self.verification_gas_limit)
            .and_then(|sum| sum.checked_add(self.call_gas_limit))
            .ok_or(StateError::FeeOverflow)
    }
}

/// Fee market the operation is priced in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "camelCase")]
pub enum FeeModel {
    /// EIP-1559 style priority fee market
    #[serde(rename_all = "camelCase")]
    Dynamic {
        max_fee_per_gas: U256,
        max_priority_fee_per_gas: U256,
    },
    /// Single fixed gas price
    #[serde(rename_all = "camelCase")]
    Legacy { gas_price: U256 },
}

impl FeeModel {
    /// Per-gas price charged by the total fee formula: `feePerGas + priorityFeePerGas`.
    pub fn price_per_gas(&self) -> Result<U256, StateError> {
        match self {
            FeeModel::Dynamic {
                max_fee_per_gas,
                max_priority_fee_per_gas,
            } => max_fee_per_gas
                .checked_add(*max_priority_fee_per_gas)
                .ok_or(StateError::FeeOverflow),
            FeeModel::Legacy { gas_price } => Ok(*gas_price),
        }
    }

    /// Fee fields placed in the user operation as `(maxFeePerGas, maxPriorityFeePerGas)`.
    ///
    /// A legacy price fills both slots so the bundler pays exactly that price.
    pub fn user_operation_fields(&self) -> (U256, U256) {
        match self {
            FeeModel::Dynamic {
                max_fee_per_gas,
                max_priority_fee_per_gas,
            } => (*max_fee_per_gas, *max_priority_fee_per_gas),
            FeeModel::Legacy { gas_price } => (*gas_price, *gas_price),
        }
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self, FeeModel::Dynamic { .. })
    }
}

/// Gas limits plus fee market for one submission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeQuote {
    pub limits: GasLimits,
    pub fee: FeeModel,
}

impl FeeQuote {
    pub fn new(limits: GasLimits, fee: FeeModel) -> Self {
        Self { limits, fee }
    }

    /// Build a quote from optional fee fields. The priority pair wins when both
    /// of its fields are present, otherwise the legacy price is used.
    pub fn from_parts(
        limits: GasLimits,
        max_fee_per_gas: Option<U256>,
        max_priority_fee_per_gas: Option<U256>,
        gas_price: Option<U256>,
    ) -> Result<Self, StateError> {
        let fee = match (max_fee_per_gas, max_priority_fee_per_gas, gas_price) {
            (Some(max_fee_per_gas), Some(max_priority_fee_per_gas), _) => FeeModel::Dynamic {
                max_fee_per_gas,
                max_priority_fee_per_gas,
            },
            (_, _, Some(gas_price)) => FeeModel::Legacy { gas_price },
            _ => return Err(StateError::MissingFeeFields),
        };
        Ok(Self { limits, fee })
    }

    /// `(pvg + vgl + cgl) * (feePerGas + priorityFeePerGas)`
    pub fn total_fee(&self) -> Result<U256, StateError> {
        self.limits
            .total()?
            .checked_mul(self.fee.price_per_gas()?)
            .ok_or(StateError::FeeOverflow)
    }
}
