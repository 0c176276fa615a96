use ethers_core::types::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::error::StateError;
use crate::PublicKey;

/// Seven days, the timelock the wallet contract enforces
pub const DEFAULT_TIMELOCK_SECS: u64 = 7 * 24 * 60 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStatus {
    None,
    Pending,
    Ready,
    Reclaimed,
    Cancelled,
}

impl RecoveryStatus {
    /// Decode the contract's stored status code. `Ready` is never stored; it is
    /// derived from `Pending` once the timelock has elapsed.
    pub fn from_code(code: u8) -> Result<Self, StateError> {
        match code {
            0 => Ok(RecoveryStatus::None),
            1 => Ok(RecoveryStatus::Pending),
            2 => Ok(RecoveryStatus::Reclaimed),
            3 => Ok(RecoveryStatus::Cancelled),
            other => Err(StateError::InvalidValue {
                field: "recovery status",
                value: other.to_string(),
            }),
        }
    }

    /// A fresh recovery cycle may start from here.
    pub fn can_initiate(&self) -> bool {
        matches!(
            self,
            RecoveryStatus::None | RecoveryStatus::Reclaimed | RecoveryStatus::Cancelled
        )
    }

    pub fn can_cancel(&self) -> bool {
        matches!(self, RecoveryStatus::Pending | RecoveryStatus::Ready)
    }

    pub fn can_reclaim(&self) -> bool {
        matches!(self, RecoveryStatus::Ready)
    }
}

/// Recovery state of one wallet as read from chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryState {
    pub status: RecoveryStatus,
    pub wallet_address: Address,
    /// Unix seconds, 0 when no cycle was ever started
    pub initiation_time: u64,
    pub completion_time: u64,
    pub new_signer: Option<PublicKey>,
}

impl RecoveryState {
    pub fn none(wallet_address: Address) -> Self {
        Self {
            status: RecoveryStatus::None,
            wallet_address,
            initiation_time: 0,
            completion_time: 0,
            new_signer: None,
        }
    }

    /// Build the state from the raw `getRecovery()` tuple, deriving `Ready`
    /// against `now` (the latest block timestamp).
    pub fn from_contract(
        wallet_address: Address,
        code: u8,
        new_x: U256,
        new_y: U256,
        initiated_at: U256,
        completes_at: U256,
        now: u64,
    ) -> Result<Self, StateError> {
        let mut status = RecoveryStatus::from_code(code)?;
        let initiation_time = to_seconds("initiatedAt", initiated_at)?;
        let completion_time = to_seconds("completesAt", completes_at)?;

        if status == RecoveryStatus::Pending && now >= completion_time {
            status = RecoveryStatus::Ready;
        }

        let new_signer = if new_x.is_zero() && new_y.is_zero() {
            None
        } else {
            Some(PublicKey::new(new_x, new_y))
        };

        Ok(Self {
            status,
            wallet_address,
            initiation_time,
            completion_time,
            new_signer,
        })
    }

    pub fn countdown(&self, now: u64) -> RecoveryCountdown {
        RecoveryCountdown::compute(now, self.initiation_time, self.completion_time)
    }
}

fn to_seconds(field: &'static str, value: U256) -> Result<u64, StateError> {
    if value > U256::from(u64::MAX) {
        return Err(StateError::InvalidValue {
            field,
            value: value.to_string(),
        });
    }
    Ok(value.as_u64())
}

/// Time left until a recovery completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryCountdown {
    pub days: u64,
    pub hours: u64,
    pub minutes: u64,
    pub seconds: u64,
    /// Elapsed share of the timelock, 0..=100
    pub percent_complete: u8,
}

impl RecoveryCountdown {
    pub fn compute(now: u64, initiation_time: u64, completion_time: u64) -> Self {
        let remaining = completion_time.saturating_sub(now);
        let window = completion_time.saturating_sub(initiation_time);
        let elapsed = now.saturating_sub(initiation_time).min(window);

        let percent_complete = if window == 0 || remaining == 0 {
            100
        } else {
            ((elapsed as u128 * 100) / window as u128) as u8
        };

        Self {
            days: remaining / 86_400,
            hours: (remaining % 86_400) / 3_600,
            minutes: (remaining % 3_600) / 60,
            seconds: remaining % 60,
            percent_complete,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.percent_complete == 100
    }
}
