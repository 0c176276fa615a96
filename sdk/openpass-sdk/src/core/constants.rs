use ethers_core::types::Address;

pub use openpass_state::network::{ENTRY_POINT_V07, WALLET_FACTORY, WALLET_INIT_CODE_HASH};
pub use openpass_state::recovery::DEFAULT_TIMELOCK_SECS;

/// Sentinel asset address meaning "native currency"
pub const NATIVE_ASSET: Address = Address::zero();

/// Nonce key used for every operation of an account
pub const DEFAULT_NONCE_KEY: u64 = 0;

/// Authenticator data flag bits
pub const FLAG_USER_PRESENT: u8 = 0x01;
pub const FLAG_USER_VERIFIED: u8 = 0x04;

/// rpIdHash (32) + flags (1) + signCount (4)
pub const AUTH_DATA_MIN_LEN: usize = 37;

pub const CHALLENGE_LEN: usize = 32;

pub const DEFAULT_RP_ID: &str = "localhost";
pub const DEFAULT_ORIGIN: &str = "http://localhost:3000";

/// Rules enforced on recovery passwords
pub const MIN_PASSWORD_LEN: usize = 12;
