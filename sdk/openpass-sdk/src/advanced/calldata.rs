use ethers_core::abi::{decode, encode, ParamType, Token};
use ethers_core::types::{Address, Bytes, H256, U256};
use ethers_core::utils::id;
use openpass_state::PublicKey;

use crate::core::signer::Assertion;
use crate::core::webauthn::{find_challenge_index, find_type_index};
use crate::error::{Result, SdkError};
use crate::types::Call;
use crate::utils;

pub const EXECUTE: &str = "execute(address,uint256,bytes)";
pub const EXECUTE_BATCH: &str = "executeBatch((address,uint256,bytes)[])";
pub const CREATE_WALLET: &str = "createWallet(bytes32,uint256,uint256)";
pub const WALLETS: &str = "wallets(bytes32)";
pub const GET_SIGNER: &str = "getSigner()";
pub const GET_NONCE: &str = "getNonce(address,uint192)";
pub const ERC20_TRANSFER: &str = "transfer(address,uint256)";
pub const SET_RECOVERY_PASSWORD: &str = "setRecoveryPassword(bytes32)";
pub const INITIATE_RECOVERY: &str = "initiateRecovery(bytes32,uint256,uint256,bytes32)";
pub const CANCEL_RECOVERY: &str = "cancelRecovery()";
pub const RECLAIM: &str = "reclaim()";
pub const GET_RECOVERY: &str = "getRecovery()";

fn with_selector(signature: &str, tokens: &[Token]) -> Bytes {
    let mut data = id(signature).to_vec();
    data.extend_from_slice(&encode(tokens));
    data.into()
}

//=============================================================================
// Encoders
//=============================================================================

pub fn execute(call: &Call) -> Bytes {
    with_selector(
        EXECUTE,
        &[
            Token::Address(call.to),
            Token::Uint(call.value),
            Token::Bytes(call.data.to_vec()),
        ],
    )
}

pub fn execute_batch(calls: &[Call]) -> Bytes {
    let tuples = calls
        .iter()
        .map(|c| {
            Token::Tuple(vec![
                Token::Address(c.to),
                Token::Uint(c.value),
                Token::Bytes(c.data.to_vec()),
            ])
        })
        .collect();
    with_selector(EXECUTE_BATCH, &[Token::Array(tuples)])
}

/// `execute` for a single call, `executeBatch` otherwise
pub fn encode_calls(calls: &[Call]) -> Result<Bytes> {
    match calls {
        [] => Err(SdkError::Encoding("operation has no calls".into())),
        [single] => Ok(execute(single)),
        many => Ok(execute_batch(many)),
    }
}

pub fn erc20_transfer(recipient: Address, amount: U256) -> Bytes {
    with_selector(ERC20_TRANSFER, &[Token::Address(recipient), Token::Uint(amount)])
}

pub fn create_wallet(wallet_id: H256, key: &PublicKey) -> Bytes {
    with_selector(
        CREATE_WALLET,
        &[
            Token::FixedBytes(wallet_id.as_bytes().to_vec()),
            Token::Uint(key.x),
            Token::Uint(key.y),
        ],
    )
}

pub fn wallets(wallet_id: H256) -> Bytes {
    with_selector(WALLETS, &[Token::FixedBytes(wallet_id.as_bytes().to_vec())])
}

pub fn get_signer() -> Bytes {
    with_selector(GET_SIGNER, &[])
}

pub fn get_nonce(sender: Address, key: U256) -> Bytes {
    with_selector(GET_NONCE, &[Token::Address(sender), Token::Uint(key)])
}

pub fn set_recovery_password(commitment: H256) -> Bytes {
    with_selector(
        SET_RECOVERY_PASSWORD,
        &[Token::FixedBytes(commitment.as_bytes().to_vec())],
    )
}

pub fn initiate_recovery(key_id: H256, new_key: &PublicKey, proof: H256) -> Bytes {
    with_selector(
        INITIATE_RECOVERY,
        &[
            Token::FixedBytes(key_id.as_bytes().to_vec()),
            Token::Uint(new_key.x),
            Token::Uint(new_key.y),
            Token::FixedBytes(proof.as_bytes().to_vec()),
        ],
    )
}

pub fn cancel_recovery() -> Bytes {
    with_selector(CANCEL_RECOVERY, &[])
}

pub fn reclaim() -> Bytes {
    with_selector(RECLAIM, &[])
}

pub fn get_recovery() -> Bytes {
    with_selector(GET_RECOVERY, &[])
}

//=============================================================================
// Return Data Decoders
//=============================================================================

pub fn decode_address(data: &[u8]) -> Result<Address> {
    match decode(&[ParamType::Address], data)?.as_slice() {
        [Token::Address(address)] => Ok(*address),
        _ => Err(SdkError::Encoding("expected address".into())),
    }
}

pub fn decode_uint(data: &[u8]) -> Result<U256> {
    match decode(&[ParamType::Uint(256)], data)?.as_slice() {
        [Token::Uint(value)] => Ok(*value),
        _ => Err(SdkError::Encoding("expected uint256".into())),
    }
}

pub fn decode_signer(data: &[u8]) -> Result<PublicKey> {
    match decode(&[ParamType::Uint(256), ParamType::Uint(256)], data)?.as_slice() {
        [Token::Uint(x), Token::Uint(y)] => Ok(PublicKey::new(*x, *y)),
        _ => Err(SdkError::Encoding("expected (uint256,uint256)".into())),
    }
}

/// Raw `getRecovery()` result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryTuple {
    pub status: u8,
    pub new_key: PublicKey,
    pub initiated_at: U256,
    pub completes_at: U256,
}

impl RecoveryTuple {
    pub fn encode(&self) -> Bytes {
        encode(&[
            Token::Uint(U256::from(self.status)),
            Token::Uint(self.new_key.x),
            Token::Uint(self.new_key.y),
            Token::Uint(self.initiated_at),
            Token::Uint(self.completes_at),
        ])
        .into()
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        let params = [
            ParamType::Uint(8),
            ParamType::Uint(256),
            ParamType::Uint(256),
            ParamType::Uint(256),
            ParamType::Uint(256),
        ];
        match decode(&params, data)?.as_slice() {
            [Token::Uint(status), Token::Uint(x), Token::Uint(y), Token::Uint(initiated_at), Token::Uint(completes_at)] => {
                Ok(Self {
                    status: status.low_u32() as u8,
                    new_key: PublicKey::new(*x, *y),
                    initiated_at: *initiated_at,
                    completes_at: *completes_at,
                })
            }
            _ => Err(SdkError::Encoding("unexpected getRecovery() layout".into())),
        }
    }
}

//=============================================================================
// WebAuthn Signature
//=============================================================================

/// On-chain signature layout checked by the wallet:
/// `abi.encode(bytes authenticatorData, string clientDataJSON, uint256
/// challengeIndex, uint256 typeIndex, uint256 r, uint256 s)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebAuthnSignature {
    pub authenticator_data: Vec<u8>,
    pub client_data_json: String,
    pub challenge_index: U256,
    pub type_index: U256,
    pub r: U256,
    pub s: U256,
}

impl WebAuthnSignature {
    /// Build from an assertion, normalising `s` to the lower half order.
    pub fn from_assertion(assertion: &Assertion) -> Result<Self> {
        let client_data_json = assertion.client_data_str()?.to_string();
        let challenge_index = find_challenge_index(&client_data_json)
            .ok_or_else(|| SdkError::Encoding("clientDataJSON has no challenge".into()))?;
        let type_index = find_type_index(&client_data_json)
            .ok_or_else(|| SdkError::Encoding("clientDataJSON is not webauthn.get".into()))?;
        let signature = utils::parse_signature(&assertion.signature)?;
        let (r, s) = utils::signature_scalars(&signature);

        Ok(Self {
            authenticator_data: assertion.authenticator_data.clone(),
            client_data_json,
            challenge_index: challenge_index.into(),
            type_index: type_index.into(),
            r,
            s,
        })
    }

    /// Correctly shaped placeholder for gas estimation
    pub fn dummy() -> Self {
        let client_data_json = crate::core::webauthn::client_data_json(
            crate::core::webauthn::AuthType::Get,
            &[0u8; 32],
            "https://localhost",
            false,
        );
        Self {
            authenticator_data: vec![0u8; 37],
            challenge_index: find_challenge_index(&client_data_json).unwrap_or_default().into(),
            type_index: find_type_index(&client_data_json).unwrap_or_default().into(),
            client_data_json,
            r: U256::MAX,
            s: U256::MAX >> 1,
        }
    }

    pub fn encode(&self) -> Bytes {
        encode(&[
            Token::Bytes(self.authenticator_data.clone()),
            Token::String(self.client_data_json.clone()),
            Token::Uint(self.challenge_index),
            Token::Uint(self.type_index),
            Token::Uint(self.r),
            Token::Uint(self.s),
        ])
        .into()
    }
}
