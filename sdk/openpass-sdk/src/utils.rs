use ecdsa::RecoveryId;
use ethers_core::abi::{encode, Token};
use ethers_core::types::{Address, H256, U256};
use ethers_core::utils::{get_create2_address_from_hash, hash_message, keccak256};
use openpass_state::{NetworkConfig, PublicKey};
use p256::ecdsa::{Signature, VerifyingKey};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::pkcs8::DecodePublicKey;

use crate::core::webauthn::base64url_encode;
use crate::error::{Result, SdkError};

//=============================================================================
// Public Key Parsing
//=============================================================================

/// Extract affine coordinates from a SEC1 uncompressed point (`0x04 || x || y`)
/// or a DER SubjectPublicKeyInfo. Fails if the point is not on the curve.
pub fn coordinates_from_public_key(raw: &[u8]) -> Result<PublicKey> {
    let key = if raw.first() == Some(&0x04) && raw.len() == 65 {
        VerifyingKey::from_sec1_bytes(raw)
            .map_err(|_| SdkError::Credential("public key is not a point on P-256".into()))?
    } else {
        VerifyingKey::from_public_key_der(raw)
            .map_err(|e| SdkError::Credential(format!("unsupported public key encoding: {e}")))?
    };
    Ok(public_key_of(&key))
}

pub fn public_key_of(key: &VerifyingKey) -> PublicKey {
    let point = key.to_encoded_point(false);
    // uncompressed points always carry both coordinates
    let x = point.x().map(|x| U256::from_big_endian(x)).unwrap_or_default();
    let y = point.y().map(|y| U256::from_big_endian(y)).unwrap_or_default();
    PublicKey::new(x, y)
}

pub fn verifying_key(key: &PublicKey) -> Result<VerifyingKey> {
    VerifyingKey::from_sec1_bytes(&key.to_uncompressed())
        .map_err(|_| SdkError::Credential("public key is not a point on P-256".into()))
}

//=============================================================================
// Signatures
//=============================================================================

/// Parse a DER (or raw 64-byte `r || s`) ECDSA signature
pub fn parse_signature(signature: &[u8]) -> Result<Signature> {
    let parsed = if signature.len() == 64 {
        Signature::from_slice(signature)
    } else {
        Signature::from_der(signature)
    };
    parsed.map_err(|e| SdkError::Credential(format!("malformed signature: {e}")))
}

/// `(r, s)` with `s` folded into the lower half of the curve order
pub fn signature_scalars(signature: &Signature) -> (U256, U256) {
    let normalized = signature.normalize_s().unwrap_or(*signature);
    let (r, s) = normalized.split_bytes();
    (U256::from_big_endian(&r), U256::from_big_endian(&s))
}

/// Both candidate keys that could have produced `signature` over `digest`.
pub fn recovery_candidates(digest: &[u8; 32], signature: &[u8]) -> Result<Vec<PublicKey>> {
    let signature = parse_signature(signature)?;
    let candidates: Vec<PublicKey> = [false, true]
        .into_iter()
        .filter_map(|odd| {
            VerifyingKey::recover_from_prehash(digest, &signature, RecoveryId::new(odd, false)).ok()
        })
        .map(|key| public_key_of(&key))
        .collect();

    if candidates.is_empty() {
        return Err(SdkError::Credential("no public key recoverable from signature".into()));
    }
    Ok(candidates)
}

/// Recover the signer of `digest` and disambiguate the two parities against
/// the key registered on-chain for that credential.
pub fn recover_public_key(digest: &[u8; 32], signature: &[u8], expected: &PublicKey) -> Result<PublicKey> {
    recovery_candidates(digest, signature)?
        .into_iter()
        .find(|candidate| candidate == expected)
        .ok_or_else(|| {
            SdkError::Credential("recovered key does not match the registered signer".into())
        })
}

//=============================================================================
// Address Derivation
//=============================================================================

/// `keccak256(abi.encode(uint256 x, uint256 y))`
pub fn derive_salt(key: &PublicKey) -> H256 {
    H256(keccak256(encode(&[Token::Uint(key.x), Token::Uint(key.y)])))
}

/// CREATE2 address the factory deploys the wallet for `key` at.
pub fn derive_address(network: &NetworkConfig, key: &PublicKey) -> Address {
    get_create2_address_from_hash(
        network.factory,
        derive_salt(key).as_bytes(),
        network.wallet_init_code_hash.as_bytes(),
    )
}

/// Key of the factory's `wallets(bytes32)` registry: EIP-191 hash of the
/// base64url credential id.
pub fn wallet_id(credential_id: &[u8]) -> H256 {
    hash_message(base64url_encode(credential_id))
}
