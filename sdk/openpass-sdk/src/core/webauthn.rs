use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::core::constants::{AUTH_DATA_MIN_LEN, FLAG_USER_PRESENT, FLAG_USER_VERIFIED};
use crate::error::{Result, SdkError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthType {
    Create,
    Get,
}

impl AuthType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthType::Create => "webauthn.create",
            AuthType::Get => "webauthn.get",
        }
    }
}

/// Base64URL without padding, the encoding WebAuthn uses for challenges and ids
pub fn base64url_encode(data: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(data)
}

pub fn base64url_decode(data: &str) -> Result<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(data.trim_end_matches('='))
        .map_err(|e| SdkError::Encoding(format!("invalid base64url: {e}")))
}

/// Builds the clientDataJSON an authenticator signs over.
///
/// Field order follows what browsers emit so the byte offsets located by
/// [`find_type_index`] and [`find_challenge_index`] stay stable.
pub fn client_data_json(auth_type: AuthType, challenge: &[u8], origin: &str, cross_origin: bool) -> String {
    format!(
        "{{\"type\":\"{}\",\"challenge\":\"{}\",\"origin\":\"{}\",\"crossOrigin\":{}}}",
        auth_type.as_str(),
        base64url_encode(challenge),
        origin,
        cross_origin
    )
}

/// Parsed clientDataJSON
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectedClientData {
    #[serde(rename = "type")]
    pub kind: String,
    pub challenge: String,
    pub origin: String,
    #[serde(default)]
    pub cross_origin: bool,
}

impl CollectedClientData {
    pub fn parse(json: &[u8]) -> Result<Self> {
        serde_json::from_slice(json)
            .map_err(|e| SdkError::Encoding(format!("invalid clientDataJSON: {e}")))
    }

    pub fn challenge_bytes(&self) -> Result<Vec<u8>> {
        base64url_decode(&self.challenge)
    }
}

/// Offset of `"type":"webauthn.get"` in the client data
pub fn find_type_index(client_data_json: &str) -> Option<usize> {
    client_data_json.find("\"type\":\"webauthn.get\"")
}

/// Offset of `"challenge":"` in the client data
pub fn find_challenge_index(client_data_json: &str) -> Option<usize> {
    client_data_json.find("\"challenge\":\"")
}

/// `rpIdHash || flags || signCount`, without attested credential data
pub fn build_authenticator_data(rp_id: &str, flags: u8, counter: u32) -> Vec<u8> {
    let mut data = Vec::with_capacity(AUTH_DATA_MIN_LEN);
    data.extend_from_slice(&Sha256::digest(rp_id.as_bytes()));
    data.push(flags);
    data.extend_from_slice(&counter.to_be_bytes());
    data
}

/// Parser for WebAuthn authenticator data
pub struct AuthDataParser<'a> {
    data: &'a [u8],
}

impl<'a> AuthDataParser<'a> {
    pub fn new(data: &'a [u8]) -> Result<Self> {
        if data.len() < AUTH_DATA_MIN_LEN {
            return Err(SdkError::Credential(format!(
                "authenticator data too short: {} bytes",
                data.len()
            )));
        }
        Ok(Self { data })
    }

    pub fn rp_id_hash(&self) -> &'a [u8] {
        &self.data[0..32]
    }

    pub fn flags(&self) -> u8 {
        self.data[32]
    }

    pub fn is_user_present(&self) -> bool {
        self.flags() & FLAG_USER_PRESENT != 0
    }

    pub fn is_user_verified(&self) -> bool {
        self.flags() & FLAG_USER_VERIFIED != 0
    }

    pub fn counter(&self) -> u32 {
        let mut counter = [0u8; 4];
        counter.copy_from_slice(&self.data[33..37]);
        u32::from_be_bytes(counter)
    }

    pub fn matches_rp_id(&self, rp_id: &str) -> bool {
        self.rp_id_hash() == Sha256::digest(rp_id.as_bytes()).as_slice()
    }
}
