use async_trait::async_trait;
use openpass_state::Credential;
use p256::ecdsa::signature::Signer;
use p256::ecdsa::{Signature, SigningKey};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::core::constants::{FLAG_USER_PRESENT, FLAG_USER_VERIFIED};
use crate::core::webauthn::{build_authenticator_data, client_data_json, AuthDataParser, AuthType};
use crate::error::{Result, SdkError};
use crate::utils;

//=============================================================================
// Platform Boundary
//=============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserVerification {
    Required,
    Preferred,
    Discouraged,
}

#[derive(Debug, Clone)]
pub struct RegistrationOptions {
    pub rp_id: String,
    pub user_name: String,
    pub challenge: Vec<u8>,
    pub user_verification: UserVerification,
}

#[derive(Debug, Clone)]
pub struct AssertionOptions {
    pub rp_id: String,
    pub challenge: Vec<u8>,
    /// Empty means any discoverable credential
    pub allow_credentials: Vec<Vec<u8>>,
    pub user_verification: UserVerification,
}

#[derive(Debug, Clone)]
pub struct RegistrationResponse {
    pub credential_id: Vec<u8>,
    /// SEC1 uncompressed point or DER SubjectPublicKeyInfo
    pub public_key: Vec<u8>,
    pub authenticator_data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct AssertionResponse {
    pub credential_id: Vec<u8>,
    pub authenticator_data: Vec<u8>,
    pub client_data_json: Vec<u8>,
    /// DER encoded ECDSA signature
    pub signature: Vec<u8>,
}

/// Abstraction over a platform authenticator.
/// This allows the SDK to work with:
/// 1. Browser/OS passkey providers (through a host bridge)
/// 2. Local software keys (Backend/CLI/tests)
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn create_credential(
        &self,
        options: &RegistrationOptions,
    ) -> std::result::Result<RegistrationResponse, String>;

    async fn get_assertion(
        &self,
        options: &AssertionOptions,
    ) -> std::result::Result<AssertionResponse, String>;
}

//=============================================================================
// Credential Adapter
//=============================================================================

/// Signed assertion over an engine-chosen challenge. Not validated here.
#[derive(Debug, Clone)]
pub struct Assertion {
    pub authenticator_data: Vec<u8>,
    pub client_data_json: Vec<u8>,
    pub signature: Vec<u8>,
}

impl Assertion {
    /// `sha256(authenticatorData || sha256(clientDataJSON))`
    pub fn signed_digest(&self) -> [u8; 32] {
        let client_hash = Sha256::digest(&self.client_data_json);
        let mut hasher = Sha256::new();
        hasher.update(&self.authenticator_data);
        hasher.update(client_hash);
        hasher.finalize().into()
    }

    pub fn client_data_str(&self) -> Result<&str> {
        std::str::from_utf8(&self.client_data_json)
            .map_err(|e| SdkError::Encoding(format!("clientDataJSON is not utf-8: {e}")))
    }
}

#[derive(Debug, Clone)]
pub struct Authentication {
    pub credential_id: Vec<u8>,
    pub assertion: Assertion,
}

/// Wraps an [`Authenticator`] with the relying-party settings.
#[derive(Clone)]
pub struct CredentialAdapter {
    authenticator: Arc<dyn Authenticator>,
    rp_id: String,
}

impl CredentialAdapter {
    pub fn new(authenticator: Arc<dyn Authenticator>, rp_id: impl Into<String>) -> Self {
        Self {
            authenticator,
            rp_id: rp_id.into(),
        }
    }

    pub fn rp_id(&self) -> &str {
        &self.rp_id
    }

    /// Enroll a new passkey. Fails unless the authenticator reports both user
    /// presence and user verification.
    pub async fn register(&self, label: &str) -> Result<Credential> {
        let options = RegistrationOptions {
            rp_id: self.rp_id.clone(),
            user_name: label.to_string(),
            challenge: random_challenge(),
            user_verification: UserVerification::Required,
        };

        let response = self
            .authenticator
            .create_credential(&options)
            .await
            .map_err(SdkError::Credential)?;

        let auth_data = AuthDataParser::new(&response.authenticator_data)?;
        if !auth_data.is_user_present() {
            return Err(SdkError::Credential("user presence not asserted".into()));
        }
        if !auth_data.is_user_verified() {
            return Err(SdkError::Credential("user verification not performed".into()));
        }

        let public_key = utils::coordinates_from_public_key(&response.public_key)?;
        debug!(label, id_len = response.credential_id.len(), "credential registered");

        Ok(Credential::new(response.credential_id, public_key))
    }

    /// Ask the authenticator to sign `challenge`. `allow` restricts the
    /// credential; `None` lets the user pick any discoverable one.
    pub async fn authenticate(&self, challenge: &[u8], allow: Option<&[u8]>) -> Result<Authentication> {
        let options = AssertionOptions {
            rp_id: self.rp_id.clone(),
            challenge: challenge.to_vec(),
            allow_credentials: allow.map(|id| vec![id.to_vec()]).unwrap_or_default(),
            user_verification: UserVerification::Required,
        };

        let response = self
            .authenticator
            .get_assertion(&options)
            .await
            .map_err(SdkError::Credential)?;

        if let Some(expected) = allow {
            if response.credential_id != expected {
                return Err(SdkError::Credential(
                    "authenticator answered with a different credential".into(),
                ));
            }
        }

        Ok(Authentication {
            credential_id: response.credential_id,
            assertion: Assertion {
                authenticator_data: response.authenticator_data,
                client_data_json: response.client_data_json,
                signature: response.signature,
            },
        })
    }
}

pub fn random_challenge() -> Vec<u8> {
    let mut challenge = vec![0u8; crate::core::constants::CHALLENGE_LEN];
    OsRng.fill_bytes(&mut challenge);
    challenge
}

//=============================================================================
// Local Authenticator
//=============================================================================

struct LocalKeys {
    keys: HashMap<Vec<u8>, SigningKey>,
    // most recent first
    order: Vec<Vec<u8>>,
}

/// Software P-256 authenticator producing WebAuthn-shaped responses.
pub struct LocalAuthenticator {
    rp_id: String,
    origin: String,
    verify_user: bool,
    keys: Mutex<LocalKeys>,
    counter: AtomicU32,
}

impl LocalAuthenticator {
    pub fn new(rp_id: impl Into<String>, origin: impl Into<String>) -> Self {
        Self {
            rp_id: rp_id.into(),
            origin: origin.into(),
            verify_user: true,
            keys: Mutex::new(LocalKeys {
                keys: HashMap::new(),
                order: Vec::new(),
            }),
            counter: AtomicU32::new(0),
        }
    }

    /// When false the UV flag is left unset, as a platform completing without
    /// biometric verification would do.
    pub fn with_user_verification(mut self, verify_user: bool) -> Self {
        self.verify_user = verify_user;
        self
    }

    /// Register an existing key under `credential_id`
    pub fn import(&self, credential_id: Vec<u8>, key: SigningKey) -> Result<()> {
        let mut keys = self.lock()?;
        keys.order.retain(|id| id != &credential_id);
        keys.order.insert(0, credential_id.clone());
        keys.keys.insert(credential_id, key);
        Ok(())
    }

    /// Drop a credential, as deleting a passkey from the device would
    pub fn forget(&self, credential_id: &[u8]) -> Result<()> {
        let mut keys = self.lock()?;
        keys.keys.remove(credential_id);
        keys.order.retain(|id| id != credential_id);
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, LocalKeys>> {
        self.keys
            .lock()
            .map_err(|_| SdkError::Credential("authenticator key store poisoned".into()))
    }

    fn flags(&self) -> u8 {
        if self.verify_user {
            FLAG_USER_PRESENT | FLAG_USER_VERIFIED
        } else {
            FLAG_USER_PRESENT
        }
    }
}

#[async_trait]
impl Authenticator for LocalAuthenticator {
    async fn create_credential(
        &self,
        options: &RegistrationOptions,
    ) -> std::result::Result<RegistrationResponse, String> {
        if options.rp_id != self.rp_id {
            return Err(format!("rp id {} not allowed for this authenticator", options.rp_id));
        }

        let key = SigningKey::random(&mut OsRng);
        let mut credential_id = vec![0u8; 16];
        OsRng.fill_bytes(&mut credential_id);

        let public_key = key.verifying_key().to_encoded_point(false).as_bytes().to_vec();
        self.import(credential_id.clone(), key).map_err(|e| e.to_string())?;

        Ok(RegistrationResponse {
            credential_id,
            public_key,
            authenticator_data: build_authenticator_data(&self.rp_id, self.flags(), 0),
        })
    }

    async fn get_assertion(
        &self,
        options: &AssertionOptions,
    ) -> std::result::Result<AssertionResponse, String> {
        let (credential_id, key) = {
            let keys = self.lock().map_err(|e| e.to_string())?;
            let selected = if options.allow_credentials.is_empty() {
                keys.order.first().cloned()
            } else {
                options
                    .allow_credentials
                    .iter()
                    .find(|id| keys.keys.contains_key(*id))
                    .cloned()
            };
            let id = selected
                .ok_or_else(|| "no matching credential on this authenticator".to_string())?;
            let key = keys
                .keys
                .get(&id)
                .cloned()
                .ok_or_else(|| "credential key missing".to_string())?;
            (id, key)
        };

        let counter = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let authenticator_data = build_authenticator_data(&self.rp_id, self.flags(), counter);
        let client_data_json = client_data_json(AuthType::Get, &options.challenge, &self.origin, false);

        let mut message = authenticator_data.clone();
        message.extend_from_slice(&Sha256::digest(client_data_json.as_bytes()));
        let signature: Signature = key.sign(&message);

        Ok(AssertionResponse {
            credential_id,
            authenticator_data,
            client_data_json: client_data_json.into_bytes(),
            signature: signature.to_der().as_bytes().to_vec(),
        })
    }
}
