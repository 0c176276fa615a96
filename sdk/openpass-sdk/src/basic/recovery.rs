use ethers_core::abi::{encode, Token};
use ethers_core::types::{Address, Bytes, H256};
use ethers_core::utils::keccak256;
use openpass_state::{RecoveryState, RecoveryStatus, WalletRegistry};
use tracing::info;

use crate::advanced::calldata::{self, RecoveryTuple};
use crate::basic::session::Session;
use crate::core::constants::MIN_PASSWORD_LEN;
use crate::core::webauthn::base64url_encode;
use crate::error::{Result, SdkError};
use crate::types::{PasswordStrength, SubmissionReceipt};

//=============================================================================
// Recovery Password
//=============================================================================

/// Score a recovery password. One point per satisfied rule; only a full
/// score of 4 is valid.
pub fn validate_password_strength(password: &str) -> PasswordStrength {
    let rules = [
        (
            password.chars().count() >= MIN_PASSWORD_LEN,
            format!("Use at least {MIN_PASSWORD_LEN} characters"),
        ),
        (
            password.chars().any(char::is_uppercase) && password.chars().any(char::is_lowercase),
            "Mix uppercase and lowercase letters".to_string(),
        ),
        (
            password.chars().any(|c| c.is_ascii_digit()),
            "Add a number".to_string(),
        ),
        (
            password.chars().any(|c| !c.is_alphanumeric() && !c.is_whitespace()),
            "Add a symbol".to_string(),
        ),
    ];

    let score = rules.iter().filter(|(ok, _)| *ok).count() as u8;
    let feedback = rules
        .into_iter()
        .filter(|(ok, _)| !ok)
        .map(|(_, hint)| hint)
        .collect();

    PasswordStrength {
        score,
        feedback,
        is_valid: score == 4,
    }
}

/// Password and confirmation must be identical and strong
pub fn check_new_password(password: &str, confirmation: &str) -> Result<()> {
    if password != confirmation {
        return Err(SdkError::RecoveryState("passwords do not match".into()));
    }
    let strength = validate_password_strength(password);
    if !strength.is_valid {
        return Err(SdkError::RecoveryState(format!(
            "password too weak: {}",
            strength.feedback.join(", ")
        )));
    }
    Ok(())
}

/// `keccak256(password)`, revealed when initiating a recovery
pub fn password_proof(password: &str) -> H256 {
    H256(keccak256(password.as_bytes()))
}

/// `keccak256(abi.encode(wallet, keccak256(password)))`, stored by the wallet
pub fn password_commitment(wallet: Address, password: &str) -> H256 {
    let proof = password_proof(password);
    H256(keccak256(encode(&[
        Token::Address(wallet),
        Token::FixedBytes(proof.as_bytes().to_vec()),
    ])))
}

//=============================================================================
// State Machine
//=============================================================================

/// Time-locked recovery of a wallet by a new passkey.
///
/// The wallet contract is the only source of truth; every transition reads it
/// first and refuses before signing when the transition is illegal.
pub struct RecoveryManager<'a> {
    session: &'a Session,
    registry: Option<&'a dyn WalletRegistry>,
}

impl<'a> RecoveryManager<'a> {
    pub fn new(session: &'a Session) -> Self {
        Self {
            session,
            registry: None,
        }
    }

    /// Update the registry's signer after a successful reclaim
    pub fn with_registry(mut self, registry: &'a dyn WalletRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    fn wallet(&self) -> Address {
        self.session.account().address
    }

    /// Read `getRecovery()` and the latest block time; `Ready` is derived here.
    pub async fn check_status(&self) -> Result<RecoveryState> {
        let chain = self.session.chain();
        let (raw, now) = tokio::join!(
            chain.call(self.wallet(), calldata::get_recovery()),
            chain.block_timestamp()
        );
        let raw = raw.map_err(SdkError::network)?;
        let now = now.map_err(SdkError::network)?;

        // undeployed wallets have no recovery storage
        if raw.is_empty() {
            return Ok(RecoveryState::none(self.wallet()));
        }

        let tuple = RecoveryTuple::decode(&raw)?;
        Ok(RecoveryState::from_contract(
            self.wallet(),
            tuple.status,
            tuple.new_key.x,
            tuple.new_key.y,
            tuple.initiated_at,
            tuple.completes_at,
            now,
        )?)
    }

    /// Owner sets (or replaces) the recovery password commitment.
    pub async fn set_recovery_password(&self, password: &str, confirmation: &str) -> Result<SubmissionReceipt> {
        check_new_password(password, confirmation)?;
        let commitment = password_commitment(self.wallet(), password);
        self.submit(calldata::set_recovery_password(commitment)).await
    }

    /// Start a recovery cycle naming this session's passkey as the new signer.
    pub async fn initiate(&self, password: &str) -> Result<SubmissionReceipt> {
        let state = self.check_status().await?;
        if !state.status.can_initiate() {
            return Err(illegal("initiate", state.status));
        }

        let account = self.session.account();
        let data = calldata::initiate_recovery(account.wallet_id, account.signer(), password_proof(password));
        let receipt = self.submit(data).await?;
        info!(wallet = %self.wallet(), "recovery initiated");
        Ok(receipt)
    }

    /// Abort a pending or ready recovery. Only the current signer may cancel.
    pub async fn cancel(&self) -> Result<SubmissionReceipt> {
        let state = self.check_status().await?;
        if !state.status.can_cancel() {
            return Err(illegal("cancel", state.status));
        }

        let on_chain = self.session.signer_on_chain().await?;
        if on_chain != *self.session.account().signer() {
            return Err(SdkError::RecoveryState(
                "only the current signer may cancel a recovery".into(),
            ));
        }

        let receipt = self.submit(calldata::cancel_recovery()).await?;
        info!(wallet = %self.wallet(), "recovery cancelled");
        Ok(receipt)
    }

    /// Complete a recovery whose timelock has elapsed, rebinding the wallet to
    /// this session's passkey.
    pub async fn reclaim(&self) -> Result<SubmissionReceipt> {
        let state = self.check_status().await?;
        if !state.status.can_reclaim() {
            return Err(illegal("reclaim", state.status));
        }

        let account = self.session.account();
        if state.new_signer.as_ref() != Some(account.signer()) {
            return Err(SdkError::RecoveryState(
                "this passkey is not the pending recovery key".into(),
            ));
        }

        let receipt = self.submit(calldata::reclaim()).await?;

        if let Some(registry) = self.registry {
            registry
                .update_signer(
                    self.wallet(),
                    self.session.network().chain_id,
                    *account.signer(),
                    base64url_encode(&account.credential.id),
                )
                .await?;
        }

        info!(wallet = %self.wallet(), "wallet reclaimed");
        Ok(receipt)
    }

    // recovery entry points are onlySelf: the EntryPoint calls them on the
    // wallet directly, never through execute
    async fn submit(&self, data: Bytes) -> Result<SubmissionReceipt> {
        let engine = self.session.engine();
        let quote = engine.quote_call_data(data.clone()).await?;
        engine.submit_call_data(data, &quote).await
    }
}

fn illegal(event: &str, status: RecoveryStatus) -> SdkError {
    SdkError::RecoveryState(format!("cannot {event} a recovery in state {status:?}"))
}

impl Session {
    pub fn recovery(&self) -> RecoveryManager<'_> {
        RecoveryManager::new(self)
    }
}
