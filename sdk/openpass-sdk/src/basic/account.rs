use ethers_core::types::{Address, H256};
use openpass_state::{Credential, NetworkConfig, PublicKey, Wallet, WalletRegistry};
use tracing::info;

use crate::advanced::calldata;
use crate::core::connection::ChainConnection;
use crate::core::signer::{random_challenge, CredentialAdapter};
use crate::core::webauthn::base64url_encode;
use crate::error::{Result, SdkError};
use crate::utils;

/// A passkey-controlled smart account.
#[derive(Debug, Clone)]
pub struct SmartAccount {
    /// CREATE2 address; valid before deployment
    pub address: Address,

    /// Factory registry key of `credential`
    pub wallet_id: H256,

    /// Credential that signs for this account in the current session
    pub credential: Credential,
}

impl SmartAccount {
    /// Create path: the address is derived from the credential's key
    pub fn derive(network: &NetworkConfig, credential: Credential) -> Self {
        Self {
            address: utils::derive_address(network, &credential.public_key),
            wallet_id: utils::wallet_id(&credential.id),
            credential,
        }
    }

    /// Login/recovery path: the address is given explicitly
    pub fn bind(address: Address, credential: Credential) -> Self {
        Self {
            address,
            wallet_id: utils::wallet_id(&credential.id),
            credential,
        }
    }

    pub fn signer(&self) -> &PublicKey {
        &self.credential.public_key
    }

    /// True when `address` is the counterfactual address of this credential,
    /// i.e. the factory can deploy it with this key.
    pub fn is_counterfactual(&self, network: &NetworkConfig) -> bool {
        utils::derive_address(network, &self.credential.public_key) == self.address
    }

    /// Registry document for this account
    pub fn to_wallet(&self, chain_id: u64) -> Wallet {
        Wallet {
            address: self.address,
            x: self.credential.public_key.x,
            y: self.credential.public_key.y,
            credential_id: base64url_encode(&self.credential.id),
            chain_id,
        }
    }
}

/// Account creation and login flows.
pub struct AccountCreator<'a> {
    adapter: &'a CredentialAdapter,
    network: &'a NetworkConfig,
    registry: Option<&'a dyn WalletRegistry>,
}

impl<'a> AccountCreator<'a> {
    pub fn new(adapter: &'a CredentialAdapter, network: &'a NetworkConfig) -> Self {
        Self {
            adapter,
            network,
            registry: None,
        }
    }

    /// Record created wallets in `registry`
    pub fn with_registry(mut self, registry: &'a dyn WalletRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Register a passkey and derive its account. Nothing is deployed; the
    /// first user operation carries the factory call.
    pub async fn create(&self, label: &str) -> Result<(SmartAccount, Wallet)> {
        let credential = self.adapter.register(label).await?;
        let account = SmartAccount::derive(self.network, credential);
        let wallet = account.to_wallet(self.network.chain_id);

        if let Some(registry) = self.registry {
            registry.create(wallet.clone()).await?;
        }

        info!(address = %account.address, chain_id = self.network.chain_id, "account created");
        Ok((account, wallet))
    }

    /// Authenticate with any discoverable passkey and resolve its account
    /// through the factory registry.
    pub async fn login(&self, chain: &dyn ChainConnection) -> Result<SmartAccount> {
        let challenge = random_challenge();
        let auth = self.adapter.authenticate(&challenge, None).await?;
        let wallet_id = utils::wallet_id(&auth.credential_id);

        let raw = chain
            .call(self.network.factory, calldata::wallets(wallet_id))
            .await
            .map_err(SdkError::network)?;
        let address = calldata::decode_address(&raw)?;
        if address.is_zero() {
            return Err(SdkError::Credential("no wallet registered for this passkey".into()));
        }

        let raw = chain
            .call(address, calldata::get_signer())
            .await
            .map_err(SdkError::network)?;
        let registered = calldata::decode_signer(&raw)?;

        let digest = auth.assertion.signed_digest();
        let key = utils::recover_public_key(&digest, &auth.assertion.signature, &registered)?;

        info!(%address, "logged in");
        Ok(SmartAccount::bind(address, Credential::new(auth.credential_id, key)))
    }
}
