use ethers_core::types::{Bytes, H256, U256};
use openpass_state::{FeeModel, GasLimits, NetworkConfig, PublicKey, StateError};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::advanced::calldata::{self, WebAuthnSignature};
use crate::advanced::user_operation::UserOperation;
use crate::basic::account::SmartAccount;
use crate::core::connection::{ChainConnection, RelayConnection};
use crate::core::constants::DEFAULT_NONCE_KEY;
use crate::core::signer::CredentialAdapter;
use crate::error::{Result, SdkError};
use crate::types::{Call, OperationOutcome};

/// A live account bound to a chain handle and a relay handle.
///
/// One session per account; callers must not run concurrent submissions on
/// the same session since nonces are assigned sequentially on-chain.
pub struct Session {
    account: SmartAccount,
    network: NetworkConfig,
    chain: Arc<dyn ChainConnection>,
    relay: Arc<dyn RelayConnection>,
    adapter: CredentialAdapter,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("address", &self.account.address)
            .field("wallet_id", &self.account.wallet_id)
            .field("chain_id", &self.network.chain_id)
            .field("entry_point", &self.network.entry_point)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Verify both network handles and bind them to `account`.
    ///
    /// The chain must report the configured chain id and the relay must list
    /// the configured EntryPoint; otherwise no session is returned.
    pub async fn connect(
        account: SmartAccount,
        network: NetworkConfig,
        chain: Arc<dyn ChainConnection>,
        relay: Arc<dyn RelayConnection>,
        adapter: CredentialAdapter,
    ) -> Result<Self> {
        let (chain_id, entry_points) = tokio::join!(chain.chain_id(), relay.supported_entry_points());

        let chain_id = chain_id.map_err(|e| SdkError::Network(format!("chain unreachable: {e}")))?;
        if chain_id != network.chain_id {
            return Err(SdkError::Network(format!(
                "chain id {chain_id} does not match configured {}",
                network.chain_id
            )));
        }

        let entry_points =
            entry_points.map_err(|e| SdkError::Network(format!("relay unavailable: {e}")))?;
        if !entry_points.contains(&network.entry_point) {
            return Err(SdkError::Network(format!(
                "relay does not support EntryPoint {:#x}",
                network.entry_point
            )));
        }

        debug!(address = %account.address, chain_id, "session connected");
        Ok(Self {
            account,
            network,
            chain,
            relay,
            adapter,
        })
    }

    pub fn account(&self) -> &SmartAccount {
        &self.account
    }

    pub fn network(&self) -> &NetworkConfig {
        &self.network
    }

    pub fn chain(&self) -> &dyn ChainConnection {
        self.chain.as_ref()
    }

    pub fn relay(&self) -> &dyn RelayConnection {
        self.relay.as_ref()
    }

    //=========================================================================
    // Chain Reads
    //=========================================================================

    pub async fn is_deployed(&self) -> Result<bool> {
        let code = self
            .chain
            .get_code(self.account.address)
            .await
            .map_err(SdkError::network)?;
        Ok(!code.is_empty())
    }

    /// EntryPoint `getNonce(sender, 0)`
    pub async fn nonce(&self) -> Result<U256> {
        let raw = self
            .chain
            .call(
                self.network.entry_point,
                calldata::get_nonce(self.account.address, U256::from(DEFAULT_NONCE_KEY)),
            )
            .await
            .map_err(SdkError::network)?;
        calldata::decode_uint(&raw)
    }

    pub async fn native_balance(&self) -> Result<U256> {
        self.chain
            .get_balance(self.account.address)
            .await
            .map_err(SdkError::network)
    }

    /// Signer currently registered in the wallet contract
    pub async fn signer_on_chain(&self) -> Result<PublicKey> {
        let raw = self
            .chain
            .call(self.account.address, calldata::get_signer())
            .await
            .map_err(SdkError::network)?;
        calldata::decode_signer(&raw)
    }

    /// Current fee market. The priority-fee model is used whenever the latest
    /// block has a base fee and the node answers the priority fee query;
    /// otherwise the legacy gas price.
    pub async fn current_fee_market(&self) -> Result<FeeModel> {
        let data = self.chain.fee_data().await.map_err(SdkError::network)?;

        let fee = match (data.base_fee_per_gas, data.max_priority_fee_per_gas) {
            (Some(base), Some(priority)) => FeeModel::Dynamic {
                max_fee_per_gas: base
                    .checked_mul(U256::from(2u64))
                    .and_then(|fee| fee.checked_add(priority))
                    .ok_or(StateError::FeeOverflow)?,
                max_priority_fee_per_gas: priority,
            },
            _ => FeeModel::Legacy {
                gas_price: data.gas_price,
            },
        };
        Ok(fee)
    }

    //=========================================================================
    // Relay
    //=========================================================================

    /// Gas limits for executing `calls`, as estimated by the relay
    pub async fn estimate(&self, calls: &[Call]) -> Result<GasLimits> {
        self.estimate_call_data(calldata::encode_calls(calls)?).await
    }

    /// Gas limits for an operation whose callData is `call_data` verbatim
    pub async fn estimate_call_data(&self, call_data: Bytes) -> Result<GasLimits> {
        let op = self
            .build_operation(call_data)
            .await?
            .with_signature(WebAuthnSignature::dummy().encode());
        Ok(self
            .relay
            .estimate_user_operation_gas(&op, self.network.entry_point)
            .await?)
    }

    /// Tri-state outcome of a broadcast operation
    pub async fn operation_outcome(&self, user_op_hash: H256) -> Result<OperationOutcome> {
        let receipt = self
            .relay
            .get_user_operation_receipt(user_op_hash)
            .await
            .map_err(SdkError::network)?;
        Ok(receipt.into())
    }

    //=========================================================================
    // User Operations
    //=========================================================================

    /// Unsigned operation for `calls` with the current nonce. Undeployed
    /// accounts get the factory call attached.
    pub async fn build_user_operation(&self, calls: &[Call]) -> Result<UserOperation> {
        self.build_operation(calldata::encode_calls(calls)?).await
    }

    /// Unsigned operation carrying `call_data` as is. Calls the wallet makes
    /// on itself (recovery) are built here so the EntryPoint invokes them
    /// directly rather than through `execute`.
    pub async fn build_operation(&self, call_data: Bytes) -> Result<UserOperation> {
        let (nonce, deployed) = tokio::try_join!(self.nonce(), self.is_deployed())?;

        let op = UserOperation::new(self.account.address, nonce, call_data);
        if deployed {
            return Ok(op);
        }

        if !self.account.is_counterfactual(&self.network) {
            return Err(SdkError::Credential(format!(
                "account {:#x} is not deployed and cannot be deployed with this passkey",
                self.account.address
            )));
        }
        Ok(op.with_factory(
            self.network.factory,
            calldata::create_wallet(self.account.wallet_id, self.account.signer()),
        ))
    }

    /// Ask the passkey to sign the operation hash and attach the encoded
    /// WebAuthn signature.
    pub async fn sign_user_operation(&self, op: UserOperation) -> Result<UserOperation> {
        let hash = op.hash(self.network.entry_point, self.network.chain_id);
        let auth = self
            .adapter
            .authenticate(hash.as_bytes(), Some(self.account.credential.id.as_slice()))
            .await?;
        let signature = WebAuthnSignature::from_assertion(&auth.assertion)?;
        Ok(op.with_signature(signature.encode()))
    }

    /// Broadcast a signed operation once. A relay rejection surfaces as
    /// [`SdkError::Submission`] and means the operation was never broadcast.
    pub async fn send_user_operation(&self, op: &UserOperation) -> Result<H256> {
        let expected = op.hash(self.network.entry_point, self.network.chain_id);
        let hash = self
            .relay
            .send_user_operation(op, self.network.entry_point)
            .await?;
        if hash != expected {
            warn!(relay = ?hash, local = ?expected, "relay returned a different user operation hash");
        }
        Ok(hash)
    }
}
