//! In-memory chain, bundler and log source for end-to-end tests.
//!
//! `MockNetwork` executes user operations the way the EntryPoint and the
//! wallet contracts would: it checks nonces, deploys through the factory,
//! verifies the WebAuthn P-256 signature against the signer the wallet
//! expects, charges gas, runs the decoded wallet call and emits a
//! `UserOperationEvent` log.

use std::collections::HashMap;
use std::error::Error;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use ethers_core::abi::{decode, encode, ParamType, Token};
use ethers_core::types::{Address, Bytes, Log, H256, U256};
use ethers_core::utils::{id, keccak256};
use openpass_indexer::{IndexerError, LogSource, UserOperationEvent};
use openpass_sdk::advanced::calldata::{self, RecoveryTuple};
use openpass_sdk::advanced::user_operation::UserOperation;
use openpass_sdk::core::signer::Assertion;
use openpass_sdk::core::webauthn::{AuthDataParser, CollectedClientData};
use openpass_sdk::rpc::RpcError;
use openpass_sdk::types::UserOperationReceipt;
use openpass_sdk::{utils, ChainConnection, FeeData, RelayConnection, RelayError};
use openpass_state::recovery::DEFAULT_TIMELOCK_SECS;
use openpass_state::{GasLimits, NetworkConfig, PublicKey};
use p256::ecdsa::signature::hazmat::PrehashVerifier;
use p256::ecdsa::Signature;


use contract::WalletCall;

// Export dependencies for convenience in tests
pub use openpass_indexer;
pub use openpass_sdk;
pub use openpass_state;

pub const GENESIS_TIMESTAMP: u64 = 1_700_000_000;
pub const BLOCK_TIME_SECS: u64 = 12;

// getRecovery() status codes
const STATUS_PENDING: u8 = 1;
const STATUS_RECLAIMED: u8 = 2;
const STATUS_CANCELLED: u8 = 3;

type ChainResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

#[derive(Debug, Clone)]
struct WalletContract {
    signer: PublicKey,
    commitment: Option<H256>,
    recovery: RecoveryTuple,
    recovery_key_id: H256,
}

impl WalletContract {
    fn new(signer: PublicKey) -> Self {
        Self {
            signer,
            commitment: None,
            recovery: RecoveryTuple {
                status: 0,
                new_key: PublicKey::new(U256::zero(), U256::zero()),
                initiated_at: U256::zero(),
                completes_at: U256::zero(),
            },
            recovery_key_id: H256::zero(),
        }
    }

    /// Key the wallet checks the signature of `call` against
    fn expected_signer(&self, call: &WalletCall) -> PublicKey {
        match call {
            WalletCall::InitiateRecovery { new_key, .. } => *new_key,
            WalletCall::Reclaim if self.recovery.status == STATUS_PENDING => self.recovery.new_key,
            _ => self.signer,
        }
    }
}

/// Balances and contract storage. Cloned for each call so a revert leaves it
/// untouched.
#[derive(Debug, Clone, Default)]
struct Ledger {
    balances: HashMap<Address, U256>,
    tokens: HashMap<(Address, Address), U256>,
    wallets: HashMap<Address, WalletContract>,
    // factory wallets(bytes32)
    registry: HashMap<H256, Address>,
}

impl Ledger {
    fn balance(&self, address: Address) -> U256 {
        self.balances.get(&address).copied().unwrap_or_default()
    }

    fn debit(&mut self, address: Address, amount: U256) -> Result<(), String> {
        let balance = self.balance(address);
        let rest = balance
            .checked_sub(amount)
            .ok_or_else(|| format!("insufficient balance: {balance} < {amount}"))?;
        self.balances.insert(address, rest);
        Ok(())
    }

    fn credit(&mut self, address: Address, amount: U256) {
        let balance = self.balance(address).saturating_add(amount);
        self.balances.insert(address, balance);
    }

    fn wallet_mut(&mut self, address: Address) -> Result<&mut WalletContract, String> {
        self.wallets
            .get_mut(&address)
            .ok_or_else(|| "call to an undeployed wallet".to_string())
    }

    fn run_call(&mut self, sender: Address, call: &openpass_sdk::Call, now: u64) -> Result<(), String> {
        if !call.value.is_zero() {
            self.debit(sender, call.value)?;
            self.credit(call.to, call.value);
        }
        // execute(self, ...) reaches the wallet's own entry points
        if call.to == sender && !call.data.is_empty() {
            let inner = WalletCall::decode(&call.data)?;
            return self.apply(sender, inner, now);
        }
        if let Some((recipient, amount)) = contract::decode_erc20_transfer(&call.data) {
            let from = self.tokens.entry((call.to, sender)).or_default();
            *from = from
                .checked_sub(amount)
                .ok_or_else(|| "ERC20: transfer amount exceeds balance".to_string())?;
            let to = self.tokens.entry((call.to, recipient)).or_default();
            *to = to.saturating_add(amount);
        }
        Ok(())
    }

    fn apply(&mut self, sender: Address, call: WalletCall, now: u64) -> Result<(), String> {
        match call {
            WalletCall::Execute(call) => self.run_call(sender, &call, now),
            WalletCall::ExecuteBatch(calls) => calls
                .iter()
                .try_for_each(|call| self.run_call(sender, call, now)),
            WalletCall::SetRecoveryPassword(commitment) => {
                self.wallet_mut(sender)?.commitment = Some(commitment);
                Ok(())
            }
            WalletCall::InitiateRecovery {
                key_id,
                new_key,
                proof,
            } => {
                let expected = H256(keccak256(encode(&[
                    Token::Address(sender),
                    Token::FixedBytes(proof.as_bytes().to_vec()),
                ])));
                let wallet = self.wallet_mut(sender)?;
                if wallet.recovery.status == STATUS_PENDING {
                    return Err("recovery already pending".into());
                }
                if wallet.commitment != Some(expected) {
                    return Err("invalid recovery password".into());
                }
                wallet.recovery = RecoveryTuple {
                    status: STATUS_PENDING,
                    new_key,
                    initiated_at: U256::from(now),
                    completes_at: U256::from(now + DEFAULT_TIMELOCK_SECS),
                };
                wallet.recovery_key_id = key_id;
                Ok(())
            }
            WalletCall::CancelRecovery => {
                let wallet = self.wallet_mut(sender)?;
                if wallet.recovery.status != STATUS_PENDING {
                    return Err("no pending recovery".into());
                }
                wallet.recovery.status = STATUS_CANCELLED;
                Ok(())
            }
            WalletCall::Reclaim => {
                let wallet = self.wallet_mut(sender)?;
                if wallet.recovery.status != STATUS_PENDING {
                    return Err("no pending recovery".into());
                }
                if U256::from(now) < wallet.recovery.completes_at {
                    return Err("recovery timelock active".into());
                }
                wallet.signer = wallet.recovery.new_key;
                wallet.recovery.status = STATUS_RECLAIMED;
                let key_id = wallet.recovery_key_id;
                self.registry.insert(key_id, sender);
                Ok(())
            }
        }
    }
}

struct ChainState {
    block_number: u64,
    timestamp: u64,
    ledger: Ledger,
    nonces: HashMap<Address, U256>,
    receipts: HashMap<H256, UserOperationReceipt>,
    // callData of every included operation
    call_data: HashMap<H256, Bytes>,
    events: HashMap<H256, UserOperationEvent>,
    logs: Vec<Log>,
    fee: FeeData,
    gas: GasLimits,
    rejection: Option<String>,
    offline: bool,
    submissions: usize,
}

impl ChainState {
    fn mine(&mut self, seconds: u64) {
        self.block_number += 1;
        self.timestamp += seconds;
    }

    fn nonce(&self, sender: Address) -> U256 {
        self.nonces.get(&sender).copied().unwrap_or_default()
    }

    /// EntryPoint `handleOps` for a single operation, mined in its own block.
    fn execute(
        &mut self,
        network: &NetworkConfig,
        op: &UserOperation,
        hash: H256,
    ) -> Result<UserOperationReceipt, RelayError> {
        if op.nonce != self.nonce(op.sender) {
            return Err(rejected("AA25 invalid account nonce"));
        }

        // validation
        let deployed = self.ledger.wallets.get(&op.sender).cloned();
        let (wallet, deployment) = match (deployed, &op.factory, &op.factory_data) {
            (Some(_), Some(_), _) => return Err(rejected("AA10 sender already constructed")),
            (Some(wallet), None, _) => (wallet, None),
            (None, Some(factory), Some(data)) if *factory == network.factory => {
                let (wallet_id, key) = contract::decode_create_wallet(data)
                    .map_err(|e| rejected(format!("AA13 initCode failed: {e}")))?;
                if utils::derive_address(network, &key) != op.sender {
                    return Err(rejected("AA14 initCode must return sender"));
                }
                (WalletContract::new(key), Some(wallet_id))
            }
            (None, _, _) => return Err(rejected("AA20 account not deployed")),
        };

        let call = WalletCall::decode(&op.call_data)
            .map_err(|e| rejected(format!("AA23 reverted: {e}")))?;
        verify_signature(op, hash, &wallet.expected_signer(&call))?;

        let gas_used = op
            .gas_limits()
            .total()
            .map_err(|e| rejected(e.to_string()))?;
        let gas_cost = gas_used
            .checked_mul(op.max_fee_per_gas)
            .ok_or_else(|| rejected("gas cost overflow"))?;
        if self.ledger.balance(op.sender) < gas_cost {
            return Err(rejected("AA21 didn't pay prefund"));
        }

        // inclusion
        if let Some(wallet_id) = deployment {
            self.ledger.wallets.insert(op.sender, wallet);
            self.ledger.registry.insert(wallet_id, op.sender);
        }
        self.ledger
            .debit(op.sender, gas_cost)
            .map_err(rejected)?;
        self.nonces.insert(op.sender, op.nonce + 1);
        self.mine(BLOCK_TIME_SECS);

        // execution
        let mut scratch = self.ledger.clone();
        let reason = match scratch.apply(op.sender, call, self.timestamp) {
            Ok(()) => {
                self.ledger = scratch;
                None
            }
            Err(reason) => Some(reason),
        };

        let transaction_hash = H256(keccak256(self.block_number.to_be_bytes()));
        let event = UserOperationEvent {
            user_op_hash: hash,
            sender: op.sender,
            paymaster: Address::zero(),
            nonce: op.nonce,
            success: reason.is_none(),
            actual_gas_cost: gas_cost,
            actual_gas_used: gas_used,
            block_number: Some(self.block_number),
            transaction_hash: Some(transaction_hash),
        };
        self.logs.push(event.to_log(network.entry_point));
        self.events.insert(hash, event);

        let receipt = UserOperationReceipt {
            user_op_hash: hash,
            success: reason.is_none(),
            reason,
            transaction_hash: Some(transaction_hash),
        };
        self.receipts.insert(hash, receipt.clone());
        self.call_data.insert(hash, op.call_data.clone());
        Ok(receipt)
    }
}

fn is_call(selector: &[u8], signature: &str) -> bool {
    selector == id(signature).as_slice()
}

fn rejected(reason: impl Into<String>) -> RelayError {
    RelayError::Rejected(reason.into())
}

/// The wallet's `_validateSignature`: challenge must be the operation hash and
/// `(r, s)` must verify over `sha256(authData || sha256(clientData))`.
fn verify_signature(op: &UserOperation, hash: H256, key: &PublicKey) -> Result<(), RelayError> {
    let invalid = |detail: &str| rejected(format!("AA24 signature error: {detail}"));

    let signature = contract::decode_signature(&op.signature).map_err(|_| invalid("undecodable"))?;
    let client_data = CollectedClientData::parse(signature.client_data_json.as_bytes())
        .map_err(|_| invalid("bad clientDataJSON"))?;
    if client_data.kind != "webauthn.get" {
        return Err(invalid("not an assertion"));
    }
    let challenge = client_data
        .challenge_bytes()
        .map_err(|_| invalid("bad challenge"))?;
    if challenge != hash.as_bytes() {
        return Err(invalid("challenge is not the operation hash"));
    }
    let auth_data =
        AuthDataParser::new(&signature.authenticator_data).map_err(|_| invalid("bad authenticatorData"))?;
    if !auth_data.is_user_present() {
        return Err(invalid("user not present"));
    }

    let digest = Assertion {
        authenticator_data: signature.authenticator_data.clone(),
        client_data_json: signature.client_data_json.clone().into_bytes(),
        signature: Vec::new(),
    }
    .signed_digest();

    let mut raw = [0u8; 64];
    signature.r.to_big_endian(&mut raw[..32]);
    signature.s.to_big_endian(&mut raw[32..]);
    let ecdsa = Signature::from_slice(&raw).map_err(|_| invalid("scalar out of range"))?;
    let verifying_key = utils::verifying_key(key).map_err(|_| invalid("signer is not on the curve"))?;
    verifying_key
        .verify_prehash(&digest, &ecdsa)
        .map_err(|_| invalid("wrong signer"))
}

/// EVM chain, ERC-4337 bundler and log source in one process.
pub struct MockNetwork {
    network: NetworkConfig,
    state: Mutex<ChainState>,
}

impl MockNetwork {
    /// Starts at block 1 with a priority-fee market (base 4, priority 2) and
    /// gas limits of 21000 / 50000 / 100000.
    pub fn new(network: NetworkConfig) -> Self {
        Self {
            network,
            state: Mutex::new(ChainState {
                block_number: 1,
                timestamp: GENESIS_TIMESTAMP,
                ledger: Ledger::default(),
                nonces: HashMap::new(),
                receipts: HashMap::new(),
                call_data: HashMap::new(),
                events: HashMap::new(),
                logs: Vec::new(),
                fee: FeeData {
                    base_fee_per_gas: Some(U256::from(4u64)),
                    max_priority_fee_per_gas: Some(U256::from(2u64)),
                    gas_price: U256::from(5u64),
                },
                gas: GasLimits::new(21_000u64, 50_000u64, 100_000u64),
                rejection: None,
                offline: false,
                submissions: 0,
            }),
        }
    }

    pub fn network(&self) -> &NetworkConfig {
        &self.network
    }

    fn lock(&self) -> MutexGuard<'_, ChainState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn online(&self) -> ChainResult<MutexGuard<'_, ChainState>> {
        let state = self.lock();
        if state.offline {
            return Err("connection refused".into());
        }
        Ok(state)
    }

    fn relay_online(&self) -> Result<MutexGuard<'_, ChainState>, RelayError> {
        let state = self.lock();
        if state.offline {
            return Err(RelayError::Transport("connection refused".into()));
        }
        Ok(state)
    }

    //=========================================================================
    // Test Controls
    //=========================================================================

    pub fn fund(&self, address: Address, amount: U256) {
        self.lock().ledger.credit(address, amount);
    }

    pub fn fund_token(&self, token: Address, holder: Address, amount: U256) {
        let mut state = self.lock();
        let balance = state.ledger.tokens.entry((token, holder)).or_default();
        *balance = balance.saturating_add(amount);
    }

    pub fn balance_of(&self, address: Address) -> U256 {
        self.lock().ledger.balance(address)
    }

    pub fn token_balance_of(&self, token: Address, holder: Address) -> U256 {
        self.lock()
            .ledger
            .tokens
            .get(&(token, holder))
            .copied()
            .unwrap_or_default()
    }

    pub fn set_fee_data(&self, fee: FeeData) {
        self.lock().fee = fee;
    }

    pub fn set_gas_limits(&self, gas: GasLimits) {
        self.lock().gas = gas;
    }

    /// Refuse every `eth_sendUserOperation` with `reason`
    pub fn reject_with(&self, reason: impl Into<String>) {
        self.lock().rejection = Some(reason.into());
    }

    pub fn accept(&self) {
        self.lock().rejection = None;
    }

    /// Node and bundler stop answering
    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    /// Mine one block `seconds` after the latest
    pub fn advance_time(&self, seconds: u64) {
        self.lock().mine(seconds);
    }

    pub fn mine(&self, blocks: u64) {
        let mut state = self.lock();
        for _ in 0..blocks {
            state.mine(BLOCK_TIME_SECS);
        }
    }

    pub fn block_number(&self) -> u64 {
        self.lock().block_number
    }

    pub fn timestamp(&self) -> u64 {
        self.lock().timestamp
    }

    /// Operations accepted by the bundler
    pub fn submissions(&self) -> usize {
        self.lock().submissions
    }

    pub fn is_deployed(&self, address: Address) -> bool {
        self.lock().ledger.wallets.contains_key(&address)
    }

    pub fn nonce_of(&self, address: Address) -> U256 {
        self.lock().nonce(address)
    }

    pub fn receipt(&self, user_op_hash: H256) -> Option<UserOperationReceipt> {
        self.lock().receipts.get(&user_op_hash).cloned()
    }

    /// The callData the EntryPoint handed to the wallet for an included operation
    pub fn call_data(&self, user_op_hash: H256) -> Option<WalletCall> {
        let state = self.lock();
        let data = state.call_data.get(&user_op_hash)?;
        WalletCall::decode(data).ok()
    }

    /// Emit the event of an already executed operation again in a new block,
    /// as a reorg or a re-delivering node would.
    pub fn redeliver_event(&self, user_op_hash: H256) -> bool {
        let mut state = self.lock();
        let Some(mut event) = state.events.get(&user_op_hash).cloned() else {
            return false;
        };
        state.mine(BLOCK_TIME_SECS);
        event.block_number = Some(state.block_number);
        let log = event.to_log(self.network.entry_point);
        state.logs.push(log);
        true
    }
}

#[async_trait]
impl ChainConnection for MockNetwork {
    async fn chain_id(&self) -> ChainResult<u64> {
        drop(self.online()?);
        Ok(self.network.chain_id)
    }

    async fn call(&self, to: Address, data: Bytes) -> ChainResult<Bytes> {
        let state = self.online()?;
        if data.len() < 4 {
            return Err("execution reverted".into());
        }
        let (selector, args) = data.split_at(4);

        if to == self.network.entry_point && is_call(selector, calldata::GET_NONCE) {
            let tokens = decode(&[ParamType::Address, ParamType::Uint(192)], args)?;
            let Some(Token::Address(sender)) = tokens.first() else {
                return Err("execution reverted".into());
            };
            return Ok(encode(&[Token::Uint(state.nonce(*sender))]).into());
        }

        if to == self.network.factory && is_call(selector, calldata::WALLETS) {
            let tokens = decode(&[ParamType::FixedBytes(32)], args)?;
            let Some(Token::FixedBytes(key)) = tokens.first() else {
                return Err("execution reverted".into());
            };
            let address = state
                .ledger
                .registry
                .get(&H256::from_slice(key))
                .copied()
                .unwrap_or_default();
            return Ok(encode(&[Token::Address(address)]).into());
        }

        // calls to an address without code return nothing
        let Some(wallet) = state.ledger.wallets.get(&to) else {
            return Ok(Bytes::new());
        };
        if is_call(selector, calldata::GET_SIGNER) {
            return Ok(encode(&[Token::Uint(wallet.signer.x), Token::Uint(wallet.signer.y)]).into());
        }
        if is_call(selector, calldata::GET_RECOVERY) {
            return Ok(wallet.recovery.encode());
        }
        Err("execution reverted".into())
    }

    async fn get_code(&self, address: Address) -> ChainResult<Bytes> {
        let state = self.online()?;
        if state.ledger.wallets.contains_key(&address) {
            Ok(Bytes::from(vec![0x60u8, 0x80, 0x60, 0x40]))
        } else {
            Ok(Bytes::new())
        }
    }

    async fn get_balance(&self, address: Address) -> ChainResult<U256> {
        Ok(self.online()?.ledger.balance(address))
    }

    async fn fee_data(&self) -> ChainResult<FeeData> {
        Ok(self.online()?.fee)
    }

    async fn block_timestamp(&self) -> ChainResult<u64> {
        Ok(self.online()?.timestamp)
    }
}

#[async_trait]
impl RelayConnection for MockNetwork {
    async fn supported_entry_points(&self) -> Result<Vec<Address>, RelayError> {
        drop(self.relay_online()?);
        Ok(vec![self.network.entry_point])
    }

    async fn estimate_user_operation_gas(
        &self,
        op: &UserOperation,
        entry_point: Address,
    ) -> Result<GasLimits, RelayError> {
        let state = self.relay_online()?;
        if entry_point != self.network.entry_point {
            return Err(rejected("unsupported EntryPoint"));
        }
        WalletCall::decode(&op.call_data).map_err(|e| rejected(format!("AA23 reverted: {e}")))?;
        Ok(state.gas)
    }

    async fn send_user_operation(
        &self,
        op: &UserOperation,
        entry_point: Address,
    ) -> Result<H256, RelayError> {
        let mut state = self.relay_online()?;
        if let Some(reason) = &state.rejection {
            return Err(rejected(reason.clone()));
        }
        if entry_point != self.network.entry_point {
            return Err(rejected("unsupported EntryPoint"));
        }

        let hash = op.hash(entry_point, self.network.chain_id);
        state.execute(&self.network, op, hash)?;
        state.submissions += 1;
        Ok(hash)
    }

    async fn get_user_operation_receipt(
        &self,
        hash: H256,
    ) -> Result<Option<UserOperationReceipt>, RelayError> {
        Ok(self.relay_online()?.receipts.get(&hash).cloned())
    }
}

#[async_trait]
impl LogSource for MockNetwork {
    async fn latest_block(&self) -> Result<u64, IndexerError> {
        let state = self.lock();
        if state.offline {
            return Err(RpcError::Transport("connection refused".into()).into());
        }
        Ok(state.block_number)
    }

    async fn logs(
        &self,
        address: Address,
        topic: H256,
        from: u64,
        to: u64,
    ) -> Result<Vec<Log>, IndexerError> {
        let state = self.lock();
        if state.offline {
            return Err(RpcError::Transport("connection refused".into()).into());
        }
        Ok(state
            .logs
            .iter()
            .filter(|log| log.address == address && log.topics.first() == Some(&topic))
            .filter(|log| {
                log.block_number
                    .map(|n| (from..=to).contains(&n.as_u64()))
                    .unwrap_or(false)
            })
            .cloned()
            .collect())
    }
}
