use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use ethers_core::types::{Address, H256};
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::record::TransactionRecord;
use crate::{PublicKey, Wallet};

/// Persistence surface for transaction records.
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Insert a record. Fails with [`StoreError::Duplicate`] when the hash exists.
    async fn insert(&self, record: TransactionRecord) -> Result<(), StoreError>;

    /// Records of one wallet, newest first, at most `limit` entries.
    async fn find_by_wallet(
        &self,
        address: Address,
        limit: usize,
    ) -> Result<Vec<TransactionRecord>, StoreError>;
}

/// Persistence surface for wallet documents.
#[async_trait]
pub trait WalletRegistry: Send + Sync {
    async fn find_by_address(
        &self,
        address: Address,
        chain_id: u64,
    ) -> Result<Option<Wallet>, StoreError>;

    async fn create(&self, wallet: Wallet) -> Result<(), StoreError>;

    /// Rebind the signer after a reclaim; the address stays the same.
    async fn update_signer(
        &self,
        address: Address,
        chain_id: u64,
        key: PublicKey,
        credential_id: String,
    ) -> Result<Wallet, StoreError>;
}

#[derive(Default)]
struct Records {
    // insertion order
    rows: Vec<TransactionRecord>,
    hashes: HashSet<H256>,
}

/// In-memory document store implementing both persistence traits.
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<Records>,
    wallets: RwLock<HashMap<(Address, u64), Wallet>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record_count(&self) -> usize {
        self.records.read().await.rows.len()
    }

    pub async fn wallet_count(&self) -> usize {
        self.wallets.read().await.len()
    }
}

#[async_trait]
impl TransactionStore for MemoryStore {
    async fn insert(&self, record: TransactionRecord) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        if !records.hashes.insert(record.hash) {
            return Err(StoreError::Duplicate { key: record.key() });
        }
        records.rows.push(record);
        Ok(())
    }

    async fn find_by_wallet(
        &self,
        address: Address,
        limit: usize,
    ) -> Result<Vec<TransactionRecord>, StoreError> {
        let records = self.records.read().await;
        let mut found: Vec<TransactionRecord> = records
            .rows
            .iter()
            .rev()
            .filter(|r| r.wallet_address == address)
            .cloned()
            .collect();
        // stable: equal timestamps keep latest-inserted first
        found.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        found.truncate(limit);
        Ok(found)
    }
}

#[async_trait]
impl WalletRegistry for MemoryStore {
    async fn find_by_address(
        &self,
        address: Address,
        chain_id: u64,
    ) -> Result<Option<Wallet>, StoreError> {
        Ok(self.wallets.read().await.get(&(address, chain_id)).cloned())
    }

    async fn create(&self, wallet: Wallet) -> Result<(), StoreError> {
        let mut wallets = self.wallets.write().await;
        let key = (wallet.address, wallet.chain_id);
        if wallets.contains_key(&key) {
            return Err(StoreError::Duplicate {
                key: format!("{:#x}@{}", wallet.address, wallet.chain_id),
            });
        }
        wallets.insert(key, wallet);
        Ok(())
    }

    async fn update_signer(
        &self,
        address: Address,
        chain_id: u64,
        key: PublicKey,
        credential_id: String,
    ) -> Result<Wallet, StoreError> {
        let mut wallets = self.wallets.write().await;
        let wallet = wallets
            .get_mut(&(address, chain_id))
            .ok_or_else(|| StoreError::NotFound(format!("{address:#x}@{chain_id}")))?;
        wallet.x = key.x;
        wallet.y = key.y;
        wallet.credential_id = credential_id;
        Ok(wallet.clone())
    }
}
