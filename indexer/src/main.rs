//! openpass-indexer
//!
//! Polls the EntryPoint for `UserOperationEvent` logs and writes a transaction
//! record for every operation sent by a registered wallet.

use std::sync::Arc;

use openpass_indexer::config::log_json_enabled;
use openpass_indexer::{
    seed_wallets, HttpLogSource, IndexerConfig, IndexerPool, LogPoller, UserOperationProcessor,
};
use openpass_state::MemoryStore;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing(log_json_enabled());

    let config = IndexerConfig::from_env()?;
    info!(
        network = %config.network.name,
        chain_id = config.network.chain_id,
        rpc = %config.network.rpc_url,
        start_block = config.start_block,
        workers = config.workers,
        "starting openpass-indexer"
    );

    let store = Arc::new(MemoryStore::new());
    if let Some(path) = &config.wallets_file {
        let json = tokio::fs::read_to_string(path).await?;
        let added = seed_wallets(store.as_ref(), &json).await?;
        info!(added, path = %path.display(), "wallet registry loaded");
    }

    let processor = Arc::new(UserOperationProcessor::new(store.clone(), store.clone()));
    let pool = IndexerPool::start(processor, config.network.chain_id, config.workers);

    let source = Arc::new(HttpLogSource::new(config.network.rpc_url.clone()));
    let mut poller = LogPoller::new(source, config.network.entry_point, config.start_block)
        .with_confirmations(config.confirmations)
        .with_batch_size(config.batch_size);

    tokio::select! {
        _ = poller.run(&pool, config.poll_interval) => {}
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!(next_block = poller.next_block(), "shutting down indexer");
        }
    }

    let stats = pool.shutdown().await;
    info!(
        processed = stats.processed(),
        records = store.record_count().await,
        "indexer stopped"
    );
    Ok(())
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| "openpass_indexer=info".into());
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
