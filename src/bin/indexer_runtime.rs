//! Indexer Runtime - scan loop with fork reconciliation
//!
//! Opens (and migrates) the SQLite store, connects to the chain node over JSON-RPC and scans
//! block by block until CTRL+C.
//!
//! Usage:
//!   cargo run --release --bin indexer_runtime
//!
//! Environment variables:
//!   INDEXER_DB_PATH - SQLite database path (default: ./data/inscription_ledger.db)
//!   CHAIN_RPC_URL - node JSON-RPC endpoint (default: http://127.0.0.1:22555)
//!   CHAIN_RPC_USER / CHAIN_RPC_PASSWORD - node credentials
//!   SCAN_INTERVAL_MS - delay between scan ticks (default: 3000)
//!   MAX_BLOCKS_PER_TICK - heights per tick (default: 100)
//!   START_HEIGHT - first height on an empty database (default: 0)
//!   WDOGE_CUSTODY_ADDRESS - address backing wdoge deposits

use dotenv::dotenv;
use inscription_ledger::chain::rpc::RpcChainReader;
use inscription_ledger::chain::ChainReader;
use inscription_ledger::config::IndexerConfig;
use inscription_ledger::decoder::ScriptSigDecoder;
use inscription_ledger::protocol::HandlerRegistry;
use inscription_ledger::scanner::Scanner;
use inscription_ledger::store::Store;
use log::{error, info};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    env_logger::init();

    info!("🚀 Inscription Ledger Indexer");
    info!("   └─ Version: {}", env!("CARGO_PKG_VERSION"));

    let config = IndexerConfig::from_env();

    info!("✅ Configuration loaded");
    info!("   ├─ Database: {}", config.db_path);
    info!("   ├─ Node: {}", config.rpc_url);
    info!("   ├─ Start height: {}", config.start_height);
    if config.wdoge_custody_address.is_empty() {
        info!("   └─ WDOGE custody: not set, deposits will be rejected");
    } else {
        info!("   └─ WDOGE custody: {}", config.wdoge_custody_address);
    }

    info!("🔧 Initializing database...");
    let store = Arc::new(Store::open(&config.db_path)?);

    let reader: Arc<dyn ChainReader> = Arc::new(RpcChainReader::new(&config)?);
    match reader.block_count().await {
        Ok(tip) => info!("✅ Node reachable, tip at height {}", tip),
        Err(e) => error!("❌ Node not reachable yet ({}), scanner will keep retrying", e),
    }

    let registry = HandlerRegistry::with_defaults(&config);
    let mut scanner = Scanner::new(
        store,
        reader,
        Box::new(ScriptSigDecoder),
        registry,
        config,
    );

    info!("🔄 Press CTRL+C to shutdown gracefully");

    scanner
        .run(async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("⚠️  Received CTRL+C, shutting down..."),
                Err(err) => error!("❌ Failed to listen for CTRL+C: {}", err),
            }
        })
        .await;

    info!("✅ Indexer stopped");
    Ok(())
}
