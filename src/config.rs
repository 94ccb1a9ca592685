//! Indexer configuration from environment variables

use std::env;

/// Configuration for the indexer runtime
///
/// Loaded from environment variables (and `.env` via dotenv) with defaults.
#[derive(Debug, Clone)]
pub struct IndexerConfig {
    /// Path to SQLite database file
    pub db_path: String,

    /// JSON-RPC endpoint of the chain node
    pub rpc_url: String,

    pub rpc_user: Option<String>,
    pub rpc_password: Option<String>,

    /// Delay between scan ticks in milliseconds
    pub scan_interval_ms: u64,

    /// Upper bound on heights processed per tick
    pub max_blocks_per_tick: u64,

    /// First height to scan when the database holds no block records
    pub start_height: u64,

    /// Address whose incoming outputs back `wdoge` deposits
    pub wdoge_custody_address: String,
}

impl IndexerConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `INDEXER_DB_PATH` (default: ./data/inscription_ledger.db)
    /// - `CHAIN_RPC_URL` (default: http://127.0.0.1:22555)
    /// - `CHAIN_RPC_USER`, `CHAIN_RPC_PASSWORD` (optional)
    /// - `SCAN_INTERVAL_MS` (default: 3000)
    /// - `MAX_BLOCKS_PER_TICK` (default: 100)
    /// - `START_HEIGHT` (default: 0)
    /// - `WDOGE_CUSTODY_ADDRESS` (default: empty, deposits rejected)
    pub fn from_env() -> Self {
        Self {
            db_path: env::var("INDEXER_DB_PATH")
                .unwrap_or_else(|_| "./data/inscription_ledger.db".to_string()),

            rpc_url: env::var("CHAIN_RPC_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:22555".to_string()),

            rpc_user: env::var("CHAIN_RPC_USER").ok().filter(|s| !s.is_empty()),

            rpc_password: env::var("CHAIN_RPC_PASSWORD").ok().filter(|s| !s.is_empty()),

            scan_interval_ms: env::var("SCAN_INTERVAL_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(3_000),

            max_blocks_per_tick: env::var("MAX_BLOCKS_PER_TICK")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(100),

            start_height: env::var("START_HEIGHT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(0),

            wdoge_custody_address: env::var("WDOGE_CUSTODY_ADDRESS").unwrap_or_default(),
        }
    }
}
