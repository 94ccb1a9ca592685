//! Shared fixtures for scanner integration tests: an in-memory chain and a temp-file store

#![allow(dead_code)]

use async_trait::async_trait;
use inscription_ledger::chain::{
    BlockDetail, ChainReader, RawTransaction, ScriptPubKey, ScriptSig, TxInput, TxOutput,
};
use inscription_ledger::config::IndexerConfig;
use inscription_ledger::decoder::ScriptSigDecoder;
use inscription_ledger::protocol::HandlerRegistry;
use inscription_ledger::scanner::Scanner;
use inscription_ledger::store::Store;
use inscription_ledger::{IndexerError, IndexerResult};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;

pub const GENESIS_TIME: i64 = 1_700_000_000;

struct ChainState {
    branch: String,
    blocks: Vec<BlockDetail>,
    txs: HashMap<String, RawTransaction>,
    unreachable: HashSet<String>,
}

/// Chain whose blocks are appended by the test; `reorg_from` swaps in a new branch
pub struct FakeChain {
    state: Mutex<ChainState>,
}

impl FakeChain {
    pub fn new() -> Arc<Self> {
        let chain = Arc::new(Self {
            state: Mutex::new(ChainState {
                branch: "main".to_string(),
                blocks: Vec::new(),
                txs: HashMap::new(),
                unreachable: HashSet::new(),
            }),
        });
        chain.push_block(Vec::new());
        chain
    }

    pub fn tip(&self) -> u64 {
        self.state.lock().unwrap().blocks.len() as u64 - 1
    }

    pub fn hash_at(&self, height: u64) -> String {
        self.state.lock().unwrap().blocks[height as usize].hash.clone()
    }

    /// Append a block carrying `txs`; returns its height
    pub fn push_block(&self, txs: Vec<RawTransaction>) -> u64 {
        let mut state = self.state.lock().unwrap();
        let height = state.blocks.len() as u64;
        let hash = format!("{}-{:04}", state.branch, height);
        let previous_hash = state.blocks.last().map(|b| b.hash.clone());
        let txids = txs.iter().map(|tx| tx.txid.clone()).collect();
        for tx in txs {
            state.txs.insert(tx.txid.clone(), tx);
        }
        state.blocks.push(BlockDetail {
            hash,
            height,
            previous_hash,
            time: GENESIS_TIME + height as i64 * 60,
            txids,
        });
        height
    }

    /// Drop every block at or above `height`; later pushes build on the new branch
    pub fn reorg_from(&self, height: u64, branch: &str) {
        let mut state = self.state.lock().unwrap();
        state.blocks.truncate(height as usize);
        state.branch = branch.to_string();
    }

    /// Make `raw_transaction(txid)` fail with a network error until `restore_tx`
    pub fn drop_tx(&self, txid: &str) {
        self.state.lock().unwrap().unreachable.insert(txid.to_string());
    }

    pub fn restore_tx(&self, txid: &str) {
        self.state.lock().unwrap().unreachable.remove(txid);
    }

    /// An inscription transaction paying its first output to `holder`, funded by `holder`
    pub fn inscribe(&self, txid: &str, holder: &str, body: Value) -> RawTransaction {
        let funding_txid = format!("fund-{}", txid);
        let funding = RawTransaction {
            txid: funding_txid.clone(),
            block_hash: None,
            block_time: None,
            vin: Vec::new(),
            vout: vec![output(holder, 1.0, 0)],
        };
        self.state
            .lock()
            .unwrap()
            .txs
            .insert(funding_txid.clone(), funding);

        RawTransaction {
            txid: txid.to_string(),
            block_hash: None,
            block_time: None,
            vin: vec![TxInput {
                txid: Some(funding_txid),
                vout: Some(0),
                script_sig: Some(ScriptSig {
                    hex: envelope_hex(&body.to_string()),
                }),
                coinbase: None,
            }],
            vout: vec![output(holder, 0.001, 0)],
        }
    }
}

#[async_trait]
impl ChainReader for FakeChain {
    async fn block_count(&self) -> IndexerResult<u64> {
        Ok(self.tip())
    }

    async fn block_hash(&self, height: u64) -> IndexerResult<String> {
        let state = self.state.lock().unwrap();
        state
            .blocks
            .get(height as usize)
            .map(|b| b.hash.clone())
            .ok_or_else(|| IndexerError::ChainNetwork(format!("no block at {}", height)))
    }

    async fn block(&self, hash: &str) -> IndexerResult<BlockDetail> {
        let state = self.state.lock().unwrap();
        state
            .blocks
            .iter()
            .find(|b| b.hash == hash)
            .cloned()
            .ok_or_else(|| IndexerError::ChainNetwork(format!("unknown block {}", hash)))
    }

    async fn raw_transaction(&self, txid: &str) -> IndexerResult<RawTransaction> {
        let state = self.state.lock().unwrap();
        if state.unreachable.contains(txid) {
            return Err(IndexerError::ChainNetwork(format!("timeout fetching {}", txid)));
        }
        state
            .txs
            .get(txid)
            .cloned()
            .ok_or_else(|| IndexerError::ChainNetwork(format!("unknown tx {}", txid)))
    }
}

pub fn output(address: &str, value: f64, n: u32) -> TxOutput {
    TxOutput {
        value,
        n,
        script_pub_key: ScriptPubKey {
            addresses: vec![address.to_string()],
            address: None,
        },
    }
}

/// `ord` envelope scriptSig with the payload split into 240-byte pieces
pub fn envelope_hex(payload: &str) -> String {
    fn push(script: &mut Vec<u8>, data: &[u8]) {
        match data.len() {
            0 => script.push(0x00),
            n if n <= 0x4b => script.push(n as u8),
            n => {
                script.push(0x4c);
                script.push(n as u8);
            }
        }
        script.extend_from_slice(data);
    }

    let chunks: Vec<&[u8]> = payload.as_bytes().chunks(240).collect();
    let mut script = Vec::new();
    push(&mut script, b"ord");
    push(&mut script, &[chunks.len() as u8]);
    push(&mut script, b"text/plain;charset=utf-8");
    for (i, chunk) in chunks.iter().enumerate() {
        let countdown = (chunks.len() - 1 - i) as u8;
        if countdown == 0 {
            script.push(0x00);
        } else {
            push(&mut script, &[countdown]);
        }
        push(&mut script, chunk);
    }
    hex::encode(script)
}

pub struct Harness {
    pub chain: Arc<FakeChain>,
    pub store: Arc<Store>,
    pub scanner: Scanner,
    _db: NamedTempFile,
}

pub fn test_config(db_path: &str) -> IndexerConfig {
    IndexerConfig {
        db_path: db_path.to_string(),
        rpc_url: "http://127.0.0.1:0".to_string(),
        rpc_user: None,
        rpc_password: None,
        scan_interval_ms: 10,
        max_blocks_per_tick: 100,
        start_height: 0,
        wdoge_custody_address: "DCustody".to_string(),
    }
}

pub fn harness() -> Harness {
    let db = NamedTempFile::new().expect("temp db file");
    let path = db.path().to_string_lossy().to_string();
    let config = test_config(&path);
    let store = Arc::new(Store::open(&path).expect("open store"));
    let chain = FakeChain::new();
    let reader: Arc<dyn ChainReader> = chain.clone();
    let scanner = Scanner::new(
        store.clone(),
        reader,
        Box::new(ScriptSigDecoder),
        HandlerRegistry::with_defaults(&config),
        config,
    );
    Harness {
        chain,
        store,
        scanner,
        _db: db,
    }
}
