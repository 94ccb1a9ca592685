//! JSON-RPC [`ChainReader`] for a Dogecoin-compatible node

use super::{BlockDetail, ChainReader, RawTransaction};
use crate::config::IndexerConfig;
use crate::error::{IndexerError, IndexerResult};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

pub struct RpcChainReader {
    client: reqwest::Client,
    url: String,
    user: Option<String>,
    password: Option<String>,
}

impl RpcChainReader {
    pub fn new(config: &IndexerConfig) -> IndexerResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            url: config.rpc_url.clone(),
            user: config.rpc_user.clone(),
            password: config.rpc_password.clone(),
        })
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> IndexerResult<T> {
        let body = json!({
            "jsonrpc": "1.0",
            "id": "inscription_ledger",
            "method": method,
            "params": params,
        });

        let mut request = self.client.post(&self.url).json(&body);
        if let Some(user) = &self.user {
            request = request.basic_auth(user, self.password.as_ref());
        }

        // Nodes answer RPC-level failures with HTTP 500 and a JSON error body
        let response = request.send().await?;
        let status = response.status();
        let envelope: RpcResponse<T> = response.json().await.map_err(|e| {
            IndexerError::ChainNetwork(format!("{} returned HTTP {}: {}", method, status, e))
        })?;

        if let Some(err) = envelope.error {
            return Err(IndexerError::ChainNetwork(format!(
                "{} failed: {} (code {})",
                method, err.message, err.code
            )));
        }
        envelope
            .result
            .ok_or_else(|| IndexerError::ChainNetwork(format!("{} returned no result", method)))
    }
}

#[async_trait]
impl ChainReader for RpcChainReader {
    async fn block_count(&self) -> IndexerResult<u64> {
        self.call("getblockcount", json!([])).await
    }

    async fn block_hash(&self, height: u64) -> IndexerResult<String> {
        self.call("getblockhash", json!([height])).await
    }

    async fn block(&self, hash: &str) -> IndexerResult<BlockDetail> {
        self.call("getblock", json!([hash, true])).await
    }

    async fn raw_transaction(&self, txid: &str) -> IndexerResult<RawTransaction> {
        self.call("getrawtransaction", json!([txid, true])).await
    }
}
