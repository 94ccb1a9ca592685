//! Chain node access
//!
//! The scanner only needs four reads from a node: the tip height, the hash at a height, a block's
//! transaction list and a verbose transaction. They are behind [`ChainReader`] so tests can drive
//! the scanner from an in-memory chain.

pub mod rpc;

use crate::amount::Amount;
use crate::error::{IndexerError, IndexerResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Base units per whole coin
pub const COIN: f64 = 100_000_000.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockDetail {
    pub hash: String,
    pub height: u64,
    #[serde(rename = "previousblockhash", default)]
    pub previous_hash: Option<String>,
    pub time: i64,
    #[serde(rename = "tx", default)]
    pub txids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptSig {
    #[serde(default)]
    pub hex: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxInput {
    #[serde(default)]
    pub txid: Option<String>,
    #[serde(default)]
    pub vout: Option<u32>,
    #[serde(rename = "scriptSig", default)]
    pub script_sig: Option<ScriptSig>,
    #[serde(default)]
    pub coinbase: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptPubKey {
    #[serde(default)]
    pub addresses: Vec<String>,
    #[serde(default)]
    pub address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxOutput {
    pub value: f64,
    pub n: u32,
    #[serde(rename = "scriptPubKey")]
    pub script_pub_key: ScriptPubKey,
}

impl TxOutput {
    /// First address the output pays to
    pub fn address(&self) -> Option<&str> {
        self.script_pub_key
            .addresses
            .first()
            .map(String::as_str)
            .or(self.script_pub_key.address.as_deref())
    }

    /// Output value in base units
    pub fn amount(&self) -> Amount {
        Amount::new((self.value * COIN).round().max(0.0) as u64)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTransaction {
    pub txid: String,
    #[serde(rename = "blockhash", default)]
    pub block_hash: Option<String>,
    #[serde(rename = "blocktime", default)]
    pub block_time: Option<i64>,
    #[serde(default)]
    pub vin: Vec<TxInput>,
    #[serde(default)]
    pub vout: Vec<TxOutput>,
}

impl RawTransaction {
    /// Address of the first output, the holder of any inscription carried by this transaction
    pub fn holder(&self) -> Option<&str> {
        self.vout.first().and_then(TxOutput::address)
    }
}

#[async_trait]
pub trait ChainReader: Send + Sync {
    async fn block_count(&self) -> IndexerResult<u64>;

    async fn block_hash(&self, height: u64) -> IndexerResult<String>;

    async fn block(&self, hash: &str) -> IndexerResult<BlockDetail>;

    async fn raw_transaction(&self, txid: &str) -> IndexerResult<RawTransaction>;
}

/// Address that funded `tx`'s first input, one hop back
pub async fn first_input_address<R: ChainReader + ?Sized>(
    reader: &R,
    tx: &RawTransaction,
) -> IndexerResult<Option<String>> {
    let Some(input) = tx.vin.first() else {
        return Ok(None);
    };
    let (Some(prev_txid), Some(prev_vout)) = (input.txid.as_deref(), input.vout) else {
        return Ok(None);
    };

    let prev = reader.raw_transaction(prev_txid).await?;
    let output = prev.vout.get(prev_vout as usize).ok_or_else(|| {
        IndexerError::ChainNetwork(format!(
            "prevout {}:{} missing from node response",
            prev_txid, prev_vout
        ))
    })?;
    Ok(output.address().map(str::to_string))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_verbose_transaction() {
        let raw = r#"{
            "txid": "abc",
            "blockhash": "00ff",
            "blocktime": 1700000000,
            "vin": [{"txid": "prev", "vout": 1, "scriptSig": {"asm": "", "hex": "036f7264"}}],
            "vout": [
                {"value": 0.001, "n": 0, "scriptPubKey": {"addresses": ["DHolder"]}},
                {"value": 12.5, "n": 1, "scriptPubKey": {"address": "DCustody"}}
            ]
        }"#;
        let tx: RawTransaction = serde_json::from_str(raw).unwrap();
        assert_eq!(tx.holder(), Some("DHolder"));
        assert_eq!(tx.vout[1].address(), Some("DCustody"));
        assert_eq!(tx.vout[1].amount(), Amount::new(1_250_000_000));
        assert_eq!(tx.vout[0].amount(), Amount::new(100_000));
        assert_eq!(tx.vin[0].script_sig.as_ref().unwrap().hex, "036f7264");
    }

    #[test]
    fn test_parse_block_without_previous_hash() {
        let raw = r#"{"hash": "00aa", "height": 0, "time": 1386325540, "tx": ["t0"]}"#;
        let block: BlockDetail = serde_json::from_str(raw).unwrap();
        assert_eq!(block.previous_hash, None);
        assert_eq!(block.txids, vec!["t0".to_string()]);
    }
}
