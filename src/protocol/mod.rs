//! Protocol handlers
//!
//! Each meta-protocol tag (`drc-20`, `pair-v2`, `pump`, ...) has one [`ProtocolHandler`] that
//! turns a decoded [`Inscription`] into a typed [`Operation`], checks it against the verification
//! gate and applies it through the ledger. The scanner looks handlers up by tag in a
//! [`HandlerRegistry`].

pub mod drc20;
pub mod invite;
pub mod launch;
pub mod meme20;
pub mod order;
pub mod pair;
pub mod pump;
pub mod stake;
pub mod wdoge;

use crate::amm::PoolKind;
use crate::amount::Amount;
use crate::config::IndexerConfig;
use crate::decoder::Inscription;
use crate::error::{IndexerError, IndexerResult};
use crate::ledger::{Apply, Ledger, TxContext};
use crate::store::operations::OperationRecord;
use rusqlite::Connection;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

/// Chain facts about the transaction carrying an inscription
#[derive(Debug, Clone, PartialEq)]
pub struct OperationMeta {
    pub tx_hash: String,
    pub tx_index: u32,
    pub block_number: u64,
    pub block_hash: String,
    pub block_time: i64,
    /// Address of the first output
    pub holder: String,
    /// Address that funded the first input, when it could be resolved
    pub sender: Option<String>,
    /// `(address, value)` of every output with an address
    pub outputs: Vec<(String, Amount)>,
}

impl OperationMeta {
    pub fn ctx(&self) -> TxContext {
        TxContext {
            tx_hash: self.tx_hash.clone(),
            block_number: self.block_number,
            block_time: self.block_time,
        }
    }

    pub fn sender(&self) -> IndexerResult<&str> {
        self.sender
            .as_deref()
            .ok_or_else(|| IndexerError::validation("the sender address cannot be resolved"))
    }

    /// Total value paid to `address` by this transaction
    pub fn paid_to(&self, address: &str) -> IndexerResult<Amount> {
        self.outputs
            .iter()
            .filter(|(addr, _)| addr == address)
            .try_fold(Amount::ZERO, |acc, (_, value)| acc.checked_add(*value))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Payload {
    Drc20(drc20::Drc20Op),
    Meme20(meme20::Meme20Op),
    Wdoge(wdoge::WdogeOp),
    Pair(pair::PairOp),
    Pump(pump::PumpOp),
    Invite(invite::InviteOp),
    Stake(stake::StakeOp),
    Launch(launch::BoxOp),
    Order(order::OrderOp),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub protocol: &'static str,
    pub op: String,
    pub meta: OperationMeta,
    pub payload: Payload,
}

impl Operation {
    /// Pending row persisted before verification
    pub fn record(&self) -> IndexerResult<OperationRecord> {
        Ok(OperationRecord {
            protocol: self.protocol.to_string(),
            op: self.op.clone(),
            tx_hash: self.meta.tx_hash.clone(),
            tx_index: self.meta.tx_index,
            block_number: self.meta.block_number,
            block_hash: self.meta.block_hash.clone(),
            block_time: self.meta.block_time,
            holder: self.meta.holder.clone(),
            payload: serde_json::to_value(&self.payload)?,
        })
    }
}

pub trait ProtocolHandler: Send + Sync {
    fn tag(&self) -> &'static str;

    /// Shape the inscription body into a typed operation; no database access
    fn decode(&self, inscription: &Inscription, meta: OperationMeta) -> IndexerResult<Operation>;

    /// Read-only preconditions
    fn verify(&self, conn: &Connection, op: &Operation) -> IndexerResult<()>;

    /// Mutate the ledger; returns the outputs stored on the operation row
    fn apply(&self, ledger: &Ledger<'_, Apply>, op: &Operation) -> IndexerResult<Value>;
}

#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<&'static str, Box<dyn ProtocolHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every protocol family the indexer understands
    pub fn with_defaults(config: &IndexerConfig) -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(drc20::Drc20Handler));
        registry.register(Box::new(meme20::Meme20Handler));
        registry.register(Box::new(wdoge::WdogeHandler::new(
            config.wdoge_custody_address.clone(),
        )));
        registry.register(Box::new(pair::PairHandler::new(PoolKind::Legacy)));
        registry.register(Box::new(pair::PairHandler::new(PoolKind::V2)));
        registry.register(Box::new(pump::PumpHandler));
        registry.register(Box::new(invite::InviteHandler));
        registry.register(Box::new(stake::StakeHandler));
        registry.register(Box::new(launch::BoxHandler));
        registry.register(Box::new(order::OrderHandler));
        registry
    }

    pub fn register(&mut self, handler: Box<dyn ProtocolHandler>) {
        self.handlers.insert(handler.tag(), handler);
    }

    pub fn get(&self, tag: &str) -> Option<&dyn ProtocolHandler> {
        self.handlers.get(tag).map(|h| h.as_ref())
    }

    pub fn tags(&self) -> Vec<&'static str> {
        let mut tags: Vec<_> = self.handlers.keys().copied().collect();
        tags.sort_unstable();
        tags
    }
}

fn unsupported_op(protocol: &str, op: &str) -> IndexerError {
    IndexerError::Decode(format!("{} does not support op {:?}", protocol, op))
}

fn payload_mismatch(protocol: &str) -> IndexerError {
    IndexerError::Decode(format!("payload does not belong to {}", protocol))
}

fn field_str(body: &Value, name: &str) -> IndexerResult<String> {
    body.get(name)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| IndexerError::Decode(format!("missing field {:?}", name)))
}

fn opt_str(body: &Value, name: &str) -> Option<String> {
    body.get(name)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Amounts arrive as decimal strings; bare JSON integers are accepted too
fn field_amount(body: &Value, name: &str) -> IndexerResult<Amount> {
    match body.get(name) {
        Some(Value::String(s)) => Amount::parse(s),
        Some(Value::Number(n)) => n
            .as_u64()
            .map(Amount::new)
            .ok_or_else(|| IndexerError::Decode(format!("field {:?} is not an integer", name))),
        _ => Err(IndexerError::Decode(format!("missing field {:?}", name))),
    }
}

fn opt_amount(body: &Value, name: &str) -> IndexerResult<Amount> {
    match body.get(name) {
        None | Some(Value::Null) => Ok(Amount::ZERO),
        Some(Value::String(s)) if s.is_empty() => Ok(Amount::ZERO),
        Some(_) => field_amount(body, name),
    }
}
