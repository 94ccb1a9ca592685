//! `meme-20`: id-keyed tokens minted in full to the deployer

use super::{
    field_amount, field_str, payload_mismatch, unsupported_op, Operation, OperationMeta, Payload,
    ProtocolHandler,
};
use crate::amount::Amount;
use crate::decoder::Inscription;
use crate::error::IndexerResult;
use crate::ledger::{Apply, Ledger, NewToken};
use crate::verify;
use rusqlite::Connection;
use serde::Serialize;
use serde_json::{json, Value};

pub const TAG: &str = "meme-20";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Meme20Op {
    /// The token id is the deploying transaction's hash
    Deploy { tick: String, name: String, max: Amount },
    Transfer { tick_id: String, amt: Amount },
}

pub struct Meme20Handler;

impl Meme20Handler {
    fn op<'a>(&self, op: &'a Operation) -> IndexerResult<&'a Meme20Op> {
        match &op.payload {
            Payload::Meme20(inner) => Ok(inner),
            _ => Err(payload_mismatch(TAG)),
        }
    }
}

impl ProtocolHandler for Meme20Handler {
    fn tag(&self) -> &'static str {
        TAG
    }

    fn decode(&self, inscription: &Inscription, meta: OperationMeta) -> IndexerResult<Operation> {
        let body = &inscription.body;
        let payload = match inscription.op.as_str() {
            "deploy" => Meme20Op::Deploy {
                tick: field_str(body, "tick")?,
                name: field_str(body, "name")?,
                max: field_amount(body, "max")?,
            },
            "transfer" => Meme20Op::Transfer {
                tick_id: field_str(body, "tick_id")?,
                amt: field_amount(body, "amt")?,
            },
            other => return Err(unsupported_op(TAG, other)),
        };

        Ok(Operation {
            protocol: TAG,
            op: inscription.op.clone(),
            meta,
            payload: Payload::Meme20(payload),
        })
    }

    fn verify(&self, conn: &Connection, op: &Operation) -> IndexerResult<()> {
        match self.op(op)? {
            Meme20Op::Deploy { tick, name, max } => verify::meme20_deploy(tick, name, *max),
            Meme20Op::Transfer { tick_id, amt } => verify::meme20_transfer(
                conn,
                tick_id,
                op.meta.sender()?,
                *amt,
                op.meta.block_number,
            ),
        }
    }

    fn apply(&self, ledger: &Ledger<'_, Apply>, op: &Operation) -> IndexerResult<Value> {
        match self.op(op)? {
            Meme20Op::Deploy { tick, name, max } => {
                let tick_id = op.meta.tx_hash.clone();
                ledger.deploy_token(&NewToken {
                    token: tick_id.clone(),
                    symbol: tick.clone(),
                    name: name.clone(),
                    max_supply: Some(*max),
                    lim: None,
                    holder: op.meta.holder.clone(),
                })?;
                ledger.mint(&tick_id, &op.meta.holder, *max)?;
                Ok(json!({ "tick_id": tick_id, "tick": tick, "max": max }))
            }
            Meme20Op::Transfer { tick_id, amt } => {
                ledger.transfer(tick_id, op.meta.sender()?, &op.meta.holder, *amt)?;
                Ok(json!({ "tick_id": tick_id, "amt": amt, "to": op.meta.holder }))
            }
        }
    }
}
