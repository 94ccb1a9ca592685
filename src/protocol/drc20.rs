//! `drc-20`: tick-keyed fungible tokens (deploy, open mint, multi-recipient transfer)

use super::{
    field_amount, field_str, opt_str, payload_mismatch, unsupported_op, Operation, OperationMeta,
    Payload, ProtocolHandler,
};
use crate::amount::Amount;
use crate::decoder::Inscription;
use crate::error::IndexerResult;
use crate::ledger::{Apply, Ledger, NewToken};
use crate::verify;
use rusqlite::Connection;
use serde::Serialize;
use serde_json::{json, Value};

pub const TAG: &str = "drc-20";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Drc20Op {
    Deploy { tick: String, max: Amount, lim: Amount },
    Mint { tick: String, amt: Amount },
    Transfer { tick: String, amt: Amount, to: Vec<String> },
}

pub struct Drc20Handler;

impl Drc20Handler {
    fn op<'a>(&self, op: &'a Operation) -> IndexerResult<&'a Drc20Op> {
        match &op.payload {
            Payload::Drc20(inner) => Ok(inner),
            _ => Err(payload_mismatch(TAG)),
        }
    }
}

impl ProtocolHandler for Drc20Handler {
    fn tag(&self) -> &'static str {
        TAG
    }

    fn decode(&self, inscription: &Inscription, meta: OperationMeta) -> IndexerResult<Operation> {
        let body = &inscription.body;
        let tick = field_str(body, "tick")?.to_uppercase();

        let payload = match inscription.op.as_str() {
            "deploy" => Drc20Op::Deploy {
                tick,
                max: field_amount(body, "max")?,
                lim: field_amount(body, "lim")?,
            },
            "mint" => Drc20Op::Mint {
                tick,
                amt: field_amount(body, "amt")?,
            },
            "transfer" => {
                // Without an explicit list the first output receives the tokens
                let to = match opt_str(body, "to") {
                    Some(list) => list
                        .split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .collect(),
                    None => vec![meta.holder.clone()],
                };
                Drc20Op::Transfer {
                    tick,
                    amt: field_amount(body, "amt")?,
                    to,
                }
            }
            other => return Err(unsupported_op(TAG, other)),
        };

        Ok(Operation {
            protocol: TAG,
            op: inscription.op.clone(),
            meta,
            payload: Payload::Drc20(payload),
        })
    }

    fn verify(&self, conn: &Connection, op: &Operation) -> IndexerResult<()> {
        match self.op(op)? {
            Drc20Op::Deploy { tick, max, lim } => verify::drc20_deploy(conn, tick, *max, *lim),
            Drc20Op::Mint { tick, amt } => verify::drc20_mint(conn, tick, *amt),
            Drc20Op::Transfer { tick, amt, to } => {
                verify::drc20_transfer(conn, tick, op.meta.sender()?, *amt, to.len())
            }
        }
    }

    fn apply(&self, ledger: &Ledger<'_, Apply>, op: &Operation) -> IndexerResult<Value> {
        match self.op(op)? {
            Drc20Op::Deploy { tick, max, lim } => {
                ledger.deploy_token(&NewToken {
                    token: tick.clone(),
                    symbol: tick.clone(),
                    name: String::new(),
                    max_supply: Some(*max),
                    lim: Some(*lim),
                    holder: op.meta.holder.clone(),
                })?;
                Ok(json!({ "tick": tick, "max": max, "lim": lim }))
            }
            Drc20Op::Mint { tick, amt } => {
                ledger.mint(tick, &op.meta.holder, *amt)?;
                Ok(json!({ "tick": tick, "amt": amt }))
            }
            Drc20Op::Transfer { tick, amt, to } => {
                let sender = op.meta.sender()?;
                for recipient in to {
                    ledger.transfer(tick, sender, recipient, *amt)?;
                }
                Ok(json!({ "tick": tick, "amt": amt, "to": to }))
            }
        }
    }
}
