//! `pair-v1` / `pair-v2`: constant-product pools
//!
//! Legacy pools are addressed by their two ticks; v2 pools by `pair_id`, the hash of the creating
//! transaction. Either way the operation carries the pool's pair id once decoded.

use super::{
    field_amount, field_str, opt_amount, opt_str, payload_mismatch, unsupported_op, Operation,
    OperationMeta, Payload, ProtocolHandler,
};
use crate::amm::engine::{add_liquidity, create_pool, remove_liquidity, swap, CreatePool};
use crate::amm::{self, canonical_pair, legacy_pair_id, PoolKind};
use crate::amount::Amount;
use crate::decoder::Inscription;
use crate::error::{IndexerError, IndexerResult};
use crate::ledger::{Apply, Ledger};
use crate::verify;
use rusqlite::Connection;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PairOp {
    Create {
        pair_id: String,
        tick0: String,
        tick1: String,
        amt0: Amount,
        amt1: Amount,
    },
    Add {
        pair_id: String,
        /// Token `amt0` refers to, when the inscription names it
        tick0: Option<String>,
        amt0: Amount,
        amt1: Amount,
        amt0_min: Amount,
        amt1_min: Amount,
    },
    Remove {
        pair_id: String,
        liquidity: Amount,
    },
    Swap {
        pair_id: String,
        tick_in: String,
        amt_in: Amount,
        amt_out_min: Amount,
    },
}

pub struct PairHandler {
    kind: PoolKind,
}

impl PairHandler {
    pub fn new(kind: PoolKind) -> Self {
        Self { kind }
    }

    fn op<'a>(&self, op: &'a Operation) -> IndexerResult<&'a PairOp> {
        match &op.payload {
            Payload::Pair(inner) => Ok(inner),
            _ => Err(payload_mismatch(self.kind.protocol())),
        }
    }

    fn tick_field(&self, body: &Value, base: &str) -> IndexerResult<String> {
        match self.kind {
            PoolKind::Legacy => Ok(field_str(body, base)?.to_uppercase()),
            PoolKind::V2 => field_str(body, &format!("{}_id", base)),
        }
    }

    /// Pair id named by the inscription; legacy pairs derive it from the sorted ticks
    fn pair_id(&self, body: &Value) -> IndexerResult<String> {
        match self.kind {
            PoolKind::Legacy => {
                let (t0, t1, _, _) = canonical_pair(
                    &self.tick_field(body, "tick0")?,
                    &self.tick_field(body, "tick1")?,
                    (),
                    (),
                );
                Ok(legacy_pair_id(&t0, &t1))
            }
            PoolKind::V2 => field_str(body, "pair_id"),
        }
    }

    /// Put `(amt0, amt1, amt0_min, amt1_min)` into the pool's token order
    fn oriented_deposit(
        &self,
        conn: &Connection,
        pair_id: &str,
        tick0: Option<&str>,
        amounts: (Amount, Amount, Amount, Amount),
    ) -> IndexerResult<(Amount, Amount, Amount, Amount)> {
        let (a0, a1, m0, m1) = amounts;
        let Some(tick0) = tick0 else {
            return Ok(amounts);
        };
        let pool = amm::load_pool(conn, self.kind, pair_id)?
            .ok_or_else(|| IndexerError::validation("the contract does not exist"))?;
        if tick0 == pool.tick1 {
            Ok((a1, a0, m1, m0))
        } else if tick0 == pool.tick0 {
            Ok(amounts)
        } else {
            Err(IndexerError::validation("the contract does not exist err"))
        }
    }
}

impl ProtocolHandler for PairHandler {
    fn tag(&self) -> &'static str {
        self.kind.protocol()
    }

    fn decode(&self, inscription: &Inscription, meta: OperationMeta) -> IndexerResult<Operation> {
        let body = &inscription.body;
        let payload = match inscription.op.as_str() {
            "create" => {
                let pair_id = match self.kind {
                    PoolKind::Legacy => self.pair_id(body)?,
                    PoolKind::V2 => meta.tx_hash.clone(),
                };
                PairOp::Create {
                    pair_id,
                    tick0: self.tick_field(body, "tick0")?,
                    tick1: self.tick_field(body, "tick1")?,
                    amt0: field_amount(body, "amt0")?,
                    amt1: field_amount(body, "amt1")?,
                }
            }
            "add" => {
                let amt0 = field_amount(body, "amt0")?;
                let amt1 = field_amount(body, "amt1")?;
                let amt0_min = opt_amount(body, "amt0_min")?;
                let amt1_min = opt_amount(body, "amt1_min")?;
                match self.kind {
                    PoolKind::Legacy => {
                        let t0 = self.tick_field(body, "tick0")?;
                        let t1 = self.tick_field(body, "tick1")?;
                        let (s0, s1, (a0, m0), (a1, m1)) =
                            canonical_pair(&t0, &t1, (amt0, amt0_min), (amt1, amt1_min));
                        PairOp::Add {
                            pair_id: legacy_pair_id(&s0, &s1),
                            tick0: None,
                            amt0: a0,
                            amt1: a1,
                            amt0_min: m0,
                            amt1_min: m1,
                        }
                    }
                    PoolKind::V2 => PairOp::Add {
                        pair_id: field_str(body, "pair_id")?,
                        tick0: opt_str(body, "tick0_id"),
                        amt0,
                        amt1,
                        amt0_min,
                        amt1_min,
                    },
                }
            }
            "remove" => PairOp::Remove {
                pair_id: self.pair_id(body)?,
                liquidity: field_amount(body, "liquidity")?,
            },
            "swap" => PairOp::Swap {
                pair_id: self.pair_id(body)?,
                tick_in: self.tick_field(body, "tick0")?,
                amt_in: field_amount(body, "amt0")?,
                amt_out_min: opt_amount(body, "amt1_min")?,
            },
            other => return Err(unsupported_op(self.kind.protocol(), other)),
        };

        Ok(Operation {
            protocol: self.kind.protocol(),
            op: inscription.op.clone(),
            meta,
            payload: Payload::Pair(payload),
        })
    }

    fn verify(&self, conn: &Connection, op: &Operation) -> IndexerResult<()> {
        let holder = op.meta.holder.as_str();
        match self.op(op)? {
            PairOp::Create {
                tick0,
                tick1,
                amt0,
                amt1,
                ..
            } => verify::pair_create(conn, self.kind, tick0, tick1, *amt0, *amt1, holder),
            PairOp::Add {
                pair_id,
                tick0,
                amt0,
                amt1,
                amt0_min,
                amt1_min,
            } => {
                let (a0, a1, _, _) = self.oriented_deposit(
                    conn,
                    pair_id,
                    tick0.as_deref(),
                    (*amt0, *amt1, *amt0_min, *amt1_min),
                )?;
                verify::pair_add(conn, self.kind, pair_id, holder, a0, a1)
            }
            PairOp::Remove { pair_id, liquidity } => {
                verify::pair_remove(conn, self.kind, pair_id, holder, *liquidity)
            }
            PairOp::Swap {
                pair_id,
                tick_in,
                amt_in,
                amt_out_min,
            } => verify::pair_swap(
                conn,
                self.kind,
                pair_id,
                holder,
                tick_in,
                *amt_in,
                *amt_out_min,
                op.meta.block_number,
            ),
        }
    }

    fn apply(&self, ledger: &Ledger<'_, Apply>, op: &Operation) -> IndexerResult<Value> {
        let holder = op.meta.holder.as_str();
        let outcome = match self.op(op)? {
            PairOp::Create {
                pair_id,
                tick0,
                tick1,
                amt0,
                amt1,
            } => serde_json::to_value(create_pool(
                ledger,
                &CreatePool {
                    kind: self.kind,
                    pair_id: pair_id.clone(),
                    tick0: tick0.clone(),
                    tick1: tick1.clone(),
                    amt0: *amt0,
                    amt1: *amt1,
                    holder: holder.to_string(),
                },
            )?)?,
            PairOp::Add {
                pair_id,
                tick0,
                amt0,
                amt1,
                amt0_min,
                amt1_min,
            } => {
                let (a0, a1, m0, m1) = self.oriented_deposit(
                    ledger.conn(),
                    pair_id,
                    tick0.as_deref(),
                    (*amt0, *amt1, *amt0_min, *amt1_min),
                )?;
                serde_json::to_value(add_liquidity(
                    ledger, self.kind, pair_id, holder, a0, a1, m0, m1,
                )?)?
            }
            PairOp::Remove { pair_id, liquidity } => serde_json::to_value(remove_liquidity(
                ledger, self.kind, pair_id, holder, *liquidity,
            )?)?,
            PairOp::Swap {
                pair_id,
                tick_in,
                amt_in,
                amt_out_min,
            } => serde_json::to_value(swap(
                ledger,
                self.kind,
                pair_id,
                holder,
                tick_in,
                *amt_in,
                *amt_out_min,
            )?)?,
        };
        Ok(outcome)
    }
}
