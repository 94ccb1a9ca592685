//! `order-v1`: fixed-price offers between two tick-keyed tokens

use super::{
    field_amount, field_str, payload_mismatch, unsupported_op, Operation, OperationMeta, Payload,
    ProtocolHandler,
};
use crate::amount::Amount;
use crate::decoder::Inscription;
use crate::error::IndexerResult;
use crate::ledger::{Apply, Ledger};
use crate::order;
use crate::verify;
use rusqlite::Connection;
use serde::Serialize;
use serde_json::{json, Value};

pub const TAG: &str = "order-v1";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum OrderOp {
    Create {
        tick0: String,
        tick1: String,
        amt0: Amount,
        amt1: Amount,
    },
    Trade {
        ex_id: String,
        amt1: Amount,
    },
    Cancel {
        ex_id: String,
        amt0: Amount,
    },
}

pub struct OrderHandler;

impl OrderHandler {
    fn op<'a>(&self, op: &'a Operation) -> IndexerResult<&'a OrderOp> {
        match &op.payload {
            Payload::Order(inner) => Ok(inner),
            _ => Err(payload_mismatch(TAG)),
        }
    }
}

impl ProtocolHandler for OrderHandler {
    fn tag(&self) -> &'static str {
        TAG
    }

    fn decode(&self, inscription: &Inscription, meta: OperationMeta) -> IndexerResult<Operation> {
        let body = &inscription.body;
        let payload = match inscription.op.as_str() {
            "create" => OrderOp::Create {
                tick0: field_str(body, "tick0")?.to_uppercase(),
                tick1: field_str(body, "tick1")?.to_uppercase(),
                amt0: field_amount(body, "amt0")?,
                amt1: field_amount(body, "amt1")?,
            },
            "trade" => OrderOp::Trade {
                ex_id: field_str(body, "exid")?,
                amt1: field_amount(body, "amt1")?,
            },
            "cancel" => OrderOp::Cancel {
                ex_id: field_str(body, "exid")?,
                amt0: field_amount(body, "amt0")?,
            },
            other => return Err(unsupported_op(TAG, other)),
        };

        Ok(Operation {
            protocol: TAG,
            op: inscription.op.clone(),
            meta,
            payload: Payload::Order(payload),
        })
    }

    fn verify(&self, conn: &Connection, op: &Operation) -> IndexerResult<()> {
        let holder = op.meta.holder.as_str();
        match self.op(op)? {
            OrderOp::Create {
                tick0,
                tick1,
                amt0,
                amt1,
            } => verify::order_create(conn, tick0, tick1, *amt0, *amt1, holder),
            OrderOp::Trade { ex_id, amt1 } => verify::order_trade(conn, ex_id, holder, *amt1),
            OrderOp::Cancel { ex_id, amt0 } => verify::order_cancel(conn, ex_id, holder, *amt0),
        }
    }

    fn apply(&self, ledger: &Ledger<'_, Apply>, op: &Operation) -> IndexerResult<Value> {
        let holder = op.meta.holder.as_str();
        match self.op(op)? {
            OrderOp::Create {
                tick0,
                tick1,
                amt0,
                amt1,
            } => {
                let made = order::create(ledger, tick0, tick1, *amt0, *amt1, holder)?;
                Ok(json!({ "ex_id": made.ex_id, "reserves_address": made.reserves_address }))
            }
            OrderOp::Trade { ex_id, amt1 } => {
                Ok(serde_json::to_value(order::trade(ledger, ex_id, holder, *amt1)?)?)
            }
            OrderOp::Cancel { ex_id, amt0 } => {
                let left = order::cancel(ledger, ex_id, holder, *amt0)?;
                Ok(json!({ "ex_id": ex_id, "amt0": amt0, "remaining": left.remaining()? }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::balance;
    use crate::ledger::test_support::{ctx, deploy_tick};
    use crate::protocol::test_support::{meta, run};
    use crate::store::test_support::create_test_store;

    #[test]
    fn test_create_fill_and_cancel() {
        let (store, _tmp) = create_test_store();
        store
            .write(|tx| {
                let ledger = Ledger::new(tx, ctx(1));
                deploy_tick(&ledger, "DOGI", None);
                deploy_tick(&ledger, "CATS", None);
                ledger.mint("DOGI", "DMaker", Amount::new(1_000))?;
                ledger.mint("CATS", "DTaker", Amount::new(1_000))?;

                let out = run(
                    &OrderHandler,
                    tx,
                    json!({"p": "order-v1", "op": "create", "tick0": "dogi", "tick1": "cats",
                           "amt0": "1000", "amt1": "250"}),
                    meta("ord1", 2, "DMaker", None),
                )?;
                assert_eq!(out["ex_id"], "ord1");

                let fill = run(
                    &OrderHandler,
                    tx,
                    json!({"p": "order-v1", "op": "trade", "exid": "ord1", "amt1": "50"}),
                    meta("t2", 3, "DTaker", None),
                )?;
                assert_eq!(fill["amt0_out"], "200");
                assert_eq!(balance(tx, "DOGI", "DTaker")?, Amount::new(200));
                assert_eq!(balance(tx, "CATS", "DMaker")?, Amount::new(50));

                let left = run(
                    &OrderHandler,
                    tx,
                    json!({"p": "order-v1", "op": "cancel", "exid": "ord1", "amt0": "800"}),
                    meta("t3", 4, "DMaker", None),
                )?;
                assert_eq!(left["remaining"], "0");
                assert_eq!(balance(tx, "DOGI", "DMaker")?, Amount::new(800));

                let err = run(
                    &OrderHandler,
                    tx,
                    json!({"p": "order-v1", "op": "trade", "exid": "ord1", "amt1": "1"}),
                    meta("t4", 5, "DTaker", None),
                )
                .unwrap_err();
                assert!(err.is_rejection());
                Ok(())
            })
            .unwrap();
    }
}
