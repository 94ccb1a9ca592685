//! `box-v1`: launch boxes that raise tick1 for a freshly deployed tick0

use super::{
    field_amount, field_str, opt_amount, payload_mismatch, unsupported_op, Operation,
    OperationMeta, Payload, ProtocolHandler,
};
use crate::amount::Amount;
use crate::decoder::Inscription;
use crate::error::{IndexerError, IndexerResult};
use crate::ledger::{Apply, Ledger};
use crate::sale::{self, DeployBox};
use crate::verify;
use rusqlite::Connection;
use serde::Serialize;
use serde_json::{json, Value};

pub const TAG: &str = "box-v1";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum BoxOp {
    Deploy {
        tick0: String,
        tick1: String,
        max: Amount,
        amt0: Amount,
        liqamt: Amount,
        liqblock: u64,
    },
    Mint {
        tick0: String,
        amt1: Amount,
    },
}

pub struct BoxHandler;

impl BoxHandler {
    fn op<'a>(&self, op: &'a Operation) -> IndexerResult<&'a BoxOp> {
        match &op.payload {
            Payload::Launch(inner) => Ok(inner),
            _ => Err(payload_mismatch(TAG)),
        }
    }
}

/// Closing height, sent as a number or a numeric string; absent means none
fn liqblock_field(body: &Value) -> IndexerResult<u64> {
    match body.get("liqblock") {
        None | Some(Value::Null) => Ok(0),
        Some(Value::Number(n)) => n
            .as_u64()
            .ok_or_else(|| IndexerError::Decode("liqblock is not a height".to_string())),
        Some(Value::String(s)) if s.is_empty() => Ok(0),
        Some(Value::String(s)) => s
            .trim()
            .parse()
            .map_err(|_| IndexerError::Decode("liqblock is not a height".to_string())),
        Some(_) => Err(IndexerError::Decode("liqblock is not a height".to_string())),
    }
}

impl ProtocolHandler for BoxHandler {
    fn tag(&self) -> &'static str {
        TAG
    }

    fn decode(&self, inscription: &Inscription, meta: OperationMeta) -> IndexerResult<Operation> {
        let body = &inscription.body;
        let payload = match inscription.op.as_str() {
            "deploy" => BoxOp::Deploy {
                tick0: field_str(body, "tick0")?.to_uppercase(),
                tick1: field_str(body, "tick1")?.to_uppercase(),
                max: field_amount(body, "max")?,
                amt0: field_amount(body, "amt0")?,
                liqamt: opt_amount(body, "liqamt")?,
                liqblock: liqblock_field(body)?,
            },
            "mint" => BoxOp::Mint {
                tick0: field_str(body, "tick0")?.to_uppercase(),
                amt1: field_amount(body, "amt1")?,
            },
            other => return Err(unsupported_op(TAG, other)),
        };

        Ok(Operation {
            protocol: TAG,
            op: inscription.op.clone(),
            meta,
            payload: Payload::Launch(payload),
        })
    }

    fn verify(&self, conn: &Connection, op: &Operation) -> IndexerResult<()> {
        let height = op.meta.block_number;
        match self.op(op)? {
            BoxOp::Deploy {
                tick0,
                tick1,
                max,
                amt0,
                liqamt,
                liqblock,
            } => verify::box_deploy(conn, tick0, tick1, *max, *amt0, *liqamt, *liqblock, height),
            BoxOp::Mint { tick0, amt1 } => {
                verify::box_mint(conn, tick0, &op.meta.holder, *amt1, height)
            }
        }
    }

    fn apply(&self, ledger: &Ledger<'_, Apply>, op: &Operation) -> IndexerResult<Value> {
        let holder = op.meta.holder.as_str();
        match self.op(op)? {
            BoxOp::Deploy {
                tick0,
                tick1,
                max,
                amt0,
                liqamt,
                liqblock,
            } => {
                let launch = sale::deploy(
                    ledger,
                    &DeployBox {
                        tick0: tick0.clone(),
                        tick1: tick1.clone(),
                        max: *max,
                        amt0: *amt0,
                        liqamt: *liqamt,
                        liqblock: *liqblock,
                        holder: holder.to_string(),
                    },
                )?;
                Ok(json!({ "tick0": launch.tick0, "reserves_address": launch.reserves_address }))
            }
            BoxOp::Mint { tick0, amt1 } => {
                let finished = sale::contribute(ledger, tick0, holder, *amt1)?;
                Ok(json!({ "tick0": tick0, "amt1": amt1, "finished": finished }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::balance;
    use crate::ledger::test_support::{ctx, deploy_tick};
    use crate::protocol::test_support::{inscription, meta, run};
    use crate::sale::BoxStatus;
    use crate::store::test_support::create_test_store;

    #[test]
    fn test_liqblock_accepts_number_or_string() {
        let deploy = |liqblock: Value| {
            BoxHandler.decode(
                &inscription(json!({
                    "p": "box-v1", "op": "deploy", "tick0": "boxt", "tick1": "dogi",
                    "max": "100", "amt0": "10", "liqblock": liqblock
                })),
                meta("t", 1, "DOwner", None),
            )
        };
        for raw in [json!(120), json!("120")] {
            match deploy(raw).unwrap().payload {
                Payload::Launch(BoxOp::Deploy {
                    tick0, liqblock, ..
                }) => {
                    assert_eq!(tick0, "BOXT");
                    assert_eq!(liqblock, 120);
                }
                other => panic!("unexpected payload {:?}", other),
            }
        }
        assert!(deploy(json!("soon")).is_err());
    }

    #[test]
    fn test_target_box_finishes_on_last_mint() {
        let (store, _tmp) = create_test_store();
        store
            .write(|tx| {
                let ledger = Ledger::new(tx, ctx(1));
                deploy_tick(&ledger, "DOGI", None);
                ledger.mint("DOGI", "DAlice", Amount::new(40_000))?;

                run(
                    &BoxHandler,
                    tx,
                    json!({"p": "box-v1", "op": "deploy", "tick0": "BOXT", "tick1": "DOGI",
                           "max": "200000", "amt0": "100000", "liqamt": "40000"}),
                    meta("t1", 2, "DOwner", None),
                )?;
                let out = run(
                    &BoxHandler,
                    tx,
                    json!({"p": "box-v1", "op": "mint", "tick0": "BOXT", "amt1": "40000"}),
                    meta("t2", 3, "DAlice", None),
                )?;
                assert!(out["finished"].is_object());
                assert_eq!(balance(tx, "BOXT", "DAlice")?, Amount::new(100_000));
                assert_eq!(sale::load_box(tx, "BOXT")?.unwrap().status, BoxStatus::Finished);

                let err = run(
                    &BoxHandler,
                    tx,
                    json!({"p": "box-v1", "op": "mint", "tick0": "BOXT", "amt1": "1"}),
                    meta("t3", 4, "DAlice", None),
                )
                .unwrap_err();
                assert!(err.is_rejection());
                Ok(())
            })
            .unwrap();
    }
}
