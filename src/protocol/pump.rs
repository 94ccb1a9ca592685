//! `pump`: bonding-curve launches and trades against the curve

use super::{
    field_amount, field_str, opt_amount, opt_str, payload_mismatch, unsupported_op, Operation,
    OperationMeta, Payload, ProtocolHandler,
};
use crate::amount::Amount;
use crate::decoder::Inscription;
use crate::error::{IndexerError, IndexerResult};
use crate::ledger::{Apply, Ledger};
use crate::pump::engine::{deploy, trade, DeployPump, TradePump};
use crate::verify;
use crate::wdoge::WDOGE_TICK;
use rusqlite::Connection;
use serde::Serialize;
use serde_json::Value;

pub const TAG: &str = "pump";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PumpOp {
    Deploy {
        tick_id: String,
        symbol: String,
        name: String,
        tick1_id: String,
        reserve: u8,
        amt1: Amount,
    },
    Trade {
        tick_id: String,
        tick_in: String,
        amt_in: Amount,
        amt_out_min: Amount,
    },
}

pub struct PumpHandler;

impl PumpHandler {
    fn op<'a>(&self, op: &'a Operation) -> IndexerResult<&'a PumpOp> {
        match &op.payload {
            Payload::Pump(inner) => Ok(inner),
            _ => Err(payload_mismatch(TAG)),
        }
    }
}

/// `reserve` is a percentage, sent either as a number or a numeric string
fn reserve_field(body: &Value) -> IndexerResult<u8> {
    let raw = match body.get("reserve") {
        None | Some(Value::Null) => return Ok(0),
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) if s.is_empty() => return Ok(0),
        Some(Value::String(s)) => s.trim().parse::<u64>().ok(),
        Some(_) => None,
    };
    raw.and_then(|r| u8::try_from(r).ok())
        .ok_or_else(|| IndexerError::Decode("reserve is not a percentage".to_string()))
}

impl ProtocolHandler for PumpHandler {
    fn tag(&self) -> &'static str {
        TAG
    }

    fn decode(&self, inscription: &Inscription, meta: OperationMeta) -> IndexerResult<Operation> {
        let body = &inscription.body;
        let payload = match inscription.op.as_str() {
            "deploy" => PumpOp::Deploy {
                tick_id: meta.tx_hash.clone(),
                symbol: field_str(body, "symbol")?,
                name: opt_str(body, "name").unwrap_or_default(),
                tick1_id: opt_str(body, "tick").unwrap_or_else(|| WDOGE_TICK.to_string()),
                reserve: reserve_field(body)?,
                amt1: opt_amount(body, "amt")?,
            },
            "trade" => PumpOp::Trade {
                tick_id: field_str(body, "pair_id")?,
                tick_in: field_str(body, "tick0_id")?,
                amt_in: field_amount(body, "amt0")?,
                amt_out_min: opt_amount(body, "amt1_min")?,
            },
            other => return Err(unsupported_op(TAG, other)),
        };

        Ok(Operation {
            protocol: TAG,
            op: inscription.op.clone(),
            meta,
            payload: Payload::Pump(payload),
        })
    }

    fn verify(&self, conn: &Connection, op: &Operation) -> IndexerResult<()> {
        let holder = op.meta.holder.as_str();
        match self.op(op)? {
            PumpOp::Deploy {
                tick_id,
                symbol,
                tick1_id,
                reserve,
                amt1,
                ..
            } => {
                if symbol.is_empty() || symbol.chars().count() > 32 {
                    return Err(IndexerError::validation("symbol is invalid"));
                }
                verify::pump_deploy(conn, tick_id, tick1_id, *reserve, *amt1, holder)
            }
            PumpOp::Trade {
                tick_id,
                tick_in,
                amt_in,
                ..
            } => verify::pump_trade(conn, tick_id, holder, tick_in, *amt_in, op.meta.block_number),
        }
    }

    fn apply(&self, ledger: &Ledger<'_, Apply>, op: &Operation) -> IndexerResult<Value> {
        let holder = op.meta.holder.clone();
        let outcome = match self.op(op)? {
            PumpOp::Deploy {
                tick_id,
                symbol,
                name,
                tick1_id,
                reserve,
                amt1,
            } => serde_json::to_value(deploy(
                ledger,
                &DeployPump {
                    tick_id: tick_id.clone(),
                    symbol: symbol.clone(),
                    name: name.clone(),
                    tick1_id: tick1_id.clone(),
                    reserve: *reserve,
                    amt1: *amt1,
                    holder,
                },
            )?)?,
            PumpOp::Trade {
                tick_id,
                tick_in,
                amt_in,
                amt_out_min,
            } => serde_json::to_value(trade(
                ledger,
                &TradePump {
                    tick_id: tick_id.clone(),
                    tick_in: tick_in.clone(),
                    amt_in: *amt_in,
                    amt_out_min: *amt_out_min,
                    holder,
                },
            )?)?,
        };
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{balance, test_support::ctx};
    use crate::protocol::test_support::{meta, run};
    use crate::pump::{load_pool, MEME_MAX};
    use crate::store::test_support::create_test_store;
    use crate::wdoge;
    use serde_json::json;

    #[test]
    fn test_deploy_keys_token_by_tx_hash() {
        let (store, _tmp) = create_test_store();
        let tick_id = "d".repeat(64);
        store
            .write(|tx| {
                let out = run(
                    &PumpHandler,
                    tx,
                    json!({"p": "pump", "op": "deploy", "symbol": "FROG", "name": "Frog", "tick": WDOGE_TICK, "reserve": "5"}),
                    meta(&tick_id, 1, "DCreator", None),
                )?;
                assert_eq!(out["tick_id"], tick_id.as_str());
                assert_eq!(
                    balance(tx, &tick_id, "DCreator")?,
                    Amount::new(MEME_MAX / 100 * 5)
                );
                assert!(load_pool(tx, &tick_id)?.is_some());
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_reserve_with_initial_buy_rejected() {
        let (store, _tmp) = create_test_store();
        store
            .write(|tx| {
                let err = run(
                    &PumpHandler,
                    tx,
                    json!({"p": "pump", "op": "deploy", "symbol": "FROG", "reserve": 5, "amt": "100"}),
                    meta(&"e".repeat(64), 1, "DCreator", None),
                )
                .unwrap_err();
                assert!(err.is_rejection());
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_trade_buys_from_curve() {
        let (store, _tmp) = create_test_store();
        let tick_id = "f".repeat(64);
        store
            .write(|tx| {
                run(
                    &PumpHandler,
                    tx,
                    json!({"p": "pump", "op": "deploy", "symbol": "FROG"}),
                    meta(&tick_id, 1, "DCreator", None),
                )?;
                wdoge::deposit(&Ledger::new(tx, ctx(1)), "DBuyer", Amount::new(1_000_000_000))?;

                let out = run(
                    &PumpHandler,
                    tx,
                    json!({"p": "pump", "op": "trade", "pair_id": tick_id, "tick0_id": WDOGE_TICK, "amt0": "1000000000"}),
                    meta("t2", 2, "DBuyer", None),
                )?;
                assert_eq!(out["tick_out"], tick_id.as_str());
                assert!(balance(tx, &tick_id, "DBuyer")? > Amount::ZERO);
                assert_eq!(balance(tx, WDOGE_TICK, "DBuyer")?, Amount::ZERO);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_decode_rejects_bad_reserve() {
        let err = PumpHandler
            .decode(
                &crate::protocol::test_support::inscription(
                    json!({"p": "pump", "op": "deploy", "symbol": "X", "reserve": "300"}),
                ),
                meta("t", 1, "D", None),
            )
            .unwrap_err();
        assert!(matches!(err, IndexerError::Decode(_)));
    }
}
