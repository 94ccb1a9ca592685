//! `wdoge`: wrap native DOGE into the tick-keyed WDOGE token and back

use super::{
    field_amount, payload_mismatch, unsupported_op, Operation, OperationMeta, Payload,
    ProtocolHandler,
};
use crate::amount::Amount;
use crate::decoder::Inscription;
use crate::error::{IndexerError, IndexerResult};
use crate::ledger::{Apply, Ledger};
use crate::verify;
use crate::wdoge::{self, WDOGE_TICK};
use rusqlite::Connection;
use serde::Serialize;
use serde_json::{json, Value};

pub const TAG: &str = "wdoge";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum WdogeOp {
    Deposit { amt: Amount },
    Withdraw { amt: Amount },
}

pub struct WdogeHandler {
    custody_address: String,
}

impl WdogeHandler {
    pub fn new(custody_address: String) -> Self {
        Self { custody_address }
    }

    fn op<'a>(&self, op: &'a Operation) -> IndexerResult<&'a WdogeOp> {
        match &op.payload {
            Payload::Wdoge(inner) => Ok(inner),
            _ => Err(payload_mismatch(TAG)),
        }
    }
}

impl ProtocolHandler for WdogeHandler {
    fn tag(&self) -> &'static str {
        TAG
    }

    fn decode(&self, inscription: &Inscription, meta: OperationMeta) -> IndexerResult<Operation> {
        let amt = field_amount(&inscription.body, "amt")?;
        let payload = match inscription.op.as_str() {
            "deposit" => WdogeOp::Deposit { amt },
            "withdraw" => WdogeOp::Withdraw { amt },
            other => return Err(unsupported_op(TAG, other)),
        };

        Ok(Operation {
            protocol: TAG,
            op: inscription.op.clone(),
            meta,
            payload: Payload::Wdoge(payload),
        })
    }

    fn verify(&self, conn: &Connection, op: &Operation) -> IndexerResult<()> {
        match self.op(op)? {
            WdogeOp::Deposit { amt } => {
                if amt.is_zero() {
                    return Err(IndexerError::validation("the amount of tokens exceeds the 0"));
                }
                if self.custody_address.is_empty() {
                    return Err(IndexerError::validation("wdoge deposits are disabled"));
                }
                if op.meta.paid_to(&self.custody_address)? < *amt {
                    return Err(IndexerError::validation(
                        "the deposit is not backed by a payment to the custody address",
                    ));
                }
                Ok(())
            }
            WdogeOp::Withdraw { amt } => verify::wdoge_withdraw(conn, &op.meta.holder, *amt),
        }
    }

    fn apply(&self, ledger: &Ledger<'_, Apply>, op: &Operation) -> IndexerResult<Value> {
        let holder = op.meta.holder.as_str();
        match self.op(op)? {
            WdogeOp::Deposit { amt } => {
                wdoge::deposit(ledger, holder, *amt)?;
                Ok(json!({ "tick": WDOGE_TICK, "amt": amt }))
            }
            WdogeOp::Withdraw { amt } => {
                wdoge::withdraw(ledger, holder, *amt)?;
                Ok(json!({ "tick": WDOGE_TICK, "amt": amt }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::balance;
    use crate::protocol::test_support::{meta, run};
    use crate::store::test_support::create_test_store;

    #[test]
    fn test_deposit_must_be_backed_by_payment() {
        let (store, _tmp) = create_test_store();
        store
            .write(|tx| {
                let h = WdogeHandler::new("DCustody".to_string());
                let mut m = meta("t1", 1, "DAlice", None);
                let body = json!({"p": "wdoge", "op": "deposit", "amt": "500000000"});
                assert!(run(&h, tx, body.clone(), m.clone()).is_err());

                m.outputs.push(("DCustody".to_string(), Amount::new(500_000_000)));
                run(&h, tx, body, m)?;
                assert_eq!(balance(tx, WDOGE_TICK, "DAlice")?, Amount::new(500_000_000));

                run(
                    &h,
                    tx,
                    json!({"p": "wdoge", "op": "withdraw", "amt": "100000000"}),
                    meta("t2", 2, "DAlice", None),
                )?;
                assert_eq!(balance(tx, WDOGE_TICK, "DAlice")?, Amount::new(400_000_000));
                Ok(())
            })
            .unwrap();
    }
}
