//! `stake-v1`: lock tick tokens into a per-tick stake pool and claim its rewards

use super::{
    field_amount, field_str, payload_mismatch, unsupported_op, Operation, OperationMeta, Payload,
    ProtocolHandler,
};
use crate::amount::Amount;
use crate::decoder::Inscription;
use crate::error::IndexerResult;
use crate::ledger::{Apply, Ledger};
use crate::stake;
use crate::verify;
use rusqlite::Connection;
use serde::Serialize;
use serde_json::{json, Value};

pub const TAG: &str = "stake-v1";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum StakeOp {
    Stake { tick: String, amt: Amount },
    Unstake { tick: String, amt: Amount },
    ClaimReward { tick: String },
}

pub struct StakeHandler;

impl StakeHandler {
    fn op<'a>(&self, op: &'a Operation) -> IndexerResult<&'a StakeOp> {
        match &op.payload {
            Payload::Stake(inner) => Ok(inner),
            _ => Err(payload_mismatch(TAG)),
        }
    }
}

impl ProtocolHandler for StakeHandler {
    fn tag(&self) -> &'static str {
        TAG
    }

    fn decode(&self, inscription: &Inscription, meta: OperationMeta) -> IndexerResult<Operation> {
        let body = &inscription.body;
        let tick = field_str(body, "tick")?.to_uppercase();
        let payload = match inscription.op.as_str() {
            "stake" => StakeOp::Stake {
                tick,
                amt: field_amount(body, "amt")?,
            },
            "unstake" => StakeOp::Unstake {
                tick,
                amt: field_amount(body, "amt")?,
            },
            "getallreward" => StakeOp::ClaimReward { tick },
            other => return Err(unsupported_op(TAG, other)),
        };

        Ok(Operation {
            protocol: TAG,
            op: inscription.op.clone(),
            meta,
            payload: Payload::Stake(payload),
        })
    }

    fn verify(&self, conn: &Connection, op: &Operation) -> IndexerResult<()> {
        let holder = op.meta.holder.as_str();
        match self.op(op)? {
            StakeOp::Stake { tick, amt } => verify::stake(conn, tick, holder, *amt),
            StakeOp::Unstake { tick, amt } => verify::unstake(conn, tick, holder, *amt),
            StakeOp::ClaimReward { tick } => verify::stake_claim(conn, tick, holder),
        }
    }

    fn apply(&self, ledger: &Ledger<'_, Apply>, op: &Operation) -> IndexerResult<Value> {
        let holder = op.meta.holder.as_str();
        match self.op(op)? {
            StakeOp::Stake { tick, amt } => {
                stake::stake(ledger, tick, holder, *amt)?;
                Ok(json!({ "tick": tick, "amt": amt }))
            }
            StakeOp::Unstake { tick, amt } => {
                stake::unstake(ledger, tick, holder, *amt)?;
                Ok(json!({ "tick": tick, "amt": amt }))
            }
            StakeOp::ClaimReward { tick } => {
                let reward = stake::claim_reward(ledger, tick, holder)?;
                Ok(json!({ "tick": tick, "reward": reward }))
            }
        }
    }
}
