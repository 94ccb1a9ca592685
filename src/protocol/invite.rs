//! `invite`: bind a holder to the address that referred them

use super::{
    field_str, payload_mismatch, unsupported_op, Operation, OperationMeta, Payload,
    ProtocolHandler,
};
use crate::decoder::Inscription;
use crate::error::IndexerResult;
use crate::invite;
use crate::ledger::{Apply, Ledger};
use crate::verify;
use rusqlite::Connection;
use serde::Serialize;
use serde_json::{json, Value};

pub const TAG: &str = "invite";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum InviteOp {
    Deploy { invite_address: String },
}

pub struct InviteHandler;

impl InviteHandler {
    fn op<'a>(&self, op: &'a Operation) -> IndexerResult<&'a InviteOp> {
        match &op.payload {
            Payload::Invite(inner) => Ok(inner),
            _ => Err(payload_mismatch(TAG)),
        }
    }
}

impl ProtocolHandler for InviteHandler {
    fn tag(&self) -> &'static str {
        TAG
    }

    fn decode(&self, inscription: &Inscription, meta: OperationMeta) -> IndexerResult<Operation> {
        let payload = match inscription.op.as_str() {
            "deploy" => InviteOp::Deploy {
                invite_address: field_str(&inscription.body, "invite_address")?,
            },
            other => return Err(unsupported_op(TAG, other)),
        };

        Ok(Operation {
            protocol: TAG,
            op: inscription.op.clone(),
            meta,
            payload: Payload::Invite(payload),
        })
    }

    fn verify(&self, conn: &Connection, op: &Operation) -> IndexerResult<()> {
        let InviteOp::Deploy { invite_address } = self.op(op)?;
        verify::invite_bind(conn, &op.meta.holder, invite_address)
    }

    fn apply(&self, ledger: &Ledger<'_, Apply>, op: &Operation) -> IndexerResult<Value> {
        let InviteOp::Deploy { invite_address } = self.op(op)?;
        invite::bind(ledger, &op.meta.holder, invite_address)?;
        Ok(json!({ "invite_address": invite_address }))
    }
}
