//! Revert log: the undo log behind fork rollback
//!
//! Every forward mutation appends one tagged [`RevertEvent`] in the same database transaction.
//! Rollback reads events above the common ancestor in descending id order and inverts them.
//! Events that create rows (deploys, pool creation) are appended before the mints and transfers
//! they cause, so the reverse replay empties those rows before deleting them.

use super::TxContext;
use crate::amm::PoolKind;
use crate::amount::Amount;
use crate::error::IndexerResult;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RevertEvent {
    Transfer {
        token: String,
        from: String,
        to: String,
        amt: Amount,
    },
    Mint {
        token: String,
        to: String,
        amt: Amount,
    },
    Burn {
        token: String,
        from: String,
        amt: Amount,
    },
    TokenDeploy {
        token: String,
    },
    /// v2 pool row plus its id-keyed LP token
    PoolCreate {
        pair_id: String,
    },
    /// legacy pool row plus its tick-keyed LP token
    LegacyPoolCreate {
        pair_id: String,
    },
    /// Pool row before an add, remove or swap, restored verbatim
    PoolReserves {
        kind: PoolKind,
        pair_id: String,
        amt0: Amount,
        amt1: Amount,
        liquidity: Amount,
    },
    PumpDeploy {
        tick_id: String,
    },
    /// Pre-trade snapshot of the curve, restored verbatim
    PumpTrade {
        tick_id: String,
        amt0: Amount,
        amt1: Amount,
        king_date: i64,
    },
    /// Curve closed after moving its reserves into a v2 pool
    PumpGraduate {
        tick_id: String,
    },
    /// Referral reward counter before the credit; `None` when the row was created
    InviteReward {
        holder: String,
        inviter: String,
        prior_reward: Option<Amount>,
    },
    InviteBind {
        holder: String,
        inviter: String,
    },
    Stake {
        tick: String,
        holder: String,
        amt: Amount,
        pool_created: bool,
        holder_created: bool,
    },
    Unstake {
        tick: String,
        holder: String,
        amt: Amount,
    },
    StakeClaim {
        tick: String,
        holder: String,
        prior_received: Amount,
    },
    /// Box row plus its contributions
    BoxDeploy {
        tick0: String,
    },
    BoxContribute {
        tick0: String,
        contribution_id: i64,
        prior_raised: Amount,
    },
    /// Box settled into a pool; reopened on undo
    BoxFinish {
        tick0: String,
    },
    /// Box token deleted after its supply was burnt; recreated on undo
    BoxRefund {
        tick0: String,
        transactions: i64,
    },
    OrderCreate {
        ex_id: String,
    },
    /// Fill counters before a trade or cancel, restored verbatim
    OrderProgress {
        ex_id: String,
        amt0_finish: Amount,
        amt1_finish: Amount,
    },
}

impl RevertEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            RevertEvent::Transfer { .. } => "transfer",
            RevertEvent::Mint { .. } => "mint",
            RevertEvent::Burn { .. } => "burn",
            RevertEvent::TokenDeploy { .. } => "token_deploy",
            RevertEvent::PoolCreate { .. } => "pool_create",
            RevertEvent::LegacyPoolCreate { .. } => "legacy_pool_create",
            RevertEvent::PoolReserves { .. } => "pool_reserves",
            RevertEvent::PumpDeploy { .. } => "pump_deploy",
            RevertEvent::PumpTrade { .. } => "pump_trade",
            RevertEvent::PumpGraduate { .. } => "pump_graduate",
            RevertEvent::InviteReward { .. } => "invite_reward",
            RevertEvent::InviteBind { .. } => "invite_bind",
            RevertEvent::Stake { .. } => "stake",
            RevertEvent::Unstake { .. } => "unstake",
            RevertEvent::StakeClaim { .. } => "stake_claim",
            RevertEvent::BoxDeploy { .. } => "box_deploy",
            RevertEvent::BoxContribute { .. } => "box_contribute",
            RevertEvent::BoxFinish { .. } => "box_finish",
            RevertEvent::BoxRefund { .. } => "box_refund",
            RevertEvent::OrderCreate { .. } => "order_create",
            RevertEvent::OrderProgress { .. } => "order_progress",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RevertEntry {
    pub id: i64,
    pub block_number: u64,
    pub tx_hash: String,
    pub event: RevertEvent,
}

pub(crate) fn append(conn: &Connection, ctx: &TxContext, event: &RevertEvent) -> IndexerResult<()> {
    let payload = serde_json::to_string(event)?;
    conn.execute(
        "INSERT INTO revert_log (block_number, tx_hash, event_kind, payload) VALUES (?1, ?2, ?3, ?4)",
        params![ctx.block_number, ctx.tx_hash, event.kind(), payload],
    )?;
    Ok(())
}

/// Entries above `height`, most recent first
pub fn entries_above(conn: &Connection, height: u64) -> IndexerResult<Vec<RevertEntry>> {
    let mut stmt = conn.prepare(
        "SELECT id, block_number, tx_hash, payload FROM revert_log
         WHERE block_number > ?1 ORDER BY id DESC",
    )?;
    let rows = stmt.query_map(params![height], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, u64>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
        ))
    })?;

    let mut entries = Vec::new();
    for row in rows {
        let (id, block_number, tx_hash, payload) = row?;
        entries.push(RevertEntry {
            id,
            block_number,
            tx_hash,
            event: serde_json::from_str(&payload)?,
        });
    }
    Ok(entries)
}

pub fn delete_above(conn: &Connection, height: u64) -> IndexerResult<usize> {
    Ok(conn.execute(
        "DELETE FROM revert_log WHERE block_number > ?1",
        params![height],
    )?)
}

pub fn count(conn: &Connection) -> IndexerResult<i64> {
    Ok(conn.query_row("SELECT COUNT(*) FROM revert_log", [], |row| row.get(0))?)
}
