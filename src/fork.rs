//! Fork detection and rollback
//!
//! Before a height is processed its node-reported parent hash is compared with the stored hash
//! of the previous height. On mismatch the engine walks back one height at a time until the
//! stored and node hashes agree (the common ancestor), then undoes everything above it in one
//! database transaction by replaying the revert log newest-first.

use crate::amm::{self, PoolKind};
use crate::chain::{BlockDetail, ChainReader};
use crate::error::{IndexerError, IndexerResult};
use crate::invite;
use crate::ledger::revert::{self, RevertEvent};
use crate::ledger::{Ledger, Undo};
use crate::order;
use crate::pump;
use crate::sale;
use crate::stake;
use crate::store::{blocks, operations, Store};
use rusqlite::Connection;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Synced,
    Reconciling,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RollbackReport {
    pub ancestor: u64,
    pub events_undone: usize,
    pub operations_removed: usize,
    pub blocks_removed: usize,
}

/// True when `block`'s parent is not the block stored one height below it
pub fn diverges(conn: &Connection, block: &BlockDetail) -> IndexerResult<bool> {
    if block.height == 0 {
        return Ok(false);
    }
    let Some(local) = blocks::hash_at(conn, block.height - 1)? else {
        return Ok(false);
    };
    Ok(block.previous_hash.as_deref() != Some(local.as_str()))
}

/// Walk down from `from_height` until the stored hash matches the node's
///
/// A height with no stored block counts as the ancestor: nothing at or below it was indexed.
pub async fn find_common_ancestor<R: ChainReader + ?Sized>(
    reader: &R,
    store: &Store,
    from_height: u64,
) -> IndexerResult<u64> {
    let mut height = from_height;
    loop {
        let local = store.read(|conn| blocks::hash_at(conn, height))?;
        let Some(local) = local else {
            return Ok(height);
        };

        let remote = reader.block_hash(height).await?;
        if remote == local {
            return Ok(height);
        }

        log::warn!("🔄 height {} diverged (local {} node {})", height, local, remote);

        if height == 0 {
            return Err(IndexerError::ForkReplay(
                "no common ancestor down to genesis".to_string(),
            ));
        }
        height -= 1;
    }
}

/// Invert one forward mutation
pub(crate) fn undo_event(ledger: &Ledger<'_, Undo>, event: &RevertEvent) -> IndexerResult<()> {
    let conn = ledger.conn();
    match event {
        RevertEvent::Transfer {
            token,
            from,
            to,
            amt,
        } => ledger.transfer(token, to, from, *amt),
        RevertEvent::Mint { token, to, amt } => ledger.burn(token, to, *amt),
        RevertEvent::Burn { token, from, amt } => ledger.mint(token, from, *amt),
        RevertEvent::TokenDeploy { token } => ledger.delete_token(token),
        RevertEvent::PoolCreate { pair_id } => amm::delete_pool(conn, PoolKind::V2, pair_id),
        RevertEvent::LegacyPoolCreate { pair_id } => {
            amm::delete_pool(conn, PoolKind::Legacy, pair_id)
        }
        RevertEvent::PoolReserves {
            kind,
            pair_id,
            amt0,
            amt1,
            liquidity,
        } => amm::write_reserves(conn, *kind, pair_id, *amt0, *amt1, *liquidity),
        RevertEvent::PumpDeploy { tick_id } => pump::delete_pool(conn, tick_id),
        RevertEvent::PumpTrade {
            tick_id,
            amt0,
            amt1,
            king_date,
        } => pump::write_curve(conn, tick_id, *amt0, *amt1, *king_date),
        RevertEvent::PumpGraduate { tick_id } => pump::set_graduated(conn, tick_id, false),
        RevertEvent::InviteReward {
            holder,
            prior_reward,
            ..
        } => invite::restore_reward(conn, holder, *prior_reward),
        RevertEvent::InviteBind { holder, .. } => invite::unbind(conn, holder),
        RevertEvent::Stake {
            tick,
            holder,
            amt,
            pool_created,
            holder_created,
        } => stake::undo_stake(conn, tick, holder, *amt, *pool_created, *holder_created),
        RevertEvent::Unstake { tick, holder, amt } => {
            stake::undo_unstake(conn, tick, holder, *amt)
        }
        RevertEvent::StakeClaim {
            tick,
            holder,
            prior_received,
        } => stake::restore_received(conn, tick, holder, *prior_received),
        RevertEvent::BoxDeploy { tick0 } => sale::delete_box(conn, tick0),
        RevertEvent::BoxContribute {
            tick0,
            contribution_id,
            prior_raised,
        } => sale::undo_contribution(conn, tick0, *contribution_id, *prior_raised),
        RevertEvent::BoxFinish { tick0 } => sale::reopen(conn, tick0),
        RevertEvent::BoxRefund {
            tick0,
            transactions,
        } => sale::undo_refund(conn, tick0, *transactions),
        RevertEvent::OrderCreate { ex_id } => order::delete_order(conn, ex_id),
        RevertEvent::OrderProgress {
            ex_id,
            amt0_finish,
            amt1_finish,
        } => order::write_progress(conn, ex_id, *amt0_finish, *amt1_finish),
    }
}

/// Undo every mutation above `ancestor` and drop the rows that recorded them
///
/// Runs on the caller's transaction; any error leaves the caller to roll everything back.
pub fn rollback_to(conn: &Connection, ancestor: u64) -> IndexerResult<RollbackReport> {
    let entries = revert::entries_above(conn, ancestor)?;
    let undo = Ledger::undo(conn);

    for entry in &entries {
        undo_event(&undo, &entry.event).map_err(|e| {
            IndexerError::ForkReplay(format!(
                "undo {} #{} (tx {} at {}): {}",
                entry.event.kind(),
                entry.id,
                entry.tx_hash,
                entry.block_number,
                e
            ))
        })?;
    }

    revert::delete_above(conn, ancestor)?;
    let operations_removed = operations::delete_above(conn, ancestor)?;
    let blocks_removed = blocks::delete_above(conn, ancestor)?;

    Ok(RollbackReport {
        ancestor,
        events_undone: entries.len(),
        operations_removed,
        blocks_removed,
    })
}
