//! Referral registry: holder -> inviter bindings and lifetime referral rewards

use crate::amount::Amount;
use crate::error::{IndexerError, IndexerResult};
use crate::ledger::revert::RevertEvent;
use crate::ledger::{Apply, Ledger};
use rusqlite::{params, Connection, OptionalExtension};

pub fn inviter_of(conn: &Connection, holder: &str) -> IndexerResult<Option<String>> {
    Ok(conn
        .query_row(
            "SELECT invite_address FROM invite_binding WHERE holder_address = ?1",
            params![holder],
            |row| row.get(0),
        )
        .optional()?)
}

pub fn reward_of(conn: &Connection, holder: &str) -> IndexerResult<Option<Amount>> {
    Ok(conn
        .query_row(
            "SELECT invite_reward FROM invite_reward WHERE holder_address = ?1",
            params![holder],
            |row| row.get(0),
        )
        .optional()?)
}

/// Bind `holder` to `inviter`; a holder can be bound once
pub fn bind(ledger: &Ledger<'_, Apply>, holder: &str, inviter: &str) -> IndexerResult<()> {
    if holder == inviter {
        return Err(IndexerError::validation("the same address cannot be invited"));
    }
    if inviter_of(ledger.conn(), holder)?.is_some() {
        return Err(IndexerError::validation("already invited"));
    }

    ledger.conn().execute(
        "INSERT INTO invite_binding (holder_address, invite_address, block_number) VALUES (?1, ?2, ?3)",
        params![holder, inviter, ledger.ctx().block_number],
    )?;

    ledger.record(&RevertEvent::InviteBind {
        holder: holder.to_string(),
        inviter: inviter.to_string(),
    })
}

/// Add `amt` to the referral reward counter of the trade made by `holder`
pub fn credit_reward(
    ledger: &Ledger<'_, Apply>,
    holder: &str,
    inviter: &str,
    amt: Amount,
) -> IndexerResult<()> {
    let prior = reward_of(ledger.conn(), holder)?;
    let total = prior.unwrap_or(Amount::ZERO).checked_add(amt)?;

    ledger.conn().execute(
        "INSERT INTO invite_reward (holder_address, invite_address, invite_reward)
         VALUES (?1, ?2, ?3)
         ON CONFLICT(holder_address) DO UPDATE SET invite_reward = excluded.invite_reward",
        params![holder, inviter, total],
    )?;

    ledger.record(&RevertEvent::InviteReward {
        holder: holder.to_string(),
        inviter: inviter.to_string(),
        prior_reward: prior,
    })
}

pub(crate) fn unbind(conn: &Connection, holder: &str) -> IndexerResult<()> {
    conn.execute(
        "DELETE FROM invite_binding WHERE holder_address = ?1",
        params![holder],
    )?;
    Ok(())
}

pub(crate) fn restore_reward(
    conn: &Connection,
    holder: &str,
    prior: Option<Amount>,
) -> IndexerResult<()> {
    match prior {
        Some(amt) => {
            conn.execute(
                "UPDATE invite_reward SET invite_reward = ?1 WHERE holder_address = ?2",
                params![amt, holder],
            )?;
        }
        None => {
            conn.execute(
                "DELETE FROM invite_reward WHERE holder_address = ?1",
                params![holder],
            )?;
        }
    }
    Ok(())
}
