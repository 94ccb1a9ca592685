//! Stake pools: tokens parked on a per-tick custodial address
//!
//! Anything the reserves address holds beyond the pool total is reward. A holder claims their
//! share of it pro rata to what they have staked.

use crate::address::stake_reserves_address;
use crate::amount::Amount;
use crate::error::{IndexerError, IndexerResult};
use crate::ledger::revert::RevertEvent;
use crate::ledger::{balance, Apply, Ledger};
use rusqlite::{params, Connection, OptionalExtension};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StakePool {
    pub tick: String,
    pub amt: Amount,
    pub reserves_address: String,
}

pub fn load_pool(conn: &Connection, tick: &str) -> IndexerResult<Option<StakePool>> {
    Ok(conn
        .query_row(
            "SELECT tick, amt, reserves_address FROM stake_pool WHERE tick = ?1",
            params![tick],
            |row| {
                Ok(StakePool {
                    tick: row.get(0)?,
                    amt: row.get(1)?,
                    reserves_address: row.get(2)?,
                })
            },
        )
        .optional()?)
}

pub fn staked(conn: &Connection, tick: &str, holder: &str) -> IndexerResult<Option<Amount>> {
    Ok(conn
        .query_row(
            "SELECT amt FROM stake_holder WHERE tick = ?1 AND holder_address = ?2",
            params![tick, holder],
            |row| row.get(0),
        )
        .optional()?)
}

fn write_pool(conn: &Connection, tick: &str, amt: Amount) -> IndexerResult<()> {
    conn.execute(
        "UPDATE stake_pool SET amt = ?1 WHERE tick = ?2",
        params![amt, tick],
    )?;
    Ok(())
}

fn write_holder(conn: &Connection, tick: &str, holder: &str, amt: Amount) -> IndexerResult<()> {
    conn.execute(
        "INSERT INTO stake_holder (tick, holder_address, amt) VALUES (?1, ?2, ?3)
         ON CONFLICT(tick, holder_address) DO UPDATE SET amt = excluded.amt",
        params![tick, holder, amt],
    )?;
    Ok(())
}

/// Lifetime rewards claimed by `holder` from the `tick` pool
pub fn received_reward(conn: &Connection, tick: &str, holder: &str) -> IndexerResult<Amount> {
    Ok(conn
        .query_row(
            "SELECT received_reward FROM stake_holder WHERE tick = ?1 AND holder_address = ?2",
            params![tick, holder],
            |row| row.get(0),
        )
        .optional()?
        .unwrap_or(Amount::ZERO))
}

fn write_received(conn: &Connection, tick: &str, holder: &str, amt: Amount) -> IndexerResult<()> {
    conn.execute(
        "UPDATE stake_holder SET received_reward = ?1 WHERE tick = ?2 AND holder_address = ?3",
        params![amt, tick, holder],
    )?;
    Ok(())
}

/// Claimable now: `staked * (reserves balance - pool total) / pool total`
pub fn pending_reward(conn: &Connection, tick: &str, holder: &str) -> IndexerResult<Amount> {
    let Some(pool) = load_pool(conn, tick)? else {
        return Ok(Amount::ZERO);
    };
    let held = staked(conn, tick, holder)?.unwrap_or(Amount::ZERO);
    if held.is_zero() || pool.amt.is_zero() {
        return Ok(Amount::ZERO);
    }
    let on_reserves = balance(conn, tick, &pool.reserves_address)?;
    if on_reserves <= pool.amt {
        return Ok(Amount::ZERO);
    }
    let surplus = on_reserves.checked_sub(pool.amt)?;
    held.checked_mul(surplus)?.checked_div(pool.amt)
}

/// Pay out the holder's share of the pool surplus
pub fn claim_reward(ledger: &Ledger<'_, Apply>, tick: &str, holder: &str) -> IndexerResult<Amount> {
    let conn = ledger.conn();
    let pool = load_pool(conn, tick)?
        .ok_or_else(|| IndexerError::validation("stake pool does not exist"))?;
    let reward = pending_reward(conn, tick, holder)?;
    if reward.is_zero() {
        return Err(IndexerError::validation("no reward to claim"));
    }

    let prior_received = received_reward(conn, tick, holder)?;
    ledger.record(&RevertEvent::StakeClaim {
        tick: tick.to_string(),
        holder: holder.to_string(),
        prior_received,
    })?;
    ledger.transfer(tick, &pool.reserves_address, holder, reward)?;
    write_received(conn, tick, holder, prior_received.checked_add(reward)?)?;

    log::info!("🎁 stake reward {} {} -> {}", reward, tick, holder);
    Ok(reward)
}

/// Lock `amt` of `tick` into the stake pool, creating the pool on first use
pub fn stake(ledger: &Ledger<'_, Apply>, tick: &str, holder: &str, amt: Amount) -> IndexerResult<()> {
    if amt.is_zero() {
        return Err(IndexerError::validation("amt must be greater than 0"));
    }
    if balance(ledger.conn(), tick, holder)? < amt {
        return Err(IndexerError::validation(
            "the amount of tokens exceeds the balance",
        ));
    }

    let conn = ledger.conn();
    let (pool, pool_created) = match load_pool(conn, tick)? {
        Some(pool) => (pool, false),
        None => {
            let pool = StakePool {
                tick: tick.to_string(),
                amt: Amount::ZERO,
                reserves_address: stake_reserves_address(tick),
            };
            conn.execute(
                "INSERT INTO stake_pool (tick, amt, reserves_address) VALUES (?1, ?2, ?3)",
                params![pool.tick, pool.amt, pool.reserves_address],
            )?;
            (pool, true)
        }
    };

    let prior = staked(conn, tick, holder)?;
    let holder_created = prior.is_none();

    ledger.transfer(tick, holder, &pool.reserves_address, amt)?;
    write_pool(conn, tick, pool.amt.checked_add(amt)?)?;
    write_holder(conn, tick, holder, prior.unwrap_or(Amount::ZERO).checked_add(amt)?)?;

    ledger.record(&RevertEvent::Stake {
        tick: tick.to_string(),
        holder: holder.to_string(),
        amt,
        pool_created,
        holder_created,
    })
}

/// Release `amt` of previously staked `tick` back to the holder
pub fn unstake(ledger: &Ledger<'_, Apply>, tick: &str, holder: &str, amt: Amount) -> IndexerResult<()> {
    if amt.is_zero() {
        return Err(IndexerError::validation("amt must be greater than 0"));
    }
    let conn = ledger.conn();
    let pool = load_pool(conn, tick)?
        .ok_or_else(|| IndexerError::validation("stake pool does not exist"))?;
    let held = staked(conn, tick, holder)?.unwrap_or(Amount::ZERO);
    if held < amt {
        return Err(IndexerError::validation(
            "the amount of tokens exceeds the staked amount",
        ));
    }

    ledger.transfer(tick, &pool.reserves_address, holder, amt)?;
    write_pool(conn, tick, pool.amt.checked_sub(amt)?)?;
    write_holder(conn, tick, holder, held.checked_sub(amt)?)?;

    ledger.record(&RevertEvent::Unstake {
        tick: tick.to_string(),
        holder: holder.to_string(),
        amt,
    })
}

/// Inverse of [`stake`]'s bookkeeping; the token transfer is undone separately
pub(crate) fn undo_stake(
    conn: &Connection,
    tick: &str,
    holder: &str,
    amt: Amount,
    pool_created: bool,
    holder_created: bool,
) -> IndexerResult<()> {
    if holder_created {
        conn.execute(
            "DELETE FROM stake_holder WHERE tick = ?1 AND holder_address = ?2",
            params![tick, holder],
        )?;
    } else {
        let held = staked(conn, tick, holder)?.unwrap_or(Amount::ZERO);
        write_holder(conn, tick, holder, held.checked_sub(amt)?)?;
    }

    if pool_created {
        conn.execute("DELETE FROM stake_pool WHERE tick = ?1", params![tick])?;
    } else if let Some(pool) = load_pool(conn, tick)? {
        write_pool(conn, tick, pool.amt.checked_sub(amt)?)?;
    }
    Ok(())
}

pub(crate) fn restore_received(
    conn: &Connection,
    tick: &str,
    holder: &str,
    prior_received: Amount,
) -> IndexerResult<()> {
    write_received(conn, tick, holder, prior_received)
}

pub(crate) fn undo_unstake(conn: &Connection, tick: &str, holder: &str, amt: Amount) -> IndexerResult<()> {
    let held = staked(conn, tick, holder)?.unwrap_or(Amount::ZERO);
    write_holder(conn, tick, holder, held.checked_add(amt)?)?;
    if let Some(pool) = load_pool(conn, tick)? {
        write_pool(conn, tick, pool.amt.checked_add(amt)?)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::test_support::{ctx, deploy_tick};
    use crate::store::test_support::create_test_store;

    #[test]
    fn test_stake_and_unstake_move_tokens_through_reserves() {
        let (store, _tmp) = create_test_store();
        store
            .write(|tx| {
                let ledger = Ledger::new(tx, ctx(1));
                deploy_tick(&ledger, "DOGI", None);
                ledger.mint("DOGI", "A", Amount::new(1_000))?;

                stake(&ledger, "DOGI", "A", Amount::new(400))?;
                let pool = load_pool(tx, "DOGI")?.unwrap();
                assert_eq!(pool.amt, Amount::new(400));
                assert_eq!(balance(tx, "DOGI", &pool.reserves_address)?, Amount::new(400));
                assert_eq!(balance(tx, "DOGI", "A")?, Amount::new(600));

                assert!(unstake(&ledger, "DOGI", "A", Amount::new(401)).is_err());
                unstake(&ledger, "DOGI", "A", Amount::new(150))?;
                assert_eq!(staked(tx, "DOGI", "A")?, Some(Amount::new(250)));
                assert_eq!(load_pool(tx, "DOGI")?.unwrap().amt, Amount::new(250));
                assert_eq!(balance(tx, "DOGI", "A")?, Amount::new(750));
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_stake_rejects_over_balance() {
        let (store, _tmp) = create_test_store();
        store
            .write(|tx| {
                let ledger = Ledger::new(tx, ctx(1));
                deploy_tick(&ledger, "DOGI", None);
                ledger.mint("DOGI", "A", Amount::new(10))?;
                assert!(stake(&ledger, "DOGI", "A", Amount::new(11)).is_err());
                assert!(stake(&ledger, "DOGI", "A", Amount::ZERO).is_err());
                assert!(load_pool(tx, "DOGI")?.is_none());
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_claim_pays_share_of_surplus() {
        let (store, _tmp) = create_test_store();
        store
            .write(|tx| {
                let ledger = Ledger::new(tx, ctx(1));
                deploy_tick(&ledger, "DOGI", None);
                ledger.mint("DOGI", "A", Amount::new(300))?;
                ledger.mint("DOGI", "B", Amount::new(100))?;
                ledger.mint("DOGI", "DONOR", Amount::new(1_000))?;

                stake(&ledger, "DOGI", "A", Amount::new(300))?;
                stake(&ledger, "DOGI", "B", Amount::new(100))?;
                assert!(claim_reward(&ledger, "DOGI", "A").is_err());

                let reserves = stake_reserves_address("DOGI");
                ledger.transfer("DOGI", "DONOR", &reserves, Amount::new(400))?;
                assert_eq!(pending_reward(tx, "DOGI", "B")?, Amount::new(100));

                assert_eq!(claim_reward(&ledger, "DOGI", "A")?, Amount::new(300));
                assert_eq!(balance(tx, "DOGI", "A")?, Amount::new(300));
                assert_eq!(received_reward(tx, "DOGI", "A")?, Amount::new(300));
                assert_eq!(staked(tx, "DOGI", "A")?, Some(Amount::new(300)));
                assert_eq!(balance(tx, "DOGI", &reserves)?, Amount::new(500));
                assert_eq!(pending_reward(tx, "DOGI", "B")?, Amount::new(25));
                assert!(claim_reward(&ledger, "DOGI", "NOBODY").is_err());
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_undo_stake_removes_created_rows() {
        let (store, _tmp) = create_test_store();
        store
            .write(|tx| {
                let ledger = Ledger::new(tx, ctx(1));
                deploy_tick(&ledger, "DOGI", None);
                ledger.mint("DOGI", "A", Amount::new(10))?;
                stake(&ledger, "DOGI", "A", Amount::new(10))?;

                undo_stake(tx, "DOGI", "A", Amount::new(10), true, true)?;
                assert!(load_pool(tx, "DOGI")?.is_none());
                assert!(staked(tx, "DOGI", "A")?.is_none());
                Ok(())
            })
            .unwrap();
    }
}
