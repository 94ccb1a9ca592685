//! Launch boxes (`box-v1`)
//!
//! A deploy creates the tick0 token and mints its whole supply to the box's reserves address.
//! Contributors then pay tick1 into the box until it settles, either inline once `liqamt` is
//! raised or from the scheduled task at height `liqblock`:
//! - finish: `amt0` of tick0 and everything raised seed a legacy pool owned by the reserves
//!   address, and another `amt0` of tick0 is split among contributors pro rata
//! - refund: the tick0 supply is burnt, the token deleted and every contribution paid back

use crate::address::box_reserves_address;
use crate::amm::engine::{create_pool, CreatePool, LiquidityOutcome};
use crate::amm::math::initial_liquidity;
use crate::amm::PoolKind;
use crate::amount::Amount;
use crate::error::{IndexerError, IndexerResult};
use crate::ledger::revert::RevertEvent;
use crate::ledger::{aggregate, balance, Apply, Ledger, NewToken};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BoxStatus {
    Open = 0,
    Finished = 1,
    Refunded = 2,
}

impl BoxStatus {
    fn from_code(code: i64) -> Self {
        match code {
            1 => BoxStatus::Finished,
            2 => BoxStatus::Refunded,
            _ => BoxStatus::Open,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchBox {
    pub tick0: String,
    pub tick1: String,
    pub max: Amount,
    pub amt0: Amount,
    /// Raise target; zero when the box closes by height instead
    pub liqamt: Amount,
    /// Closing height; zero when the box closes by target instead
    pub liqblock: u64,
    pub raised: Amount,
    pub amt0_finish: Amount,
    pub status: BoxStatus,
    pub holder: String,
    pub reserves_address: String,
}

#[derive(Debug, Clone)]
pub struct DeployBox {
    pub tick0: String,
    pub tick1: String,
    pub max: Amount,
    pub amt0: Amount,
    pub liqamt: Amount,
    pub liqblock: u64,
    pub holder: String,
}

const BOX_COLUMNS: &str = "tick0, tick1, max_supply, amt0, liqamt, liqblock, liqamt_finish, \
                           amt0_finish, status, holder_address, reserves_address";

fn box_from_row(row: &Row<'_>) -> rusqlite::Result<LaunchBox> {
    Ok(LaunchBox {
        tick0: row.get(0)?,
        tick1: row.get(1)?,
        max: row.get(2)?,
        amt0: row.get(3)?,
        liqamt: row.get(4)?,
        liqblock: row.get(5)?,
        raised: row.get(6)?,
        amt0_finish: row.get(7)?,
        status: BoxStatus::from_code(row.get(8)?),
        holder: row.get(9)?,
        reserves_address: row.get(10)?,
    })
}

pub fn load_box(conn: &Connection, tick0: &str) -> IndexerResult<Option<LaunchBox>> {
    let sql = format!("SELECT {} FROM box_collect WHERE tick0 = ?1", BOX_COLUMNS);
    Ok(conn
        .query_row(&sql, params![tick0], box_from_row)
        .optional()?)
}

/// Open boxes whose closing height is `height`
pub fn due_at(conn: &Connection, height: u64) -> IndexerResult<Vec<LaunchBox>> {
    let sql = format!(
        "SELECT {} FROM box_collect WHERE liqblock = ?1 AND status = ?2 ORDER BY tick0",
        BOX_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![height, BoxStatus::Open as i64], box_from_row)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

/// `(holder, amt)` per contribution in arrival order
pub fn contributions(conn: &Connection, tick0: &str) -> IndexerResult<Vec<(String, Amount)>> {
    let mut stmt = conn.prepare(
        "SELECT holder_address, amt FROM box_contribution WHERE tick0 = ?1 ORDER BY id",
    )?;
    let rows = stmt.query_map(params![tick0], |row| Ok((row.get(0)?, row.get(1)?)))?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

fn set_status(
    conn: &Connection,
    tick0: &str,
    status: BoxStatus,
    amt0_finish: Amount,
) -> IndexerResult<()> {
    conn.execute(
        "UPDATE box_collect SET status = ?1, amt0_finish = ?2 WHERE tick0 = ?3",
        params![status as i64, amt0_finish, tick0],
    )?;
    Ok(())
}

fn set_raised(conn: &Connection, tick0: &str, raised: Amount) -> IndexerResult<()> {
    conn.execute(
        "UPDATE box_collect SET liqamt_finish = ?1 WHERE tick0 = ?2",
        params![raised, tick0],
    )?;
    Ok(())
}

/// Create the box token, park its supply on the reserves address and open the box
pub fn deploy(ledger: &Ledger<'_, Apply>, req: &DeployBox) -> IndexerResult<LaunchBox> {
    let conn = ledger.conn();
    if load_box(conn, &req.tick0)?.is_some() {
        return Err(IndexerError::validation("the contract has been deployed"));
    }

    let reserves = box_reserves_address(&req.tick0);
    ledger.deploy_token(&NewToken {
        token: req.tick0.clone(),
        symbol: req.tick0.clone(),
        name: String::new(),
        max_supply: Some(req.max),
        lim: Some(req.max),
        holder: req.holder.clone(),
    })?;
    ledger.mint(&req.tick0, &reserves, req.max)?;

    conn.execute(
        "INSERT INTO box_collect (tick0, tick1, max_supply, amt0, liqamt, liqblock,
            holder_address, reserves_address, tx_hash, block_number)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            req.tick0,
            req.tick1,
            req.max,
            req.amt0,
            req.liqamt,
            req.liqblock,
            req.holder,
            reserves,
            ledger.ctx().tx_hash,
            ledger.ctx().block_number
        ],
    )?;
    ledger.record(&RevertEvent::BoxDeploy {
        tick0: req.tick0.clone(),
    })?;

    log::info!(
        "📦 box {} opened for {} (target {} / height {})",
        req.tick0,
        req.tick1,
        req.liqamt,
        req.liqblock
    );

    load_box(conn, &req.tick0)?
        .ok_or_else(|| IndexerError::consistency(format!("box {} vanished", req.tick0)))
}

/// Pay `amt` of tick1 into an open box; a box that reaches its target finishes right away
pub fn contribute(
    ledger: &Ledger<'_, Apply>,
    tick0: &str,
    holder: &str,
    amt: Amount,
) -> IndexerResult<Option<LiquidityOutcome>> {
    let conn = ledger.conn();
    let launch = load_box(conn, tick0)?
        .ok_or_else(|| IndexerError::validation("the contract does not exist"))?;
    if launch.status != BoxStatus::Open {
        return Err(IndexerError::validation("the box has been closed"));
    }

    let raised = launch.raised.checked_add(amt)?;
    if !launch.liqamt.is_zero() && raised > launch.liqamt {
        return Err(IndexerError::validation(
            "the amount of tokens exceeds the maximum",
        ));
    }

    ledger.transfer(&launch.tick1, holder, &launch.reserves_address, amt)?;
    conn.execute(
        "INSERT INTO box_contribution (tick0, holder_address, amt, tx_hash, block_number)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            tick0,
            holder,
            amt,
            ledger.ctx().tx_hash,
            ledger.ctx().block_number
        ],
    )?;
    ledger.record(&RevertEvent::BoxContribute {
        tick0: tick0.to_string(),
        contribution_id: conn.last_insert_rowid(),
        prior_raised: launch.raised,
    })?;
    set_raised(conn, tick0, raised)?;

    if !launch.liqamt.is_zero() && raised >= launch.liqamt {
        let launch = LaunchBox { raised, ..launch };
        return finish(ledger, &launch).map(Some);
    }
    Ok(None)
}

/// Seed the pool from the raise and hand out the contributors' share of tick0
pub fn finish(ledger: &Ledger<'_, Apply>, launch: &LaunchBox) -> IndexerResult<LiquidityOutcome> {
    let reserves = launch.reserves_address.as_str();
    let created = create_pool(
        ledger,
        &CreatePool {
            kind: PoolKind::Legacy,
            pair_id: String::new(),
            tick0: launch.tick0.clone(),
            tick1: launch.tick1.clone(),
            amt0: launch.amt0,
            amt1: launch.raised,
            holder: reserves.to_string(),
        },
    )?;

    let mut handed_out = Amount::ZERO;
    for (holder, amt) in contributions(ledger.conn(), &launch.tick0)? {
        let share = amt.checked_mul(launch.amt0)?.checked_div(launch.raised)?;
        if share.is_zero() || holder == reserves {
            continue;
        }
        ledger.transfer(&launch.tick0, reserves, &holder, share)?;
        handed_out = handed_out.checked_add(share)?;
    }

    ledger.record(&RevertEvent::BoxFinish {
        tick0: launch.tick0.clone(),
    })?;
    set_status(ledger.conn(), &launch.tick0, BoxStatus::Finished, launch.amt0)?;

    log::info!("📦 box {} finished into {}", launch.tick0, created.pair_id);
    log::info!("   ├─ raised: {} {}", launch.raised, launch.tick1);
    log::info!("   └─ handed out: {} {}", handed_out, launch.tick0);

    Ok(created)
}

/// Burn and delete the box token, then return every contribution
pub fn refund(ledger: &Ledger<'_, Apply>, launch: &LaunchBox) -> IndexerResult<usize> {
    let conn = ledger.conn();
    let reserves = launch.reserves_address.as_str();

    let parked = balance(conn, &launch.tick0, reserves)?;
    if !parked.is_zero() {
        ledger.burn(&launch.tick0, reserves, parked)?;
    }
    let transactions = aggregate(conn, &launch.tick0)?
        .map(|agg| agg.transactions)
        .unwrap_or_default();
    ledger.record(&RevertEvent::BoxRefund {
        tick0: launch.tick0.clone(),
        transactions,
    })?;
    ledger.delete_token(&launch.tick0)?;
    set_status(conn, &launch.tick0, BoxStatus::Refunded, Amount::ZERO)?;

    let returned = contributions(conn, &launch.tick0)?;
    for (holder, amt) in &returned {
        ledger.transfer(&launch.tick1, reserves, holder, *amt)?;
    }

    log::info!(
        "📦 box {} refunded ({} contributions returned)",
        launch.tick0,
        returned.len()
    );
    Ok(returned.len())
}

/// Close a box at its deadline: finish when the raise can seed a pool, refund otherwise
pub fn settle(ledger: &Ledger<'_, Apply>, launch: &LaunchBox) -> IndexerResult<BoxStatus> {
    let seeds_pool =
        !launch.raised.is_zero() && initial_liquidity(launch.amt0, launch.raised).is_ok();
    if seeds_pool {
        finish(ledger, launch)?;
        Ok(BoxStatus::Finished)
    } else {
        refund(ledger, launch)?;
        Ok(BoxStatus::Refunded)
    }
}

pub(crate) fn delete_box(conn: &Connection, tick0: &str) -> IndexerResult<()> {
    conn.execute("DELETE FROM box_contribution WHERE tick0 = ?1", params![tick0])?;
    conn.execute("DELETE FROM box_collect WHERE tick0 = ?1", params![tick0])?;
    Ok(())
}

pub(crate) fn undo_contribution(
    conn: &Connection,
    tick0: &str,
    contribution_id: i64,
    prior_raised: Amount,
) -> IndexerResult<()> {
    conn.execute(
        "DELETE FROM box_contribution WHERE id = ?1",
        params![contribution_id],
    )?;
    set_raised(conn, tick0, prior_raised)
}

pub(crate) fn reopen(conn: &Connection, tick0: &str) -> IndexerResult<()> {
    set_status(conn, tick0, BoxStatus::Open, Amount::ZERO)
}

/// Recreate the deleted box token with zero supply and reopen the box
pub(crate) fn undo_refund(conn: &Connection, tick0: &str, transactions: i64) -> IndexerResult<()> {
    let restored = conn.execute(
        "INSERT INTO drc20_collect (tick, max_supply, lim, amt_sum, transactions,
            holder_address, tx_hash, block_number)
         SELECT tick0, max_supply, max_supply, '0', ?2, holder_address, tx_hash, block_number
         FROM box_collect WHERE tick0 = ?1",
        params![tick0, transactions],
    )?;
    if restored == 0 {
        return Err(IndexerError::consistency(format!(
            "box {} missing while restoring its token",
            tick0
        )));
    }
    reopen(conn, tick0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amm::{legacy_pair_id, load_pool};
    use crate::ledger::test_support::{ctx, deploy_tick};
    use crate::store::test_support::create_test_store;

    fn a(v: u64) -> Amount {
        Amount::new(v)
    }

    fn open_box(ledger: &Ledger<'_, Apply>, liqamt: u64, liqblock: u64) -> LaunchBox {
        deploy(
            ledger,
            &DeployBox {
                tick0: "BOXT".to_string(),
                tick1: "DOGI".to_string(),
                max: a(1_000_000),
                amt0: a(400_000),
                liqamt: a(liqamt),
                liqblock,
                holder: "DOwner".to_string(),
            },
        )
        .unwrap()
    }

    #[test]
    fn test_deploy_parks_supply_on_reserves() {
        let (store, _tmp) = create_test_store();
        store
            .write(|tx| {
                let ledger = Ledger::new(tx, ctx(1));
                deploy_tick(&ledger, "DOGI", None);
                let launch = open_box(&ledger, 0, 10);

                assert_eq!(launch.status, BoxStatus::Open);
                assert_eq!(launch.reserves_address, box_reserves_address("BOXT"));
                assert_eq!(balance(tx, "BOXT", &launch.reserves_address)?, a(1_000_000));
                assert_eq!(aggregate(tx, "BOXT")?.unwrap().max_supply, Some(a(1_000_000)));
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_reaching_target_finishes_inline() {
        let (store, _tmp) = create_test_store();
        store
            .write(|tx| {
                let ledger = Ledger::new(tx, ctx(1));
                deploy_tick(&ledger, "DOGI", None);
                ledger.mint("DOGI", "DAlice", a(300_000))?;
                ledger.mint("DOGI", "DBob", a(300_000))?;
                let launch = open_box(&ledger, 400_000, 0);

                assert!(contribute(&ledger, "BOXT", "DAlice", a(300_000))?.is_none());
                let err = contribute(&ledger, "BOXT", "DBob", a(100_001)).unwrap_err();
                assert!(err.is_rejection());

                let pool = contribute(&ledger, "BOXT", "DBob", a(100_000))?.unwrap();
                assert_eq!(pool.pair_id, legacy_pair_id("BOXT", "DOGI"));

                let pool = load_pool(tx, PoolKind::Legacy, &pool.pair_id)?.unwrap();
                assert_eq!(pool.amt0, a(400_000));
                assert_eq!(pool.amt1, a(400_000));
                assert_eq!(balance(tx, "BOXT", "DAlice")?, a(300_000));
                assert_eq!(balance(tx, "BOXT", "DBob")?, a(100_000));
                assert_eq!(balance(tx, "BOXT", &launch.reserves_address)?, a(200_000));

                let closed = load_box(tx, "BOXT")?.unwrap();
                assert_eq!(closed.status, BoxStatus::Finished);
                assert_eq!(closed.amt0_finish, a(400_000));
                assert!(contribute(&ledger, "BOXT", "DBob", a(1)).is_err());
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_settle_without_raise_refunds_and_deletes_token() {
        let (store, _tmp) = create_test_store();
        store
            .write(|tx| {
                let ledger = Ledger::new(tx, ctx(1));
                deploy_tick(&ledger, "DOGI", None);
                ledger.mint("DOGI", "DAlice", a(2))?;
                open_box(&ledger, 0, 10);
                contribute(&ledger, "BOXT", "DAlice", a(2))?;

                let due = due_at(tx, 10)?;
                assert_eq!(due.len(), 1);
                // sqrt(400000 * 2) is below the locked minimum liquidity
                assert_eq!(settle(&ledger, &due[0])?, BoxStatus::Refunded);

                assert!(aggregate(tx, "BOXT")?.is_none());
                assert_eq!(balance(tx, "DOGI", "DAlice")?, a(2));
                assert_eq!(load_box(tx, "BOXT")?.unwrap().status, BoxStatus::Refunded);
                assert!(due_at(tx, 10)?.is_empty());
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_undo_refund_restores_token_row() {
        let (store, _tmp) = create_test_store();
        store
            .write(|tx| {
                let ledger = Ledger::new(tx, ctx(1));
                deploy_tick(&ledger, "DOGI", None);
                let launch = open_box(&ledger, 0, 10);
                refund(&ledger, &launch)?;

                undo_refund(tx, "BOXT", 2)?;
                let agg = aggregate(tx, "BOXT")?.unwrap();
                assert_eq!(agg.amt_sum, Amount::ZERO);
                assert_eq!(agg.max_supply, Some(a(1_000_000)));
                assert_eq!(load_box(tx, "BOXT")?.unwrap().status, BoxStatus::Open);
                Ok(())
            })
            .unwrap();
    }
}
