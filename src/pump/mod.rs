//! Bonding-curve ("pump") pools
//!
//! A pump pool pairs a freshly minted id-keyed token with WDOGE. Prices follow a single-sided
//! constant-product curve over *virtual* amounts: `amt1` starts at [`DOGE_INIT`] although the
//! reserves address holds no WDOGE yet. Once the real WDOGE balance of the reserves address
//! reaches [`DOGE_MAX`] the pool graduates into a v2 AMM pool; a graduated curve stays closed.

pub mod engine;

use crate::amount::Amount;
use crate::error::IndexerResult;
use crate::ledger::TxContext;
use rusqlite::{params, Connection, OptionalExtension, Row};

/// Fixed supply of every bonding-curve token
pub const MEME_MAX: u64 = 100_000_000_000_000_000;
/// Virtual WDOGE a new curve starts with
pub const DOGE_INIT: u64 = 300_000_000_000;
/// Real WDOGE balance that sets the king-of-the-hill watermark
pub const DOGE_KING_MAX: u64 = 1_000_000_000_000;
/// Real WDOGE balance that triggers graduation
pub const DOGE_MAX: u64 = 10_000_000_000_000;
pub const PUMP_FINISH_FEE: u64 = 100_000_000_000;
pub const PUMP_CREATE_HOLDER_FEE: u64 = 10_000_000_000;
/// Ceiling on the creator's initial buy at deploy
pub const DEPLOY_BUY_MAX: u64 = 500_000_000_000;

pub const FINISH_FEE_ADDRESS: &str = "DJ9wVHBFnbcZUtfWdHWPEnijdxz1CABPUY";
pub const TX_FEE_ADDRESS: &str = "D7NfMMzqWB9FaUssLwgCs14Q5F6CCfpf9A";

/// `king_date` value of a pool that never crossed the watermark
pub const KING_UNSET: i64 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PumpPool {
    pub tick_id: String,
    pub symbol: String,
    pub tick1_id: String,
    pub amt0: Amount,
    pub amt1: Amount,
    pub reserves_address: String,
    pub holder: String,
    pub king_date: i64,
    pub graduated: bool,
}

fn pool_from_row(row: &Row<'_>) -> rusqlite::Result<PumpPool> {
    Ok(PumpPool {
        tick_id: row.get(0)?,
        symbol: row.get(1)?,
        tick1_id: row.get(2)?,
        amt0: row.get(3)?,
        amt1: row.get(4)?,
        reserves_address: row.get(5)?,
        holder: row.get(6)?,
        king_date: row.get(7)?,
        graduated: row.get(8)?,
    })
}

const POOL_COLUMNS: &str =
    "tick_id, symbol, tick1_id, amt0, amt1, reserves_address, holder_address, king_date, graduated";

pub fn load_pool(conn: &Connection, tick_id: &str) -> IndexerResult<Option<PumpPool>> {
    let sql = format!("SELECT {} FROM pump_pool WHERE tick_id = ?1", POOL_COLUMNS);
    Ok(conn
        .query_row(&sql, params![tick_id], pool_from_row)
        .optional()?)
}

pub fn all_pools(conn: &Connection) -> IndexerResult<Vec<PumpPool>> {
    let sql = format!("SELECT {} FROM pump_pool ORDER BY tick_id", POOL_COLUMNS);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], pool_from_row)?;
    let mut pools = Vec::new();
    for pool in rows {
        pools.push(pool?);
    }
    Ok(pools)
}

pub(crate) fn insert_pool(conn: &Connection, pool: &PumpPool, ctx: &TxContext) -> IndexerResult<()> {
    conn.execute(
        "INSERT INTO pump_pool (tick_id, symbol, tick1_id, amt0, amt1, reserves_address,
            holder_address, king_date, graduated, tx_hash, block_number)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            pool.tick_id,
            pool.symbol,
            pool.tick1_id,
            pool.amt0,
            pool.amt1,
            pool.reserves_address,
            pool.holder,
            pool.king_date,
            pool.graduated,
            ctx.tx_hash,
            ctx.block_number
        ],
    )?;
    Ok(())
}

/// Overwrite the curve state; used forward by trades and backward by rollback
pub(crate) fn write_curve(
    conn: &Connection,
    tick_id: &str,
    amt0: Amount,
    amt1: Amount,
    king_date: i64,
) -> IndexerResult<()> {
    conn.execute(
        "UPDATE pump_pool SET amt0 = ?1, amt1 = ?2, king_date = ?3 WHERE tick_id = ?4",
        params![amt0, amt1, king_date, tick_id],
    )?;
    Ok(())
}

pub(crate) fn set_graduated(conn: &Connection, tick_id: &str, graduated: bool) -> IndexerResult<()> {
    conn.execute(
        "UPDATE pump_pool SET graduated = ?1 WHERE tick_id = ?2",
        params![graduated, tick_id],
    )?;
    Ok(())
}

pub(crate) fn delete_pool(conn: &Connection, tick_id: &str) -> IndexerResult<()> {
    conn.execute("DELETE FROM pump_pool WHERE tick_id = ?1", params![tick_id])?;
    Ok(())
}
