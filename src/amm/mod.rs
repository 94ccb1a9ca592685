//! Constant-product AMM: legacy tick-keyed pools and v2 pools keyed by pair id
//!
//! Both variants share one engine ([`engine`]) and one row shape; they differ only in how pairs
//! are identified and which token kind carries their LP shares:
//! - legacy: pair id = LP tick `"{tick0}-SWAP-{tick1}"`, both sides tick-keyed
//! - v2: pair id = creating tx hash, LP shares are the id-keyed token with that id
//!
//! Pool reserves are never tracked incrementally. After each mutation they are re-read from the
//! reserves address's holder balances and the LP aggregate. The row as it stood before the
//! mutation goes to the revert log, and rollback writes it back unchanged.

pub mod engine;
pub mod math;

use crate::address::reserves_address;
use crate::amount::Amount;
use crate::error::IndexerResult;
use crate::ledger::{aggregate, balance, TxContext};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolKind {
    Legacy,
    V2,
}

impl PoolKind {
    pub(crate) fn table(self) -> &'static str {
        match self {
            PoolKind::Legacy => "swap_v1_pool",
            PoolKind::V2 => "swap_v2_pool",
        }
    }

    pub fn protocol(self) -> &'static str {
        match self {
            PoolKind::Legacy => "pair-v1",
            PoolKind::V2 => "pair-v2",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pool {
    pub kind: PoolKind,
    pub pair_id: String,
    pub tick0: String,
    pub tick1: String,
    pub amt0: Amount,
    pub amt1: Amount,
    pub liquidity: Amount,
    pub reserves_address: String,
    pub holder: String,
}

impl Pool {
    /// The LP share token shares the pair id in both variants
    pub fn lp_token(&self) -> &str {
        &self.pair_id
    }

    /// `(reserve_in, reserve_out, tick_out)` for an input on `tick_in`, if it is a side of this pool
    pub fn orient(&self, tick_in: &str) -> Option<(Amount, Amount, &str)> {
        if tick_in == self.tick0 {
            Some((self.amt0, self.amt1, &self.tick1))
        } else if tick_in == self.tick1 {
            Some((self.amt1, self.amt0, &self.tick0))
        } else {
            None
        }
    }
}

/// Order two tokens lexicographically, carrying their paired values along
pub fn canonical_pair<T>(tick0: &str, tick1: &str, v0: T, v1: T) -> (String, String, T, T) {
    if tick0 <= tick1 {
        (tick0.to_string(), tick1.to_string(), v0, v1)
    } else {
        (tick1.to_string(), tick0.to_string(), v1, v0)
    }
}

/// Legacy pair id and LP tick for an already-sorted pair
pub fn legacy_pair_id(tick0: &str, tick1: &str) -> String {
    format!("{}-SWAP-{}", tick0, tick1)
}

pub fn pool_reserves_address(pair_id: &str) -> String {
    reserves_address(pair_id)
}

fn pool_from_row(kind: PoolKind, row: &Row<'_>) -> rusqlite::Result<Pool> {
    Ok(Pool {
        kind,
        pair_id: row.get(0)?,
        tick0: row.get(1)?,
        tick1: row.get(2)?,
        amt0: row.get(3)?,
        amt1: row.get(4)?,
        liquidity: row.get(5)?,
        reserves_address: row.get(6)?,
        holder: row.get(7)?,
    })
}

pub fn load_pool(conn: &Connection, kind: PoolKind, pair_id: &str) -> IndexerResult<Option<Pool>> {
    let sql = format!(
        "SELECT pair_id, tick0, tick1, amt0, amt1, liquidity, reserves_address, holder_address
         FROM {} WHERE pair_id = ?1",
        kind.table()
    );
    Ok(conn
        .query_row(&sql, params![pair_id], |row| pool_from_row(kind, row))
        .optional()?)
}

pub fn all_pools(conn: &Connection, kind: PoolKind) -> IndexerResult<Vec<Pool>> {
    let sql = format!(
        "SELECT pair_id, tick0, tick1, amt0, amt1, liquidity, reserves_address, holder_address
         FROM {} ORDER BY pair_id",
        kind.table()
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], |row| pool_from_row(kind, row))?;
    let mut pools = Vec::new();
    for pool in rows {
        pools.push(pool?);
    }
    Ok(pools)
}

/// True if a v2 pool already exists for this unordered token pair
pub fn v2_pair_exists(conn: &Connection, tick0: &str, tick1: &str) -> IndexerResult<bool> {
    let (t0, t1, _, _) = canonical_pair(tick0, tick1, (), ());
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM swap_v2_pool WHERE tick0 = ?1 AND tick1 = ?2",
        params![t0, t1],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub(crate) fn insert_pool(conn: &Connection, pool: &Pool, ctx: &TxContext) -> IndexerResult<()> {
    let sql = format!(
        "INSERT INTO {} (pair_id, tick0, tick1, amt0, amt1, liquidity, reserves_address,
            holder_address, tx_hash, block_number)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        pool.kind.table()
    );
    conn.execute(
        &sql,
        params![
            pool.pair_id,
            pool.tick0,
            pool.tick1,
            pool.amt0,
            pool.amt1,
            pool.liquidity,
            pool.reserves_address,
            pool.holder,
            ctx.tx_hash,
            ctx.block_number
        ],
    )?;
    Ok(())
}

pub(crate) fn delete_pool(conn: &Connection, kind: PoolKind, pair_id: &str) -> IndexerResult<()> {
    conn.execute(
        &format!("DELETE FROM {} WHERE pair_id = ?1", kind.table()),
        params![pair_id],
    )?;
    Ok(())
}

/// Re-read reserves and total shares from the ledger
pub fn refresh_reserves(conn: &Connection, kind: PoolKind, pair_id: &str) -> IndexerResult<()> {
    let pool = match load_pool(conn, kind, pair_id)? {
        Some(pool) => pool,
        None => return Ok(()),
    };

    let amt0 = balance(conn, &pool.tick0, &pool.reserves_address)?;
    let amt1 = balance(conn, &pool.tick1, &pool.reserves_address)?;
    let liquidity = aggregate(conn, pool.lp_token())?
        .map(|agg| agg.amt_sum)
        .unwrap_or(Amount::ZERO);

    write_reserves(conn, kind, pair_id, amt0, amt1, liquidity)
}

/// Overwrite reserves and total shares with a recorded snapshot
pub(crate) fn write_reserves(
    conn: &Connection,
    kind: PoolKind,
    pair_id: &str,
    amt0: Amount,
    amt1: Amount,
    liquidity: Amount,
) -> IndexerResult<()> {
    conn.execute(
        &format!(
            "UPDATE {} SET amt0 = ?1, amt1 = ?2, liquidity = ?3 WHERE pair_id = ?4",
            kind.table()
        ),
        params![amt0, amt1, liquidity, pair_id],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_pair_swaps_values() {
        let (t0, t1, a0, a1) = canonical_pair("ZZZ", "AAA", 1, 2);
        assert_eq!((t0.as_str(), t1.as_str(), a0, a1), ("AAA", "ZZZ", 2, 1));
        let (t0, t1, a0, a1) = canonical_pair("AAA", "ZZZ", 1, 2);
        assert_eq!((t0.as_str(), t1.as_str(), a0, a1), ("AAA", "ZZZ", 1, 2));
    }

    #[test]
    fn test_legacy_pair_id() {
        assert_eq!(legacy_pair_id("CARD", "DOGI"), "CARD-SWAP-DOGI");
    }

    #[test]
    fn test_pool_kind_serializes_snake_case() {
        assert_eq!(serde_json::to_value(PoolKind::V2).unwrap(), "v2");
        assert_eq!(serde_json::to_value(PoolKind::Legacy).unwrap(), "legacy");
    }
}
