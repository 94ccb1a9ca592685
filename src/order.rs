//! Fixed-price offers (`order-v1`)
//!
//! The maker escrows `amt0` of tick0 on the order's reserves address and asks `amt1` of tick1
//! for all of it. Takers fill any part at that price; the maker can withdraw what is unsold.

use crate::address::reserves_address;
use crate::amount::Amount;
use crate::error::{IndexerError, IndexerResult};
use crate::ledger::revert::RevertEvent;
use crate::ledger::{Apply, Ledger};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub ex_id: String,
    pub tick0: String,
    pub tick1: String,
    pub amt0: Amount,
    pub amt1: Amount,
    /// tick0 that left escrow through fills and cancels
    pub amt0_finish: Amount,
    /// tick1 paid to the maker
    pub amt1_finish: Amount,
    pub holder: String,
    pub reserves_address: String,
}

impl Order {
    pub fn remaining(&self) -> IndexerResult<Amount> {
        self.amt0.checked_sub(self.amt0_finish)
    }

    /// tick0 bought by paying `amt1` at the order's price, rounded down
    pub fn quote(&self, amt1: Amount) -> IndexerResult<Amount> {
        amt1.checked_mul(self.amt0)?.checked_div(self.amt1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Fill {
    pub ex_id: String,
    pub amt0_out: Amount,
    pub amt1_in: Amount,
}

fn order_from_row(row: &Row<'_>) -> rusqlite::Result<Order> {
    Ok(Order {
        ex_id: row.get(0)?,
        tick0: row.get(1)?,
        tick1: row.get(2)?,
        amt0: row.get(3)?,
        amt1: row.get(4)?,
        amt0_finish: row.get(5)?,
        amt1_finish: row.get(6)?,
        holder: row.get(7)?,
        reserves_address: row.get(8)?,
    })
}

pub fn load_order(conn: &Connection, ex_id: &str) -> IndexerResult<Option<Order>> {
    Ok(conn
        .query_row(
            "SELECT ex_id, tick0, tick1, amt0, amt1, amt0_finish, amt1_finish, holder_address,
                reserves_address
             FROM order_collect WHERE ex_id = ?1",
            params![ex_id],
            order_from_row,
        )
        .optional()?)
}

pub(crate) fn write_progress(
    conn: &Connection,
    ex_id: &str,
    amt0_finish: Amount,
    amt1_finish: Amount,
) -> IndexerResult<()> {
    conn.execute(
        "UPDATE order_collect SET amt0_finish = ?1, amt1_finish = ?2 WHERE ex_id = ?3",
        params![amt0_finish, amt1_finish, ex_id],
    )?;
    Ok(())
}

pub(crate) fn delete_order(conn: &Connection, ex_id: &str) -> IndexerResult<()> {
    conn.execute("DELETE FROM order_collect WHERE ex_id = ?1", params![ex_id])?;
    Ok(())
}

fn require_order(ledger: &Ledger<'_, Apply>, ex_id: &str) -> IndexerResult<Order> {
    let order = load_order(ledger.conn(), ex_id)?
        .ok_or_else(|| IndexerError::validation("the contract does not exist"))?;
    ledger.record(&RevertEvent::OrderProgress {
        ex_id: order.ex_id.clone(),
        amt0_finish: order.amt0_finish,
        amt1_finish: order.amt1_finish,
    })?;
    Ok(order)
}

/// Open an order keyed by the creating transaction
pub fn create(
    ledger: &Ledger<'_, Apply>,
    tick0: &str,
    tick1: &str,
    amt0: Amount,
    amt1: Amount,
    holder: &str,
) -> IndexerResult<Order> {
    let conn = ledger.conn();
    let ex_id = ledger.ctx().tx_hash.clone();
    if load_order(conn, &ex_id)?.is_some() {
        return Err(IndexerError::validation("the contract has been created"));
    }

    let order = Order {
        reserves_address: reserves_address(&ex_id),
        ex_id,
        tick0: tick0.to_string(),
        tick1: tick1.to_string(),
        amt0,
        amt1,
        amt0_finish: Amount::ZERO,
        amt1_finish: Amount::ZERO,
        holder: holder.to_string(),
    };
    conn.execute(
        "INSERT INTO order_collect (ex_id, tick0, tick1, amt0, amt1, holder_address,
            reserves_address, block_number)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            order.ex_id,
            order.tick0,
            order.tick1,
            order.amt0,
            order.amt1,
            order.holder,
            order.reserves_address,
            ledger.ctx().block_number
        ],
    )?;
    ledger.record(&RevertEvent::OrderCreate {
        ex_id: order.ex_id.clone(),
    })?;
    ledger.transfer(tick0, holder, &order.reserves_address, amt0)?;

    log::info!(
        "📝 order {} offers {} {} for {} {}",
        order.ex_id,
        amt0,
        tick0,
        amt1,
        tick1
    );
    Ok(order)
}

/// Pay `amt1` of tick1 to the maker and take the matching tick0 out of escrow
pub fn trade(ledger: &Ledger<'_, Apply>, ex_id: &str, taker: &str, amt1: Amount) -> IndexerResult<Fill> {
    let order = require_order(ledger, ex_id)?;
    if order.holder == taker {
        return Err(IndexerError::validation("the same address cannot be traded"));
    }
    let amt0_out = order.quote(amt1)?;
    if amt0_out.is_zero() {
        return Err(IndexerError::validation("the amount of tokens is too small"));
    }
    if amt0_out > order.remaining()? {
        return Err(IndexerError::validation(
            "the amount of tokens exceeds the remaining order",
        ));
    }

    write_progress(
        ledger.conn(),
        ex_id,
        order.amt0_finish.checked_add(amt0_out)?,
        order.amt1_finish.checked_add(amt1)?,
    )?;
    ledger.transfer(&order.tick1, taker, &order.holder, amt1)?;
    ledger.transfer(&order.tick0, &order.reserves_address, taker, amt0_out)?;

    log::debug!("📝 order {} filled {} by {}", ex_id, amt0_out, taker);
    Ok(Fill {
        ex_id: ex_id.to_string(),
        amt0_out,
        amt1_in: amt1,
    })
}

/// Return `amt0` of the unsold tick0 to the maker
pub fn cancel(ledger: &Ledger<'_, Apply>, ex_id: &str, holder: &str, amt0: Amount) -> IndexerResult<Order> {
    let order = require_order(ledger, ex_id)?;
    if order.holder != holder {
        return Err(IndexerError::validation("only the creator can cancel the order"));
    }
    if amt0 > order.remaining()? {
        return Err(IndexerError::validation(
            "the amount of tokens exceeds the remaining order",
        ));
    }

    let amt0_finish = order.amt0_finish.checked_add(amt0)?;
    write_progress(ledger.conn(), ex_id, amt0_finish, order.amt1_finish)?;
    ledger.transfer(&order.tick0, &order.reserves_address, holder, amt0)?;

    log::debug!("📝 order {} cancelled {} by {}", ex_id, amt0, holder);
    Ok(Order {
        amt0_finish,
        ..order
    })
}
