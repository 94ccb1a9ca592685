//! OperationRow table: one row per decoded instruction
//!
//! Rows are inserted as pending at decode time and finalized once: applied (with outputs) inside
//! the same transaction as the mutation, or failed with `err_info` after a rejection. Both final
//! states are terminal: a height replayed after an aborted tick skips them.

use crate::error::IndexerResult;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    Applied = 0,
    Pending = 1,
    Failed = 2,
}

impl OrderStatus {
    fn from_code(code: i64) -> Self {
        match code {
            0 => OrderStatus::Applied,
            2 => OrderStatus::Failed,
            _ => OrderStatus::Pending,
        }
    }

    /// Applied and failed rows are never verified again
    pub fn is_final(self) -> bool {
        !matches!(self, OrderStatus::Pending)
    }
}

#[derive(Debug, Clone)]
pub struct OperationRecord {
    pub protocol: String,
    pub op: String,
    pub tx_hash: String,
    pub tx_index: u32,
    pub block_number: u64,
    pub block_hash: String,
    pub block_time: i64,
    pub holder: String,
    pub payload: Value,
}

#[derive(Debug, Clone)]
pub struct OperationRow {
    pub protocol: String,
    pub op: String,
    pub tx_hash: String,
    pub block_number: u64,
    pub holder: String,
    pub status: OrderStatus,
    pub outputs: Option<Value>,
    pub err_info: Option<String>,
}

/// Insert (or reset) the pending row for a decoded instruction
pub fn insert_pending(conn: &Connection, record: &OperationRecord) -> IndexerResult<()> {
    conn.execute(
        "INSERT OR REPLACE INTO operations (
            protocol, op, tx_hash, tx_index, block_number, block_hash, block_time,
            holder_address, payload, outputs, order_status, err_info
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, NULL, ?10, NULL)",
        params![
            record.protocol,
            record.op,
            record.tx_hash,
            record.tx_index,
            record.block_number,
            record.block_hash,
            record.block_time,
            record.holder,
            record.payload.to_string(),
            OrderStatus::Pending as i64,
        ],
    )?;
    Ok(())
}

pub fn mark_applied(conn: &Connection, tx_hash: &str, outputs: &Value) -> IndexerResult<()> {
    conn.execute(
        "UPDATE operations SET order_status = ?1, outputs = ?2, err_info = NULL WHERE tx_hash = ?3",
        params![OrderStatus::Applied as i64, outputs.to_string(), tx_hash],
    )?;
    Ok(())
}

pub fn mark_failed(conn: &Connection, tx_hash: &str, err_info: &str) -> IndexerResult<()> {
    conn.execute(
        "UPDATE operations SET order_status = ?1, err_info = ?2 WHERE tx_hash = ?3",
        params![OrderStatus::Failed as i64, err_info, tx_hash],
    )?;
    Ok(())
}

pub fn status_of(conn: &Connection, tx_hash: &str) -> IndexerResult<Option<OrderStatus>> {
    Ok(conn
        .query_row(
            "SELECT order_status FROM operations WHERE tx_hash = ?1",
            params![tx_hash],
            |row| row.get::<_, i64>(0),
        )
        .optional()?
        .map(OrderStatus::from_code))
}

pub fn get(conn: &Connection, tx_hash: &str) -> IndexerResult<Option<OperationRow>> {
    let row = conn
        .query_row(
            "SELECT protocol, op, tx_hash, block_number, holder_address, order_status, outputs, err_info
             FROM operations WHERE tx_hash = ?1",
            params![tx_hash],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, u64>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, i64>(5)?,
                    row.get::<_, Option<String>>(6)?,
                    row.get::<_, Option<String>>(7)?,
                ))
            },
        )
        .optional()?;

    match row {
        None => Ok(None),
        Some((protocol, op, tx_hash, block_number, holder, status, outputs, err_info)) => {
            let outputs = match outputs {
                Some(raw) => Some(serde_json::from_str(&raw)?),
                None => None,
            };
            Ok(Some(OperationRow {
                protocol,
                op,
                tx_hash,
                block_number,
                holder,
                status: OrderStatus::from_code(status),
                outputs,
                err_info,
            }))
        }
    }
}

/// True if `holder` already has an applied `protocol`/`op` row at `height`
pub fn has_applied_at(
    conn: &Connection,
    holder: &str,
    height: u64,
    protocol: &str,
    op: &str,
) -> IndexerResult<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM operations
         WHERE holder_address = ?1 AND block_number = ?2 AND protocol = ?3 AND op = ?4
           AND order_status = ?5",
        params![holder, height, protocol, op, OrderStatus::Applied as i64],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub fn delete_above(conn: &Connection, height: u64) -> IndexerResult<usize> {
    Ok(conn.execute(
        "DELETE FROM operations WHERE block_number > ?1",
        params![height],
    )?)
}
