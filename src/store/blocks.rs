//! BlockRecord table: height -> hash for every scanned height

use crate::error::IndexerResult;
use rusqlite::{params, Connection, OptionalExtension};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockRecord {
    pub block_number: u64,
    pub block_hash: String,
    pub block_time: i64,
}

pub fn save(conn: &Connection, record: &BlockRecord) -> IndexerResult<()> {
    conn.execute(
        "INSERT OR REPLACE INTO blocks (block_number, block_hash, block_time) VALUES (?1, ?2, ?3)",
        params![record.block_number, record.block_hash, record.block_time],
    )?;
    Ok(())
}

pub fn hash_at(conn: &Connection, height: u64) -> IndexerResult<Option<String>> {
    Ok(conn
        .query_row(
            "SELECT block_hash FROM blocks WHERE block_number = ?1",
            params![height],
            |row| row.get(0),
        )
        .optional()?)
}

pub fn latest_height(conn: &Connection) -> IndexerResult<Option<u64>> {
    Ok(conn.query_row("SELECT MAX(block_number) FROM blocks", [], |row| {
        row.get::<_, Option<u64>>(0)
    })?)
}

pub fn delete_above(conn: &Connection, height: u64) -> IndexerResult<usize> {
    Ok(conn.execute("DELETE FROM blocks WHERE block_number > ?1", params![height])?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::create_test_store;

    #[test]
    fn test_latest_and_delete_above() {
        let (store, _tmp) = create_test_store();
        store
            .write(|tx| {
                assert_eq!(latest_height(tx)?, None);
                for h in 10..15u64 {
                    save(
                        tx,
                        &BlockRecord {
                            block_number: h,
                            block_hash: format!("hash{}", h),
                            block_time: 0,
                        },
                    )?;
                }
                assert_eq!(latest_height(tx)?, Some(14));
                assert_eq!(delete_above(tx, 12)?, 2);
                assert_eq!(latest_height(tx)?, Some(12));
                assert_eq!(hash_at(tx, 12)?.as_deref(), Some("hash12"));
                assert_eq!(hash_at(tx, 13)?, None);
                Ok(())
            })
            .unwrap();
    }
}
