//! Schema migrations
//!
//! The `sql/` files are embedded at compile time and applied in file-name order. Every statement
//! uses `IF NOT EXISTS` / `INSERT OR IGNORE`, so re-running on an existing database is a no-op.

use crate::error::IndexerResult;
use rusqlite::Connection;

const MIGRATIONS: &[(&str, &str)] = &[
    ("00_blocks.sql", include_str!("../../sql/00_blocks.sql")),
    ("01_tokens.sql", include_str!("../../sql/01_tokens.sql")),
    ("02_pools.sql", include_str!("../../sql/02_pools.sql")),
    ("03_pump.sql", include_str!("../../sql/03_pump.sql")),
    ("04_stake.sql", include_str!("../../sql/04_stake.sql")),
    ("05_revert_log.sql", include_str!("../../sql/05_revert_log.sql")),
    ("06_operations.sql", include_str!("../../sql/06_operations.sql")),
    ("07_summary.sql", include_str!("../../sql/07_summary.sql")),
    ("08_box.sql", include_str!("../../sql/08_box.sql")),
    ("09_order.sql", include_str!("../../sql/09_order.sql")),
];

/// Run schema migrations and switch the database to WAL mode
pub fn run_schema_migrations(conn: &mut Connection) -> IndexerResult<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    log::info!("📊 Enabled WAL mode for SQLite database");

    log::info!("🔧 Running {} schema migrations", MIGRATIONS.len());

    for (filename, sql) in MIGRATIONS {
        log::info!("   ├─ Executing: {}", filename);
        conn.execute_batch(sql)?;
        log::info!("   └─ ✅ Success: {}", filename);
    }

    log::info!("✅ All schema migrations completed successfully");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_migrations_are_idempotent() {
        let temp_db = NamedTempFile::new().unwrap();
        let mut conn = Connection::open(temp_db.path()).unwrap();

        run_schema_migrations(&mut conn).unwrap();
        run_schema_migrations(&mut conn).unwrap();

        let wdoge_rows: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM drc20_collect WHERE tick = 'WDOGE(WRAPPED-DOGE)'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(wdoge_rows, 1);
    }

    #[test]
    fn test_wal_mode_enabled() {
        let temp_db = NamedTempFile::new().unwrap();
        let mut conn = Connection::open(temp_db.path()).unwrap();
        run_schema_migrations(&mut conn).unwrap();

        let mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
    }
}
