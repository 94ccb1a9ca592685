//! SQLite-backed store
//!
//! `Store` owns the single connection behind an `Arc<Mutex<_>>`. Holding that mutex is the
//! ledger's mutation lock: the scan loop and scheduled maintenance both go through `write`, which
//! serializes every read-modify-write sequence and wraps it in one database transaction.

pub mod blocks;
pub mod db;
pub mod operations;

use crate::error::{IndexerError, IndexerResult};
use rusqlite::{Connection, OpenFlags, Transaction};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

pub use db::run_schema_migrations;

#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Open (or create) the database and bring the schema up to date
    pub fn open(db_path: &str) -> IndexerResult<Self> {
        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut conn = Connection::open(db_path)?;
        run_schema_migrations(&mut conn)?;

        log::info!("✅ Store opened: {}", db_path);

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an existing database without write access (audit tooling)
    pub fn open_read_only(db_path: &str) -> IndexerResult<Self> {
        let conn = Connection::open_with_flags(
            db_path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> IndexerResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| IndexerError::consistency("store mutex poisoned"))
    }

    /// Run `f` inside one database transaction while holding the mutation lock.
    ///
    /// Commits when `f` returns `Ok`; any error drops the transaction, which rolls it back.
    pub fn write<T, F>(&self, f: F) -> IndexerResult<T>
    where
        F: FnOnce(&Transaction<'_>) -> IndexerResult<T>,
    {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    /// Run a read-only closure against the connection
    pub fn read<T, F>(&self, f: F) -> IndexerResult<T>
    where
        F: FnOnce(&Connection) -> IndexerResult<T>,
    {
        let conn = self.lock()?;
        f(&conn)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use tempfile::NamedTempFile;

    /// Fresh migrated store on a throwaway file; keep the handle alive for the test's duration
    pub fn create_test_store() -> (Store, NamedTempFile) {
        let temp_db = NamedTempFile::new().unwrap();
        let store = Store::open(temp_db.path().to_str().unwrap()).unwrap();
        (store, temp_db)
    }
}
