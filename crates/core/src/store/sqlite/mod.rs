//! SQLite persistence for Concord.
//!
//! One [`Database`] handle backs all four repository traits in
//! [`crate::store`]: content nodes, version chains, folder snapshots, and
//! the audit log. Schema migrations run through [`Database::initialize`].

pub mod queries;
pub mod schema;

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::Connection;
use tracing::{debug, info};

use crate::errors::StoreError;

/// File name of the engine database inside a data directory.
pub const DB_FILE: &str = "concord.db";

/// Shared handle over a single SQLite connection.
///
/// The inner connection sits behind a `Mutex` so one handle can serve every
/// store trait from behind an `Arc`. WAL journaling keeps readers unblocked
/// while a version write is in flight.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) the engine database inside `data_dir`, creating the
    /// directory first if needed.
    pub fn open_in<P: AsRef<Path>>(data_dir: P) -> Result<Self, StoreError> {
        let data_dir = data_dir.as_ref();
        std::fs::create_dir_all(data_dir)?;
        Self::new(data_dir.join(DB_FILE))
    }

    /// Open (or create) a SQLite database at an explicit `path`.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref();
        info!(path = %path.display(), "opening database");
        Self::configure(Connection::open(path)?)
    }

    /// Open an in-memory database (useful for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        Self::configure(Connection::open_in_memory()?)
    }

    fn configure(conn: Connection) -> Result<Self, StoreError> {
        // The busy timeout covers short write bursts from concurrent
        // operators sharing the file.
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run all schema migrations to bring the database up to date.
    pub fn initialize(&self) -> Result<(), StoreError> {
        info!("initializing database schema");
        let conn = self.conn();
        schema::run_migrations(&conn)?;
        debug!("database schema is up to date");
        Ok(())
    }

    /// Obtain a lock on the underlying connection.
    ///
    /// If the Mutex is poisoned (a previous holder panicked), the lock is
    /// recovered rather than propagating a panic.
    pub fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("database mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Execute a closure inside a SQLite transaction. If the closure returns
    /// `Ok`, the transaction is committed; otherwise it is rolled back.
    pub fn transaction<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError>,
    {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let result = f(&tx)?;
        tx.commit()?;
        Ok(result)
    }
}
