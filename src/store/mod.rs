//! The State Store (A, §4.1).
//!
//! A single `rusqlite::Connection` guarded by a blocking mutex. Every
//! operation is one short synchronous statement or transaction, so holding
//! the mutex never spans an `.await` — callers on the async control loops
//! invoke these methods directly without `spawn_blocking`.

mod dispatch_query;
mod measurement_ops;
mod request_ops;
mod wrapper_ops;

pub use dispatch_query::BestDeployment;

use std::sync::Mutex;

use rusqlite::Connection;
use tracing::info;

use crate::error::RegistryResult;

/// Durable storage of wrappers, requests, and measurements (§3).
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (creating if needed) the SQLite file at `path` and ensure the schema exists.
    pub fn open(path: &str) -> RegistryResult<Self> {
        let conn = Connection::open(path)?;
        let store = Self { conn: Mutex::new(conn) };
        store.create_schema()?;
        Ok(store)
    }

    /// Open an in-memory store, for tests.
    pub fn open_in_memory() -> RegistryResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn: Mutex::new(conn) };
        store.create_schema()?;
        Ok(store)
    }

    fn create_schema(&self) -> RegistryResult<()> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS wrapper (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                llm TEXT NOT NULL,
                llm_config TEXT,
                address TEXT NOT NULL UNIQUE,
                username TEXT NOT NULL,
                password TEXT NOT NULL,
                status TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS request (
                id TEXT PRIMARY KEY,
                llm_config TEXT NOT NULL,
                status TEXT NOT NULL,
                measurement_id INTEGER NOT NULL,
                address TEXT
            );
            CREATE TABLE IF NOT EXISTS measurement (
                id INTEGER PRIMARY KEY,
                status TEXT NOT NULL,
                wrapper_id INTEGER
            );",
        )?;
        Ok(())
    }

    /// Drop and recreate the schema. Used only at process start, and only
    /// when `[registry] reset_on_boot = true` (§9 — the source's quirk is
    /// preserved but gated, never unconditional).
    pub fn reset(&self) -> RegistryResult<()> {
        info!("resetting state store schema");
        let conn = self.conn.lock().expect("store mutex poisoned");
        conn.execute_batch("DROP TABLE IF EXISTS wrapper; DROP TABLE IF EXISTS request; DROP TABLE IF EXISTS measurement;")?;
        drop(conn);
        self.create_schema()
    }
}
