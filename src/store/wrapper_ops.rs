//! Wrapper-table operations (§4.1).

use rusqlite::{params, OptionalExtension, Row};

use crate::domain::{Wrapper, WrapperStatus};
use crate::error::{RegistryError, RegistryResult};

use super::Store;

fn row_to_wrapper(row: &Row) -> rusqlite::Result<Wrapper> {
    let status_raw: String = row.get(6)?;
    Ok(Wrapper {
        id: row.get(0)?,
        llm: row.get(1)?,
        llm_config: row.get(2)?,
        address: row.get(3)?,
        username: row.get(4)?,
        password: row.get(5)?,
        status: status_raw
            .parse()
            .map_err(|e: String| rusqlite::Error::InvalidColumnType(6, e, rusqlite::types::Type::Text))?,
    })
}

const WRAPPER_COLUMNS: &str = "id, llm, llm_config, address, username, password, status";

impl Store {
    /// Insert a new wrapper, assigning its id.
    pub fn add_wrapper(&self, llm: &str, address: &str, username: &str, password: &str, status: WrapperStatus) -> RegistryResult<i64> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        conn.execute(
            "INSERT INTO wrapper (llm, llm_config, address, username, password, status) VALUES (?1, NULL, ?2, ?3, ?4, ?5)",
            params![llm, address, username, password, status.to_string()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn list_wrappers(&self) -> RegistryResult<Vec<Wrapper>> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let mut stmt = conn.prepare(&format!("SELECT {WRAPPER_COLUMNS} FROM wrapper ORDER BY id ASC"))?;
        let rows = stmt.query_map([], row_to_wrapper)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    pub fn find_wrappers_by_status(&self, status: WrapperStatus) -> RegistryResult<Vec<Wrapper>> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let mut stmt = conn.prepare(&format!("SELECT {WRAPPER_COLUMNS} FROM wrapper WHERE status = ?1 ORDER BY id ASC"))?;
        let rows = stmt.query_map(params![status.to_string()], row_to_wrapper)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    pub fn get_wrapper_by_id(&self, id: i64) -> RegistryResult<Option<Wrapper>> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        conn.query_row(&format!("SELECT {WRAPPER_COLUMNS} FROM wrapper WHERE id = ?1"), params![id], row_to_wrapper)
            .optional()
            .map_err(Into::into)
    }

    pub fn get_wrapper_by_address(&self, address: &str) -> RegistryResult<Option<Wrapper>> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        conn.query_row(&format!("SELECT {WRAPPER_COLUMNS} FROM wrapper WHERE address = ?1"), params![address], row_to_wrapper)
            .optional()
            .map_err(Into::into)
    }

    pub fn set_wrapper_status(&self, id: i64, status: WrapperStatus) -> RegistryResult<()> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let changed = conn.execute("UPDATE wrapper SET status = ?1 WHERE id = ?2", params![status.to_string(), id])?;
        if changed == 0 {
            return Err(RegistryError::NotFound(format!("wrapper {id}")));
        }
        Ok(())
    }

    pub fn set_wrapper_status_by_address(&self, address: &str, status: WrapperStatus) -> RegistryResult<()> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let changed = conn.execute("UPDATE wrapper SET status = ?1 WHERE address = ?2", params![status.to_string(), address])?;
        if changed == 0 {
            return Err(RegistryError::NotFound(format!("wrapper at {address}")));
        }
        Ok(())
    }

    pub fn set_wrapper_config(&self, id: i64, config: &str) -> RegistryResult<()> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let changed = conn.execute("UPDATE wrapper SET llm_config = ?1 WHERE id = ?2", params![config, id])?;
        if changed == 0 {
            return Err(RegistryError::NotFound(format!("wrapper {id}")));
        }
        Ok(())
    }
}
