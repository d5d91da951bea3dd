//! Measurement-table operations (§4.1, §4.6).

use rusqlite::{params, OptionalExtension, Row};

use crate::domain::{Measurement, MeasurementStatus};
use crate::error::{RegistryError, RegistryResult};

use super::Store;

fn row_to_measurement(row: &Row) -> rusqlite::Result<Measurement> {
    let status_raw: String = row.get(1)?;
    Ok(Measurement {
        id: row.get(0)?,
        status: status_raw
            .parse()
            .map_err(|e: String| rusqlite::Error::InvalidColumnType(1, e, rusqlite::types::Type::Text))?,
        wrapper_id: row.get(2)?,
    })
}

const MEASUREMENT_COLUMNS: &str = "id, status, wrapper_id";

impl Store {
    /// Upsert: a no-op if `id` already exists (§3, invariant 6).
    pub fn add_measurement(&self, id: i64) -> RegistryResult<()> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        conn.execute(
            "INSERT INTO measurement (id, status, wrapper_id) VALUES (?1, ?2, NULL) ON CONFLICT(id) DO NOTHING",
            params![id, MeasurementStatus::DeploymentsPending.to_string()],
        )?;
        Ok(())
    }

    pub fn get_measurement(&self, id: i64) -> RegistryResult<Option<Measurement>> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        conn.query_row(&format!("SELECT {MEASUREMENT_COLUMNS} FROM measurement WHERE id = ?1"), params![id], row_to_measurement)
            .optional()
            .map_err(Into::into)
    }

    pub fn list_measurements_by_status(&self, status: MeasurementStatus) -> RegistryResult<Vec<Measurement>> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let mut stmt = conn.prepare(&format!("SELECT {MEASUREMENT_COLUMNS} FROM measurement WHERE status = ?1 ORDER BY id ASC"))?;
        let rows = stmt.query_map(params![status.to_string()], row_to_measurement)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    pub fn set_measurement_wrapper(&self, id: i64, wrapper_id: Option<i64>) -> RegistryResult<()> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let changed = conn.execute("UPDATE measurement SET wrapper_id = ?1 WHERE id = ?2", params![wrapper_id, id])?;
        if changed == 0 {
            return Err(RegistryError::NotFound(format!("measurement {id}")));
        }
        Ok(())
    }

    pub fn set_measurement_status(&self, id: i64, status: MeasurementStatus) -> RegistryResult<()> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let changed = conn.execute("UPDATE measurement SET status = ?1 WHERE id = ?2", params![status.to_string(), id])?;
        if changed == 0 {
            return Err(RegistryError::NotFound(format!("measurement {id}")));
        }
        Ok(())
    }
}
