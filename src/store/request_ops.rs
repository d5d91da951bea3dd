//! Request-table operations (§4.1, §4.6).

use rusqlite::{params, OptionalExtension, Row};

use crate::domain::{Request, RequestStatus};
use crate::error::{RegistryError, RegistryResult};

use super::Store;

fn row_to_request(row: &Row) -> rusqlite::Result<Request> {
    let status_raw: String = row.get(2)?;
    Ok(Request {
        id: row.get(0)?,
        llm_config: row.get(1)?,
        status: status_raw
            .parse()
            .map_err(|e: String| rusqlite::Error::InvalidColumnType(2, e, rusqlite::types::Type::Text))?,
        measurement_id: row.get(3)?,
        address: row.get(4)?,
    })
}

const REQUEST_COLUMNS: &str = "id, llm_config, status, measurement_id, address";

impl Store {
    /// Insert a new request with status `queued` and `address = null`.
    pub fn add_request(&self, id: &str, llm_config: &str, measurement_id: i64) -> RegistryResult<()> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        conn.execute(
            "INSERT INTO request (id, llm_config, status, measurement_id, address) VALUES (?1, ?2, ?3, ?4, NULL)",
            params![id, llm_config, RequestStatus::Queued.to_string(), measurement_id],
        )?;
        Ok(())
    }

    pub fn get_request(&self, id: &str) -> RegistryResult<Option<Request>> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        conn.query_row(&format!("SELECT {REQUEST_COLUMNS} FROM request WHERE id = ?1"), params![id], row_to_request)
            .optional()
            .map_err(Into::into)
    }

    pub fn list_requests_by_measurement(&self, measurement_id: i64) -> RegistryResult<Vec<Request>> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let mut stmt = conn.prepare(&format!("SELECT {REQUEST_COLUMNS} FROM request WHERE measurement_id = ?1 ORDER BY rowid ASC"))?;
        let rows = stmt.query_map(params![measurement_id], row_to_request)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    pub fn list_requests_by_status(&self, status: RequestStatus) -> RegistryResult<Vec<Request>> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let mut stmt = conn.prepare(&format!("SELECT {REQUEST_COLUMNS} FROM request WHERE status = ?1 ORDER BY rowid ASC"))?;
        let rows = stmt.query_map(params![status.to_string()], row_to_request)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    /// The measurement's next `queued` request, in insertion order, or `None`.
    pub fn next_queued_request_for_measurement(&self, measurement_id: i64) -> RegistryResult<Option<Request>> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        conn.query_row(
            &format!("SELECT {REQUEST_COLUMNS} FROM request WHERE measurement_id = ?1 AND status = ?2 ORDER BY rowid ASC LIMIT 1"),
            params![measurement_id, RequestStatus::Queued.to_string()],
            row_to_request,
        )
        .optional()
        .map_err(Into::into)
    }

    /// Atomically bind `address` and transition to `deployed` (§4.1).
    pub fn set_request_address(&self, id: &str, address: &str) -> RegistryResult<()> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let changed = conn.execute(
            "UPDATE request SET address = ?1, status = ?2 WHERE id = ?3",
            params![address, RequestStatus::Deployed.to_string(), id],
        )?;
        if changed == 0 {
            return Err(RegistryError::NotFound(format!("request {id}")));
        }
        Ok(())
    }

    pub fn set_request_status(&self, id: &str, status: RequestStatus) -> RegistryResult<()> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let changed = conn.execute("UPDATE request SET status = ?1 WHERE id = ?2", params![status.to_string(), id])?;
        if changed == 0 {
            return Err(RegistryError::NotFound(format!("request {id}")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_request_starts_queued_with_no_address() {
        let store = Store::open_in_memory().unwrap();
        store.add_measurement(1).unwrap();
        store.add_request("r1", "{}", 1).unwrap();
        let request = store.get_request("r1").unwrap().unwrap();
        assert_eq!(request.status, RequestStatus::Queued);
        assert_eq!(request.address, None);
    }

    #[test]
    fn set_request_address_also_transitions_to_deployed() {
        let store = Store::open_in_memory().unwrap();
        store.add_measurement(1).unwrap();
        store.add_request("r1", "{}", 1).unwrap();
        store.set_request_address("r1", "10.0.0.1").unwrap();
        let request = store.get_request("r1").unwrap().unwrap();
        assert_eq!(request.status, RequestStatus::Deployed);
        assert_eq!(request.address.as_deref(), Some("10.0.0.1"));
    }

    #[test]
    fn next_queued_request_skips_non_queued() {
        let store = Store::open_in_memory().unwrap();
        store.add_measurement(1).unwrap();
        store.add_request("r1", "{}", 1).unwrap();
        store.add_request("r2", "{}", 1).unwrap();
        store.set_request_status("r1", RequestStatus::Completed).unwrap();
        let next = store.next_queued_request_for_measurement(1).unwrap().unwrap();
        assert_eq!(next.id, "r2");
    }
}
