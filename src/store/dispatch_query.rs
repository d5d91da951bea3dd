//! `find_best_deployments` — the one non-trivial query (§4.1, §4.5 Phase 1).

use rusqlite::{params, Row};

use crate::error::RegistryResult;

use super::Store;

/// A zero-cost (request, wrapper) pairing: the wrapper is already `ready`
/// with the request's exact `llm_config`, and the measurement is unbound.
#[derive(Debug, Clone, PartialEq)]
pub struct BestDeployment {
    pub request_id: String,
    pub llm_config: String,
    pub measurement_id: i64,
    pub wrapper_id: i64,
    pub wrapper_address: String,
}

fn row_to_best_deployment(row: &Row) -> rusqlite::Result<BestDeployment> {
    Ok(BestDeployment {
        request_id: row.get(0)?,
        llm_config: row.get(1)?,
        measurement_id: row.get(2)?,
        wrapper_id: row.get(3)?,
        wrapper_address: row.get(4)?,
    })
}

impl Store {
    /// Requests that are `queued`, whose measurement has no bound wrapper,
    /// matched against a `ready` wrapper with identical `llm_config`.
    pub fn find_best_deployments(&self) -> RegistryResult<Vec<BestDeployment>> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let mut stmt = conn.prepare(
            "SELECT request.id, request.llm_config, request.measurement_id, wrapper.id, wrapper.address
             FROM request
             JOIN wrapper ON request.llm_config = wrapper.llm_config
             JOIN measurement ON request.measurement_id = measurement.id
             WHERE measurement.wrapper_id IS NULL
               AND wrapper.status = ?1
               AND request.status = ?2",
        )?;
        let rows = stmt.query_map(
            params![crate::domain::WrapperStatus::Ready.to_string(), crate::domain::RequestStatus::Queued.to_string()],
            row_to_best_deployment,
        )?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::WrapperStatus;

    #[test]
    fn empty_store_has_no_best_deployments() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.find_best_deployments().unwrap().is_empty());
    }

    #[test]
    fn matches_ready_wrapper_with_identical_config_and_unbound_measurement() {
        let store = Store::open_in_memory().unwrap();
        let wrapper_id = store.add_wrapper("llama", "10.0.0.1", "u", "p", WrapperStatus::Ready).unwrap();
        store.set_wrapper_config(wrapper_id, "config-x").unwrap();
        store.add_measurement(9).unwrap();
        store.add_request("r1", "config-x", 9).unwrap();

        let best = store.find_best_deployments().unwrap();
        assert_eq!(best.len(), 1);
        assert_eq!(best[0].request_id, "r1");
        assert_eq!(best[0].wrapper_id, wrapper_id);
    }

    #[test]
    fn does_not_match_when_measurement_already_bound() {
        let store = Store::open_in_memory().unwrap();
        let wrapper_id = store.add_wrapper("llama", "10.0.0.1", "u", "p", WrapperStatus::Ready).unwrap();
        store.set_wrapper_config(wrapper_id, "config-x").unwrap();
        store.add_measurement(9).unwrap();
        store.set_measurement_wrapper(9, Some(wrapper_id)).unwrap();
        store.add_request("r1", "config-x", 9).unwrap();

        assert!(store.find_best_deployments().unwrap().is_empty());
    }

    #[test]
    fn does_not_match_on_config_mismatch() {
        let store = Store::open_in_memory().unwrap();
        let wrapper_id = store.add_wrapper("llama", "10.0.0.1", "u", "p", WrapperStatus::Ready).unwrap();
        store.set_wrapper_config(wrapper_id, "config-x").unwrap();
        store.add_measurement(9).unwrap();
        store.add_request("r1", "config-y", 9).unwrap();

        assert!(store.find_best_deployments().unwrap().is_empty());
    }
}
