//! Startup configuration (§6).
//!
//! Loaded once from an INI file. A malformed `llm_wrapper_machines` JSON
//! array is fatal (`ConfigError`); an empty array is permitted and logged.

use std::path::Path;

use config::{Config as RawConfig, File, FileFormat};
use serde::Deserialize;
use tracing::info;

use crate::error::{RegistryError, RegistryResult};

/// One entry of the `[llm] llm_wrapper_machines` roster.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WrapperMachine {
    pub ip_address: String,
    pub user: String,
    pub password: String,
}

/// Fully-resolved registry configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub db_name: String,
    pub llm_wrapper_machines: Vec<WrapperMachine>,
    pub reset_on_boot: bool,
    pub bind_address: String,
    pub log_level: String,
}

impl Config {
    /// Load and validate configuration from an INI file at `path`.
    pub fn load(path: &Path) -> RegistryResult<Self> {
        let raw = RawConfig::builder()
            .add_source(File::new(
                path.to_str().ok_or_else(|| RegistryError::ConfigError("config path is not valid UTF-8".to_string()))?,
                FileFormat::Ini,
            ))
            .build()
            .map_err(|e| RegistryError::ConfigError(format!("failed to read {}: {e}", path.display())))?;

        let db_name = raw
            .get_string("database.db_name")
            .map_err(|e| RegistryError::ConfigError(format!("[database] db_name is required: {e}")))?;

        let machines_raw = raw.get_string("llm.llm_wrapper_machines").unwrap_or_default();
        let llm_wrapper_machines = parse_wrapper_machines(&machines_raw)?;

        let reset_on_boot = raw.get_bool("registry.reset_on_boot").unwrap_or(false);
        let bind_address = raw.get_string("server.bind_address").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
        let log_level = raw.get_string("logging.level").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            db_name,
            llm_wrapper_machines,
            reset_on_boot,
            bind_address,
            log_level,
        })
    }
}

fn parse_wrapper_machines(raw: &str) -> RegistryResult<Vec<WrapperMachine>> {
    if raw.trim().is_empty() {
        info!("the 'llm_wrapper_machines' list is empty");
        return Ok(Vec::new());
    }

    let machines: Vec<WrapperMachine> = serde_json::from_str(raw)
        .map_err(|e| RegistryError::ConfigError(format!("invalid JSON value for llm_wrapper_machines: {e}")))?;

    if machines.is_empty() {
        info!("the 'llm_wrapper_machines' list is empty");
    }

    Ok(machines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_ini(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn loads_db_name_and_empty_roster() {
        let file = write_ini(
            "[database]\ndb_name = registry.sqlite3\n\n[llm]\nllm_wrapper_machines = []\n",
        );
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.db_name, "registry.sqlite3");
        assert!(config.llm_wrapper_machines.is_empty());
        assert!(!config.reset_on_boot);
    }

    #[test]
    fn loads_wrapper_roster() {
        let file = write_ini(
            r#"[database]
db_name = registry.sqlite3

[llm]
llm_wrapper_machines = [{"ip_address": "10.0.0.1", "user": "root", "password": "secret"}]

[registry]
reset_on_boot = true
"#,
        );
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.llm_wrapper_machines.len(), 1);
        assert_eq!(config.llm_wrapper_machines[0].ip_address, "10.0.0.1");
        assert!(config.reset_on_boot);
    }

    #[test]
    fn invalid_json_roster_is_fatal() {
        let file = write_ini(
            "[database]\ndb_name = registry.sqlite3\n\n[llm]\nllm_wrapper_machines = not json\n",
        );
        let result = Config::load(file.path());
        assert!(matches!(result, Err(RegistryError::ConfigError(_))));
    }

    #[test]
    fn missing_db_name_is_fatal() {
        let file = write_ini("[llm]\nllm_wrapper_machines = []\n");
        let result = Config::load(file.path());
        assert!(matches!(result, Err(RegistryError::ConfigError(_))));
    }
}
