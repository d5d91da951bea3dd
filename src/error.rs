//! Error taxonomy (§7).

use thiserror::Error;

/// The registry's error taxonomy.
///
/// Control loops catch and log every variant at iteration scope; the API
/// surface translates only `InvalidState` and `NotFound` to client-visible
/// errors (§7 propagation policy).
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A remote call returned transport failure or timeout.
    #[error("remote host unreachable: {0}")]
    TransientRemote(String),

    /// Remote returned a well-formed negative result.
    #[error("remote rejected the operation: {0}")]
    RemoteNegative(String),

    /// A state transition was requested that the wrapper state machine forbids.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Request or wrapper referenced by an unknown key.
    #[error("not found: {0}")]
    NotFound(String),

    /// Malformed configuration at startup.
    #[error("config error: {0}")]
    ConfigError(String),

    /// Persistence failure.
    #[error("store error: {0}")]
    StoreError(#[from] rusqlite::Error),

    /// A stored `llm_config` blob or request body failed to (de)serialize.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type RegistryResult<T> = Result<T, RegistryError>;
