//! Registry and dispatcher for remote LLM wrapper hosts.

pub mod api;
pub mod config;
pub mod dispatch;
pub mod domain;
pub mod error;
pub mod health;
pub mod registry;
pub mod server;
pub mod store;
pub mod worker;

pub use config::Config;
pub use error::{RegistryError, RegistryResult};
pub use registry::Registry;
pub use store::Store;
