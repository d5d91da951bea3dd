//! The `Wrapper` entity (§3).

use super::status::WrapperStatus;

/// A remote host that can host one model at a time.
#[derive(Debug, Clone, PartialEq)]
pub struct Wrapper {
    pub id: i64,
    pub llm: String,
    pub llm_config: Option<String>,
    pub address: String,
    pub username: String,
    pub password: String,
    pub status: WrapperStatus,
}

impl Wrapper {
    /// Construct a freshly-seeded wrapper (no id yet; the store assigns one on insert).
    pub fn seed(llm: impl Into<String>, address: impl Into<String>, username: impl Into<String>, password: impl Into<String>, status: WrapperStatus) -> Self {
        Self {
            id: 0,
            llm: llm.into(),
            llm_config: None,
            address: address.into(),
            username: username.into(),
            password: password.into(),
            status,
        }
    }
}
