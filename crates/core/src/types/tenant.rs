//! Tenant identity.

use serde::{Deserialize, Serialize};

/// Identifies which external credential/config set a request runs under.
///
/// Tenant identity is always passed explicitly - core calls never infer it
/// from ambient state. Authentication of the tenant happens upstream; by the
/// time a `Tenant` reaches the core it is trusted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tenant(String);

impl Tenant {
    /// Create a tenant identifier.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The tenant name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Tenant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Tenant {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tenant_display() {
        assert_eq!(Tenant::new("acme").to_string(), "acme");
    }

    #[test]
    fn test_tenant_serde_transparent() {
        let tenant = Tenant::new("acme");
        assert_eq!(serde_json::to_string(&tenant).expect("serialize"), "\"acme\"");
    }
}
