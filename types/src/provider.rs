use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable identity of one card provider.
///
/// A package may expose several providers, each reachable at its own endpoint.
/// Equality and hashing use both fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProviderId {
    package: String,
    endpoint: String,
}

impl ProviderId {
    #[must_use]
    pub fn new(package: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            endpoint: endpoint.into(),
        }
    }

    #[must_use]
    pub fn package(&self) -> &str {
        &self.package
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// `true` if `package` is this provider's package.
    #[must_use]
    pub fn contains_package(&self, package: &str) -> bool {
        self.package == package
    }

    /// `true` if `endpoint` is this provider's endpoint.
    #[must_use]
    pub fn contains_endpoint(&self, endpoint: &str) -> bool {
        self.endpoint == endpoint
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} : {}", self.endpoint, self.package)
    }
}
