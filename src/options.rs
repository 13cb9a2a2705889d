use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Configures the HTTP layer of [`crate::HttpApiClient`].
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientOptions {
    /// Per-request timeout in milliseconds.
    pub timeout_ms: u64,
    /// Overrides the `User-Agent` header.
    pub user_agent: Option<String>,
    /// Extra headers sent with every request.
    pub default_headers: BTreeMap<String, String>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            user_agent: None,
            default_headers: BTreeMap::new(),
        }
    }
}

impl ClientOptions {
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.insert(name.into(), value.into());
        self
    }
}
