use std::collections::BTreeSet;

/// Error type returned by this crate.
///
/// Errors are `Clone` so a coalesced GET can hand the same outcome to every
/// waiting caller.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum ApiError {
    /// No HTTP response was obtained (connect, DNS, reset, body read).
    #[error("network error: {0}")]
    Network(String),
    /// A single attempt exceeded its timeout.
    #[error("request timed out after {after_ms} ms")]
    Timeout { after_ms: u64 },
    /// Non-success HTTP status code.
    #[error("http error {status}: {message}")]
    Http {
        status: u16,
        /// Message extracted from the response body, or the canonical reason.
        message: String,
        /// Response body when it parsed as JSON.
        body: Option<serde_json::Value>,
    },
    /// The owning client was shut down.
    #[error("request cancelled")]
    Cancelled,
    /// Request body encoding or response decoding error.
    #[error("decode error: {0}")]
    Decode(String),
    /// Rejected client or policy configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ApiError {
    /// Builds an HTTP error without a body.
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            message: message.into(),
            body: None,
        }
    }

    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True when no response was obtained at all.
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout { .. })
    }

    /// Network-level failures are always retryable; HTTP failures only when
    /// their status is listed.
    pub fn is_retryable(&self, retryable_status_codes: &BTreeSet<u16>) -> bool {
        match self {
            Self::Network(_) | Self::Timeout { .. } => true,
            Self::Http { status, .. } => retryable_status_codes.contains(status),
            Self::Cancelled | Self::Decode(_) | Self::InvalidConfig(_) => false,
        }
    }
}
