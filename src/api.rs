use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value as JsonValue;

use crate::{Params, Result};

/// A single call against the upstream API.
#[derive(Clone, Debug, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    /// Path relative to the client's base URL, or an absolute URL.
    pub url: String,
    pub params: Params,
    /// JSON body; `None` sends no body.
    pub body: Option<JsonValue>,
}

impl ApiRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            params: Params::default(),
            body: None,
        }
    }

    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    pub fn with_body(mut self, body: Option<JsonValue>) -> Self {
        self.body = body;
        self
    }
}

/// Upstream API client wrapped by [`crate::ResilientClient`].
///
/// Implementations perform exactly one attempt per call and report failures
/// as [`crate::ApiError`]: `Network`/`Timeout` when no response was
/// obtained, `Http` for non-success statuses.
#[async_trait]
pub trait ApiClient: Send + Sync {
    async fn send(&self, request: &ApiRequest) -> Result<JsonValue>;
}
