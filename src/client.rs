use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, StatusCode};
use serde_json::Value as JsonValue;
use tokio_util::sync::CancellationToken;

use crate::{
    auth::{normalize_bearer_authorization, UnauthorizedListeners},
    ApiClient, ApiError, ApiRequest, ClientOptions, Result, StaticToken, TokenProvider,
};

#[derive(Clone)]
/// JSON REST client for the backend API.
///
/// One call to [`ApiClient::send`] is exactly one HTTP request; wrap the
/// client in a [`crate::ResilientClient`] for retries.
pub struct HttpApiClient {
    http: reqwest::Client,
    base_url: String,
    auth: Option<Arc<dyn TokenProvider>>,
    unauthorized: UnauthorizedListeners,
    options: ClientOptions,
}

impl fmt::Debug for HttpApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpApiClient")
            .field("base_url", &self.base_url)
            .field("auth", &self.auth.as_ref().map(|_| "<redacted>"))
            .field("options", &self.options)
            .finish()
    }
}

impl HttpApiClient {
    /// Creates an unauthenticated client for `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            auth: None,
            unauthorized: UnauthorizedListeners::default(),
            options: ClientOptions::default(),
        }
    }

    /// Creates a client from environment variables.
    ///
    /// Reads:
    /// - `API_BASE_URL` — backend base URL (required)
    /// - `API_TOKEN` — access token, `Bearer` prefix optional
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var("API_BASE_URL").map_err(|_| {
            ApiError::InvalidConfig("missing API_BASE_URL environment variable".to_owned())
        })?;
        if base_url.trim().is_empty() {
            return Err(ApiError::InvalidConfig(
                "API_BASE_URL is set but empty".to_owned(),
            ));
        }
        let client = Self::new(base_url.trim());
        match std::env::var("API_TOKEN") {
            Ok(token) if !token.trim().is_empty() => Ok(client.with_bearer_token(token)),
            _ => Ok(client),
        }
    }

    /// Applies timeout and header options.
    pub fn with_options(mut self, opts: ClientOptions) -> Self {
        self.options = opts;
        self
    }

    /// Resolves the token through `provider` on every request.
    pub fn with_token_provider<P>(mut self, provider: P) -> Self
    where
        P: TokenProvider + 'static,
    {
        self.auth = Some(Arc::new(provider));
        self
    }

    /// Sends a fixed token. The `Bearer ` prefix is added when missing.
    pub fn with_bearer_token(self, token: impl Into<String>) -> Self {
        self.with_token_provider(StaticToken::new(token))
    }

    /// Registers `listener` to run on every 401 response until
    /// `registration` is cancelled.
    pub fn on_unauthorized<F>(&self, registration: CancellationToken, listener: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.unauthorized.register(registration, listener);
    }

    /// Number of live unauthorized listeners.
    pub fn unauthorized_listeners(&self) -> usize {
        self.unauthorized.len()
    }

    /// Joins `path` onto the base URL. Absolute URLs pass through.
    pub fn resolve_url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_owned();
        }
        let base = self.base_url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        if path.is_empty() {
            base.to_owned()
        } else {
            format!("{base}/{path}")
        }
    }

    fn authorization(&self) -> Option<String> {
        let token = self.auth.as_ref()?.token()?;
        if token.trim().is_empty() {
            return None;
        }
        Some(normalize_bearer_authorization(&token))
    }

    fn transport_error(&self, err: reqwest::Error) -> ApiError {
        if err.is_timeout() {
            ApiError::Timeout {
                after_ms: self.options.timeout_ms,
            }
        } else {
            ApiError::Network(err.to_string())
        }
    }
}

#[async_trait]
impl ApiClient for HttpApiClient {
    async fn send(&self, request: &ApiRequest) -> Result<JsonValue> {
        let url = self.resolve_url(&request.url);
        let mut builder = self
            .http
            .request(request.method.clone(), &url)
            .header(header::ACCEPT, "application/json")
            .timeout(Duration::from_millis(self.options.timeout_ms));

        if let Some(user_agent) = &self.options.user_agent {
            builder = builder.header(header::USER_AGENT, user_agent.as_str());
        }
        for (name, value) in &self.options.default_headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(authorization) = self.authorization() {
            builder = builder.header(header::AUTHORIZATION, authorization);
        }
        if !request.params.is_empty() {
            builder = builder.query(request.params.pairs());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|err| self.transport_error(err))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|err| self.transport_error(err))?;

        if !status.is_success() {
            if status == StatusCode::UNAUTHORIZED {
                let _notified = self.unauthorized.notify();
                #[cfg(feature = "tracing")]
                tracing::warn!(url = %url, listeners = _notified, "unauthorized response");
            }
            return Err(http_error(status, &text));
        }

        if text.trim().is_empty() {
            return Ok(JsonValue::Null);
        }
        serde_json::from_str(&text).map_err(|err| {
            ApiError::Decode(format!("invalid JSON response: {err}; body: {text}"))
        })
    }
}

/// Builds an [`ApiError::Http`], taking the message from the body's
/// `message` or `error` field when present.
fn http_error(status: StatusCode, text: &str) -> ApiError {
    let body = serde_json::from_str::<JsonValue>(text).ok();
    let message = body
        .as_ref()
        .and_then(|body| {
            body.get("message")
                .or_else(|| body.get("error"))
                .and_then(JsonValue::as_str)
        })
        .map(str::to_owned)
        .or_else(|| status.canonical_reason().map(str::to_owned))
        .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));

    ApiError::Http {
        status: status.as_u16(),
        message,
        body,
    }
}
