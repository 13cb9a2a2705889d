//! `resilient-api-client` is an async JSON API client with retry, jittered
//! exponential backoff, cached-read fallback and coalescing of identical
//! in-flight reads.
//!
//! The crate is split into:
//! - [`ApiClient`], the one-attempt upstream contract, with
//!   [`HttpApiClient`] as its reqwest implementation
//! - [`ResilientClient`], which wraps any [`ApiClient`] with the
//!   [`RetryPolicy`]
//! - [`StatusPoller`], for waiting on payment and other status resources

mod api;
mod auth;
pub mod backoff;
mod cache;
mod client;
mod error;
mod fingerprint;
mod options;
mod params;
mod pending;
mod poll;
mod policy;
mod resilient;

pub use api::{ApiClient, ApiRequest};
pub use auth::{StaticToken, TokenProvider};
pub use cache::ResponseCache;
pub use client::HttpApiClient;
pub use error::ApiError;
pub use fingerprint::Fingerprint;
pub use options::ClientOptions;
pub use params::Params;
pub use poll::{PollDecision, PollError, StatusPoller};
pub use policy::{PolicyUpdate, RetryPolicy, DEFAULT_RETRYABLE_STATUS_CODES};
pub use resilient::ResilientClient;

pub use reqwest::Method;
pub use tokio_util::sync::CancellationToken;

pub type Result<T> = std::result::Result<T, ApiError>;
