use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use parking_lot::RwLock;
use reqwest::Method;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value as JsonValue;
use tokio_util::sync::CancellationToken;

use crate::{
    backoff, pending::PendingRequests, ApiClient, ApiError, ApiRequest, Fingerprint, Params,
    PolicyUpdate, ResponseCache, Result, RetryPolicy,
};

/// Retrying wrapper around an [`ApiClient`].
///
/// Every verb retries network failures and retryable statuses with jittered
/// exponential backoff. GET requests are additionally coalesced while in
/// flight and, once retries are exhausted, may be answered from the last
/// successful response stored for the same fingerprint.
///
/// Cloning is cheap; clones share cache, in-flight registry, policy and
/// cancellation token.
#[derive(Clone)]
pub struct ResilientClient {
    api: Arc<dyn ApiClient>,
    policy: Arc<RwLock<RetryPolicy>>,
    cache: Arc<ResponseCache>,
    pending: Arc<PendingRequests>,
    cancel: CancellationToken,
}

impl fmt::Debug for ResilientClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResilientClient")
            .field("policy", &*self.policy.read())
            .field("cached", &self.cache.len())
            .field("in_flight", &self.pending.len())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

impl ResilientClient {
    /// Wraps `api` with the default [`RetryPolicy`].
    pub fn new<C>(api: C) -> Self
    where
        C: ApiClient + 'static,
    {
        Self::from_arc(Arc::new(api))
    }

    /// Wraps an already shared client.
    pub fn from_arc(api: Arc<dyn ApiClient>) -> Self {
        Self {
            api,
            policy: Arc::new(RwLock::new(RetryPolicy::default())),
            cache: Arc::new(ResponseCache::new()),
            pending: Arc::new(PendingRequests::default()),
            cancel: CancellationToken::new(),
        }
    }

    /// Replaces the retry policy after validating it.
    pub fn with_policy(self, policy: RetryPolicy) -> Result<Self> {
        policy.validate()?;
        *self.policy.write() = policy;
        Ok(self)
    }

    /// Ties the client to an external shutdown token.
    ///
    /// Only this client and clones made from it afterwards see the token;
    /// call it before cloning.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Snapshot of the live policy.
    pub fn policy(&self) -> RetryPolicy {
        self.policy.read().clone()
    }

    /// Merges `update` into the live policy. Executions already running keep
    /// the policy they started with.
    ///
    /// Switching `canonical_params` changes the fingerprint format, so the
    /// cache is cleared.
    pub fn update_config(&self, update: PolicyUpdate) -> Result<()> {
        let mut policy = self.policy.write();
        let next = policy.merged(&update);
        next.validate()?;
        let rekeyed = next.canonical_params != policy.canonical_params;
        *policy = next;
        drop(policy);
        if rekeyed {
            self.cache.clear();
        }
        Ok(())
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Drops the entry stored for one request.
    pub fn clear_cache_for(&self, method: Method, url: &str, params: impl Into<Params>) {
        let canonical = self.policy.read().canonical_params;
        let key = Fingerprint::for_policy(&method, url, &params.into(), canonical);
        self.cache.remove(&key);
    }

    /// Number of distinct GET requests currently in flight.
    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }

    /// Cancels waiting and running requests; later calls fail with
    /// [`ApiError::Cancelled`].
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub async fn get<T>(&self, url: &str, params: impl Into<Params>) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let value = self.get_shared(url, params.into(), None).await?;
        decode(value)
    }

    /// Like [`ResilientClient::get`], caching the response for `max_age`
    /// instead of the policy default.
    pub async fn get_with_max_age<T>(
        &self,
        url: &str,
        params: impl Into<Params>,
        max_age: Duration,
    ) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let value = self.get_shared(url, params.into(), Some(max_age)).await?;
        decode(value)
    }

    pub async fn get_value(&self, url: &str, params: impl Into<Params>) -> Result<JsonValue> {
        self.get_shared(url, params.into(), None).await
    }

    /// Sends `body` as JSON. A body serializing to `null` (such as `&()`) is
    /// omitted.
    pub async fn post<T, B>(&self, url: &str, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.mutate(Method::POST, url, Params::default(), encode(body)?)
            .await
    }

    pub async fn put<T, B>(&self, url: &str, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.mutate(Method::PUT, url, Params::default(), encode(body)?)
            .await
    }

    pub async fn patch<T, B>(&self, url: &str, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.mutate(Method::PATCH, url, Params::default(), encode(body)?)
            .await
    }

    pub async fn delete<T>(&self, url: &str, params: impl Into<Params>) -> Result<T>
    where
        T: DeserializeOwned,
    {
        self.mutate(Method::DELETE, url, params.into(), None).await
    }

    /// Sleeps for `delay` unless the client is shut down first.
    pub(crate) async fn pause(&self, delay: Duration) -> Result<()> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ApiError::Cancelled),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }

    async fn mutate<T>(
        &self,
        method: Method,
        url: &str,
        params: Params,
        body: Option<JsonValue>,
    ) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let request = ApiRequest::new(method, url)
            .with_params(params)
            .with_body(body);
        let value = self.execute(request, None, None).await?;
        decode(value)
    }

    async fn get_shared(
        &self,
        url: &str,
        params: Params,
        max_age: Option<Duration>,
    ) -> Result<JsonValue> {
        let canonical = self.policy.read().canonical_params;
        let key = Fingerprint::for_policy(&Method::GET, url, &params, canonical);
        let request = ApiRequest::new(Method::GET, url).with_params(params);

        let this = self.clone();
        let flight_key = key.clone();
        let (flight, joined) = self.pending.join_or_start(key, move |guard| {
            async move {
                let _guard = guard;
                this.execute(request, Some(flight_key), max_age).await
            }
            .boxed()
        });

        #[cfg(feature = "tracing")]
        {
            if joined {
                tracing::debug!(url, "joined in-flight GET request");
            }
        }
        #[cfg(not(feature = "tracing"))]
        let _ = joined;

        flight.await
    }

    /// Runs the retry loop. `cache_key` is set for GET requests only.
    async fn execute(
        &self,
        request: ApiRequest,
        cache_key: Option<Fingerprint>,
        max_age: Option<Duration>,
    ) -> Result<JsonValue> {
        let policy = self.policy.read().clone();
        let mut attempt = 0u32;
        loop {
            match self.attempt(&request, &policy).await {
                Ok(payload) => {
                    if let Some(key) = cache_key.as_ref().filter(|_| policy.caching_enabled) {
                        let max_age = max_age.unwrap_or_else(|| policy.default_cache_max_age());
                        self.cache.insert(key.clone(), payload.clone(), max_age);
                    }
                    return Ok(payload);
                }
                Err(ApiError::Cancelled) => return Err(ApiError::Cancelled),
                Err(err) => {
                    if policy.is_retryable(&err) && attempt < policy.max_retries {
                        let delay = backoff::retry_delay(&policy, attempt);

                        #[cfg(feature = "tracing")]
                        tracing::debug!(
                            method = %request.method,
                            url = %request.url,
                            attempt = attempt + 1,
                            max_retries = policy.max_retries,
                            delay_ms = delay.as_millis() as u64,
                            error = %err,
                            "retrying request"
                        );

                        self.pause(delay).await?;
                        attempt += 1;
                        continue;
                    }

                    if let Some(cached) = cache_key.as_ref().and_then(|key| self.cache.get(key)) {
                        #[cfg(feature = "tracing")]
                        tracing::info!(
                            url = %request.url,
                            error = %err,
                            "serving cached response after failed request"
                        );
                        return Ok(cached);
                    }

                    #[cfg(feature = "tracing")]
                    tracing::warn!(
                        method = %request.method,
                        url = %request.url,
                        attempts = attempt + 1,
                        error = %err,
                        "request failed"
                    );
                    return Err(err);
                }
            }
        }
    }

    async fn attempt(&self, request: &ApiRequest, policy: &RetryPolicy) -> Result<JsonValue> {
        let send = self.api.send(request);
        let bounded = async {
            match policy.attempt_timeout() {
                Some(limit) => match tokio::time::timeout(limit, send).await {
                    Ok(result) => result,
                    Err(_) => Err(ApiError::Timeout {
                        after_ms: limit.as_millis() as u64,
                    }),
                },
                None => send.await,
            }
        };
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ApiError::Cancelled),
            result = bounded => result,
        }
    }
}

fn encode<B: Serialize + ?Sized>(body: &B) -> Result<Option<JsonValue>> {
    let value = serde_json::to_value(body)
        .map_err(|err| ApiError::Decode(format!("request body could not be encoded: {err}")))?;
    Ok((!value.is_null()).then_some(value))
}

fn decode<T: DeserializeOwned>(value: JsonValue) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|err| ApiError::Decode(format!("unexpected response shape: {err}")))
}
