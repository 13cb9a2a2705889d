//! Polling a status endpoint until it reports a final state.
//!
//! Used for payment confirmation: after an STK push the backend exposes a
//! status resource that moves from pending to completed or failed while the
//! customer answers the prompt on their phone.

use std::time::Duration;

use serde_json::Value as JsonValue;

use crate::{ApiError, Params, ResilientClient};

/// Verdict of the caller's predicate on one status response.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PollDecision {
    /// Not final yet; poll again after the interval.
    Continue,
    /// Final; stop and return this response.
    Done,
}

#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum PollError {
    /// `max_polls` responses were seen without a final state.
    #[error("status still pending after {polls} polls")]
    Exhausted { polls: u32, last: JsonValue },
    /// A status request failed after its retries.
    #[error(transparent)]
    Request(#[from] ApiError),
}

/// Repeated GET of one status URL through a [`ResilientClient`].
#[derive(Clone, Debug)]
pub struct StatusPoller {
    client: ResilientClient,
    url: String,
    params: Params,
    interval: Duration,
    max_polls: u32,
}

impl StatusPoller {
    /// Polls every 5 s, at most 12 times.
    pub fn new(client: ResilientClient, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
            params: Params::default(),
            interval: Duration::from_secs(5),
            max_polls: 12,
        }
    }

    pub fn with_params(mut self, params: impl Into<Params>) -> Self {
        self.params = params.into();
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Values below 1 are treated as 1.
    pub fn with_max_polls(mut self, max_polls: u32) -> Self {
        self.max_polls = max_polls.max(1);
        self
    }

    /// Polls until `decide` returns [`PollDecision::Done`].
    ///
    /// Shutting down the client ends the loop with
    /// `PollError::Request(ApiError::Cancelled)`.
    pub async fn poll_until<F>(&self, mut decide: F) -> Result<JsonValue, PollError>
    where
        F: FnMut(&JsonValue) -> PollDecision,
    {
        let mut polls = 0u32;
        loop {
            let status = self
                .client
                .get_value(&self.url, self.params.clone())
                .await?;
            polls += 1;

            if decide(&status) == PollDecision::Done {
                return Ok(status);
            }

            #[cfg(feature = "tracing")]
            tracing::debug!(url = %self.url, polls, max_polls = self.max_polls, "status not final");

            if polls >= self.max_polls {
                return Err(PollError::Exhausted {
                    polls,
                    last: status,
                });
            }
            self.client.pause(self.interval).await?;
        }
    }

    /// Polls until the string field `field` holds one of `terminal`.
    pub async fn poll_field(&self, field: &str, terminal: &[&str]) -> Result<JsonValue, PollError> {
        self.poll_until(|status| {
            let done = status
                .get(field)
                .and_then(JsonValue::as_str)
                .is_some_and(|value| terminal.iter().any(|t| t.eq_ignore_ascii_case(value)));
            if done {
                PollDecision::Done
            } else {
                PollDecision::Continue
            }
        })
        .await
    }
}
