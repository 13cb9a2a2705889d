//! Authorization resolution and unauthorized-response listeners.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

/// Resolves the access token for each outgoing request.
///
/// Closures returning `Option<String>` implement this trait.
pub trait TokenProvider: Send + Sync {
    /// Current token, or `None` to send the request unauthenticated.
    fn token(&self) -> Option<String>;
}

impl<F> TokenProvider for F
where
    F: Fn() -> Option<String> + Send + Sync,
{
    fn token(&self) -> Option<String> {
        self()
    }
}

/// A token fixed at construction.
#[derive(Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StaticToken(<redacted>)")
    }
}

impl TokenProvider for StaticToken {
    fn token(&self) -> Option<String> {
        Some(self.0.clone())
    }
}

type Listener = Arc<dyn Fn() + Send + Sync>;

/// Callbacks notified on every 401 response.
///
/// Each listener is registered with a [`CancellationToken`]; cancelling the
/// token deregisters it.
#[derive(Clone, Default)]
pub(crate) struct UnauthorizedListeners {
    listeners: Arc<Mutex<Vec<(CancellationToken, Listener)>>>,
}

impl UnauthorizedListeners {
    pub(crate) fn register<F>(&self, registration: CancellationToken, listener: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.listeners.lock().push((registration, Arc::new(listener)));
    }

    /// Calls every live listener outside the lock and prunes cancelled ones.
    pub(crate) fn notify(&self) -> usize {
        let live: Vec<Listener> = {
            let mut listeners = self.listeners.lock();
            listeners.retain(|(registration, _)| !registration.is_cancelled());
            listeners
                .iter()
                .map(|(_, listener)| Arc::clone(listener))
                .collect()
        };
        for listener in &live {
            listener();
        }
        live.len()
    }

    pub(crate) fn len(&self) -> usize {
        self.listeners
            .lock()
            .iter()
            .filter(|(registration, _)| !registration.is_cancelled())
            .count()
    }
}

/// Adds the `Bearer ` prefix unless the token already carries it.
pub(crate) fn normalize_bearer_authorization(token: &str) -> String {
    let trimmed = token.trim();
    let prefix = trimmed.get(..7);
    if prefix.is_some_and(|value| value.eq_ignore_ascii_case("bearer ")) {
        trimmed.to_owned()
    } else {
        format!("Bearer {trimmed}")
    }
}
