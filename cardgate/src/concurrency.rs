use std::fmt;
use std::future::Future;
use std::sync::Arc;

use cardgate_core::CacheKey;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::{Instrument, debug, debug_span};

use crate::error::GatewayError;

/// Outcome of a fetch, shared by every caller coalesced onto it.
pub type SharedFetch<T> = Shared<BoxFuture<'static, Result<T, GatewayError>>>;

/// Result of joining the in-flight registry.
pub enum Joined<T> {
    /// No fetch was running for the key; the factory's work was started.
    Started(SharedFetch<T>),
    /// Another caller's fetch is running; its outcome will be shared.
    Coalesced(SharedFetch<T>),
}

impl<T> Joined<T> {
    /// Returns `true` if the caller joined an existing fetch.
    pub fn is_coalesced(&self) -> bool {
        matches!(self, Joined::Coalesced(_))
    }

    /// Returns the shared outcome.
    pub fn into_future(self) -> SharedFetch<T> {
        match self {
            Joined::Started(fetch) | Joined::Coalesced(fetch) => fetch,
        }
    }
}

/// Registry of fetches currently running, keyed by cache key.
///
/// At most one fetch per key is registered at any time. Registered work is
/// driven by its own tokio task, so it runs to completion and deregisters even
/// if every caller stops awaiting it.
pub struct InFlightRegistry<T> {
    requests: Arc<DashMap<CacheKey, SharedFetch<T>>>,
}

impl<T> InFlightRegistry<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            requests: Arc::new(DashMap::new()),
        }
    }

    /// Returns the fetch registered for `key`, if any.
    pub fn get(&self, key: &CacheKey) -> Option<SharedFetch<T>> {
        self.requests.get(key).map(|fetch| fetch.clone())
    }

    /// Joins the fetch for `key`, starting one with `factory` if none is running.
    ///
    /// `factory` is called synchronously, at most once, and only when no fetch
    /// is registered for `key`.
    pub fn join<F, Fut>(&self, key: &CacheKey, factory: F) -> Joined<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, GatewayError>> + Send + 'static,
    {
        match self.requests.entry(key.clone()) {
            Entry::Occupied(entry) => {
                debug!(%key, "Coalescing request with in-flight fetch");
                Joined::Coalesced(entry.get().clone())
            }
            Entry::Vacant(entry) => {
                let work = factory();
                let guard = Deregister {
                    requests: Arc::clone(&self.requests),
                    key: key.clone(),
                };
                let handle = tokio::spawn(
                    async move {
                        let _guard = guard;
                        work.await
                    }
                    .instrument(debug_span!("in_flight", %key)),
                );

                let interrupted = key.clone();
                let fetch = async move {
                    handle
                        .await
                        .unwrap_or_else(|_| Err(GatewayError::Interrupted { key: interrupted }))
                }
                .boxed()
                .shared();

                entry.insert(fetch.clone());
                Joined::Started(fetch)
            }
        }
    }

    /// Number of fetches currently registered.
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    /// Returns `true` if no fetch is registered.
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

impl<T> Default for InFlightRegistry<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for InFlightRegistry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InFlightRegistry")
            .field("in_flight", &self.requests.len())
            .finish()
    }
}

/// Removes a key from the registry when the task driving its fetch ends,
/// including by panic.
struct Deregister<T> {
    requests: Arc<DashMap<CacheKey, SharedFetch<T>>>,
    key: CacheKey,
}

impl<T> Drop for Deregister<T> {
    fn drop(&mut self) {
        self.requests.remove(&self.key);
    }
}
