//! The [`BatchFetcher`] trait.
//!
//! A source that can answer for many resources in one upstream round-trip
//! registers a batch fetcher with the gateway. When batching is enabled the
//! gateway accumulates resource requests for a short window and hands the whole
//! set to the fetcher at once.
//!
//! The fetcher returns a map keyed by resource id. It may omit ids it has no
//! data for; the gateway answers those waiters from stale cache or with a
//! "no data" error.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;

use async_trait::async_trait;

use crate::card::UpstreamResult;
use crate::id::ResourceId;

/// Result map produced by a batch fetch.
pub type BatchResponse<T> = HashMap<ResourceId, T>;

/// Fetches many resources of one source in a single upstream call.
#[async_trait]
pub trait BatchFetcher<T>: Send + Sync {
    /// Fetches all of `resource_ids`.
    async fn fetch_batch(&self, resource_ids: Vec<ResourceId>) -> UpstreamResult<BatchResponse<T>>;
}

/// A [`BatchFetcher`] backed by an async closure.
///
/// ```
/// use std::collections::HashMap;
/// use cardgate_core::{BatchFetcher, BatchFn, ResourceId, UpstreamError};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let fetcher = BatchFn::new(|ids: Vec<ResourceId>| async move {
///     Ok::<_, UpstreamError>(ids.into_iter().map(|id| (id, 1u32)).collect::<HashMap<_, _>>())
/// });
/// let result = BatchFetcher::<u32>::fetch_batch(&fetcher, vec![ResourceId::new("a")])
///     .await
///     .unwrap();
/// assert_eq!(result[&ResourceId::new("a")], 1);
/// # }
/// ```
pub struct BatchFn<F>(F);

impl<F> BatchFn<F> {
    /// Wraps `fetch` as a batch fetcher.
    pub fn new(fetch: F) -> Self {
        Self(fetch)
    }
}

impl<F> fmt::Debug for BatchFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BatchFn")
    }
}

#[async_trait]
impl<T, F, Fut> BatchFetcher<T> for BatchFn<F>
where
    T: Send + 'static,
    F: Fn(Vec<ResourceId>) -> Fut + Send + Sync,
    Fut: Future<Output = UpstreamResult<BatchResponse<T>>> + Send,
{
    async fn fetch_batch(&self, resource_ids: Vec<ResourceId>) -> UpstreamResult<BatchResponse<T>> {
        (self.0)(resource_ids).await
    }
}
