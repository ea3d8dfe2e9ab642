//! Per-source batch queues.
//!
//! Batched requests for a source accumulate in one queue. The first request
//! creates the queue and arms a timer for its batch window; later requests only
//! add waiters. When the timer fires the queue is detached atomically, so any
//! request arriving afterwards starts a new queue, and all pending resources
//! are fetched with a single [`BatchFetcher`] call.
//!
//! Each waiter owns a oneshot sender. A flush settles every waiter exactly
//! once. If the flush itself dies, the dropped senders surface to the waiting
//! side as [`GatewayError::Interrupted`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use cardgate_core::{BatchFetcher, CacheKey, CardId, ResolvedPolicy, ResourceId, SourceId};
use dashmap::DashMap;
use futures::future::join_all;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{Instrument, debug, info, info_span, trace, warn};

use crate::cache::TtlCache;
use crate::error::GatewayError;
use crate::metrics;
use crate::rate_limit::RateLimiter;

/// Receiving side of a batch waiter.
pub type WaiterReceiver<T> = oneshot::Receiver<Result<T, GatewayError>>;

struct Waiter<T> {
    tx: oneshot::Sender<Result<T, GatewayError>>,
    policy: Arc<ResolvedPolicy>,
    card: CardId,
}

struct BatchQueue<T> {
    generation: u64,
    resource_ids: Vec<ResourceId>,
    requests: HashMap<ResourceId, Vec<Waiter<T>>>,
}

impl<T> BatchQueue<T> {
    fn new(generation: u64) -> Self {
        Self {
            generation,
            resource_ids: Vec::new(),
            requests: HashMap::new(),
        }
    }

    fn push(&mut self, resource: ResourceId, waiter: Waiter<T>) {
        let waiters = self.requests.entry(resource.clone()).or_default();
        if waiters.is_empty() {
            self.resource_ids.push(resource);
        }
        waiters.push(waiter);
    }

    /// Policy of the first waiter of the first queued resource.
    fn leading_policy(&self) -> Option<Arc<ResolvedPolicy>> {
        self.resource_ids
            .first()
            .and_then(|id| self.requests.get(id))
            .and_then(|waiters| waiters.first())
            .map(|waiter| Arc::clone(&waiter.policy))
    }

    fn has_mixed_rate_limits(&self, leading: &ResolvedPolicy) -> bool {
        self.requests
            .values()
            .flatten()
            .any(|waiter| waiter.policy.rate_limit != leading.rate_limit)
    }
}

/// Accumulates batched resource requests per source and flushes them.
pub struct BatchScheduler<T> {
    queues: DashMap<SourceId, BatchQueue<T>>,
    fetchers: HashMap<SourceId, Arc<dyn BatchFetcher<T>>>,
    cache: Arc<TtlCache<T>>,
    rate_limiter: Arc<RateLimiter>,
    next_generation: AtomicU64,
}

impl<T> BatchScheduler<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Creates a scheduler over the given fetchers, cache and rate limiter.
    pub fn new(
        fetchers: HashMap<SourceId, Arc<dyn BatchFetcher<T>>>,
        cache: Arc<TtlCache<T>>,
        rate_limiter: Arc<RateLimiter>,
    ) -> Self {
        Self {
            queues: DashMap::new(),
            fetchers,
            cache,
            rate_limiter,
            next_generation: AtomicU64::new(0),
        }
    }

    /// Returns `true` if a batch fetcher is registered for `source`.
    pub fn has_fetcher(&self, source: &SourceId) -> bool {
        self.fetchers.contains_key(source)
    }

    /// Number of sources with a pending queue.
    pub fn pending_sources(&self) -> usize {
        self.queues.len()
    }

    /// Queues `resource` for the next flush of `policy.source`.
    ///
    /// Arms the flush timer when this request creates the queue.
    pub fn enqueue(
        self: &Arc<Self>,
        policy: Arc<ResolvedPolicy>,
        card: CardId,
        resource: ResourceId,
    ) -> WaiterReceiver<T> {
        let (tx, rx) = oneshot::channel();
        let source = policy.source.clone();
        let window = policy.batch_window;
        let mut armed = None;

        {
            let mut queue = self.queues.entry(source.clone()).or_insert_with(|| {
                let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
                armed = Some(generation);
                BatchQueue::new(generation)
            });
            debug!(%source, %resource, %card, "Queued batched request");
            queue.push(resource, Waiter { tx, policy, card });
        }

        if let Some(generation) = armed {
            self.arm_timer(source, generation, window);
        }

        rx
    }

    fn arm_timer(self: &Arc<Self>, source: SourceId, generation: u64, window: Duration) {
        let scheduler = Arc::clone(self);
        let span = info_span!("batch_flush", %source, generation);
        tokio::spawn(
            async move {
                tokio::time::sleep(window).await;
                scheduler.flush_generation(&source, generation).await;
            }
            .instrument(span),
        );
    }

    /// Flushes the queue of `source` if it is still the queue the timer was armed for.
    async fn flush_generation(&self, source: &SourceId, generation: u64) {
        let queue = self
            .queues
            .remove_if(source, |_, queue| queue.generation == generation);
        if let Some((_, queue)) = queue {
            self.dispatch(source, queue).await;
        }
    }

    /// Flushes the pending queue of `source` immediately.
    pub async fn flush(&self, source: &SourceId) {
        if let Some((_, queue)) = self.queues.remove(source) {
            self.dispatch(source, queue).await;
        }
    }

    /// Flushes every pending queue immediately.
    pub async fn flush_all(&self) {
        let sources: Vec<SourceId> = self
            .queues
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        join_all(sources.iter().map(|source| self.flush(source))).await;
    }

    async fn dispatch(&self, source: &SourceId, queue: BatchQueue<T>) {
        let Some(policy) = queue.leading_policy() else {
            return;
        };
        if queue.has_mixed_rate_limits(&policy) {
            warn!(
                %source,
                "Batched cards disagree on rate limit; applying the first waiter's policy"
            );
        }

        let BatchQueue {
            resource_ids,
            mut requests,
            ..
        } = queue;

        info!(%source, resources = resource_ids.len(), "Flushing batch");
        metrics::record_batch_flush(source, resource_ids.len());

        if let Some(limit) = &policy.rate_limit
            && !self.rate_limiter.consume(source, limit)
        {
            warn!(%source, "Rate limit exceeded for batch flush");
            metrics::record_rate_limited(source);
            let use_cache = policy.uses_cache_on_limit();
            for id in &resource_ids {
                let waiters = requests.remove(id).unwrap_or_default();
                let stale = use_cache
                    .then(|| self.stale(source, id, "rate_limited"))
                    .flatten();
                let result = stale.ok_or_else(|| GatewayError::RateLimited {
                    source_id: source.clone(),
                });
                settle(waiters, result);
            }
            return;
        }

        let Some(fetcher) = self.fetchers.get(source).cloned() else {
            let error = GatewayError::upstream(
                format!("no batch fetcher registered for source {source}").into(),
            );
            for id in &resource_ids {
                let waiters = requests.remove(id).unwrap_or_default();
                settle(waiters, Err(error.clone()));
            }
            return;
        };

        let start = Instant::now();
        let response = fetcher.fetch_batch(resource_ids.clone()).await;
        metrics::record_batch_duration(source, start.elapsed());

        match response {
            Ok(mut data) => {
                for id in resource_ids {
                    let waiters = requests.remove(&id).unwrap_or_default();
                    match data.remove(&id) {
                        Some(value) => {
                            let ttl = max_cache_ttl(&waiters);
                            let key = policy.cache_key(&id);
                            self.cache.set(key, value.clone(), ttl);
                            settle(waiters, Ok(value));
                        }
                        None => {
                            let result = self.stale(source, &id, "missing").ok_or_else(|| {
                                GatewayError::NoDataForResource {
                                    resource: id.clone(),
                                    source_id: source.clone(),
                                }
                            });
                            settle(waiters, result);
                        }
                    }
                }
            }
            Err(error) => {
                warn!(%source, %error, "Batch fetch failed");
                let error = GatewayError::upstream(error);
                for id in &resource_ids {
                    let waiters = requests.remove(id).unwrap_or_default();
                    let result = self
                        .stale(source, id, "upstream_error")
                        .ok_or_else(|| error.clone());
                    settle(waiters, result);
                }
            }
        }
    }

    fn stale(&self, source: &SourceId, resource: &ResourceId, reason: &'static str) -> Option<T> {
        let key = CacheKey::new(source.clone(), resource.clone());
        let stale = self.cache.get_stale(&key)?;
        warn!(%key, reason, "Serving stale cache for batched resource");
        metrics::record_stale_served(source, reason);
        Some(stale)
    }
}

impl<T> fmt::Debug for BatchScheduler<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchScheduler")
            .field("pending_sources", &self.queues.len())
            .field("fetchers", &self.fetchers.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Largest TTL requested by any waiter; a shared resource is kept as long as
/// its most generous card wants it.
fn max_cache_ttl<T>(waiters: &[Waiter<T>]) -> Duration {
    waiters
        .iter()
        .map(|waiter| waiter.policy.cache_ttl)
        .max()
        .unwrap_or(Duration::ZERO)
}

fn settle<T: Clone>(waiters: Vec<Waiter<T>>, result: Result<T, GatewayError>) {
    for waiter in waiters {
        trace!(card = %waiter.card, ok = result.is_ok(), "Settling batch waiter");
        // A closed receiver means nobody is waiting any more.
        let _ = waiter.tx.send(result.clone());
    }
}
