//! The gateway facade.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use cardgate_core::{
    BatchFetcher, CacheKey, Card, CardId, ResolvedPolicy, ResourceId, SourceDefaults, SourceId,
};
use futures::future::try_join_all;
use indexmap::IndexMap;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::batch::BatchScheduler;
use crate::cache::TtlCache;
use crate::concurrency::InFlightRegistry;
use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::metrics;
use crate::rate_limit::RateLimiter;

/// Data returned for a card.
///
/// Cards served through a batch fetcher with several resources get one value
/// per resource, in the order the policy lists them. Every other card gets a
/// single value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CardData<T> {
    /// Data of a single-resource card.
    Single(T),
    /// Data of a multi-resource batched card, keyed by resource id.
    Batch(IndexMap<ResourceId, T>),
}

impl<T> CardData<T> {
    /// Returns the single value, if this is [`CardData::Single`].
    pub fn as_single(&self) -> Option<&T> {
        match self {
            CardData::Single(value) => Some(value),
            CardData::Batch(_) => None,
        }
    }

    /// Consumes the data and returns the single value, if any.
    pub fn into_single(self) -> Option<T> {
        match self {
            CardData::Single(value) => Some(value),
            CardData::Batch(_) => None,
        }
    }

    /// Returns the value of `resource` from a batched card.
    pub fn get(&self, resource: &str) -> Option<&T> {
        match self {
            CardData::Batch(values) => values.get(resource),
            CardData::Single(_) => None,
        }
    }
}

struct GatewayInner<T> {
    config: GatewayConfig,
    cache: Arc<TtlCache<T>>,
    rate_limiter: Arc<RateLimiter>,
    in_flight: InFlightRegistry<T>,
    batches: Arc<BatchScheduler<T>>,
}

/// Data-fetching gateway between the HTTP layer and card fetch functions.
///
/// Owns the TTL cache, per-source rate limits, the in-flight registry and the
/// batch queues. Cloning is cheap and every clone shares the same state, so one
/// gateway is built at server start and handed to all request handlers.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
/// use cardgate::{CardData, Gateway};
/// use cardgate_core::{Card, CardFn, DataPolicy, UpstreamError};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let gateway = Gateway::<u64>::builder().build();
///
/// let card: Arc<dyn Card<u64>> = Arc::new(
///     CardFn::new("visitors", || async { Ok::<_, UpstreamError>(1_000u64) })
///         .with_policy(DataPolicy::builder().cache_ttl(Duration::from_secs(10)).build()),
/// );
///
/// let data = gateway.fetch_card_data(card).await.unwrap();
/// assert_eq!(data, CardData::Single(1_000u64));
/// # }
/// ```
pub struct Gateway<T> {
    inner: Arc<GatewayInner<T>>,
}

impl<T> Clone for Gateway<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Gateway<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gateway")
            .field("config", &self.inner.config)
            .field("cache", &self.inner.cache)
            .field("rate_limiter", &self.inner.rate_limiter)
            .field("in_flight", &self.inner.in_flight)
            .field("batches", &self.inner.batches)
            .finish()
    }
}

impl<T> Gateway<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Creates a new [`GatewayBuilder`].
    pub fn builder() -> GatewayBuilder<T> {
        GatewayBuilder::new()
    }

    /// Creates a gateway with the given configuration and no batch fetchers.
    pub fn new(config: GatewayConfig) -> Self {
        Self::builder().config(config).build()
    }

    /// Returns the gateway configuration.
    pub fn config(&self) -> &GatewayConfig {
        &self.inner.config
    }

    /// Resolves the effective policy of `card`.
    pub fn resolve_policy(&self, card: &dyn Card<T>) -> ResolvedPolicy {
        ResolvedPolicy::resolve(
            card.id(),
            card.data_policy(),
            self.inner.config.source_defaults(),
        )
    }

    /// Fetches the data of `card`, going through cache, coalescing, rate
    /// limiting and batching according to its policy.
    pub async fn fetch_card_data(
        &self,
        card: Arc<dyn Card<T>>,
    ) -> Result<CardData<T>, GatewayError> {
        let policy = Arc::new(self.resolve_policy(card.as_ref()));

        if policy.batch && self.inner.batches.has_fetcher(&policy.source) {
            self.fetch_with_batch(policy, card.id()).await
        } else {
            self.fetch_without_batch(policy, card)
                .await
                .map(CardData::Single)
        }
    }

    /// Drops the cached value of `resource` within `source`.
    pub fn invalidate(&self, source: &SourceId, resource: &ResourceId) -> bool {
        let key = CacheKey::new(source.clone(), resource.clone());
        self.inner.cache.remove(&key).is_some()
    }

    /// Drops every cached value.
    pub fn clear_cache(&self) {
        self.inner.cache.clear();
    }

    /// Flushes every pending batch queue without waiting for its window.
    pub async fn flush_pending(&self) {
        self.inner.batches.flush_all().await;
    }

    /// Number of fetches currently in flight.
    pub fn in_flight_count(&self) -> usize {
        self.inner.in_flight.len()
    }

    /// Number of cached entries, fresh or stale.
    pub fn cached_count(&self) -> usize {
        self.inner.cache.len()
    }

    async fn fetch_without_batch(
        &self,
        policy: Arc<ResolvedPolicy>,
        card: Arc<dyn Card<T>>,
    ) -> Result<T, GatewayError> {
        let key = policy.cache_key(policy.primary_resource());
        if let Some(fresh) = self.inner.fresh(&key) {
            return Ok(fresh);
        }

        let inner = Arc::clone(&self.inner);
        let task_key = key.clone();
        let joined = self.inner.in_flight.join(&key, move || async move {
            inner.fetch_upstream(&policy, card.as_ref(), &task_key).await
        });
        if joined.is_coalesced() {
            metrics::record_coalesced(key.source());
        }
        joined.into_future().await
    }

    async fn fetch_with_batch(
        &self,
        policy: Arc<ResolvedPolicy>,
        card: &CardId,
    ) -> Result<CardData<T>, GatewayError> {
        if policy.resource_ids.len() > 1 {
            let values = try_join_all(
                policy
                    .resource_ids
                    .iter()
                    .map(|id| self.fetch_batch_resource(&policy, card, id)),
            )
            .await?;
            let data = policy.resource_ids.iter().cloned().zip(values).collect();
            return Ok(CardData::Batch(data));
        }

        self.fetch_batch_resource(&policy, card, policy.primary_resource())
            .await
            .map(CardData::Single)
    }

    async fn fetch_batch_resource(
        &self,
        policy: &Arc<ResolvedPolicy>,
        card: &CardId,
        resource: &ResourceId,
    ) -> Result<T, GatewayError> {
        let key = policy.cache_key(resource);
        if let Some(fresh) = self.inner.fresh(&key) {
            return Ok(fresh);
        }

        let batches = Arc::clone(&self.inner.batches);
        let waiter_key = key.clone();
        let joined = self.inner.in_flight.join(&key, move || {
            let waiter = batches.enqueue(Arc::clone(policy), card.clone(), resource.clone());
            async move {
                waiter
                    .await
                    .unwrap_or_else(|_| Err(GatewayError::Interrupted { key: waiter_key }))
            }
        });
        if joined.is_coalesced() {
            metrics::record_coalesced(key.source());
        }
        joined.into_future().await
    }
}

impl<T> GatewayInner<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn fresh(&self, key: &CacheKey) -> Option<T> {
        match self.cache.get_fresh(key) {
            Some(value) => {
                debug!(%key, "Serving fresh cache");
                metrics::record_cache_hit(key.source());
                Some(value)
            }
            None => {
                metrics::record_cache_miss(key.source());
                None
            }
        }
    }

    async fn fetch_upstream(
        &self,
        policy: &ResolvedPolicy,
        card: &dyn Card<T>,
        key: &CacheKey,
    ) -> Result<T, GatewayError> {
        if let Some(limit) = &policy.rate_limit
            && !self.rate_limiter.consume(&policy.source, limit)
        {
            metrics::record_rate_limited(&policy.source);
            if policy.uses_cache_on_limit()
                && let Some(stale) = self.cache.get_stale(key)
            {
                warn!(%key, "Rate limit exceeded, serving stale cache");
                metrics::record_stale_served(&policy.source, "rate_limited");
                return Ok(stale);
            }
            warn!(%key, "Rate limit exceeded");
            return Err(GatewayError::RateLimited {
                source_id: policy.source.clone(),
            });
        }

        let start = Instant::now();
        let result = card.fetch().await;
        metrics::record_upstream_duration(&policy.source, start.elapsed());

        match result {
            Ok(data) => {
                self.cache.set(key.clone(), data.clone(), policy.cache_ttl);
                Ok(data)
            }
            Err(error) => match self.cache.get_stale(key) {
                Some(stale) => {
                    warn!(%key, card = %card.id(), %error, "Fetch failed, serving stale cache");
                    metrics::record_stale_served(&policy.source, "upstream_error");
                    Ok(stale)
                }
                None => Err(GatewayError::upstream(error)),
            },
        }
    }
}

/// Builder for [`Gateway`].
pub struct GatewayBuilder<T> {
    config: GatewayConfig,
    fetchers: HashMap<SourceId, Arc<dyn BatchFetcher<T>>>,
}

impl<T> GatewayBuilder<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Creates a builder with an empty configuration.
    pub fn new() -> Self {
        Self {
            config: GatewayConfig::default(),
            fetchers: HashMap::new(),
        }
    }

    /// Replaces the configuration.
    pub fn config(self, config: GatewayConfig) -> Self {
        Self { config, ..self }
    }

    /// Sets the defaults of one source.
    pub fn source_defaults(self, source: impl Into<SourceId>, defaults: SourceDefaults) -> Self {
        Self {
            config: self.config.source(source, defaults),
            ..self
        }
    }

    /// Registers the batch fetcher of `source`.
    pub fn batch_fetcher<F>(mut self, source: impl Into<SourceId>, fetcher: F) -> Self
    where
        F: BatchFetcher<T> + 'static,
    {
        self.fetchers.insert(source.into(), Arc::new(fetcher));
        self
    }

    /// Builds the [`Gateway`].
    pub fn build(self) -> Gateway<T> {
        let cache = Arc::new(TtlCache::new());
        let rate_limiter = Arc::new(RateLimiter::new());
        let batches = Arc::new(BatchScheduler::new(
            self.fetchers,
            Arc::clone(&cache),
            Arc::clone(&rate_limiter),
        ));

        Gateway {
            inner: Arc::new(GatewayInner {
                config: self.config,
                cache,
                rate_limiter,
                in_flight: InFlightRegistry::new(),
                batches,
            }),
        }
    }
}

impl<T> Default for GatewayBuilder<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
