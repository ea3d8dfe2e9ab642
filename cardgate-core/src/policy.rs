//! Data policy types and policy normalization.
//!
//! A card may carry a [`DataPolicy`] describing how its data should be fetched:
//! which source it belongs to, which resources it needs, how long results may
//! be cached, how the source is rate limited and whether requests should be
//! batched. Every field is optional. Operators can also configure
//! [`SourceDefaults`] per source.
//!
//! [`ResolvedPolicy::resolve`] merges both into a [`ResolvedPolicy`] with every
//! field set. Precedence, per field:
//!
//! 1. the card's own policy
//! 2. the defaults of the source the card names explicitly
//! 3. built-in defaults: no caching, no rate limit, no batching, 25ms window
//!
//! Normalization never fails and performs no validation.
//!
//! ```
//! use std::collections::HashMap;
//! use std::time::Duration;
//! use cardgate_core::{CardId, DataPolicy, ResolvedPolicy, SourceDefaults, SourceId};
//!
//! let mut defaults = HashMap::new();
//! defaults.insert(
//!     SourceId::new("prices"),
//!     SourceDefaults::builder().cache_ttl(Duration::from_secs(30)).batch(true).build(),
//! );
//!
//! let policy = DataPolicy::builder().source("prices").resource_ids(["btc"]).build();
//! let resolved = ResolvedPolicy::resolve(&CardId::new("btc-card"), Some(&policy), &defaults);
//!
//! assert_eq!(resolved.cache_ttl, Duration::from_secs(30));
//! assert!(resolved.batch);
//! assert_eq!(resolved.batch_window, Duration::from_millis(25));
//! ```

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::id::{CardId, ResourceId, SourceId};
use crate::key::CacheKey;

/// Batch window used when neither the card nor its source configures one.
pub const DEFAULT_BATCH_WINDOW: Duration = Duration::from_millis(25);

/// What to do when a source's rate limit denies a request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RateLimitFallback {
    /// Serve stale cached data if any exists, fail otherwise.
    #[default]
    Cache,
    /// Fail immediately with a rate-limit error.
    Error,
}

/// Fixed-window rate limit for a source.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct RateLimitPolicy {
    /// Length of one counting window (e.g. "1s", "1m").
    #[serde(with = "humantime_serde")]
    pub window: Duration,
    /// Requests admitted per window.
    pub max_requests: u32,
    /// Behavior once the window is exhausted.
    #[serde(default)]
    pub fallback: RateLimitFallback,
}

impl RateLimitPolicy {
    /// Creates a policy admitting `max_requests` per `window`, falling back to cache.
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            window,
            max_requests,
            fallback: RateLimitFallback::default(),
        }
    }

    /// Sets the fallback behavior.
    pub fn fallback(self, fallback: RateLimitFallback) -> Self {
        Self { fallback, ..self }
    }
}

/// Per-card data policy. Every field is optional.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Default)]
pub struct DataPolicy {
    /// Upstream source the card's resources belong to.
    #[serde(default)]
    pub source: Option<SourceId>,
    /// Resources the card needs; empty means "the card itself".
    #[serde(default)]
    pub resource_ids: Vec<ResourceId>,
    /// How long fetched data stays fresh.
    #[serde(default, with = "humantime_serde")]
    pub cache_ttl: Option<Duration>,
    /// Rate limit applied to the source.
    #[serde(default)]
    pub rate_limit: Option<RateLimitPolicy>,
    /// Whether requests should go through the source's batch fetcher.
    #[serde(default)]
    pub batch: Option<bool>,
    /// How long to accumulate requests before flushing a batch.
    #[serde(default, with = "humantime_serde")]
    pub batch_window: Option<Duration>,
}

impl DataPolicy {
    /// Creates a new [`DataPolicyBuilder`].
    pub fn builder() -> DataPolicyBuilder {
        DataPolicyBuilder::default()
    }
}

/// Builder for [`DataPolicy`].
#[derive(Debug, Clone, Default)]
pub struct DataPolicyBuilder {
    policy: DataPolicy,
}

impl DataPolicyBuilder {
    /// Sets the source.
    pub fn source(mut self, source: impl Into<SourceId>) -> Self {
        self.policy.source = Some(source.into());
        self
    }

    /// Sets the resource ids.
    pub fn resource_ids<I, R>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<ResourceId>,
    {
        self.policy.resource_ids = ids.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the cache TTL.
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.policy.cache_ttl = Some(ttl);
        self
    }

    /// Sets the rate limit.
    pub fn rate_limit(mut self, rate_limit: RateLimitPolicy) -> Self {
        self.policy.rate_limit = Some(rate_limit);
        self
    }

    /// Enables or disables batching.
    pub fn batch(mut self, batch: bool) -> Self {
        self.policy.batch = Some(batch);
        self
    }

    /// Sets the batch window.
    pub fn batch_window(mut self, window: Duration) -> Self {
        self.policy.batch_window = Some(window);
        self
    }

    /// Builds the [`DataPolicy`].
    pub fn build(self) -> DataPolicy {
        self.policy
    }
}

/// Defaults applied to every card that names a source explicitly.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Default)]
pub struct SourceDefaults {
    /// Default cache TTL.
    #[serde(default, with = "humantime_serde")]
    pub cache_ttl: Option<Duration>,
    /// Default rate limit.
    #[serde(default)]
    pub rate_limit: Option<RateLimitPolicy>,
    /// Default batching flag.
    #[serde(default)]
    pub batch: Option<bool>,
    /// Default batch window.
    #[serde(default, with = "humantime_serde")]
    pub batch_window: Option<Duration>,
}

impl SourceDefaults {
    /// Creates a new [`SourceDefaultsBuilder`].
    pub fn builder() -> SourceDefaultsBuilder {
        SourceDefaultsBuilder::default()
    }
}

/// Builder for [`SourceDefaults`].
#[derive(Debug, Clone, Default)]
pub struct SourceDefaultsBuilder {
    defaults: SourceDefaults,
}

impl SourceDefaultsBuilder {
    /// Sets the default cache TTL.
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.defaults.cache_ttl = Some(ttl);
        self
    }

    /// Sets the default rate limit.
    pub fn rate_limit(mut self, rate_limit: RateLimitPolicy) -> Self {
        self.defaults.rate_limit = Some(rate_limit);
        self
    }

    /// Sets the default batching flag.
    pub fn batch(mut self, batch: bool) -> Self {
        self.defaults.batch = Some(batch);
        self
    }

    /// Sets the default batch window.
    pub fn batch_window(mut self, window: Duration) -> Self {
        self.defaults.batch_window = Some(window);
        self
    }

    /// Builds the [`SourceDefaults`].
    pub fn build(self) -> SourceDefaults {
        self.defaults
    }
}

/// Per-source defaults keyed by source.
pub type SourceDefaultsMap = HashMap<SourceId, SourceDefaults>;

/// A data policy with every field resolved.
///
/// Derived once per fetch and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPolicy {
    /// Source used for rate limiting, batching and cache keys.
    pub source: SourceId,
    /// Requested resources, never empty.
    pub resource_ids: Vec<ResourceId>,
    /// Cache TTL; zero disables caching.
    pub cache_ttl: Duration,
    /// Rate limit applied to the source, if any.
    pub rate_limit: Option<RateLimitPolicy>,
    /// Whether the batched path is requested.
    pub batch: bool,
    /// Batch accumulation window.
    pub batch_window: Duration,
}

impl ResolvedPolicy {
    /// Merges a card's policy with the defaults of the source it names.
    pub fn resolve(
        card: &CardId,
        policy: Option<&DataPolicy>,
        defaults: &SourceDefaultsMap,
    ) -> Self {
        let explicit_source = policy.and_then(|p| p.source.as_ref());
        // Defaults only apply to sources named explicitly.
        let source_defaults = explicit_source.and_then(|source| defaults.get(source));

        let source = explicit_source
            .cloned()
            .unwrap_or_else(|| SourceId::from(card));

        let resource_ids = match policy {
            Some(p) if !p.resource_ids.is_empty() => p.resource_ids.clone(),
            _ => vec![ResourceId::from(card)],
        };

        let cache_ttl = policy
            .and_then(|p| p.cache_ttl)
            .or_else(|| source_defaults.and_then(|d| d.cache_ttl))
            .unwrap_or(Duration::ZERO);

        let rate_limit = policy
            .and_then(|p| p.rate_limit.clone())
            .or_else(|| source_defaults.and_then(|d| d.rate_limit.clone()));

        let batch = policy
            .and_then(|p| p.batch)
            .or_else(|| source_defaults.and_then(|d| d.batch))
            .unwrap_or(false);

        let batch_window = policy
            .and_then(|p| p.batch_window)
            .or_else(|| source_defaults.and_then(|d| d.batch_window))
            .unwrap_or(DEFAULT_BATCH_WINDOW);

        ResolvedPolicy {
            source,
            resource_ids,
            cache_ttl,
            rate_limit,
            batch,
            batch_window,
        }
    }

    /// Returns the cache key of `resource` within this policy's source.
    pub fn cache_key(&self, resource: &ResourceId) -> CacheKey {
        CacheKey::new(self.source.clone(), resource.clone())
    }

    /// Returns the first requested resource.
    pub fn primary_resource(&self) -> &ResourceId {
        // `resolve` never produces an empty list.
        &self.resource_ids[0]
    }

    /// Returns `true` if a denied rate-limit check may be answered from stale cache.
    ///
    /// Policies without a rate limit count as cache-fallback.
    pub fn uses_cache_on_limit(&self) -> bool {
        self.rate_limit
            .as_ref()
            .map_or(RateLimitFallback::Cache, |limit| limit.fallback)
            != RateLimitFallback::Error
    }
}
