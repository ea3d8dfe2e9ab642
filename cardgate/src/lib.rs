#![doc = include_str!("../README.md")]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

/// Per-source batch queues and their flush logic.
///
/// [`BatchScheduler`](batch::BatchScheduler) accumulates resource requests of
/// one source during a short window and serves them all with a single
/// [`BatchFetcher`] call.
pub mod batch;

/// In-memory TTL cache with stale reads.
pub mod cache;

/// Request coalescing.
///
/// When several callers miss the cache for the same key at the same time, only
/// the first one reaches the upstream. [`InFlightRegistry`](concurrency::InFlightRegistry)
/// registers that fetch and hands every later caller a shared handle to its
/// outcome, success or failure.
pub mod concurrency;

/// Gateway configuration.
pub mod config;

/// Error types for gateway operations.
///
/// Defines [`GatewayError`] which covers:
/// - Rate-limit denials without usable stale data
/// - Upstream failures of card or batch fetches
/// - Resources missing from a batch response
pub mod error;

/// The gateway facade and its builder.
pub mod gateway;

/// Metrics collection for gateway observability.
///
/// When the `metrics` feature is enabled, this module provides counters
/// and histograms for:
/// - Cache hits, misses and stale fallbacks
/// - Rate-limit denials and coalesced requests
/// - Batch flush sizes and upstream latency
pub mod metrics;

/// Fixed-window rate limiting per source.
pub mod rate_limit;

pub use config::GatewayConfig;
pub use error::GatewayError;
pub use gateway::{CardData, Gateway, GatewayBuilder};

pub use cardgate_core::{
    BatchFetcher, BatchFn, BatchResponse, CacheKey, CacheValue, Card, CardFn, CardId, DataPolicy,
    RateLimitFallback, RateLimitPolicy, ResolvedPolicy, ResourceId, SourceDefaults, SourceId,
    UpstreamError, UpstreamResult,
};

/// The `cardgate` prelude.
///
/// ```rust
/// use cardgate::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        Card, CardData, CardFn, DataPolicy, Gateway, GatewayError, RateLimitPolicy,
        SourceDefaults,
    };
}
