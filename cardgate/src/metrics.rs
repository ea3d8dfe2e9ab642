//! Metrics declaration and recording.
//!
//! With the `metrics` feature disabled every recording function compiles to a
//! no-op.

use std::time::Duration;

use cardgate_core::SourceId;

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

#[cfg(feature = "metrics")]
lazy_static! {
    // Cache status metrics

    /// Track number of fresh cache hits.
    pub static ref CACHE_HIT_COUNTER: &'static str = {
        metrics::describe_counter!(
            "cardgate_cache_hit_total",
            "Total number of fresh cache hits."
        );
        "cardgate_cache_hit_total"
    };
    /// Track number of cache misses.
    pub static ref CACHE_MISS_COUNTER: &'static str = {
        metrics::describe_counter!(
            "cardgate_cache_miss_total",
            "Total number of cache misses."
        );
        "cardgate_cache_miss_total"
    };
    /// Track number of stale values served in place of an upstream result.
    pub static ref CACHE_STALE_COUNTER: &'static str = {
        metrics::describe_counter!(
            "cardgate_cache_stale_total",
            "Total number of stale cache values served as a fallback."
        );
        "cardgate_cache_stale_total"
    };

    // Gateway control metrics

    /// Track number of requests denied by a rate limit.
    pub static ref RATE_LIMITED_COUNTER: &'static str = {
        metrics::describe_counter!(
            "cardgate_rate_limited_total",
            "Total number of upstream attempts denied by a source rate limit."
        );
        "cardgate_rate_limited_total"
    };
    /// Track number of requests that joined an in-flight fetch.
    pub static ref COALESCED_COUNTER: &'static str = {
        metrics::describe_counter!(
            "cardgate_coalesced_total",
            "Total number of requests coalesced onto an in-flight fetch."
        );
        "cardgate_coalesced_total"
    };
    /// Track number of batch flushes.
    pub static ref BATCH_FLUSH_COUNTER: &'static str = {
        metrics::describe_counter!(
            "cardgate_batch_flush_total",
            "Total number of batch queue flushes."
        );
        "cardgate_batch_flush_total"
    };
    /// Histogram of resources per batch flush.
    pub static ref BATCH_SIZE_HISTOGRAM: &'static str = {
        metrics::describe_histogram!(
            "cardgate_batch_size",
            "Number of distinct resources per batch flush."
        );
        "cardgate_batch_size"
    };

    // Latency metrics

    /// Histogram of single-card upstream fetch duration.
    pub static ref UPSTREAM_DURATION: &'static str = {
        metrics::describe_histogram!(
            "cardgate_upstream_duration_seconds",
            metrics::Unit::Seconds,
            "Duration of card upstream fetches in seconds."
        );
        "cardgate_upstream_duration_seconds"
    };
    /// Histogram of batch fetch duration.
    pub static ref BATCH_DURATION: &'static str = {
        metrics::describe_histogram!(
            "cardgate_batch_duration_seconds",
            metrics::Unit::Seconds,
            "Duration of batch upstream fetches in seconds."
        );
        "cardgate_batch_duration_seconds"
    };
}

/// Record a fresh cache hit.
#[allow(unused_variables)]
pub fn record_cache_hit(source: &SourceId) {
    #[cfg(feature = "metrics")]
    metrics::counter!(*CACHE_HIT_COUNTER, "source" => source.to_string()).increment(1);
}

/// Record a cache miss.
#[allow(unused_variables)]
pub fn record_cache_miss(source: &SourceId) {
    #[cfg(feature = "metrics")]
    metrics::counter!(*CACHE_MISS_COUNTER, "source" => source.to_string()).increment(1);
}

/// Record a stale value served as a fallback.
#[allow(unused_variables)]
pub fn record_stale_served(source: &SourceId, reason: &'static str) {
    #[cfg(feature = "metrics")]
    metrics::counter!(*CACHE_STALE_COUNTER, "source" => source.to_string(), "reason" => reason)
        .increment(1);
}

/// Record a rate-limit denial.
#[allow(unused_variables)]
pub fn record_rate_limited(source: &SourceId) {
    #[cfg(feature = "metrics")]
    metrics::counter!(*RATE_LIMITED_COUNTER, "source" => source.to_string()).increment(1);
}

/// Record a request coalesced onto an in-flight fetch.
#[allow(unused_variables)]
pub fn record_coalesced(source: &SourceId) {
    #[cfg(feature = "metrics")]
    metrics::counter!(*COALESCED_COUNTER, "source" => source.to_string()).increment(1);
}

/// Record a batch flush of `size` resources.
#[allow(unused_variables)]
pub fn record_batch_flush(source: &SourceId, size: usize) {
    #[cfg(feature = "metrics")]
    {
        metrics::counter!(*BATCH_FLUSH_COUNTER, "source" => source.to_string()).increment(1);
        metrics::histogram!(*BATCH_SIZE_HISTOGRAM, "source" => source.to_string())
            .record(size as f64);
    }
}

/// Record the duration of a single-card upstream fetch.
#[allow(unused_variables)]
pub fn record_upstream_duration(source: &SourceId, duration: Duration) {
    #[cfg(feature = "metrics")]
    metrics::histogram!(*UPSTREAM_DURATION, "source" => source.to_string())
        .record(duration.as_secs_f64());
}

/// Record the duration of a batch upstream fetch.
#[allow(unused_variables)]
pub fn record_batch_duration(source: &SourceId, duration: Duration) {
    #[cfg(feature = "metrics")]
    metrics::histogram!(*BATCH_DURATION, "source" => source.to_string())
        .record(duration.as_secs_f64());
}
