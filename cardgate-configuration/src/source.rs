use std::time::Duration;

use cardgate_core::{RateLimitFallback, RateLimitPolicy, SourceDefaults};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Rate limit of a source as written in the configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ConfigRateLimit {
    /// Window length, e.g. `1m`.
    #[serde(with = "humantime_serde")]
    pub window: Duration,
    /// Upstream attempts allowed per window.
    pub max_requests: u32,
    /// What to serve once the budget is spent.
    #[serde(default)]
    pub fallback: RateLimitFallback,
}

/// Defaults of one source as written in the configuration.
///
/// ```yaml
/// cache_ttl: 30s
/// batch: true
/// batch_window: 25ms
/// rate_limit:
///   window: 1m
///   max_requests: 60
///   fallback: cache
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ConfigSource {
    /// Freshness of cached values.
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub cache_ttl: Option<Duration>,
    /// Fixed-window rate limit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<ConfigRateLimit>,
    /// Whether cards of the source are batched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch: Option<bool>,
    /// How long a batch queue collects requests before it is flushed.
    /// `0s` flushes on the next scheduler tick.
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub batch_window: Option<Duration>,
}

impl ConfigSource {
    /// Validates the section and converts it into [`SourceDefaults`].
    pub fn into_defaults(self, source: &str) -> Result<SourceDefaults, ConfigError> {
        let rate_limit = self
            .rate_limit
            .map(|limit| {
                if limit.window.is_zero() {
                    return Err(ConfigError::ZeroWindow {
                        source_id: source.to_owned(),
                    });
                }
                if limit.max_requests == 0 {
                    return Err(ConfigError::ZeroMaxRequests {
                        source_id: source.to_owned(),
                    });
                }
                Ok(RateLimitPolicy::new(limit.window, limit.max_requests).fallback(limit.fallback))
            })
            .transpose()?;

        Ok(SourceDefaults {
            cache_ttl: self.cache_ttl,
            rate_limit,
            batch: self.batch,
            batch_window: self.batch_window,
        })
    }
}
