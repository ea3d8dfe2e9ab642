//! Error types for gateway operations.

use std::sync::Arc;

use cardgate_core::{CacheKey, ResourceId, SourceId, UpstreamError};
use thiserror::Error;

/// Error returned by [`Gateway::fetch_card_data`](crate::Gateway::fetch_card_data).
///
/// Every variant is surfaced only after stale-cache substitution has been
/// attempted. The error is `Clone` because all callers coalesced onto one
/// upstream attempt receive the same outcome.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// The source's rate-limit window is exhausted and no usable stale data exists.
    #[error("rate limit exceeded for source {source_id}")]
    RateLimited {
        /// The throttled source.
        source_id: SourceId,
    },

    /// The card's fetch or the source's batch fetch failed.
    #[error("upstream fetch failed: {cause}")]
    Upstream {
        /// The upstream error.
        #[source]
        cause: Arc<dyn std::error::Error + Send + Sync>,
    },

    /// A batch fetch succeeded but did not include a requested resource.
    #[error("no data returned for resource {resource} (source {source_id})")]
    NoDataForResource {
        /// The missing resource.
        resource: ResourceId,
        /// The source that was asked for it.
        source_id: SourceId,
    },

    /// The background task driving the fetch stopped before producing a result.
    #[error("fetch of {key} was interrupted")]
    Interrupted {
        /// Cache key of the interrupted fetch.
        key: CacheKey,
    },
}

impl GatewayError {
    /// Wraps an upstream error.
    pub fn upstream(error: UpstreamError) -> Self {
        Self::Upstream {
            cause: Arc::from(error),
        }
    }

    /// Returns `true` for [`GatewayError::RateLimited`].
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// Returns the source the error relates to, when known.
    pub fn source_id(&self) -> Option<&SourceId> {
        match self {
            Self::RateLimited { source_id } | Self::NoDataForResource { source_id, .. } => {
                Some(source_id)
            }
            Self::Interrupted { key } => Some(key.source()),
            Self::Upstream { .. } => None,
        }
    }
}
