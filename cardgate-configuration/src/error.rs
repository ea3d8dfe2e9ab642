use thiserror::Error;

/// Errors raised while loading a gateway configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The document is not valid YAML or does not match the expected shape.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_saphyr::Error),

    /// A rate limit of `source` has a zero window.
    #[error("rate limit of source '{source_id}' must have a positive window")]
    ZeroWindow {
        /// Source carrying the invalid limit.
        source_id: String,
    },

    /// A rate limit of `source` admits no requests at all.
    #[error("rate limit of source '{source_id}' must allow at least one request")]
    ZeroMaxRequests {
        /// Source carrying the invalid limit.
        source_id: String,
    },
}
