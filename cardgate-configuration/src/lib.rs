//! YAML configuration for the cardgate gateway.
//!
//! A configuration document lists per-source defaults. Durations are written
//! in human-readable form:
//!
//! ```
//! use cardgate_configuration::from_yaml;
//!
//! let config = from_yaml(
//!     r#"
//! sources:
//!   prices:
//!     cache_ttl: 30s
//!     batch: true
//!     rate_limit:
//!       window: 1m
//!       max_requests: 60
//!   weather:
//!     cache_ttl: 10m
//! "#,
//! )
//! .unwrap();
//!
//! assert_eq!(config.sources.len(), 2);
//! ```
//!
//! Sources not listed in the document get no defaults; cards of such sources
//! fall back to their own policy and the gateway's built-in defaults.

use cardgate::GatewayConfig;
use cardgate_core::SourceId;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

pub mod error;
pub mod source;

pub use error::ConfigError;
pub use source::{ConfigRateLimit, ConfigSource};

/// Gateway configuration as written in YAML.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ConfigGateway {
    /// Defaults keyed by source id, in document order.
    #[serde(default)]
    pub sources: IndexMap<String, ConfigSource>,
}

impl ConfigGateway {
    /// Validates every section and converts the document into a [`GatewayConfig`].
    pub fn into_config(self) -> Result<GatewayConfig, ConfigError> {
        self.sources
            .into_iter()
            .try_fold(GatewayConfig::new(), |config, (source, section)| {
                let defaults = section.into_defaults(&source)?;
                Ok(config.source(SourceId::new(source), defaults))
            })
    }
}

/// Parses and validates a YAML configuration document.
pub fn from_yaml(yaml: &str) -> Result<GatewayConfig, ConfigError> {
    serde_saphyr::from_str::<ConfigGateway>(yaml)?.into_config()
}
