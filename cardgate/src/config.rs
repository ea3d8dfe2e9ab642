//! Gateway configuration.
//!
//! [`GatewayConfig`] carries the per-source defaults consulted by policy
//! normalization. It is plain data and (de)serializable, so it can be built in
//! code or loaded from a file (see the `cardgate-configuration` crate).

use cardgate_core::{SourceDefaults, SourceDefaultsMap, SourceId};
use serde::{Deserialize, Serialize};

/// Static configuration of a [`Gateway`](crate::Gateway).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GatewayConfig {
    /// Defaults for cards that name a source explicitly.
    #[serde(default)]
    pub sources: SourceDefaultsMap,
}

impl GatewayConfig {
    /// Creates an empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the defaults of `source`, replacing any previous ones.
    pub fn source(mut self, source: impl Into<SourceId>, defaults: SourceDefaults) -> Self {
        self.sources.insert(source.into(), defaults);
        self
    }

    /// Returns the per-source defaults.
    pub fn source_defaults(&self) -> &SourceDefaultsMap {
        &self.sources
    }
}
