//! Cache key type.
//!
//! A [`CacheKey`] pairs a source with one of its resources. Its string form is
//! `{source}:{resource}`:
//!
//! ```
//! use cardgate_core::{CacheKey, ResourceId, SourceId};
//!
//! let key = CacheKey::new(SourceId::new("prices"), ResourceId::new("btc"));
//! assert_eq!(key.to_string(), "prices:btc");
//! ```
//!
//! Both halves are [`SmolStr`](smol_str::SmolStr)-backed, so cloning a key is
//! cheap and keys can be moved freely into spawned tasks.

use std::fmt;

use serde::Serialize;

use crate::id::{ResourceId, SourceId};

/// Identifies one cached resource of one source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CacheKey {
    source: SourceId,
    resource: ResourceId,
}

impl CacheKey {
    /// Creates a key for `resource` within `source`.
    pub fn new(source: SourceId, resource: ResourceId) -> Self {
        Self { source, resource }
    }

    /// Returns the source half of the key.
    #[inline]
    pub fn source(&self) -> &SourceId {
        &self.source
    }

    /// Returns the resource half of the key.
    #[inline]
    pub fn resource(&self) -> &ResourceId {
        &self.resource
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.source, self.resource)
    }
}
