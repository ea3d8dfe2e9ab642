#![warn(missing_docs)]
//! # cardgate-core
//!
//! Core traits and types for the cardgate data-fetching gateway.
//!
//! The gateway sits between an HTTP layer and per-card fetch functions. This
//! crate defines what the gateway consumes:
//!
//! - **Identify** cards, sources and resources ([`CardId`], [`SourceId`], [`ResourceId`])
//! - **Describe** how a card's data may be fetched ([`DataPolicy`], [`SourceDefaults`])
//! - **Resolve** both into one effective policy ([`ResolvedPolicy`])
//! - **Fetch** a single card's data ([`Card`]) or many resources at once ([`BatchFetcher`])
//! - **Store** fetched data with an expiry ([`CacheKey`], [`CacheValue`])
//!
//! The orchestration itself lives in the `cardgate` crate.

pub mod batch;
pub mod card;
pub mod id;
pub mod key;
pub mod policy;
pub mod value;

pub use batch::{BatchFetcher, BatchFn, BatchResponse};
pub use card::{Card, CardFn, UpstreamError, UpstreamResult};
pub use id::{CardId, ResourceId, SourceId};
pub use key::CacheKey;
pub use policy::{
    DEFAULT_BATCH_WINDOW, DataPolicy, DataPolicyBuilder, RateLimitFallback, RateLimitPolicy,
    ResolvedPolicy, SourceDefaults, SourceDefaultsBuilder, SourceDefaultsMap,
};
pub use value::{CacheValue, MAX_TTL};
