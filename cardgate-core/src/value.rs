//! Cached value with expiration metadata.
//!
//! A [`CacheValue`] wraps a payload with the instant after which it is no
//! longer fresh. Expired values are not discarded: they remain readable as
//! *stale* data, which the gateway serves when an upstream fails or a source is
//! throttled.
//!
//! ## Fresh vs stale
//!
//! - **Fresh** - `now <= expires_at`
//! - **Stale** - any stored value, whether or not it has expired
//!
//! Timestamps use [`tokio::time::Instant`], so tests running on a paused tokio
//! clock observe expiry deterministically.

use std::time::Duration;

use tokio::time::Instant;

/// Longest freshness a value can get, roughly 136 years.
pub const MAX_TTL: Duration = Duration::from_secs(u32::MAX as u64);

/// A cached payload together with its expiry instant.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use cardgate_core::CacheValue;
///
/// let value = CacheValue::with_ttl("quote of the day", Duration::from_secs(60));
/// assert!(value.is_fresh());
/// assert_eq!(value.data(), &"quote of the day");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheValue<T> {
    data: T,
    expires_at: Instant,
}

impl<T> CacheValue<T> {
    /// Creates a value that stays fresh until `expires_at`.
    pub fn new(data: T, expires_at: Instant) -> Self {
        CacheValue { data, expires_at }
    }

    /// Creates a value that stays fresh for `ttl` from now.
    ///
    /// A TTL too large to represent as an instant is capped at
    /// [`MAX_TTL`], which for a dashboard is the same as never expiring.
    pub fn with_ttl(data: T, ttl: Duration) -> Self {
        let now = Instant::now();
        let expires_at = now
            .checked_add(ttl)
            .unwrap_or_else(|| now + MAX_TTL);
        Self::new(data, expires_at)
    }

    /// Returns a reference to the cached data.
    #[inline]
    pub fn data(&self) -> &T {
        &self.data
    }

    /// Returns the instant after which the value is stale.
    #[inline]
    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }

    /// Returns `true` while the value is within its TTL.
    pub fn is_fresh(&self) -> bool {
        self.is_fresh_at(Instant::now())
    }

    /// Returns `true` if the value is fresh at `now`.
    #[inline]
    pub fn is_fresh_at(&self, now: Instant) -> bool {
        now <= self.expires_at
    }

    /// Remaining time until the value goes stale, or `None` if it already has.
    pub fn ttl(&self) -> Option<Duration> {
        let remaining = self.expires_at.saturating_duration_since(Instant::now());
        (!remaining.is_zero()).then_some(remaining)
    }

    /// Consumes the cache value and returns the inner data.
    pub fn into_inner(self) -> T {
        self.data
    }
}
