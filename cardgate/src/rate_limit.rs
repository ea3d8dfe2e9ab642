//! Fixed-window rate limiting per source.
//!
//! Each source has a window start and a counter. The first request after a
//! window has elapsed opens a new window with a count of one; later requests
//! increment the counter until `max_requests` is reached, after which requests
//! are denied until the window rolls over.
//!
//! This is a fixed window, not a sliding one: up to twice the budget can pass
//! across a window boundary.

use std::fmt;

use cardgate_core::{RateLimitPolicy, SourceId};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::time::Instant;
use tracing::trace;

#[derive(Debug, Clone, Copy)]
struct Window {
    start: Instant,
    count: u32,
}

impl Window {
    fn open(now: Instant) -> Self {
        Self {
            start: now,
            count: 1,
        }
    }
}

/// Per-source fixed-window counters.
#[derive(Default)]
pub struct RateLimiter {
    windows: DashMap<SourceId, Window>,
}

impl RateLimiter {
    /// Creates a limiter with no recorded windows.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one request against `source`, returning whether it is admitted.
    pub fn consume(&self, source: &SourceId, policy: &RateLimitPolicy) -> bool {
        let now = Instant::now();
        match self.windows.entry(source.clone()) {
            Entry::Vacant(entry) => {
                entry.insert(Window::open(now));
                true
            }
            Entry::Occupied(mut entry) => {
                let window = entry.get_mut();
                if now.duration_since(window.start) > policy.window {
                    *window = Window::open(now);
                    trace!(%source, "Rate limit window reset");
                    true
                } else if window.count >= policy.max_requests {
                    false
                } else {
                    window.count += 1;
                    true
                }
            }
        }
    }

    /// Requests counted in the current window of `source`, if any window exists.
    pub fn count(&self, source: &SourceId) -> Option<u32> {
        self.windows.get(source).map(|window| window.count)
    }

    /// Forgets the window of `source`.
    pub fn reset(&self, source: &SourceId) {
        self.windows.remove(source);
    }
}

impl fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("sources", &self.windows.len())
            .finish()
    }
}
