//! The [`Card`] trait: the gateway's view of a dashboard card.
//!
//! The gateway knows nothing about rendering or layout. A card is just an id,
//! an optional [`DataPolicy`] and a way to fetch its raw data from upstream.
//!
//! Implement [`Card`] directly, or wrap an async closure with [`CardFn`]:
//!
//! ```
//! use cardgate_core::{Card, CardFn, UpstreamError};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let card = CardFn::new("answer", || async { Ok::<_, UpstreamError>(42u32) });
//! let value: u32 = Card::<u32>::fetch(&card).await.unwrap();
//! assert_eq!(value, 42);
//! # }
//! ```

use std::fmt;
use std::future::Future;

use async_trait::async_trait;

use crate::id::CardId;
use crate::policy::DataPolicy;

/// Error produced by an upstream fetch.
pub type UpstreamError = Box<dyn std::error::Error + Send + Sync>;

/// Result of an upstream fetch.
pub type UpstreamResult<T> = Result<T, UpstreamError>;

/// A dashboard card as seen by the gateway.
///
/// `T` is the card's payload type. The gateway treats it as opaque.
#[async_trait]
pub trait Card<T>: Send + Sync {
    /// The card's identifier.
    fn id(&self) -> &CardId;

    /// The card's data policy, if it has one.
    fn data_policy(&self) -> Option<&DataPolicy> {
        None
    }

    /// Fetches the card's data from upstream.
    async fn fetch(&self) -> UpstreamResult<T>;
}

/// A [`Card`] backed by an async closure.
pub struct CardFn<F> {
    id: CardId,
    policy: Option<DataPolicy>,
    fetch: F,
}

impl<F> CardFn<F> {
    /// Creates a card with no data policy.
    pub fn new(id: impl Into<CardId>, fetch: F) -> Self {
        Self {
            id: id.into(),
            policy: None,
            fetch,
        }
    }

    /// Attaches a data policy.
    pub fn with_policy(self, policy: DataPolicy) -> Self {
        Self {
            policy: Some(policy),
            ..self
        }
    }
}

impl<F> fmt::Debug for CardFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CardFn")
            .field("id", &self.id)
            .field("policy", &self.policy)
            .field("fetch", &"...")
            .finish()
    }
}

#[async_trait]
impl<T, F, Fut> Card<T> for CardFn<F>
where
    T: Send + 'static,
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = UpstreamResult<T>> + Send,
{
    fn id(&self) -> &CardId {
        &self.id
    }

    fn data_policy(&self) -> Option<&DataPolicy> {
        self.policy.as_ref()
    }

    async fn fetch(&self) -> UpstreamResult<T> {
        (self.fetch)().await
    }
}
