//! Identifier newtypes.
//!
//! Cards, sources and resources are all addressed by short strings. Each gets
//! its own type so a source can never be passed where a resource id is expected.
//! All three wrap [`SmolStr`], so identifiers up to 23 bytes live inline and
//! cloning never allocates.
//!
//! ```
//! use cardgate_core::{CardId, SourceId};
//!
//! let card = CardId::new("btc-price");
//! // A card without an explicit source acts as its own source.
//! let source = SourceId::from(&card);
//! assert_eq!(source.as_str(), "btc-price");
//! ```

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

macro_rules! identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(SmolStr);

        impl $name {
            /// Creates a new identifier.
            pub fn new(value: impl AsRef<str>) -> Self {
                Self(SmolStr::new(value))
            }

            /// Creates an identifier from a static string without allocating.
            pub const fn new_static(value: &'static str) -> Self {
                Self(SmolStr::new_static(value))
            }

            /// Returns the identifier as a string slice.
            #[inline]
            pub fn as_str(&self) -> &str {
                self.0.as_str()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(SmolStr::from(value))
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                self.as_str()
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                self.as_str()
            }
        }
    };
}

identifier! {
    /// Identifier of a dashboard card.
    CardId
}

identifier! {
    /// Identifier of an upstream source.
    ///
    /// Sources are the unit of rate limiting and batching.
    SourceId
}

identifier! {
    /// Identifier of one unit of data within a source.
    ResourceId
}

impl From<&CardId> for SourceId {
    fn from(card: &CardId) -> Self {
        Self(card.0.clone())
    }
}

impl From<&CardId> for ResourceId {
    fn from(card: &CardId) -> Self {
        Self(card.0.clone())
    }
}
