//! Node identifiers.
//!
//! An [`Id`] is an opaque 128-bit random handle. Its stable string form is
//! the canonical hyphenated UUID text, which is also what serde writes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque, globally unique handle to a node.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id(Uuid);

impl Id {
    /// Generate a random identifier.
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_u128(bits: u128) -> Self {
        Self(Uuid::from_u128(bits))
    }

    pub fn as_u128(&self) -> u128 {
        self.0.as_u128()
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0.hyphenated(), f)
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id({})", self.0.hyphenated())
    }
}

impl FromStr for Id {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Source of fresh identifiers for a store.
pub trait IdSource: Send + Sync {
    fn next_id(&self) -> Id;
}

/// The default source: random version-4 UUIDs.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomIds;

impl IdSource for RandomIds {
    fn next_id(&self) -> Id {
        Id::random()
    }
}

impl<F> IdSource for F
where
    F: Fn() -> Id + Send + Sync,
{
    fn next_id(&self) -> Id {
        self()
    }
}
