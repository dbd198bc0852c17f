//! Typed identifiers for the entities that appear side by side in ledger
//! history.
//!
//! Bonus schemes, promo codes and user segments are all keyed by database
//! integers. Wrapping each in its own type keeps a scheme filter from ever
//! matching a promo code with the same number.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            /// Returns the raw database key.
            pub fn get(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse::<i64>().map($name)
            }
        }

        impl From<i64> for $name {
            fn from(raw: i64) -> Self {
                $name(raw)
            }
        }
    };
}

entity_id!(
    /// Identifier of a bonus scheme.
    SchemeId
);
entity_id!(
    /// Identifier of a promo code.
    PromoId
);
entity_id!(
    /// Identifier of a user segment.
    SegmentId
);
