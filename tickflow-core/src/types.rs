//! Strongly-typed identifiers and time units.
//!
//! Ticks are plain `u64` microseconds. Token identifiers are wrapped so they
//! cannot be mixed up with counts or ticks.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A discrete simulated time instant, in microseconds.
pub type Tick = u64;

/// Ticks in one millisecond.
pub const TICKS_PER_MS: u64 = 1_000;

/// Ticks in one second.
pub const TICKS_PER_SEC: u64 = 1_000_000;

/// Macro to generate strongly-typed ID wrappers.
macro_rules! define_id {
    ($name:ident, $prefix:expr, $doc:expr) => {
        #[doc = $doc]
        #[derive(
            Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        #[repr(transparent)]
        pub struct $name(u64);

        impl $name {
            /// Creates a new ID from a raw u64 value.
            #[inline]
            #[must_use]
            pub const fn new(value: u64) -> Self {
                Self(value)
            }

            /// Returns the raw u64 value.
            #[inline]
            #[must_use]
            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", $prefix, self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}-{}", $prefix, self.0)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self::new(value)
            }
        }

        impl From<$name> for u64 {
            fn from(id: $name) -> Self {
                id.get()
            }
        }
    };
}

define_id!(TokenId, "io", "Unique identifier for an IO token within a run.");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_id_display() {
        let id = TokenId::new(42);
        assert_eq!(format!("{id}"), "io-42");
        assert_eq!(format!("{id:?}"), "io(42)");
    }

    #[test]
    fn test_token_id_ordering() {
        assert!(TokenId::new(1) < TokenId::new(2));
        assert_eq!(u64::from(TokenId::from(7)), 7);
    }

    #[test]
    fn test_token_id_serializes_as_integer() {
        let json = serde_json::to_string(&TokenId::new(9)).unwrap();
        assert_eq!(json, "9");
    }
}
