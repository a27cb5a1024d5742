//! Strongly-typed identifiers for the publishing pipeline.
//!
//! A message is known by two numbers over its life: the sequence id the
//! publisher assigns when it accepts the message, and the delivery tag the
//! channel assigns when it actually goes out with publisher confirms enabled.
//! The two sequences are expected to line up 1:1, but they are still different
//! things and the type system keeps them apart.

use std::fmt;

/// Macro to generate strongly-typed ID wrappers.
///
/// Each ID type wraps a u64 and provides:
/// - Type safety (can't mix `SequenceId` with `DeliveryTag`)
/// - Debug/Display formatting
/// - Zero-cost abstraction (same as raw u64)
macro_rules! define_id {
    ($name:ident, $prefix:expr, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
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

            /// Returns the next ID in sequence.
            ///
            /// # Panics
            /// Panics if the ID would overflow.
            #[inline]
            #[must_use]
            pub const fn next(self) -> Self {
                assert!(self.0 < u64::MAX, "ID overflow");
                Self(self.0 + 1)
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

define_id!(
    SequenceId,
    "seq",
    "Locally assigned id for an accepted publish. The first publish gets 1."
);
define_id!(
    DeliveryTag,
    "tag",
    "Confirm tag assigned by the channel when a message is dispatched."
);

impl SequenceId {
    /// Id value meaning "nothing confirmed yet".
    pub const ZERO: Self = Self(0);

    /// The id handed to the very first publish on a fresh publisher.
    pub const FIRST: Self = Self(1);

    /// Returns the id just before this one, stopping at zero.
    #[inline]
    #[must_use]
    pub const fn prev(self) -> Self {
        Self(self.0.saturating_sub(1))
    }

    /// Returns the delivery tag this id is expected to be confirmed under.
    #[inline]
    #[must_use]
    pub const fn expected_tag(self) -> DeliveryTag {
        DeliveryTag(self.0)
    }
}
