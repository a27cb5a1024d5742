//! Error types for core validation.
//!
//! These cover checks that happen before anything touches a channel:
//! limit validation and message shape. Higher layers wrap them.

use std::fmt;

/// The result type for core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by core validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A resource limit was exceeded.
    LimitExceeded {
        /// Which limit was exceeded.
        limit: &'static str,
        /// The maximum allowed value.
        max: u64,
        /// The actual value that exceeded the limit.
        actual: u64,
    },

    /// An invalid argument was provided.
    InvalidArgument {
        /// The name of the argument.
        name: &'static str,
        /// Why it was invalid.
        reason: &'static str,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LimitExceeded { limit, max, actual } => {
                write!(f, "limit exceeded: {limit} (max={max}, actual={actual})")
            }
            Self::InvalidArgument { name, reason } => {
                write!(f, "invalid argument '{name}': {reason}")
            }
        }
    }
}

impl std::error::Error for Error {}
