//! Throttled publisher configuration.

use pacer_core::Limits;
use serde::{Deserialize, Serialize};

use crate::error::{ThrottleError, ThrottleResult};

/// Configuration for a [`ThrottledPublisher`](crate::ThrottledPublisher).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThrottleConfig {
    /// Maximum number of dispatched but unconfirmed messages.
    ///
    /// Zero pauses dispatch entirely; only `flush` sends while it is zero.
    pub throttle: usize,

    /// Limits checked on every publish before it is accepted.
    pub limits: Limits,
}

impl ThrottleConfig {
    /// Creates a configuration with the given capacity and default limits.
    #[must_use]
    pub const fn with_throttle(throttle: usize) -> Self {
        Self {
            throttle,
            limits: Limits::new(),
        }
    }

    /// Creates a configuration for testing.
    #[must_use]
    pub const fn for_testing() -> Self {
        Self::with_throttle(4)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the limits are inconsistent.
    pub fn validate(&self) -> ThrottleResult<()> {
        self.limits
            .validate()
            .map_err(|err| ThrottleError::InvalidConfig {
                message: err.to_string(),
            })
    }
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self::with_throttle(1_000)
    }
}
