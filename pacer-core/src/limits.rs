//! Message shape limits.
//!
//! AMQP carries exchange names and routing keys as short strings, so neither
//! can exceed 255 bytes on the wire. Bodies are bounded by the broker's
//! configured maximum message size. Checking these before a message is
//! accepted keeps a malformed publish from ever entering the queue.

use serde::{Deserialize, Serialize};

use crate::message::OutboundMessage;

/// Largest value an AMQP short string can encode.
pub const SHORT_STRING_MAX_BYTES: u32 = 255;

/// Limits applied to every outbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Maximum exchange name length in bytes.
    pub max_exchange_bytes: u32,
    /// Maximum routing key length in bytes.
    pub max_routing_key_bytes: u32,
    /// Maximum body size in bytes.
    pub max_body_bytes: u64,
}

impl Limits {
    /// Creates limits with safe defaults.
    ///
    /// 128 MiB matches the default `max_message_size` of current brokers.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_exchange_bytes: SHORT_STRING_MAX_BYTES,
            max_routing_key_bytes: SHORT_STRING_MAX_BYTES,
            max_body_bytes: 128 * 1024 * 1024,
        }
    }

    /// Validates that all limits are internally consistent.
    ///
    /// # Errors
    /// Returns an error if any limit is zero or exceeds what the wire can carry.
    pub fn validate(&self) -> crate::Result<()> {
        if self.max_exchange_bytes > SHORT_STRING_MAX_BYTES {
            return Err(crate::Error::InvalidArgument {
                name: "max_exchange_bytes",
                reason: "must fit in an AMQP short string",
            });
        }

        if self.max_routing_key_bytes == 0 {
            return Err(crate::Error::InvalidArgument {
                name: "max_routing_key_bytes",
                reason: "must be positive",
            });
        }

        if self.max_routing_key_bytes > SHORT_STRING_MAX_BYTES {
            return Err(crate::Error::InvalidArgument {
                name: "max_routing_key_bytes",
                reason: "must fit in an AMQP short string",
            });
        }

        if self.max_body_bytes == 0 {
            return Err(crate::Error::InvalidArgument {
                name: "max_body_bytes",
                reason: "must be positive",
            });
        }

        Ok(())
    }

    /// Checks a message against these limits.
    ///
    /// An empty exchange name is legal: it addresses the default exchange.
    ///
    /// # Errors
    /// Returns `LimitExceeded` naming the first field that is too large.
    pub fn check(&self, message: &OutboundMessage) -> crate::Result<()> {
        check_len(
            "exchange_bytes",
            u64::from(self.max_exchange_bytes),
            message.exchange().len() as u64,
        )?;
        check_len(
            "routing_key_bytes",
            u64::from(self.max_routing_key_bytes),
            message.routing_key().len() as u64,
        )?;
        check_len(
            "body_bytes",
            self.max_body_bytes,
            message.envelope().body().len() as u64,
        )
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self::new()
    }
}

const fn check_len(limit: &'static str, max: u64, actual: u64) -> crate::Result<()> {
    if actual > max {
        return Err(crate::Error::LimitExceeded { limit, max, actual });
    }
    Ok(())
}
