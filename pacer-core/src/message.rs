//! Outbound message model.
//!
//! An [`OutboundMessage`] is everything `basic.publish` needs: where the
//! message goes (exchange and routing key), what it carries (the
//! [`Envelope`]) and how the broker should treat an unroutable message
//! ([`PublishFlags`]). Frame encoding is left to the protocol layer.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use bytes::Bytes;

/// Flags for `basic.publish`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PublishFlags(u8);

impl PublishFlags {
    /// No flags.
    pub const NONE: Self = Self(0);
    /// Return the message if it cannot be routed to any queue.
    pub const MANDATORY: Self = Self(0x01);
    /// Return the message if it cannot be delivered to a consumer immediately.
    pub const IMMEDIATE: Self = Self(0x02);

    /// Builds flags from raw bits, dropping unknown bits.
    #[must_use]
    pub const fn from_bits_truncate(bits: u8) -> Self {
        Self(bits & (Self::MANDATORY.0 | Self::IMMEDIATE.0))
    }

    /// Returns the raw bits.
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Returns true if every flag in `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns true if no flag is set.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for PublishFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for PublishFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for PublishFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = Vec::with_capacity(2);
        if self.contains(Self::MANDATORY) {
            names.push("MANDATORY");
        }
        if self.contains(Self::IMMEDIATE) {
            names.push("IMMEDIATE");
        }
        if names.is_empty() {
            write!(f, "PublishFlags(NONE)")
        } else {
            write!(f, "PublishFlags({})", names.join(" | "))
        }
    }
}

/// Persistence requested for a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryMode {
    /// Held in memory only (delivery-mode 1).
    #[default]
    Transient,
    /// Written to disk by durable queues (delivery-mode 2).
    Persistent,
}

impl DeliveryMode {
    /// Returns the wire value of this mode.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::Transient => 1,
            Self::Persistent => 2,
        }
    }
}

/// Message body plus the basic properties the publisher sets.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Envelope {
    body: Bytes,
    content_type: Option<String>,
    content_encoding: Option<String>,
    delivery_mode: Option<DeliveryMode>,
    priority: Option<u8>,
    correlation_id: Option<String>,
    message_id: Option<String>,
    expiration: Option<String>,
}

impl Envelope {
    /// Creates an envelope with the given body and no properties.
    #[must_use]
    pub fn new(body: impl Into<Bytes>) -> Self {
        Self {
            body: body.into(),
            ..Self::default()
        }
    }

    /// Sets the MIME content type.
    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Sets the content encoding.
    #[must_use]
    pub fn with_content_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.content_encoding = Some(encoding.into());
        self
    }

    /// Sets the delivery mode.
    #[must_use]
    pub const fn with_delivery_mode(mut self, mode: DeliveryMode) -> Self {
        self.delivery_mode = Some(mode);
        self
    }

    /// Sets the priority (0-9 is what brokers honour).
    #[must_use]
    pub const fn with_priority(mut self, priority: u8) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Sets the correlation id.
    #[must_use]
    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    /// Sets the application message id.
    #[must_use]
    pub fn with_message_id(mut self, id: impl Into<String>) -> Self {
        self.message_id = Some(id.into());
        self
    }

    /// Sets the per-message TTL, in milliseconds as a decimal string.
    #[must_use]
    pub fn with_expiration(mut self, expiration: impl Into<String>) -> Self {
        self.expiration = Some(expiration.into());
        self
    }

    /// Returns the body.
    #[must_use]
    pub const fn body(&self) -> &Bytes {
        &self.body
    }

    /// Returns the content type, if set.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// Returns the content encoding, if set.
    #[must_use]
    pub fn content_encoding(&self) -> Option<&str> {
        self.content_encoding.as_deref()
    }

    /// Returns the delivery mode, if set.
    #[must_use]
    pub const fn delivery_mode(&self) -> Option<DeliveryMode> {
        self.delivery_mode
    }

    /// Returns the priority, if set.
    #[must_use]
    pub const fn priority(&self) -> Option<u8> {
        self.priority
    }

    /// Returns the correlation id, if set.
    #[must_use]
    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    /// Returns the message id, if set.
    #[must_use]
    pub fn message_id(&self) -> Option<&str> {
        self.message_id.as_deref()
    }

    /// Returns the expiration, if set.
    #[must_use]
    pub fn expiration(&self) -> Option<&str> {
        self.expiration.as_deref()
    }
}

impl From<Bytes> for Envelope {
    fn from(body: Bytes) -> Self {
        Self::new(body)
    }
}

impl From<Vec<u8>> for Envelope {
    fn from(body: Vec<u8>) -> Self {
        Self::new(body)
    }
}

impl From<&'static [u8]> for Envelope {
    fn from(body: &'static [u8]) -> Self {
        Self::new(Bytes::from_static(body))
    }
}

impl From<&'static str> for Envelope {
    fn from(body: &'static str) -> Self {
        Self::new(Bytes::from_static(body.as_bytes()))
    }
}

impl From<String> for Envelope {
    fn from(body: String) -> Self {
        Self::new(body)
    }
}

/// A message ready to be handed to `basic.publish`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    exchange: String,
    routing_key: String,
    envelope: Envelope,
    flags: PublishFlags,
}

impl OutboundMessage {
    /// Creates a new outbound message.
    #[must_use]
    pub fn new(
        exchange: impl Into<String>,
        routing_key: impl Into<String>,
        envelope: impl Into<Envelope>,
        flags: PublishFlags,
    ) -> Self {
        Self {
            exchange: exchange.into(),
            routing_key: routing_key.into(),
            envelope: envelope.into(),
            flags,
        }
    }

    /// Returns the target exchange. Empty means the default exchange.
    #[must_use]
    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    /// Returns the routing key.
    #[must_use]
    pub fn routing_key(&self) -> &str {
        &self.routing_key
    }

    /// Returns the envelope.
    #[must_use]
    pub const fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    /// Returns the publish flags.
    #[must_use]
    pub const fn flags(&self) -> PublishFlags {
        self.flags
    }

    /// Returns the number of payload-bearing bytes: addressing plus body.
    #[must_use]
    pub fn size_bytes(&self) -> u64 {
        (self.exchange.len() + self.routing_key.len() + self.envelope.body.len()) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_combine() {
        let flags = PublishFlags::MANDATORY | PublishFlags::IMMEDIATE;
        assert!(flags.contains(PublishFlags::MANDATORY));
        assert!(flags.contains(PublishFlags::IMMEDIATE));
        assert_eq!(flags.bits(), 0x03);
        assert!(PublishFlags::NONE.is_empty());
    }

    #[test]
    fn test_flags_truncate_unknown_bits() {
        let flags = PublishFlags::from_bits_truncate(0xFF);
        assert_eq!(flags.bits(), 0x03);
    }

    #[test]
    fn test_flags_debug() {
        assert_eq!(format!("{:?}", PublishFlags::NONE), "PublishFlags(NONE)");
        assert_eq!(
            format!("{:?}", PublishFlags::MANDATORY | PublishFlags::IMMEDIATE),
            "PublishFlags(MANDATORY | IMMEDIATE)"
        );
    }

    #[test]
    fn test_envelope_properties() {
        let envelope = Envelope::from("payload")
            .with_content_type("application/json")
            .with_delivery_mode(DeliveryMode::Persistent)
            .with_priority(5)
            .with_message_id("m-1");

        assert_eq!(envelope.body().as_ref(), b"payload");
        assert_eq!(envelope.content_type(), Some("application/json"));
        assert_eq!(envelope.delivery_mode().map(DeliveryMode::as_u8), Some(2));
        assert_eq!(envelope.priority(), Some(5));
        assert_eq!(envelope.message_id(), Some("m-1"));
        assert_eq!(envelope.correlation_id(), None);
    }

    #[test]
    fn test_message_size() {
        let message =
            OutboundMessage::new("ex", "key", Envelope::from("hello"), PublishFlags::NONE);
        assert_eq!(message.size_bytes(), 10);
        assert_eq!(message.exchange(), "ex");
        assert_eq!(message.routing_key(), "key");
    }
}
