//! Events a confirm-mode channel raises.

use std::fmt;

use pacer_core::DeliveryTag;

/// An event delivered by the channel's event loop.
///
/// Events arrive serially on the same loop that drives the publisher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmEvent {
    /// `basic.ack` from the broker.
    Ack {
        /// The acknowledged tag.
        tag: DeliveryTag,
        /// Whether every lower outstanding tag is acknowledged too.
        multiple: bool,
    },

    /// `basic.nack` from the broker.
    Nack {
        /// The rejected tag.
        tag: DeliveryTag,
        /// Whether every lower outstanding tag is rejected too.
        multiple: bool,
        /// The requeue bit as sent by the broker. Carried for observers only.
        requeue: bool,
    },

    /// Channel or connection level error.
    Error {
        /// The error text.
        message: String,
    },
}

impl ConfirmEvent {
    /// Creates a single-tag ack.
    #[must_use]
    pub const fn ack(tag: DeliveryTag) -> Self {
        Self::Ack {
            tag,
            multiple: false,
        }
    }

    /// Creates a cumulative ack covering `tag` and everything below it.
    #[must_use]
    pub const fn ack_through(tag: DeliveryTag) -> Self {
        Self::Ack {
            tag,
            multiple: true,
        }
    }

    /// Creates a single-tag nack.
    #[must_use]
    pub const fn nack(tag: DeliveryTag) -> Self {
        Self::Nack {
            tag,
            multiple: false,
            requeue: false,
        }
    }

    /// Returns the tag this event refers to, if any.
    #[must_use]
    pub const fn tag(&self) -> Option<DeliveryTag> {
        match self {
            Self::Ack { tag, .. } | Self::Nack { tag, .. } => Some(*tag),
            Self::Error { .. } => None,
        }
    }
}

impl fmt::Display for ConfirmEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ack { tag, multiple } => write!(f, "ack {tag} multiple={multiple}"),
            Self::Nack { tag, multiple, .. } => write!(f, "nack {tag} multiple={multiple}"),
            Self::Error { message } => write!(f, "error: {message}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors() {
        let tag = DeliveryTag::new(3);
        assert_eq!(
            ConfirmEvent::ack(tag),
            ConfirmEvent::Ack {
                tag,
                multiple: false
            }
        );
        assert_eq!(
            ConfirmEvent::ack_through(tag),
            ConfirmEvent::Ack {
                tag,
                multiple: true
            }
        );
        assert_eq!(ConfirmEvent::nack(tag).tag(), Some(tag));
    }

    #[test]
    fn test_error_has_no_tag() {
        let event = ConfirmEvent::Error {
            message: "gone".into(),
        };
        assert_eq!(event.tag(), None);
        assert_eq!(event.to_string(), "error: gone");
    }
}
