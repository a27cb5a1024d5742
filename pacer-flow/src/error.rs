//! Flow control error types.

use pacer_core::{DeliveryTag, SequenceId};

/// Flow control error type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ThrottleError {
    /// Publish attempted after `close()`.
    #[error("publisher is closing, publish rejected")]
    Closed,

    /// The message violates a configured limit.
    #[error("invalid message: {0}")]
    InvalidMessage(pacer_core::Error),

    /// The channel reported an error, or refused a dispatch.
    #[error("channel error: {message}")]
    Channel {
        /// Error text from the channel.
        message: String,
    },

    /// The channel assigned a tag other than the one the sequence predicted.
    #[error("delivery tag mismatch for {sequence_id}: expected {expected}, channel assigned {actual}")]
    TagMismatch {
        /// The sequence id being dispatched.
        sequence_id: SequenceId,
        /// The tag the sequence id predicted.
        expected: DeliveryTag,
        /// The tag the channel returned.
        actual: DeliveryTag,
    },

    /// Invalid configuration.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Error message.
        message: String,
    },
}

impl From<pacer_channel::ChannelError> for ThrottleError {
    fn from(err: pacer_channel::ChannelError) -> Self {
        Self::Channel {
            message: err.to_string(),
        }
    }
}

/// Result type for flow control operations.
pub type ThrottleResult<T> = Result<T, ThrottleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ThrottleError::TagMismatch {
            sequence_id: SequenceId::new(4),
            expected: DeliveryTag::new(4),
            actual: DeliveryTag::new(14),
        };
        let msg = err.to_string();
        assert!(msg.contains("seq-4"));
        assert!(msg.contains("tag-14"));

        assert_eq!(
            ThrottleError::Closed.to_string(),
            "publisher is closing, publish rejected"
        );
    }

    #[test]
    fn test_from_channel_error() {
        let err: ThrottleError = pacer_channel::ChannelError::Closed {
            reason: "broker shutdown".into(),
        }
        .into();
        assert_eq!(
            err,
            ThrottleError::Channel {
                message: "channel closed: broker shutdown".into()
            }
        );
    }
}
