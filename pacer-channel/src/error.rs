//! Channel error types.

use pacer_core::OutboundMessage;
use thiserror::Error;

/// Errors raised by a channel.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// The channel has been closed, locally or by the broker.
    #[error("channel closed: {reason}")]
    Closed {
        /// Why the channel is closed.
        reason: String,
    },

    /// The channel exists but cannot carry frames right now.
    #[error("channel not usable: {reason}")]
    Unusable {
        /// What is wrong with the channel.
        reason: String,
    },
}

/// A publish the channel refused to send.
///
/// The message is handed back so the caller can keep it instead of losing it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("dispatch failed: {error}")]
pub struct DispatchError {
    /// The message that was not sent.
    pub message: OutboundMessage,
    /// Why it was not sent.
    pub error: ChannelError,
}

impl DispatchError {
    /// Creates a dispatch error.
    #[must_use]
    pub const fn new(message: OutboundMessage, error: ChannelError) -> Self {
        Self { message, error }
    }

    /// Splits into the returned message and the cause.
    #[must_use]
    pub fn into_parts(self) -> (OutboundMessage, ChannelError) {
        (self.message, self.error)
    }
}
