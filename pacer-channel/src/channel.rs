//! The channel contract a throttled publisher drives.
//!
//! The channel sits below the publisher: it owns connection state, frames
//! `basic.publish` and tracks the broker's confirm sequence. The publisher
//! only needs three things from it: send a message in confirm mode and learn
//! its tag, close, and a stream of [`ConfirmEvent`](crate::ConfirmEvent)s
//! delivered by whatever event loop owns both.

use pacer_core::{DeliveryTag, OutboundMessage};

use crate::deferred::Deferred;
use crate::error::DispatchError;

/// A channel in publisher-confirm mode.
///
/// # Contract
///
/// - Tags returned by [`publish_with_confirm`](Self::publish_with_confirm)
///   start at 1 and increase by one per successful publish.
/// - Ack, nack and error events are delivered serially on the loop that
///   drives the publisher, never from inside a `Channel` method call.
/// - [`close`](Self::close) returns a handle resolved exactly once.
/// - A publisher that owns the channel is its only driver.
pub trait Channel {
    /// Publishes a message with confirms enabled and returns its delivery tag.
    ///
    /// # Errors
    ///
    /// Returns the message inside [`DispatchError`] if it could not be sent.
    fn publish_with_confirm(
        &mut self,
        message: OutboundMessage,
    ) -> Result<DeliveryTag, DispatchError>;

    /// Starts closing the channel.
    fn close(&mut self) -> Deferred;
}

impl<C: Channel + ?Sized> Channel for Box<C> {
    fn publish_with_confirm(
        &mut self,
        message: OutboundMessage,
    ) -> Result<DeliveryTag, DispatchError> {
        (**self).publish_with_confirm(message)
    }

    fn close(&mut self) -> Deferred {
        (**self).close()
    }
}
