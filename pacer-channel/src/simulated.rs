//! In-memory channel for deterministic simulation testing.
//!
//! `SimulatedChannel` plays both sides of the wire: it accepts publishes the
//! way a confirm-mode channel would, and it plays the broker by turning
//! outstanding tags into [`ConfirmEvent`]s on request. Nothing happens on its
//! own; the test or simulator decides when and how each tag is confirmed.

use std::collections::BTreeSet;

use pacer_core::{DeliveryTag, OutboundMessage};
use tracing::trace;

use crate::channel::Channel;
use crate::deferred::Deferred;
use crate::error::{ChannelError, DispatchError};
use crate::event::ConfirmEvent;

// -----------------------------------------------------------------------------
// Fault Configuration
// -----------------------------------------------------------------------------

/// How the simulated channel answers `close()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CloseBehavior {
    /// Resolve the close handle immediately.
    #[default]
    Succeed,
    /// Fail the close handle immediately.
    Fail,
    /// Leave the handle pending until [`SimulatedChannel::complete_close`].
    Hang,
}

/// Fault configuration for the simulated channel.
#[derive(Debug, Clone, Default)]
pub struct ChannelFaultConfig {
    /// Probability of a publish being refused (0.0 - 1.0).
    pub publish_fail_rate: f64,
    /// Force the next publish to fail (one-shot).
    pub force_publish_fail: bool,
    /// How `close()` resolves.
    pub close_behavior: CloseBehavior,
    /// Offset added to every assigned tag, breaking tag alignment.
    pub tag_skew: u64,
}

impl ChannelFaultConfig {
    /// No faults (all operations succeed).
    #[must_use]
    pub const fn none() -> Self {
        Self {
            publish_fail_rate: 0.0,
            force_publish_fail: false,
            close_behavior: CloseBehavior::Succeed,
            tag_skew: 0,
        }
    }

    /// Flaky configuration for stress testing.
    #[must_use]
    pub const fn flaky() -> Self {
        Self {
            publish_fail_rate: 0.05,
            force_publish_fail: false,
            close_behavior: CloseBehavior::Succeed,
            tag_skew: 0,
        }
    }

    /// Builder: set publish fail rate.
    #[must_use]
    pub const fn with_publish_fail_rate(mut self, rate: f64) -> Self {
        self.publish_fail_rate = rate;
        self
    }

    /// Builder: set close behavior.
    #[must_use]
    pub const fn with_close_behavior(mut self, behavior: CloseBehavior) -> Self {
        self.close_behavior = behavior;
        self
    }

    /// Builder: set tag skew.
    #[must_use]
    pub const fn with_tag_skew(mut self, skew: u64) -> Self {
        self.tag_skew = skew;
        self
    }
}

// -----------------------------------------------------------------------------
// Simulated Channel
// -----------------------------------------------------------------------------

/// A message the simulated channel accepted, in dispatch order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    /// The tag the channel assigned.
    pub tag: DeliveryTag,
    /// The message as received.
    pub message: OutboundMessage,
}

/// Deterministic in-memory confirm-mode channel.
#[derive(Debug)]
pub struct SimulatedChannel {
    /// Next confirm tag to hand out (before skew).
    next_tag: DeliveryTag,
    /// Everything accepted so far.
    published: Vec<PublishedMessage>,
    /// Tags the simulated broker has not confirmed yet.
    unconfirmed: BTreeSet<DeliveryTag>,
    /// Number of `close()` calls seen.
    close_calls: u32,
    /// Close handles waiting on `complete_close`.
    pending_closes: Vec<Deferred>,
    /// Set once `close()` is called.
    closed: bool,
    /// Fault configuration.
    fault_config: ChannelFaultConfig,
    /// RNG seed for deterministic faults.
    seed: u64,
    /// Operation counter for deterministic RNG.
    counter: u64,
}

impl SimulatedChannel {
    /// Creates a new simulated channel with no faults.
    #[must_use]
    pub const fn new(seed: u64) -> Self {
        Self::with_faults(seed, ChannelFaultConfig::none())
    }

    /// Creates a simulated channel with fault injection.
    #[must_use]
    pub const fn with_faults(seed: u64, config: ChannelFaultConfig) -> Self {
        Self {
            next_tag: DeliveryTag::new(1),
            published: Vec::new(),
            unconfirmed: BTreeSet::new(),
            close_calls: 0,
            pending_closes: Vec::new(),
            closed: false,
            fault_config: config,
            seed,
            counter: 0,
        }
    }

    /// Returns fault config for modification.
    pub fn fault_config(&mut self) -> &mut ChannelFaultConfig {
        &mut self.fault_config
    }

    /// Deterministic RNG following the `(seed + counter) * M` pattern.
    fn should_inject_fault(&mut self, rate: f64) -> bool {
        if rate <= 0.0 {
            return false;
        }
        if rate >= 1.0 {
            return true;
        }
        let counter = self.counter;
        self.counter = self.counter.wrapping_add(1);
        let hash = self
            .seed
            .wrapping_add(counter)
            .wrapping_mul(0x9e37_79b9_7f4a_7c15);
        #[allow(clippy::cast_precision_loss)]
        let normalized = (hash as f64) / (u64::MAX as f64);
        normalized < rate
    }

    /// Returns every accepted message in dispatch order.
    #[must_use]
    pub fn published(&self) -> &[PublishedMessage] {
        &self.published
    }

    /// Returns the number of accepted messages.
    #[must_use]
    pub fn published_count(&self) -> usize {
        self.published.len()
    }

    /// Returns the tags not yet confirmed, lowest first.
    #[must_use]
    pub fn unconfirmed(&self) -> Vec<DeliveryTag> {
        self.unconfirmed.iter().copied().collect()
    }

    /// Returns the number of tags not yet confirmed.
    #[must_use]
    pub fn unconfirmed_count(&self) -> usize {
        self.unconfirmed.len()
    }

    /// Returns how many times `close()` was called.
    #[must_use]
    pub const fn close_calls(&self) -> u32 {
        self.close_calls
    }

    /// Returns true once `close()` has been called.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    /// Plays the broker confirming `tag`.
    ///
    /// With `multiple`, every outstanding tag up to and including `tag` is
    /// confirmed. Returns `None` if nothing outstanding was covered.
    pub fn confirm(
        &mut self,
        tag: DeliveryTag,
        multiple: bool,
        positive: bool,
    ) -> Option<ConfirmEvent> {
        let covered = if multiple {
            let rest = self.unconfirmed.split_off(&tag.next());
            let removed = std::mem::replace(&mut self.unconfirmed, rest);
            !removed.is_empty()
        } else {
            self.unconfirmed.remove(&tag)
        };
        if !covered {
            return None;
        }

        trace!(tag = %tag, multiple, positive, "Simulated broker confirm");
        Some(if positive {
            ConfirmEvent::Ack { tag, multiple }
        } else {
            ConfirmEvent::Nack {
                tag,
                multiple,
                requeue: false,
            }
        })
    }

    /// Confirms every outstanding tag with one cumulative ack.
    pub fn confirm_all(&mut self) -> Option<ConfirmEvent> {
        let last = self.unconfirmed.last().copied()?;
        self.confirm(last, true, true)
    }

    /// Builds the event a broker-side failure would raise.
    #[must_use]
    pub fn raise_error(&self, message: impl Into<String>) -> ConfirmEvent {
        ConfirmEvent::Error {
            message: message.into(),
        }
    }

    /// Resolves close handles left pending by [`CloseBehavior::Hang`].
    ///
    /// Returns the number of handles resolved.
    pub fn complete_close(&mut self) -> usize {
        let pending = std::mem::take(&mut self.pending_closes);
        pending.iter().filter(|deferred| deferred.resolve()).count()
    }
}

impl Channel for SimulatedChannel {
    fn publish_with_confirm(
        &mut self,
        message: OutboundMessage,
    ) -> Result<DeliveryTag, DispatchError> {
        if self.closed {
            return Err(DispatchError::new(
                message,
                ChannelError::Closed {
                    reason: "close requested".into(),
                },
            ));
        }

        if self.fault_config.force_publish_fail {
            self.fault_config.force_publish_fail = false;
            return Err(DispatchError::new(
                message,
                ChannelError::Unusable {
                    reason: "simulated failure (forced)".into(),
                },
            ));
        }

        let rate = self.fault_config.publish_fail_rate;
        if self.should_inject_fault(rate) {
            return Err(DispatchError::new(
                message,
                ChannelError::Unusable {
                    reason: "simulated failure".into(),
                },
            ));
        }

        let tag = DeliveryTag::new(self.next_tag.get() + self.fault_config.tag_skew);
        self.next_tag = self.next_tag.next();
        self.unconfirmed.insert(tag);
        self.published.push(PublishedMessage { tag, message });
        Ok(tag)
    }

    fn close(&mut self) -> Deferred {
        self.close_calls += 1;
        self.closed = true;
        trace!(calls = self.close_calls, "Simulated channel close");

        match self.fault_config.close_behavior {
            CloseBehavior::Succeed => Deferred::succeeded(),
            CloseBehavior::Fail => Deferred::failed("simulated close failure"),
            CloseBehavior::Hang => {
                let deferred = Deferred::new();
                self.pending_closes.push(deferred.clone());
                deferred
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use pacer_core::{Envelope, PublishFlags};

    use super::*;

    fn message(body: &'static str) -> OutboundMessage {
        OutboundMessage::new("ex", "rk", Envelope::from(body), PublishFlags::NONE)
    }

    #[test]
    fn test_tags_start_at_one() {
        let mut channel = SimulatedChannel::new(42);
        assert_eq!(channel.publish_with_confirm(message("a")).unwrap().get(), 1);
        assert_eq!(channel.publish_with_confirm(message("b")).unwrap().get(), 2);
        assert_eq!(channel.published_count(), 2);
        assert_eq!(channel.unconfirmed_count(), 2);
    }

    #[test]
    fn test_cumulative_confirm_covers_prefix() {
        let mut channel = SimulatedChannel::new(42);
        for body in ["a", "b", "c", "d"] {
            channel.publish_with_confirm(message(body)).unwrap();
        }

        let event = channel.confirm(DeliveryTag::new(2), true, true);
        assert_eq!(event, Some(ConfirmEvent::ack_through(DeliveryTag::new(2))));
        assert_eq!(
            channel.unconfirmed(),
            vec![DeliveryTag::new(3), DeliveryTag::new(4)]
        );

        // Nothing left at or below 2.
        assert_eq!(channel.confirm(DeliveryTag::new(2), true, true), None);
    }

    #[test]
    fn test_single_nack() {
        let mut channel = SimulatedChannel::new(42);
        channel.publish_with_confirm(message("a")).unwrap();

        let event = channel.confirm(DeliveryTag::new(1), false, false);
        assert_eq!(event, Some(ConfirmEvent::nack(DeliveryTag::new(1))));
        assert_eq!(channel.confirm(DeliveryTag::new(1), false, false), None);
    }

    #[test]
    fn test_confirm_all() {
        let mut channel = SimulatedChannel::new(42);
        assert_eq!(channel.confirm_all(), None);

        channel.publish_with_confirm(message("a")).unwrap();
        channel.publish_with_confirm(message("b")).unwrap();
        assert_eq!(
            channel.confirm_all(),
            Some(ConfirmEvent::ack_through(DeliveryTag::new(2)))
        );
        assert_eq!(channel.unconfirmed_count(), 0);
    }

    #[test]
    fn test_forced_failure_returns_message() {
        let mut channel = SimulatedChannel::new(42);
        channel.fault_config().force_publish_fail = true;

        let err = channel.publish_with_confirm(message("a")).unwrap_err();
        assert_eq!(err.message, message("a"));

        // One-shot: the next publish succeeds and still gets tag 1.
        assert_eq!(channel.publish_with_confirm(message("a")).unwrap().get(), 1);
    }

    #[test]
    fn test_probabilistic_failure() {
        let mut channel = SimulatedChannel::with_faults(
            42,
            ChannelFaultConfig::none().with_publish_fail_rate(1.0),
        );
        for _ in 0..10 {
            assert!(channel.publish_with_confirm(message("a")).is_err());
        }
        assert_eq!(channel.published_count(), 0);
    }

    #[test]
    fn test_publish_after_close_fails() {
        let mut channel = SimulatedChannel::new(42);
        let closed = channel.close();
        assert!(closed.is_succeeded());
        assert_eq!(channel.close_calls(), 1);
        assert!(channel.is_closed());

        let err = channel.publish_with_confirm(message("a")).unwrap_err();
        assert!(matches!(err.error, ChannelError::Closed { .. }));
    }

    #[test]
    fn test_hanging_close() {
        let mut channel = SimulatedChannel::with_faults(
            42,
            ChannelFaultConfig::none().with_close_behavior(CloseBehavior::Hang),
        );
        let closing = channel.close();
        assert!(closing.is_pending());

        assert_eq!(channel.complete_close(), 1);
        assert!(closing.is_succeeded());
        assert_eq!(channel.complete_close(), 0);
    }

    #[test]
    fn test_tag_skew() {
        let mut channel =
            SimulatedChannel::with_faults(42, ChannelFaultConfig::none().with_tag_skew(10));
        assert_eq!(channel.publish_with_confirm(message("a")).unwrap().get(), 11);
        assert_eq!(channel.publish_with_confirm(message("b")).unwrap().get(), 12);
    }
}
