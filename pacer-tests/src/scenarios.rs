//! Reusable test scenarios for publisher simulation.
//!
//! Channel setups and a small harness that plays the broker, so scenario
//! tests read as a sequence of publishes and confirms.

use std::cell::RefCell;
use std::rc::Rc;

use pacer_channel::{ChannelFaultConfig, CloseBehavior, SimulatedChannel};
use pacer_core::{DeliveryTag, PublishFlags};
use pacer_flow::{ThrottleError, ThrottledPublisher};

/// Standard channel setups.
pub mod channels {
    use super::{ChannelFaultConfig, CloseBehavior, SimulatedChannel};

    /// A channel with no faults.
    #[must_use]
    pub const fn reliable(seed: u64) -> SimulatedChannel {
        SimulatedChannel::new(seed)
    }

    /// A channel that refuses a share of publishes.
    #[must_use]
    pub const fn flaky(seed: u64) -> SimulatedChannel {
        SimulatedChannel::with_faults(seed, ChannelFaultConfig::flaky())
    }

    /// A channel whose close stays pending until completed by hand.
    #[must_use]
    pub const fn hanging_close(seed: u64) -> SimulatedChannel {
        SimulatedChannel::with_faults(
            seed,
            ChannelFaultConfig::none().with_close_behavior(CloseBehavior::Hang),
        )
    }

    /// A channel whose tags run `skew` ahead of the publisher's ids.
    #[must_use]
    pub const fn skewed(seed: u64, skew: u64) -> SimulatedChannel {
        SimulatedChannel::with_faults(seed, ChannelFaultConfig::none().with_tag_skew(skew))
    }
}

/// Seeds for reproducible testing.
pub mod seeds {
    /// Standard test seeds that have historically found bugs.
    pub const REGRESSION_SEEDS: &[u64] = &[
        42,
        12345,
        0xDEAD_BEEF,
        999,
        7777,
        0x1337,
        0xCAFE_BABE,
        1,
        u64::MAX,
        0,
    ];

    /// Number of random seeds to test in CI.
    pub const CI_SEED_COUNT: u32 = 100;
}

/// Publisher over a simulated channel, with the test acting as broker.
pub struct Harness {
    publisher: ThrottledPublisher<SimulatedChannel>,
    errors: Rc<RefCell<Vec<ThrottleError>>>,
    published: usize,
}

impl Harness {
    /// Creates a harness over a reliable channel.
    #[must_use]
    pub fn new(throttle: usize) -> Self {
        Self::with_channel(channels::reliable(42), throttle)
    }

    /// Creates a harness over the given channel.
    #[must_use]
    pub fn with_channel(channel: SimulatedChannel, throttle: usize) -> Self {
        let mut publisher = ThrottledPublisher::with_throttle(channel, throttle);
        let errors = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&errors);
        publisher.on_error(move |err| sink.borrow_mut().push(err.clone()));
        Self {
            publisher,
            errors,
            published: 0,
        }
    }

    /// Publishes `n` messages with distinct bodies. Returns how many were
    /// accepted.
    pub fn publish(&mut self, n: usize) -> usize {
        let mut accepted = 0;
        for _ in 0..n {
            let body = format!("message-{}", self.published);
            self.published += 1;
            if self.publisher.publish("events", "all", body, PublishFlags::NONE) {
                accepted += 1;
            }
        }
        accepted
    }

    /// Broker acks `tag`. Returns false if the tag was not outstanding.
    pub fn ack(&mut self, tag: u64, multiple: bool) -> bool {
        self.confirm(tag, multiple, true)
    }

    /// Broker nacks `tag`. Returns false if the tag was not outstanding.
    pub fn nack(&mut self, tag: u64, multiple: bool) -> bool {
        self.confirm(tag, multiple, false)
    }

    /// Broker acks every outstanding tag, one at a time, until nothing is
    /// left in flight or queued. Returns the number of acks sent.
    pub fn ack_everything(&mut self) -> usize {
        let mut acks = 0;
        loop {
            let Some(tag) = self.publisher.channel().unconfirmed().first().copied() else {
                break;
            };
            self.ack(tag.get(), false);
            acks += 1;
        }
        acks
    }

    fn confirm(&mut self, tag: u64, multiple: bool, positive: bool) -> bool {
        let event = self
            .publisher
            .channel_mut()
            .confirm(DeliveryTag::new(tag), multiple, positive);
        match event {
            Some(event) => {
                self.publisher.handle_event(event);
                true
            }
            None => false,
        }
    }

    /// Returns the open tags as raw numbers.
    #[must_use]
    pub fn open(&self) -> Vec<u64> {
        self.publisher.open_tags().into_iter().map(DeliveryTag::get).collect()
    }

    /// Returns the queued ids as raw numbers.
    #[must_use]
    pub fn queued(&self) -> Vec<u64> {
        self.publisher
            .queued_ids()
            .into_iter()
            .map(|id| id.get())
            .collect()
    }

    /// Returns the bodies the channel received, in order.
    #[must_use]
    pub fn dispatched_bodies(&self) -> Vec<String> {
        self.publisher
            .channel()
            .published()
            .iter()
            .map(|sent| String::from_utf8_lossy(sent.message.envelope().body()).into_owned())
            .collect()
    }

    /// Returns errors delivered to the error callback so far.
    #[must_use]
    pub fn errors(&self) -> Vec<ThrottleError> {
        self.errors.borrow().clone()
    }

    /// Returns the publisher.
    #[must_use]
    pub const fn publisher(&self) -> &ThrottledPublisher<SimulatedChannel> {
        &self.publisher
    }

    /// Returns the publisher mutably.
    pub fn publisher_mut(&mut self) -> &mut ThrottledPublisher<SimulatedChannel> {
        &mut self.publisher
    }
}
