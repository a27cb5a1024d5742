//! Confirm-throttled publisher.
//!
//! The `ThrottledPublisher` sits on top of a confirm-mode [`Channel`] and
//! keeps the number of unconfirmed messages at or below a configured
//! throttle. Publishes beyond that are accepted into a FIFO queue and
//! dispatched as the broker's confirms free capacity.
//!
//! ```text
//!   publish ──▶ admission ──(capacity)──▶ Channel::publish_with_confirm ──▶ OpenTagSet
//!                   │                                                        │
//!                   └──(no capacity / queue non-empty)──▶ PendingQueue       │
//!                                                             ▲              │
//!   ack / nack ──────────────────────────▶ release tags ──────┴── drain ◀────┘
//! ```
//!
//! # Close protocol
//!
//! `Active` ─close()─▶ `Closing` ─queue and open tags empty─▶ `Closed`.
//! While closing, publishes are rejected and confirms keep draining the
//! queue. The channel is closed exactly once, when the last tag is released.
//! There is no timeout: a channel that never confirms keeps the publisher in
//! `Closing`.
//!
//! # Confirmed frontier
//!
//! `last_confirmed` is the highest sequence id at or below which everything
//! is known to be confirmed. It is counted in sequence ids, not channel tags,
//! so `waiting()` stays right when the channel's tags run out of step. After
//! any confirm it moves to just below the oldest message still in flight, or
//! to the last dispatched id when nothing is in flight. Confirms name tags,
//! so each open tag remembers the id it was dispatched for. A single ack
//! above a gap leaves the frontier where it is, and the ack that closes the
//! gap absorbs everything confirmed out of order before it.

use std::fmt;

use pacer_channel::{Channel, ConfirmEvent, Deferred};
use pacer_core::{DeliveryTag, Envelope, Limits, OutboundMessage, PublishFlags, SequenceId};
use tracing::{debug, info, trace, warn};

use crate::config::ThrottleConfig;
use crate::error::{ThrottleError, ThrottleResult};
use crate::open_tags::OpenTagSet;
use crate::pending_queue::PendingQueue;

/// Callback invoked with every reported error.
pub type ErrorCallback = Box<dyn FnMut(&ThrottleError)>;

/// Callback invoked with every nack `(tag, multiple)` before capacity is released.
pub type NackCallback = Box<dyn FnMut(DeliveryTag, bool)>;

/// Lifecycle of a publisher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublisherState {
    /// Accepting publishes.
    Active,
    /// Close requested; draining what is left.
    Closing,
    /// Channel closed. Terminal.
    Closed,
}

impl PublisherState {
    /// Returns a short name for logging.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Closing => "closing",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for PublisherState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened to an accepted publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Sent to the channel straight away.
    Dispatched {
        /// The id assigned to the message.
        sequence_id: SequenceId,
        /// The tag the channel assigned.
        tag: DeliveryTag,
    },
    /// Waiting in the pending queue.
    Queued {
        /// The id assigned to the message.
        sequence_id: SequenceId,
        /// Zero-based position in the queue at the time of the publish.
        position: usize,
    },
}

impl Admission {
    /// Returns the id assigned to the message.
    #[must_use]
    pub const fn sequence_id(&self) -> SequenceId {
        match self {
            Self::Dispatched { sequence_id, .. } | Self::Queued { sequence_id, .. } => {
                *sequence_id
            }
        }
    }

    /// Returns true if the message went straight to the channel.
    #[must_use]
    pub const fn is_dispatched(&self) -> bool {
        matches!(self, Self::Dispatched { .. })
    }
}

/// Publisher that paces dispatch by publisher confirms.
pub struct ThrottledPublisher<C: Channel> {
    /// The channel, owned exclusively.
    channel: C,

    /// Maximum unconfirmed messages.
    throttle: usize,

    /// Limits checked on publish.
    limits: Limits,

    /// Id handed to the next accepted publish.
    next_id: SequenceId,

    /// Highest id with everything at or below it confirmed.
    last_confirmed: SequenceId,

    /// Id of the most recently dispatched message.
    highest_dispatched: SequenceId,

    /// Messages waiting for capacity.
    queue: PendingQueue,

    /// Tags dispatched and not yet confirmed.
    open: OpenTagSet,

    /// Lifecycle state.
    state: PublisherState,

    /// Handle returned by `close()`, set at most once.
    close_handle: Option<Deferred>,

    /// Error callback, if installed.
    error_callback: Option<ErrorCallback>,

    /// Nack observer, if installed.
    nack_observer: Option<NackCallback>,

    /// Total publishes accepted.
    total_published: u64,

    /// Total publishes rejected.
    total_rejected: u64,

    /// Total messages handed to the channel.
    total_dispatched: u64,

    /// Messages dispatched by `flush`, a subset of `total_dispatched`.
    total_flushed: u64,

    /// Tags released by acks.
    total_acked: u64,

    /// Tags released by nacks.
    total_nacked: u64,

    /// Dispatches the channel refused.
    dispatch_failures: u64,

    /// Dispatches where the channel tag did not match the sequence id.
    tag_mismatches: u64,
}

impl<C: Channel> ThrottledPublisher<C> {
    /// Creates a publisher that takes over `channel`.
    ///
    /// The channel must already be in confirm mode, and nothing else may
    /// publish on it afterwards: the tag bookkeeping assumes every confirm
    /// belongs to a message this publisher dispatched.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the configuration does not validate.
    pub fn new(channel: C, config: ThrottleConfig) -> ThrottleResult<Self> {
        config.validate()?;
        Ok(Self::build(channel, config.throttle, config.limits))
    }

    /// Creates a publisher with the given throttle and default limits.
    #[must_use]
    pub fn with_throttle(channel: C, throttle: usize) -> Self {
        Self::build(channel, throttle, Limits::new())
    }

    fn build(channel: C, throttle: usize, limits: Limits) -> Self {
        Self {
            channel,
            throttle,
            limits,
            next_id: SequenceId::FIRST,
            last_confirmed: SequenceId::ZERO,
            highest_dispatched: SequenceId::ZERO,
            queue: PendingQueue::new(),
            open: OpenTagSet::new(),
            state: PublisherState::Active,
            close_handle: None,
            error_callback: None,
            nack_observer: None,
            total_published: 0,
            total_rejected: 0,
            total_dispatched: 0,
            total_flushed: 0,
            total_acked: 0,
            total_nacked: 0,
            dispatch_failures: 0,
            tag_mismatches: 0,
        }
    }

    // -------------------------------------------------------------------------
    // Admission
    // -------------------------------------------------------------------------

    /// Publishes a message. Returns false if it was not accepted.
    ///
    /// Acceptance is not confirmation: the message may be queued, and even a
    /// dispatched message can still be nacked.
    pub fn publish(
        &mut self,
        exchange: impl Into<String>,
        routing_key: impl Into<String>,
        envelope: impl Into<Envelope>,
        flags: PublishFlags,
    ) -> bool {
        self.try_publish(OutboundMessage::new(exchange, routing_key, envelope, flags))
            .is_ok()
    }

    /// Publishes a raw byte body with no properties.
    pub fn publish_bytes(
        &mut self,
        exchange: impl Into<String>,
        routing_key: impl Into<String>,
        body: &[u8],
        flags: PublishFlags,
    ) -> bool {
        self.publish(exchange, routing_key, Envelope::new(body.to_vec()), flags)
    }

    /// Publishes a UTF-8 body with no properties.
    pub fn publish_str(
        &mut self,
        exchange: impl Into<String>,
        routing_key: impl Into<String>,
        body: &str,
        flags: PublishFlags,
    ) -> bool {
        self.publish(exchange, routing_key, Envelope::new(body.to_owned()), flags)
    }

    /// Publishes a prepared message, reporting what happened to it.
    ///
    /// A rejected publish consumes no sequence id.
    ///
    /// # Errors
    ///
    /// Returns `Closed` after `close()`, or `InvalidMessage` if the message
    /// breaks a configured limit.
    pub fn try_publish(&mut self, message: OutboundMessage) -> ThrottleResult<Admission> {
        if self.state != PublisherState::Active {
            self.total_rejected += 1;
            debug!(state = %self.state, "Rejected publish");
            return Err(ThrottleError::Closed);
        }

        if let Err(err) = self.limits.check(&message) {
            self.total_rejected += 1;
            debug!(error = %err, "Rejected invalid message");
            return Err(ThrottleError::InvalidMessage(err));
        }

        let sequence_id = self.next_id;
        self.next_id = self.next_id.next();
        self.total_published += 1;

        // Anything already queued is older and has to go first.
        let message = if self.queue.is_empty() && self.has_capacity() {
            match self.dispatch(sequence_id, message) {
                Ok(tag) => return Ok(Admission::Dispatched { sequence_id, tag }),
                Err(returned) => returned,
            }
        } else {
            message
        };

        let position = self.queue.push_back(sequence_id, message);
        debug!(
            sequence_id = %sequence_id,
            position,
            open = self.open.len(),
            throttle = self.throttle,
            "Queued publish"
        );
        Ok(Admission::Queued {
            sequence_id,
            position,
        })
    }

    /// Dispatches queued messages ignoring the throttle.
    ///
    /// Sends at most `max` messages, or the whole queue when `max` is zero.
    /// Returns how many were sent. Flushed messages are tracked and confirmed
    /// like any other.
    pub fn flush(&mut self, max: usize) -> usize {
        let mut sent = 0;
        while max == 0 || sent < max {
            let Some(pending) = self.queue.pop_front() else {
                break;
            };
            match self.dispatch(pending.sequence_id, pending.message) {
                Ok(_) => sent += 1,
                Err(returned) => {
                    self.queue.requeue_front(pending.sequence_id, returned);
                    break;
                }
            }
        }

        self.total_flushed += sent as u64;
        if sent > 0 {
            debug!(
                sent,
                queued = self.queue.len(),
                open = self.open.len(),
                "Flushed queue"
            );
        }
        sent
    }

    // -------------------------------------------------------------------------
    // Confirms
    // -------------------------------------------------------------------------

    /// Feeds one channel event into the publisher.
    pub fn handle_event(&mut self, event: ConfirmEvent) {
        match event {
            ConfirmEvent::Ack { tag, multiple } => self.on_ack(tag, multiple),
            ConfirmEvent::Nack { tag, multiple, .. } => self.on_nack(tag, multiple),
            ConfirmEvent::Error { message } => self.report_error(message),
        }
    }

    /// Handles a positive confirm.
    pub fn on_ack(&mut self, tag: DeliveryTag, multiple: bool) {
        let released = self.release(tag, multiple);
        self.total_acked += released as u64;
        trace!(tag = %tag, multiple, released, "Ack");
        self.after_release();
    }

    /// Handles a negative confirm.
    ///
    /// The nacked message is not retried: its capacity is released exactly
    /// as for an ack. Install [`on_nack_observed`](Self::on_nack_observed) to
    /// see nacks before that happens.
    pub fn on_nack(&mut self, tag: DeliveryTag, multiple: bool) {
        if let Some(observer) = self.nack_observer.as_mut() {
            observer(tag, multiple);
        }
        let released = self.release(tag, multiple);
        self.total_nacked += released as u64;
        debug!(tag = %tag, multiple, released, "Nack released without retry");
        self.after_release();
    }

    /// Reports a channel error to the installed callback.
    ///
    /// Without a callback the error is dropped. Publisher state is untouched.
    pub fn report_error(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!(error = %message, state = %self.state, "Channel error");
        self.emit_error(&ThrottleError::Channel { message });
    }

    /// Installs the error callback, replacing any previous one.
    pub fn on_error(&mut self, callback: impl FnMut(&ThrottleError) + 'static) {
        self.error_callback = Some(Box::new(callback));
    }

    /// Installs an observer that sees every nack before it is released.
    pub fn on_nack_observed(&mut self, callback: impl FnMut(DeliveryTag, bool) + 'static) {
        self.nack_observer = Some(Box::new(callback));
    }

    // -------------------------------------------------------------------------
    // Close
    // -------------------------------------------------------------------------

    /// Requests a graceful close.
    ///
    /// Returns a handle resolved once the channel has closed. Later calls
    /// return the same handle.
    pub fn close(&mut self) -> Deferred {
        if let Some(handle) = &self.close_handle {
            return handle.clone();
        }

        let handle = Deferred::new();
        self.close_handle = Some(handle.clone());
        self.state = PublisherState::Closing;
        info!(
            queued = self.queue.len(),
            open = self.open.len(),
            "Close requested"
        );

        self.maybe_finish_close();
        handle
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    /// Returns the number of accepted messages above the confirmed frontier.
    #[must_use]
    pub fn waiting(&self) -> usize {
        let waiting = self
            .next_id
            .prev()
            .get()
            .saturating_sub(self.last_confirmed.get());
        usize::try_from(waiting).unwrap_or(usize::MAX)
    }

    /// Returns the number of dispatched, unconfirmed messages.
    #[must_use]
    pub fn unacknowledged(&self) -> usize {
        self.open.len()
    }

    /// Returns the number of queued messages.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Returns the throttle.
    #[must_use]
    pub const fn throttle(&self) -> usize {
        self.throttle
    }

    /// Sets the throttle.
    ///
    /// Takes effect at the next admission or drain: lowering it never recalls
    /// dispatched messages, and raising it does not dispatch anything until
    /// the next confirm or `flush`.
    pub fn set_throttle(&mut self, throttle: usize) {
        debug!(from = self.throttle, to = throttle, "Throttle changed");
        self.throttle = throttle;
    }

    /// Returns the lifecycle state.
    #[must_use]
    pub const fn state(&self) -> PublisherState {
        self.state
    }

    /// Returns the highest sequence id with everything at or below it
    /// confirmed.
    #[must_use]
    pub const fn last_confirmed(&self) -> SequenceId {
        self.last_confirmed
    }

    /// Returns the id the next accepted publish will get.
    #[must_use]
    pub const fn next_sequence_id(&self) -> SequenceId {
        self.next_id
    }

    /// Returns the open tags, lowest first.
    #[must_use]
    pub fn open_tags(&self) -> Vec<DeliveryTag> {
        self.open.iter().collect()
    }

    /// Returns the queued sequence ids, head first.
    #[must_use]
    pub fn queued_ids(&self) -> Vec<SequenceId> {
        self.queue.iter().map(|pending| pending.sequence_id).collect()
    }

    /// Returns the channel.
    #[must_use]
    pub const fn channel(&self) -> &C {
        &self.channel
    }

    /// Returns the channel mutably.
    ///
    /// For driving a simulated broker or reading channel state. Publishing
    /// through this reference breaks the tag bookkeeping.
    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    /// Consumes the publisher and returns the channel.
    pub fn into_channel(self) -> C {
        self.channel
    }

    /// Returns statistics about the publisher.
    #[must_use]
    pub fn stats(&self) -> ThrottleStats {
        ThrottleStats {
            total_published: self.total_published,
            total_rejected: self.total_rejected,
            total_dispatched: self.total_dispatched,
            total_flushed: self.total_flushed,
            total_acked: self.total_acked,
            total_nacked: self.total_nacked,
            dispatch_failures: self.dispatch_failures,
            tag_mismatches: self.tag_mismatches,
            queued: self.queue.len(),
            queued_bytes: self.queue.bytes(),
            unacknowledged: self.open.len(),
            waiting: self.waiting(),
            throttle: self.throttle,
            state: self.state,
        }
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    fn has_capacity(&self) -> bool {
        self.open.len() < self.throttle
    }

    /// Hands one message to the channel and records its tag.
    ///
    /// On refusal the message comes back so the caller can requeue it.
    fn dispatch(
        &mut self,
        sequence_id: SequenceId,
        message: OutboundMessage,
    ) -> Result<DeliveryTag, OutboundMessage> {
        match self.channel.publish_with_confirm(message) {
            Ok(tag) => {
                let expected = sequence_id.expected_tag();
                if tag != expected {
                    self.tag_mismatches += 1;
                    warn!(
                        sequence_id = %sequence_id,
                        expected = %expected,
                        actual = %tag,
                        "Channel tag out of step with sequence"
                    );
                    self.emit_error(&ThrottleError::TagMismatch {
                        sequence_id,
                        expected,
                        actual: tag,
                    });
                }

                // Track the channel's tag: that is what confirms will name.
                self.open.insert(tag, sequence_id);
                self.highest_dispatched = self.highest_dispatched.max(sequence_id);
                self.total_dispatched += 1;
                trace!(
                    sequence_id = %sequence_id,
                    tag = %tag,
                    open = self.open.len(),
                    "Dispatched"
                );
                Ok(tag)
            }
            Err(err) => {
                let (message, cause) = err.into_parts();
                self.dispatch_failures += 1;
                warn!(sequence_id = %sequence_id, error = %cause, "Dispatch refused, message kept");
                self.emit_error(&ThrottleError::from(cause));
                Err(message)
            }
        }
    }

    /// Removes confirmed tags and moves the frontier. Returns tags released.
    fn release(&mut self, tag: DeliveryTag, multiple: bool) -> usize {
        let released = if multiple {
            self.open.remove_through(tag)
        } else {
            usize::from(self.open.remove(tag))
        };

        if released == 0 {
            debug!(tag = %tag, multiple, "Confirm for unknown tag");
        }

        let frontier = self
            .open
            .oldest_sequence()
            .map_or(self.highest_dispatched, SequenceId::prev);
        self.last_confirmed = self.last_confirmed.max(frontier);
        released
    }

    /// Refills freed capacity from the queue, then checks for close.
    fn after_release(&mut self) {
        let mut sent = 0_usize;
        while self.has_capacity() {
            let Some(pending) = self.queue.pop_front() else {
                break;
            };
            match self.dispatch(pending.sequence_id, pending.message) {
                Ok(_) => sent += 1,
                Err(returned) => {
                    self.queue.requeue_front(pending.sequence_id, returned);
                    break;
                }
            }
        }
        if sent > 0 {
            trace!(sent, queued = self.queue.len(), open = self.open.len(), "Drained queue");
        }

        self.maybe_finish_close();
    }

    fn maybe_finish_close(&mut self) {
        if self.state != PublisherState::Closing || !self.queue.is_empty() || !self.open.is_empty()
        {
            return;
        }

        self.state = PublisherState::Closed;
        info!(
            published = self.total_published,
            nacked = self.total_nacked,
            "Drained, closing channel"
        );
        let closed = self.channel.close();
        if let Some(handle) = &self.close_handle {
            handle.follow(&closed);
        }
    }

    fn emit_error(&mut self, err: &ThrottleError) {
        if let Some(callback) = self.error_callback.as_mut() {
            callback(err);
        }
    }
}

impl<C: Channel + fmt::Debug> fmt::Debug for ThrottledPublisher<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThrottledPublisher")
            .field("channel", &self.channel)
            .field("state", &self.state)
            .field("throttle", &self.throttle)
            .field("next_id", &self.next_id)
            .field("last_confirmed", &self.last_confirmed)
            .field("queued", &self.queue.len())
            .field("open", &self.open.len())
            .finish_non_exhaustive()
    }
}

/// Statistics about a throttled publisher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThrottleStats {
    /// Publishes accepted.
    pub total_published: u64,
    /// Publishes rejected (closing or invalid).
    pub total_rejected: u64,
    /// Messages handed to the channel.
    pub total_dispatched: u64,
    /// Messages handed to the channel by `flush`.
    pub total_flushed: u64,
    /// Tags released by acks.
    pub total_acked: u64,
    /// Tags released by nacks.
    pub total_nacked: u64,
    /// Dispatches the channel refused.
    pub dispatch_failures: u64,
    /// Dispatches whose tag did not match the sequence id.
    pub tag_mismatches: u64,
    /// Messages currently queued.
    pub queued: usize,
    /// Bytes currently queued.
    pub queued_bytes: u64,
    /// Messages currently unconfirmed.
    pub unacknowledged: usize,
    /// Messages above the confirmed frontier.
    pub waiting: usize,
    /// Current throttle.
    pub throttle: usize,
    /// Current state.
    pub state: PublisherState,
}
