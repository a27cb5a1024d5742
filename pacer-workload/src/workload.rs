//! Workload generation and execution.
//!
//! A workload drives a `ThrottledPublisher` over a `SimulatedChannel` with a
//! seeded random mix of publishes, broker confirms, throttle changes, flushes
//! and channel errors, then closes the publisher and drains it. Every step is
//! recorded for verification. The same seed always produces the same run.

use std::cell::Cell;
use std::rc::Rc;

use bytes::Bytes;
use pacer_channel::{ChannelFaultConfig, Deferred, SimulatedChannel};
use pacer_core::{Envelope, OutboundMessage, PublishFlags};
use pacer_flow::{PublisherState, ThrottleError, ThrottledPublisher};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use crate::history::{CloseRecord, History, Snapshot};
use crate::operation::{OperationKind, OperationResult};
use crate::verification::{Verification, Violation};

/// Exchange every simulated publish targets.
const EXCHANGE: &str = "pacer.sim";

/// Routing key every simulated publish uses.
const ROUTING_KEY: &str = "load";

/// Upper bound on confirm/flush rounds while draining after close.
const MAX_DRAIN_ROUNDS: usize = 10_000;

/// Publisher type the workload drives.
type SimPublisher = ThrottledPublisher<SimulatedChannel>;

/// Error type for workload setup.
#[derive(Debug, thiserror::Error)]
pub enum WorkloadError {
    /// The workload configuration is unusable.
    #[error("invalid workload configuration: {message}")]
    InvalidConfig {
        /// Error message.
        message: String,
    },

    /// The publisher rejected its configuration.
    #[error(transparent)]
    Throttle(#[from] ThrottleError),
}

/// Result type for workload setup.
pub type WorkloadResult<T> = Result<T, WorkloadError>;

/// Distribution for message sizes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SizeDistribution {
    /// Fixed size for all messages.
    Fixed {
        /// Size in bytes.
        size: usize,
    },
    /// Uniform distribution between min and max (inclusive).
    Uniform {
        /// Minimum size.
        min: usize,
        /// Maximum size.
        max: usize,
    },
}

impl SizeDistribution {
    /// Samples a size from the distribution.
    #[must_use]
    pub fn sample<R: Rng>(&self, rng: &mut R) -> usize {
        match self {
            Self::Fixed { size } => *size,
            Self::Uniform { min, max } => rng.gen_range(*min..=*max),
        }
    }
}

impl Default for SizeDistribution {
    fn default() -> Self {
        Self::Uniform { min: 16, max: 256 }
    }
}

/// Relative weights of the randomly chosen operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperationMix {
    /// Application publishes.
    pub publish: u32,
    /// Broker acks.
    pub ack: u32,
    /// Broker nacks.
    pub nack: u32,
    /// Throttle changes.
    pub set_throttle: u32,
    /// Flushes.
    pub flush: u32,
    /// Channel errors.
    pub channel_error: u32,
}

impl OperationMix {
    /// Returns the sum of all weights.
    #[must_use]
    pub const fn total(&self) -> u32 {
        self.publish + self.ack + self.nack + self.set_throttle + self.flush + self.channel_error
    }
}

impl Default for OperationMix {
    fn default() -> Self {
        Self {
            publish: 50,
            ack: 35,
            nack: 5,
            set_throttle: 4,
            flush: 4,
            channel_error: 2,
        }
    }
}

/// Workload configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkloadConfig {
    /// Random seed for deterministic generation.
    pub seed: u64,
    /// Number of random operations before the final close and drain.
    pub operations: u64,
    /// Initial throttle.
    pub throttle: usize,
    /// Highest throttle a `SetThrottle` operation may pick.
    pub max_throttle: usize,
    /// Probability that a confirm is cumulative.
    pub multiple_ratio: f64,
    /// Probability that the channel refuses a publish.
    pub publish_fail_rate: f64,
    /// Offset between the channel's confirm tags and the publisher's ids.
    pub tag_skew: u64,
    /// Request close after this many operations; `None` closes at the end.
    pub close_after: Option<u64>,
    /// Message size distribution.
    pub message_size: SizeDistribution,
    /// Operation weights.
    pub mix: OperationMix,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            operations: 1_000,
            throttle: 8,
            max_throttle: 32,
            message_size: SizeDistribution::default(),
            mix: OperationMix::default(),
            multiple_ratio: 0.25,
            publish_fail_rate: 0.0,
            tag_skew: 0,
            close_after: None,
        }
    }
}

impl WorkloadConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if no operation has weight, a probability is
    /// out of range, or the size distribution is empty.
    pub fn validate(&self) -> WorkloadResult<()> {
        let invalid = |message: &str| {
            Err(WorkloadError::InvalidConfig {
                message: message.to_string(),
            })
        };

        if self.mix.total() == 0 {
            return invalid("operation mix has no weight");
        }
        if !(0.0..=1.0).contains(&self.multiple_ratio) {
            return invalid("multiple_ratio must be within 0.0..=1.0");
        }
        // A channel that refuses everything can never drain.
        if !(0.0..1.0).contains(&self.publish_fail_rate) {
            return invalid("publish_fail_rate must be within 0.0..1.0");
        }
        if let SizeDistribution::Uniform { min, max } = self.message_size {
            if min > max {
                return invalid("message_size min exceeds max");
            }
        }
        Ok(())
    }
}

/// Builder for creating workloads.
#[derive(Debug, Default)]
pub struct WorkloadBuilder {
    config: WorkloadConfig,
}

impl WorkloadBuilder {
    /// Creates a new workload builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from an existing configuration.
    #[must_use]
    pub const fn from_config(config: WorkloadConfig) -> Self {
        Self { config }
    }

    /// Sets the random seed.
    #[must_use]
    pub const fn seed(mut self, seed: u64) -> Self {
        self.config.seed = seed;
        self
    }

    /// Sets the number of operations.
    #[must_use]
    pub const fn operations(mut self, operations: u64) -> Self {
        self.config.operations = operations;
        self
    }

    /// Sets the initial throttle.
    #[must_use]
    pub const fn throttle(mut self, throttle: usize) -> Self {
        self.config.throttle = throttle;
        self
    }

    /// Sets the highest throttle a throttle change may pick.
    #[must_use]
    pub const fn max_throttle(mut self, max_throttle: usize) -> Self {
        self.config.max_throttle = max_throttle;
        self
    }

    /// Sets the message size distribution.
    #[must_use]
    pub fn message_size(mut self, size: SizeDistribution) -> Self {
        self.config.message_size = size;
        self
    }

    /// Sets the operation weights.
    #[must_use]
    pub fn mix(mut self, mix: OperationMix) -> Self {
        self.config.mix = mix;
        self
    }

    /// Sets the probability of channel publish failures.
    #[must_use]
    pub const fn publish_fail_rate(mut self, rate: f64) -> Self {
        self.config.publish_fail_rate = rate;
        self
    }

    /// Sets how far the channel's tags run ahead of the sequence ids.
    #[must_use]
    pub const fn tag_skew(mut self, skew: u64) -> Self {
        self.config.tag_skew = skew;
        self
    }

    /// Requests close after `operations` operations.
    #[must_use]
    pub const fn close_after(mut self, operations: u64) -> Self {
        self.config.close_after = Some(operations);
        self
    }

    /// Builds the workload.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration does not validate.
    pub fn build(self) -> WorkloadResult<Workload> {
        Workload::new(self.config)
    }
}

/// Outcome of a workload run.
#[derive(Debug, Clone)]
pub struct WorkloadStats {
    /// Seed the run used.
    pub seed: u64,
    /// Operations executed, drain included.
    pub operations_total: usize,
    /// Publishes accepted.
    pub publishes_accepted: u64,
    /// Publishes rejected.
    pub publishes_rejected: u64,
    /// Messages the channel accepted.
    pub dispatched: u64,
    /// Tags released by acks.
    pub acked: u64,
    /// Tags released by nacks.
    pub nacked: u64,
    /// Dispatches the channel refused.
    pub dispatch_failures: u64,
    /// Dispatches whose channel tag did not match the sequence id.
    pub tag_mismatches: u64,
    /// Errors delivered to the error callback.
    pub errors_reported: u64,
    /// Highest unacknowledged count seen.
    pub max_unacknowledged: usize,
    /// Whether the publisher reached `Closed`.
    pub closed: bool,
    /// Violations found.
    pub violations: Vec<Violation>,
}

impl WorkloadStats {
    /// Returns true if no violations were found.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Operation picked by weight before its parameters are drawn.
#[derive(Debug, Clone, Copy)]
enum Choice {
    Publish,
    Ack,
    Nack,
    SetThrottle,
    Flush,
    ChannelError,
}

/// A verifiable workload for testing.
pub struct Workload {
    config: WorkloadConfig,
    rng: ChaCha8Rng,
    history: History,
    /// Payload counter; makes every payload unique.
    sequence: u64,
    /// Close handle and the op that requested it.
    close: Option<(u64, Deferred)>,
}

impl Workload {
    /// Creates a new workload from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration does not validate.
    pub fn new(config: WorkloadConfig) -> WorkloadResult<Self> {
        config.validate()?;
        let rng = ChaCha8Rng::seed_from_u64(config.seed);
        Ok(Self {
            config,
            rng,
            history: History::new(),
            sequence: 0,
            close: None,
        })
    }

    /// Creates a workload builder.
    #[must_use]
    pub fn builder() -> WorkloadBuilder {
        WorkloadBuilder::new()
    }

    /// Returns the workload configuration.
    #[must_use]
    pub const fn config(&self) -> &WorkloadConfig {
        &self.config
    }

    /// Returns the history of the last run.
    #[must_use]
    pub const fn history(&self) -> &History {
        &self.history
    }

    /// Runs the workload and verifies the result.
    ///
    /// Each call starts over from the seed, so repeated runs are identical.
    pub fn run(&mut self) -> WorkloadStats {
        self.rng = ChaCha8Rng::seed_from_u64(self.config.seed);
        self.history = History::new();
        self.sequence = 0;
        self.close = None;

        info!(
            seed = self.config.seed,
            operations = self.config.operations,
            throttle = self.config.throttle,
            "Starting workload"
        );

        let faults = ChannelFaultConfig::none()
            .with_publish_fail_rate(self.config.publish_fail_rate)
            .with_tag_skew(self.config.tag_skew);
        let channel = SimulatedChannel::with_faults(self.config.seed, faults);
        let mut publisher = ThrottledPublisher::with_throttle(channel, self.config.throttle);

        let errors = Rc::new(Cell::new(0_u64));
        let counter = Rc::clone(&errors);
        publisher.on_error(move |_| counter.set(counter.get() + 1));

        let close_after = self.config.close_after.unwrap_or(self.config.operations);
        for index in 0..self.config.operations {
            if index == close_after {
                self.request_close(&mut publisher);
            }
            let kind = self.next_operation(&publisher);
            self.execute(&mut publisher, kind);
        }
        if self.close.is_none() {
            self.request_close(&mut publisher);
        }

        let closed = self.drain(&mut publisher);
        if !closed {
            warn!(
                seed = self.config.seed,
                queued = publisher.queued(),
                unacknowledged = publisher.unacknowledged(),
                "Publisher did not reach closed"
            );
        }

        self.finish(&publisher, errors.get());

        let violations = Verification::verify(&self.history);
        let stats = publisher.stats();
        info!(
            seed = self.config.seed,
            published = stats.total_published,
            nacked = stats.total_nacked,
            violations = violations.len(),
            "Workload finished"
        );

        WorkloadStats {
            seed: self.config.seed,
            operations_total: self.history.operations().len(),
            publishes_accepted: stats.total_published,
            publishes_rejected: stats.total_rejected,
            dispatched: stats.total_dispatched,
            acked: stats.total_acked,
            nacked: stats.total_nacked,
            dispatch_failures: stats.dispatch_failures,
            tag_mismatches: stats.tag_mismatches,
            errors_reported: self.history.errors_reported(),
            max_unacknowledged: self.history.max_unacknowledged(),
            closed,
            violations,
        }
    }

    /// Picks the next operation and draws its parameters.
    fn next_operation(&mut self, publisher: &SimPublisher) -> OperationKind {
        let choice = self.choose();
        match choice {
            Choice::Publish => self.publish_operation(),
            Choice::Ack | Choice::Nack => {
                let unconfirmed = publisher.channel().unconfirmed();
                let Some(&tag) = unconfirmed.choose(&mut self.rng) else {
                    // Nothing to confirm yet.
                    return self.publish_operation();
                };
                let multiple = self.rng.gen_bool(self.config.multiple_ratio);
                if matches!(choice, Choice::Ack) {
                    OperationKind::Ack { tag, multiple }
                } else {
                    OperationKind::Nack { tag, multiple }
                }
            }
            Choice::SetThrottle => OperationKind::SetThrottle {
                throttle: self.rng.gen_range(0..=self.config.max_throttle),
            },
            Choice::Flush => OperationKind::Flush {
                max: self.rng.gen_range(0..=4),
            },
            Choice::ChannelError => OperationKind::ChannelError,
        }
    }

    fn publish_operation(&mut self) -> OperationKind {
        OperationKind::Publish {
            size: self.config.message_size.sample(&mut self.rng),
        }
    }

    fn choose(&mut self) -> Choice {
        let mix = &self.config.mix;
        let mut roll = self.rng.gen_range(0..mix.total());
        let weighted = [
            (mix.publish, Choice::Publish),
            (mix.ack, Choice::Ack),
            (mix.nack, Choice::Nack),
            (mix.set_throttle, Choice::SetThrottle),
            (mix.flush, Choice::Flush),
            (mix.channel_error, Choice::ChannelError),
        ];
        for (weight, choice) in weighted {
            if roll < weight {
                return choice;
            }
            roll -= weight;
        }
        Choice::Publish
    }

    /// Executes one operation against the publisher and records it.
    fn execute(&mut self, publisher: &mut SimPublisher, kind: OperationKind) -> u64 {
        let before = Snapshot::capture(publisher);

        let result = match &kind {
            OperationKind::Publish { size } => {
                let payload = self.next_payload(*size);
                let message = OutboundMessage::new(
                    EXCHANGE,
                    ROUTING_KEY,
                    Envelope::new(payload.clone()),
                    PublishFlags::NONE,
                );
                match publisher.try_publish(message) {
                    Ok(admission) => {
                        self.history
                            .record_accepted(admission.sequence_id(), payload);
                        OperationResult::Published(admission)
                    }
                    Err(err) => OperationResult::Rejected(err),
                }
            }
            OperationKind::Ack { tag, multiple } => {
                if let Some(event) = publisher.channel_mut().confirm(*tag, *multiple, true) {
                    publisher.handle_event(event);
                }
                OperationResult::Applied
            }
            OperationKind::Nack { tag, multiple } => {
                if let Some(event) = publisher.channel_mut().confirm(*tag, *multiple, false) {
                    publisher.handle_event(event);
                }
                OperationResult::Applied
            }
            OperationKind::SetThrottle { throttle } => {
                publisher.set_throttle(*throttle);
                OperationResult::Applied
            }
            OperationKind::Flush { max } => OperationResult::Flushed {
                sent: publisher.flush(*max),
            },
            OperationKind::ChannelError => {
                let event = publisher.channel().raise_error("simulated channel error");
                publisher.handle_event(event);
                OperationResult::Applied
            }
            OperationKind::Close => {
                let handle = publisher.close();
                self.close = Some((self.history.operations().len() as u64, handle));
                OperationResult::Applied
            }
        };

        let after = Snapshot::capture(publisher);
        trace!(
            op = kind.label(),
            unacknowledged = after.stats.unacknowledged,
            queued = after.stats.queued,
            "Executed operation"
        );
        self.history.record(kind, result, before, after)
    }

    fn request_close(&mut self, publisher: &mut SimPublisher) {
        debug!(
            queued = publisher.queued(),
            unacknowledged = publisher.unacknowledged(),
            "Requesting close"
        );
        self.execute(publisher, OperationKind::Close);
    }

    /// Confirms and flushes until the publisher closes.
    ///
    /// Returns true if it reached `Closed`.
    fn drain(&mut self, publisher: &mut SimPublisher) -> bool {
        for _ in 0..MAX_DRAIN_ROUNDS {
            if publisher.state() == PublisherState::Closed {
                return true;
            }

            // Nothing in flight to confirm: push the queue out directly. This
            // covers a zero throttle and dispatches the channel refused.
            if publisher.unacknowledged() == 0 && publisher.queued() > 0 {
                self.execute(publisher, OperationKind::Flush { max: 0 });
                continue;
            }

            let Some(tag) = publisher.channel().unconfirmed().last().copied() else {
                break;
            };
            self.execute(
                publisher,
                OperationKind::Ack {
                    tag,
                    multiple: true,
                },
            );
        }
        publisher.state() == PublisherState::Closed
    }

    fn finish(&mut self, publisher: &SimPublisher, errors_reported: u64) {
        self.history.record_dispatched(publisher.channel().published());
        self.history.record_errors(errors_reported);
        self.history.record_final(Snapshot::capture(publisher));

        if let Some((requested_at, handle)) = &self.close {
            self.history.record_close(CloseRecord {
                requested_at: *requested_at,
                outcome: handle.outcome(),
                channel_close_calls: publisher.channel().close_calls(),
                final_state: publisher.state(),
            });
        }
    }

    /// Builds a unique payload of at least `size` bytes.
    fn next_payload(&mut self, size: usize) -> Bytes {
        let mut body = format!("{:016x}", self.sequence).into_bytes();
        self.sequence += 1;
        body.resize(size.max(body.len()), b'.');
        Bytes::from(body)
    }
}
