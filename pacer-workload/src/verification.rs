//! Verification logic for detecting correctness violations.
//!
//! Checks a recorded run against the publisher's guarantees:
//! - Dispatch order (channel sees accepted messages in acceptance order)
//! - Sequence gaps (accepted ids are 1, 2, 3, ... with no holes)
//! - Capacity (admission and drain never exceed the throttle)
//! - Accounting (every accepted message is queued, in flight, or released)
//! - Frontier (the confirmed frontier never moves backwards or past dispatch)
//! - Close (resolved, channel closed exactly once, nothing accepted after)
//! - Lost messages (everything accepted was eventually dispatched)

use std::fmt;

use pacer_channel::DeferredOutcome;
use pacer_core::SequenceId;
use pacer_flow::PublisherState;

use crate::history::History;

/// A violation of an expected property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// The channel saw messages in a different order than they were accepted.
    OutOfOrderDispatch {
        /// Dispatch position (zero-based).
        position: usize,
        /// Sequence id that should have been dispatched there.
        expected: SequenceId,
    },

    /// The channel saw more messages than were accepted.
    DuplicateDispatch {
        /// Messages accepted.
        accepted: usize,
        /// Messages dispatched.
        dispatched: usize,
    },

    /// Accepted sequence ids are not contiguous.
    SequenceGap {
        /// Expected id.
        expected: SequenceId,
        /// Id actually assigned.
        actual: SequenceId,
    },

    /// An admission or drain left more messages in flight than the throttle.
    CapacityExceeded {
        /// Operation ID.
        op_id: u64,
        /// Unacknowledged count after the operation.
        unacknowledged: usize,
        /// Throttle at the time.
        throttle: usize,
    },

    /// Counters do not add up.
    AccountingMismatch {
        /// Operation ID, or `None` for the final state.
        op_id: Option<u64>,
        /// What did not add up.
        detail: String,
    },

    /// The confirmed frontier moved backwards or past what was dispatched.
    FrontierViolation {
        /// Operation ID.
        op_id: u64,
        /// Frontier before.
        before: u64,
        /// Frontier after.
        after: u64,
    },

    /// A publish was accepted after close was requested.
    PublishAcceptedAfterClose {
        /// Operation ID.
        op_id: u64,
    },

    /// Close was requested but never completed.
    CloseNotResolved {
        /// Close handle outcome.
        outcome: DeferredOutcome,
        /// Final publisher state.
        state: PublisherState,
    },

    /// The channel was closed more than once, or never.
    ChannelCloseCount {
        /// Number of close calls.
        calls: u32,
    },

    /// An accepted message never reached the channel.
    LostMessage {
        /// Sequence id of the message.
        sequence_id: SequenceId,
    },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfOrderDispatch { position, expected } => {
                write!(f, "Out-of-order dispatch: position {position} should carry {expected}")
            }
            Self::DuplicateDispatch {
                accepted,
                dispatched,
            } => {
                write!(
                    f,
                    "Duplicate dispatch: {dispatched} messages dispatched for {accepted} accepted"
                )
            }
            Self::SequenceGap { expected, actual } => {
                write!(f, "Sequence gap: expected {expected}, got {actual}")
            }
            Self::CapacityExceeded {
                op_id,
                unacknowledged,
                throttle,
            } => {
                write!(
                    f,
                    "Capacity exceeded: op={op_id} left {unacknowledged} unacknowledged with throttle {throttle}"
                )
            }
            Self::AccountingMismatch { op_id, detail } => match op_id {
                Some(op_id) => write!(f, "Accounting mismatch: op={op_id} {detail}"),
                None => write!(f, "Accounting mismatch at end of run: {detail}"),
            },
            Self::FrontierViolation {
                op_id,
                before,
                after,
            } => {
                write!(f, "Frontier violation: op={op_id} moved from {before} to {after}")
            }
            Self::PublishAcceptedAfterClose { op_id } => {
                write!(f, "Publish accepted after close: op={op_id}")
            }
            Self::CloseNotResolved { outcome, state } => {
                write!(f, "Close not resolved: handle {outcome:?}, publisher {state}")
            }
            Self::ChannelCloseCount { calls } => {
                write!(f, "Channel closed {calls} times, expected once")
            }
            Self::LostMessage { sequence_id } => {
                write!(f, "Lost message: {sequence_id} accepted but never dispatched")
            }
        }
    }
}

/// Verification runner that checks all properties.
pub struct Verification;

impl Verification {
    /// Runs all verification checks against a history.
    #[must_use]
    pub fn verify(history: &History) -> Vec<Violation> {
        let mut violations = Vec::new();

        violations.extend(Self::check_dispatch_order(history));
        violations.extend(Self::check_sequence(history));
        violations.extend(Self::check_capacity(history));
        violations.extend(Self::check_accounting(history));
        violations.extend(Self::check_frontier(history));
        violations.extend(Self::check_close(history));
        violations.extend(Self::check_lost_messages(history));

        violations
    }

    /// Checks that the channel saw accepted messages in acceptance order.
    ///
    /// Payloads are unique per publish, so comparing them position by
    /// position catches reordering and skipped messages alike.
    #[must_use]
    pub fn check_dispatch_order(history: &History) -> Vec<Violation> {
        let accepted = history.accepted();
        let dispatched = history.dispatched();

        if dispatched.len() > accepted.len() {
            return vec![Violation::DuplicateDispatch {
                accepted: accepted.len(),
                dispatched: dispatched.len(),
            }];
        }

        dispatched
            .iter()
            .zip(accepted)
            .enumerate()
            .find(|(_, (sent, (_, payload)))| sent.message.envelope().body() != payload)
            .map(|(position, (_, (expected, _)))| Violation::OutOfOrderDispatch {
                position,
                expected: *expected,
            })
            .into_iter()
            .collect()
    }

    /// Checks that accepted ids run 1, 2, 3, ... without holes.
    #[must_use]
    pub fn check_sequence(history: &History) -> Vec<Violation> {
        let mut violations = Vec::new();
        let mut expected = SequenceId::FIRST;

        for (actual, _) in history.accepted() {
            if *actual != expected {
                violations.push(Violation::SequenceGap {
                    expected,
                    actual: *actual,
                });
            }
            expected = actual.next();
        }

        violations
    }

    /// Checks that nothing but a flush grows the in-flight count past the
    /// throttle.
    ///
    /// Lowering the throttle leaves messages in flight above it; that is
    /// allowed, so only operations that grew the count are checked.
    #[must_use]
    pub fn check_capacity(history: &History) -> Vec<Violation> {
        history
            .operations()
            .iter()
            .filter(|op| !op.bypasses_throttle())
            .filter(|op| {
                let after = &op.after.stats;
                after.unacknowledged > op.before.stats.unacknowledged
                    && after.unacknowledged > after.throttle
            })
            .map(|op| Violation::CapacityExceeded {
                op_id: op.id,
                unacknowledged: op.after.stats.unacknowledged,
                throttle: op.after.stats.throttle,
            })
            .collect()
    }

    /// Checks conservation after every operation and at the end.
    ///
    /// - accepted = dispatched + queued
    /// - dispatched = unacknowledged + acked + nacked
    /// - waiting >= unacknowledged + queued
    #[must_use]
    pub fn check_accounting(history: &History) -> Vec<Violation> {
        let mut violations = Vec::new();

        let snapshots = history
            .operations()
            .iter()
            .map(|op| (Some(op.id), &op.after))
            .chain(history.final_snapshot().map(|snapshot| (None, snapshot)));

        for (op_id, snapshot) in snapshots {
            let stats = &snapshot.stats;
            let queued = stats.queued as u64;
            let unacked = stats.unacknowledged as u64;

            if stats.total_published != snapshot.accepted() {
                violations.push(Violation::AccountingMismatch {
                    op_id,
                    detail: format!(
                        "published {} but next id is {}",
                        stats.total_published, snapshot.next_sequence_id
                    ),
                });
            }
            if stats.total_published != stats.total_dispatched + queued {
                violations.push(Violation::AccountingMismatch {
                    op_id,
                    detail: format!(
                        "published {} != dispatched {} + queued {queued}",
                        stats.total_published, stats.total_dispatched
                    ),
                });
            }
            if stats.total_dispatched != unacked + stats.total_acked + stats.total_nacked {
                violations.push(Violation::AccountingMismatch {
                    op_id,
                    detail: format!(
                        "dispatched {} != unacknowledged {unacked} + acked {} + nacked {}",
                        stats.total_dispatched, stats.total_acked, stats.total_nacked
                    ),
                });
            }
            if stats.waiting < stats.unacknowledged + stats.queued {
                violations.push(Violation::AccountingMismatch {
                    op_id,
                    detail: format!(
                        "waiting {} < unacknowledged {unacked} + queued {queued}",
                        stats.waiting
                    ),
                });
            }
        }

        violations
    }

    /// Checks that the frontier never moves backwards or past dispatch.
    #[must_use]
    pub fn check_frontier(history: &History) -> Vec<Violation> {
        history
            .operations()
            .iter()
            .filter(|op| {
                op.after.last_confirmed < op.before.last_confirmed
                    || op.after.last_confirmed > op.after.stats.total_dispatched
            })
            .map(|op| Violation::FrontierViolation {
                op_id: op.id,
                before: op.before.last_confirmed,
                after: op.after.last_confirmed,
            })
            .collect()
    }

    /// Checks the close protocol.
    #[must_use]
    pub fn check_close(history: &History) -> Vec<Violation> {
        let Some(close) = history.close() else {
            return Vec::new();
        };
        let mut violations = Vec::new();

        violations.extend(
            history
                .operations()
                .iter()
                .filter(|op| op.id > close.requested_at && op.result.is_published())
                .map(|op| Violation::PublishAcceptedAfterClose { op_id: op.id }),
        );

        if close.outcome != DeferredOutcome::Succeeded
            || close.final_state != PublisherState::Closed
        {
            violations.push(Violation::CloseNotResolved {
                outcome: close.outcome.clone(),
                state: close.final_state,
            });
        }

        if close.channel_close_calls != 1 {
            violations.push(Violation::ChannelCloseCount {
                calls: close.channel_close_calls,
            });
        }

        violations
    }

    /// Checks that every accepted message reached the channel.
    ///
    /// Only meaningful once the run has drained, so it is skipped when the
    /// run never closed.
    #[must_use]
    pub fn check_lost_messages(history: &History) -> Vec<Violation> {
        if history.close().is_none() {
            return Vec::new();
        }

        history
            .accepted()
            .iter()
            .skip(history.dispatched().len())
            .map(|(sequence_id, _)| Violation::LostMessage {
                sequence_id: *sequence_id,
            })
            .collect()
    }
}
