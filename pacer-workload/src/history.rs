//! History recording for workload verification.
//!
//! Records every operation with before/after snapshots of the publisher, the
//! payload of every accepted publish, and what the channel finally saw.

use bytes::Bytes;
use pacer_channel::{Channel, DeferredOutcome, PublishedMessage};
use pacer_core::SequenceId;
use pacer_flow::{PublisherState, ThrottleStats, ThrottledPublisher};

use crate::operation::{Operation, OperationKind, OperationResult};

/// Observable publisher state at one point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Publisher statistics.
    pub stats: ThrottleStats,
    /// Id the next publish would get.
    pub next_sequence_id: u64,
    /// Confirmed frontier.
    pub last_confirmed: u64,
}

impl Snapshot {
    /// Captures the current state of a publisher.
    #[must_use]
    pub fn capture<C: Channel>(publisher: &ThrottledPublisher<C>) -> Self {
        Self {
            stats: publisher.stats(),
            next_sequence_id: publisher.next_sequence_id().get(),
            last_confirmed: publisher.last_confirmed().get(),
        }
    }

    /// Returns the number of publishes accepted so far.
    #[must_use]
    pub const fn accepted(&self) -> u64 {
        self.next_sequence_id.saturating_sub(1)
    }
}

/// How the close went.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseRecord {
    /// Operation ID of the close request.
    pub requested_at: u64,
    /// Outcome of the close handle once the run finished.
    pub outcome: DeferredOutcome,
    /// Number of times the channel was closed.
    pub channel_close_calls: u32,
    /// Publisher state once the run finished.
    pub final_state: PublisherState,
}

/// Complete history of a workload run.
#[derive(Debug, Default)]
pub struct History {
    /// All operations in execution order.
    operations: Vec<Operation>,

    /// Accepted publishes in acceptance order.
    accepted: Vec<(SequenceId, Bytes)>,

    /// Everything the channel accepted, in dispatch order.
    dispatched: Vec<PublishedMessage>,

    /// Close record, once the run has closed.
    close: Option<CloseRecord>,

    /// Errors delivered to the error callback.
    errors_reported: u64,

    /// State after the final drain.
    final_snapshot: Option<Snapshot>,
}

impl History {
    /// Creates a new empty history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an executed operation and returns its ID.
    pub fn record(
        &mut self,
        kind: OperationKind,
        result: OperationResult,
        before: Snapshot,
        after: Snapshot,
    ) -> u64 {
        let id = self.operations.len() as u64;
        self.operations.push(Operation {
            id,
            kind,
            result,
            before,
            after,
        });
        id
    }

    /// Records the payload of an accepted publish.
    pub fn record_accepted(&mut self, sequence_id: SequenceId, payload: Bytes) {
        self.accepted.push((sequence_id, payload));
    }

    /// Records what the channel saw over the whole run.
    pub fn record_dispatched(&mut self, dispatched: &[PublishedMessage]) {
        self.dispatched = dispatched.to_vec();
    }

    /// Records how the close went.
    pub fn record_close(&mut self, close: CloseRecord) {
        self.close = Some(close);
    }

    /// Records the number of errors delivered to the callback.
    pub fn record_errors(&mut self, count: u64) {
        self.errors_reported = count;
    }

    /// Records the state after the final drain.
    pub fn record_final(&mut self, snapshot: Snapshot) {
        self.final_snapshot = Some(snapshot);
    }

    /// Returns all operations.
    #[must_use]
    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    /// Returns accepted publishes in order.
    #[must_use]
    pub fn accepted(&self) -> &[(SequenceId, Bytes)] {
        &self.accepted
    }

    /// Returns dispatched messages in order.
    #[must_use]
    pub fn dispatched(&self) -> &[PublishedMessage] {
        &self.dispatched
    }

    /// Returns the close record.
    #[must_use]
    pub const fn close(&self) -> Option<&CloseRecord> {
        self.close.as_ref()
    }

    /// Returns the number of errors delivered to the callback.
    #[must_use]
    pub const fn errors_reported(&self) -> u64 {
        self.errors_reported
    }

    /// Returns the state after the final drain.
    #[must_use]
    pub const fn final_snapshot(&self) -> Option<&Snapshot> {
        self.final_snapshot.as_ref()
    }

    /// Returns the number of operations of the given label.
    #[must_use]
    pub fn count(&self, label: &str) -> usize {
        self.operations
            .iter()
            .filter(|op| op.kind.label() == label)
            .count()
    }

    /// Returns the highest unacknowledged count seen after any operation.
    #[must_use]
    pub fn max_unacknowledged(&self) -> usize {
        self.operations
            .iter()
            .map(|op| op.after.stats.unacknowledged)
            .max()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use pacer_channel::SimulatedChannel;
    use pacer_core::PublishFlags;

    use super::*;

    #[test]
    fn test_record_assigns_sequential_ids() {
        let mut publisher = ThrottledPublisher::with_throttle(SimulatedChannel::new(1), 2);
        let mut history = History::new();

        let before = Snapshot::capture(&publisher);
        publisher.publish("ex", "rk", "a", PublishFlags::NONE);
        let after = Snapshot::capture(&publisher);

        let first = history.record(
            OperationKind::Publish { size: 1 },
            OperationResult::Applied,
            before.clone(),
            after.clone(),
        );
        let second = history.record(OperationKind::Close, OperationResult::Applied, before, after);

        assert_eq!(first, 0);
        assert_eq!(second, 1);
        assert_eq!(history.count("publish"), 1);
        assert_eq!(history.max_unacknowledged(), 1);
    }

    #[test]
    fn test_snapshot_accepted() {
        let mut publisher = ThrottledPublisher::with_throttle(SimulatedChannel::new(1), 0);
        publisher.publish("ex", "rk", "a", PublishFlags::NONE);
        publisher.publish("ex", "rk", "b", PublishFlags::NONE);

        let snapshot = Snapshot::capture(&publisher);
        assert_eq!(snapshot.accepted(), 2);
        assert_eq!(snapshot.stats.queued, 2);
        assert_eq!(snapshot.last_confirmed, 0);
    }
}
