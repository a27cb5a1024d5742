//! FIFO buffer of accepted but not yet dispatched messages.
//!
//! Messages enter at the tail in sequence-id order and leave from the head.
//! The only way back in at the head is [`PendingQueue::requeue_front`], used
//! when the channel refuses a dispatch and hands the message back; the head
//! is then the same message it was before, so ordering is preserved.

use std::collections::VecDeque;

use pacer_core::{OutboundMessage, SequenceId};

/// A queued message with its locally assigned id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMessage {
    /// The id assigned at publish time.
    pub sequence_id: SequenceId,
    /// The message to dispatch.
    pub message: OutboundMessage,
}

/// Ordered queue of messages waiting for capacity.
#[derive(Debug, Default)]
pub struct PendingQueue {
    /// Queued messages, lowest id at the front.
    queue: VecDeque<PendingMessage>,
    /// Total bytes held (see `OutboundMessage::size_bytes`).
    bytes: u64,
}

impl PendingQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a message at the tail.
    ///
    /// Returns the zero-based position the message landed at.
    ///
    /// # Panics
    ///
    /// Panics (debug builds) if `sequence_id` is not above the current tail.
    pub fn push_back(&mut self, sequence_id: SequenceId, message: OutboundMessage) -> usize {
        debug_assert!(
            self.queue
                .back()
                .map_or(true, |tail| tail.sequence_id < sequence_id),
            "sequence ids must be enqueued in increasing order"
        );
        self.bytes += message.size_bytes();
        self.queue.push_back(PendingMessage {
            sequence_id,
            message,
        });
        self.queue.len() - 1
    }

    /// Removes and returns the head.
    pub fn pop_front(&mut self) -> Option<PendingMessage> {
        let pending = self.queue.pop_front()?;
        self.bytes -= pending.message.size_bytes();
        Some(pending)
    }

    /// Puts a message back at the head after a refused dispatch.
    ///
    /// # Panics
    ///
    /// Panics (debug builds) if `sequence_id` is not below the current head.
    pub fn requeue_front(&mut self, sequence_id: SequenceId, message: OutboundMessage) {
        debug_assert!(
            self.queue
                .front()
                .map_or(true, |head| sequence_id < head.sequence_id),
            "requeued message must precede the head"
        );
        self.bytes += message.size_bytes();
        self.queue.push_front(PendingMessage {
            sequence_id,
            message,
        });
    }

    /// Returns the number of queued messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Returns true if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Returns the bytes currently held.
    #[must_use]
    pub const fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Iterates queued messages head first.
    pub fn iter(&self) -> impl Iterator<Item = &PendingMessage> {
        self.queue.iter()
    }
}
