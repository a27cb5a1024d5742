//! Operation model for simulated workloads.
//!
//! One operation is one thing the outside world does to a publisher: the
//! application publishes, the broker confirms, an operator retunes the
//! throttle, and so on.

use pacer_core::DeliveryTag;
use pacer_flow::{Admission, ThrottleError};

use crate::history::Snapshot;

/// A single executed operation.
#[derive(Debug, Clone)]
pub struct Operation {
    /// Operation ID, in execution order.
    pub id: u64,
    /// What was done.
    pub kind: OperationKind,
    /// What came of it.
    pub result: OperationResult,
    /// Publisher state before the operation.
    pub before: Snapshot,
    /// Publisher state after the operation.
    pub after: Snapshot,
}

impl Operation {
    /// Returns true if the operation dispatched messages past the throttle
    /// on purpose.
    #[must_use]
    pub const fn bypasses_throttle(&self) -> bool {
        matches!(self.kind, OperationKind::Flush { .. })
    }
}

/// The type of operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationKind {
    /// The application publishes a message.
    Publish {
        /// Payload size in bytes.
        size: usize,
    },

    /// The broker acks.
    Ack {
        /// Confirmed tag.
        tag: DeliveryTag,
        /// Cumulative confirm.
        multiple: bool,
    },

    /// The broker nacks.
    Nack {
        /// Rejected tag.
        tag: DeliveryTag,
        /// Cumulative reject.
        multiple: bool,
    },

    /// The throttle is changed.
    SetThrottle {
        /// New throttle.
        throttle: usize,
    },

    /// The queue is flushed past the throttle.
    Flush {
        /// Maximum messages to send, zero for all.
        max: usize,
    },

    /// The channel raises an error.
    ChannelError,

    /// Close is requested.
    Close,
}

impl OperationKind {
    /// Returns a short label for logs and reports.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Publish { .. } => "publish",
            Self::Ack { .. } => "ack",
            Self::Nack { .. } => "nack",
            Self::SetThrottle { .. } => "set_throttle",
            Self::Flush { .. } => "flush",
            Self::ChannelError => "channel_error",
            Self::Close => "close",
        }
    }
}

/// Result of an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationResult {
    /// Publish accepted.
    Published(Admission),
    /// Publish rejected.
    Rejected(ThrottleError),
    /// Flush sent this many messages.
    Flushed {
        /// Messages sent.
        sent: usize,
    },
    /// Anything else that has no interesting return value.
    Applied,
}

impl OperationResult {
    /// Returns true if this is an accepted publish.
    #[must_use]
    pub const fn is_published(&self) -> bool {
        matches!(self, Self::Published(_))
    }
}
