//! Confirm-driven flow control for AMQP publishing.
//!
//! A broker with publisher confirms tells the client, message by message,
//! when it has taken responsibility for what was published. This crate uses
//! those confirms as a credit signal: at most `throttle` messages are ever
//! unconfirmed on the channel, and everything beyond that waits in order.
//!
//! - **`PendingQueue`**: accepted messages waiting for capacity, FIFO.
//! - **`OpenTagSet`**: delivery tags dispatched and not yet confirmed.
//! - **`ThrottledPublisher`**: admission, drain on confirm, flush, close.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                        ThrottledPublisher                         │
//! │                                                                   │
//! │  ┌──────────────┐   drain   ┌─────────────┐   publish   ┌───────┐ │
//! │  │ PendingQueue │──────────▶│  dispatch   │────────────▶│Channel│ │
//! │  └──────────────┘           └─────────────┘             └───────┘ │
//! │         ▲                          │ tag                     │    │
//! │         │ capacity           ┌─────▼──────┐  ack / nack      │    │
//! │         └────────────────────│ OpenTagSet │◀─────────────────┘    │
//! │                              └────────────┘                       │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Threading
//!
//! Everything runs on the thread that owns the channel. Confirm events are
//! fed in with [`ThrottledPublisher::handle_event`] (or `on_ack`/`on_nack`);
//! none of the operations block.
//!
//! # Example
//!
//! ```rust
//! use pacer_channel::SimulatedChannel;
//! use pacer_core::PublishFlags;
//! use pacer_flow::{ThrottleConfig, ThrottledPublisher};
//!
//! let channel = SimulatedChannel::new(7);
//! let mut publisher = ThrottledPublisher::new(channel, ThrottleConfig::with_throttle(2)).unwrap();
//!
//! for body in ["a", "b", "c"] {
//!     assert!(publisher.publish("orders", "eu", body, PublishFlags::NONE));
//! }
//! assert_eq!(publisher.unacknowledged(), 2);
//! assert_eq!(publisher.queued(), 1);
//!
//! // The broker confirms everything sent so far; the queued message goes out.
//! let event = publisher.channel_mut().confirm_all().unwrap();
//! publisher.handle_event(event);
//! assert_eq!(publisher.unacknowledged(), 1);
//! assert_eq!(publisher.queued(), 0);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod open_tags;
pub mod pending_queue;
pub mod publisher;

pub use config::ThrottleConfig;
pub use error::{ThrottleError, ThrottleResult};
pub use open_tags::OpenTagSet;
pub use pending_queue::{PendingMessage, PendingQueue};
pub use publisher::{
    Admission, ErrorCallback, NackCallback, PublisherState, ThrottleStats, ThrottledPublisher,
};
