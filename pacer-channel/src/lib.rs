//! The channel side of publisher confirms.
//!
//! This crate defines what a throttled publisher needs from the protocol
//! layer underneath it, without implementing that layer:
//!
//! - [`Channel`]: publish in confirm mode, learn the delivery tag, close.
//! - [`ConfirmEvent`]: ack / nack / error events from the broker.
//! - [`Deferred`]: resolve-once handle for operations that finish later.
//! - [`SimulatedChannel`]: deterministic in-memory channel with fault
//!   injection, used by tests and the simulator.
//!
//! # Testing
//!
//! ```
//! use pacer_channel::{Channel, ChannelFaultConfig, SimulatedChannel};
//! use pacer_core::{Envelope, OutboundMessage, PublishFlags};
//!
//! let mut channel = SimulatedChannel::with_faults(7, ChannelFaultConfig::none());
//! let message = OutboundMessage::new("orders", "eu", Envelope::from("{}"), PublishFlags::NONE);
//!
//! let tag = channel.publish_with_confirm(message).unwrap();
//! assert_eq!(tag.get(), 1);
//!
//! // Play the broker.
//! let event = channel.confirm(tag, false, true);
//! assert!(event.is_some());
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod channel;
mod deferred;
mod error;
mod event;
mod simulated;

pub use channel::Channel;
pub use deferred::{Deferred, DeferredOutcome};
pub use error::{ChannelError, DispatchError};
pub use event::ConfirmEvent;
pub use simulated::{ChannelFaultConfig, CloseBehavior, PublishedMessage, SimulatedChannel};
