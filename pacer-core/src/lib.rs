//! Pacer Core - Typed identifiers, message model and limits for Pacer.
//!
//! This crate holds the vocabulary shared by the channel abstraction and the
//! throttled publisher. It knows nothing about channels, queues or confirms.
//!
//! # Design Principles
//!
//! - **Strongly-typed IDs**: a `SequenceId` is never confused with a `DeliveryTag`
//! - **Explicit limits**: every message is checked against bounded sizes
//! - **Explicit types**: use u32/u64 for wire-facing quantities
//! - **No unsafe code**

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;
mod limits;
mod message;
mod types;

pub use error::{Error, Result};
pub use limits::{Limits, SHORT_STRING_MAX_BYTES};
pub use message::{DeliveryMode, Envelope, OutboundMessage, PublishFlags};
pub use types::{DeliveryTag, SequenceId};
