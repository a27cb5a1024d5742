//! Pacer Workload: seeded simulation of a throttled publisher.
//!
//! Drives a `ThrottledPublisher` over a `SimulatedChannel` with a random but
//! reproducible mix of publishes, confirms, throttle changes, flushes and
//! channel errors, records everything, and verifies the run afterwards:
//!
//! 1. **Ordering** - the channel sees messages in acceptance order
//! 2. **Capacity** - only `flush` pushes the in-flight count past the throttle
//! 3. **Conservation** - every accepted message is queued, in flight or released
//! 4. **Close** - the channel is closed exactly once, after the last confirm
//!
//! # Example
//!
//! ```
//! use pacer_workload::Workload;
//!
//! let mut workload = Workload::builder()
//!     .seed(42)
//!     .operations(100)
//!     .throttle(4)
//!     .build()
//!     .unwrap();
//!
//! let stats = workload.run();
//! assert!(stats.violations.is_empty());
//! assert!(stats.closed);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod history;
mod operation;
mod verification;
mod workload;

pub mod profiles;

pub use history::{CloseRecord, History, Snapshot};
pub use operation::{Operation, OperationKind, OperationResult};
pub use profiles::{list_profiles, load_profile, ProfileError, SimulationProfile};
pub use verification::{Verification, Violation};
pub use workload::{
    OperationMix, SizeDistribution, Workload, WorkloadBuilder, WorkloadConfig, WorkloadError,
    WorkloadResult, WorkloadStats,
};
