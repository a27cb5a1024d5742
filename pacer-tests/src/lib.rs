//! Pacer Tests - scenario and deterministic simulation tests.
//!
//! ## Test Organization
//!
//! **DST Tests** (`*_dst.rs`): seeded simulation with fault injection
//! - `publisher_dst`: random publish/confirm/retune/close runs, verified
//!
//! **Scenario Tests** (`*_tests.rs`): hand-written sequences with exact
//! expectations
//! - `publisher_tests`: admission, drain, flush, nack and close behaviour
//!
//! **Support Modules**:
//! - `scenarios`: seeds, channel setups and a publisher harness
//!
//! ## Naming Conventions
//!
//! - DST tests: `test_dst_<component>_<scenario>`
//! - Scenario tests: `test_<component>_<scenario>`
//! - Unit tests: Inline in each crate under `#[cfg(test)]`

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod scenarios;

#[cfg(test)]
mod publisher_dst;

#[cfg(test)]
mod publisher_tests;
