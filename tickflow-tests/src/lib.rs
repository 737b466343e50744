//! Tickflow Tests - property checks over randomized pipelines.
//!
//! ## Test Organization
//!
//! **Support Modules**:
//! - `properties`: invariants checked against a run's history
//!   (`TokenConservation`, `MonotonicClock`, `InFlightBound`)
//! - `scenarios`: regression seeds and seeded pipeline generators
//!
//! **Randomized Tests** (`pipeline_tests`): every generated pipeline is run
//! and checked against every property; live pipelines must also complete.
//!
//! ## Naming Conventions
//!
//! - Randomized tests: `test_random_<property>`
//! - Unit tests: Inline in each crate under `#[cfg(test)]`

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod properties;
pub mod scenarios;

#[cfg(test)]
mod pipeline_tests;
