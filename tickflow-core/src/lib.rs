//! Tickflow Core - identifiers, exact arithmetic, and errors for tickflow.
//!
//! This crate provides the value types shared by every tickflow crate. It does
//! NOT provide buckets or the pipeline engine - those live in `tickflow-flow`.
//!
//! # Design Principles
//!
//! - **Exact arithmetic**: rates and fractional volumes are rationals, never
//!   floats, so long runs do not drift
//! - **Strongly-typed IDs**: a `TokenId` cannot be confused with a tick count
//! - **One tick is one microsecond**: every rate is normalized to items per tick
//! - **No unsafe code**

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;
mod rate;
mod ratio;
mod types;

pub use error::{Error, Result};
pub use rate::{Rate, RateUnit};
pub use ratio::Ratio;
pub use types::{Tick, TokenId, TICKS_PER_MS, TICKS_PER_SEC};
