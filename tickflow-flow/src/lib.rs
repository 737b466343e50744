//! Tick-driven bucket pipeline for flow-control simulation.
//!
//! This crate simulates IO tokens flowing through an ordered chain of buckets.
//! Simulated time only advances to ticks at which some bucket has work, so
//! long runs cost as many iterations as there are events. It includes:
//!
//! - **Bucket contract**: engine-owned [`Stage`] state plus a [`Bucket`]
//!   movement policy that sees the rest of the pipeline read-only.
//! - **Bucket kinds**: gate, dial, continue, stop, rate, sampling rate,
//!   threshold, and three capacity-constrained variants.
//! - **Pipeline**: builder, event loop, per-tick [`History`], and a
//!   per-token [`Tracer`].
//! - **AIMD sampling**: an adaptive rate policy for the sampling bucket.
//!
//! # Architecture
//!
//! ```text
//!  tokens ─▶ ┌────────┐    ┌────────┐    ┌────────┐    ┌────────┐
//!            │ Gate   │───▶│ Dial   │───▶│ Rate   │───▶│ Stop   │◀─┐
//!            └────────┘    └────────┘    └────────┘    └────────┘  │
//!                 ▲ reads sizes/counters of other stages      └────┘
//!                 └─────────────── (never reverse flow)
//! ```
//!
//! # Bucket kinds
//!
//! | Kind | Moves | Next action |
//! |------|-------|-------------|
//! | `GateBucket` | `min(wanted_move_size(), residents)` | never |
//! | `DialBucket` | residents admitted `latency()` ago | earliest eligible tick |
//! | `ContinueBucket` | everything | never |
//! | `StopBucket` | nothing (terminal sink) | never |
//! | `RateBucket` | `floor(volume)` at an exact rational rate | when volume allows |
//! | `SamplingRateBucket` | a probe, then the rate-limited batch | when the probe resolves |
//! | `ThresholdBucket` | everything once `threshold()` are resident | next tick at threshold |
//! | `CapacityBucket` and variants | `min(residents, slack)` | next tick with slack |
//!
//! # Determinism
//!
//! Resident sets iterate in ascending token id and rates are exact rationals,
//! so the same inputs always produce the same history.
//!
//! # Example
//!
//! ```rust
//! use tickflow_flow::{DialBucket, GateBucket, IoToken, Pipeline, StopBucket, StopReason};
//!
//! let mut pipeline = Pipeline::builder()
//!     .stage("gate", GateBucket::fixed(2))
//!     .stage("dial", DialBucket::fixed(5))
//!     .stage("stop", StopBucket)
//!     .build()
//!     .unwrap();
//!
//! let outcome = pipeline.run(IoToken::batch(10), None).unwrap();
//! assert_eq!(outcome.reason, StopReason::Completed);
//! assert_eq!(outcome.final_tick, 25);
//! ```

#![warn(missing_docs)]

pub mod aimd;
pub mod bucket;
pub mod capacity;
pub mod dial;
pub mod drain;
pub mod gate;
pub mod history;
pub mod pipeline;
pub mod rate;
pub mod record;
pub mod sampling;
pub mod threshold;
pub mod token;
pub mod tracer;

#[cfg(test)]
mod testing;

// Re-export main types for convenience.
pub use aimd::{AimdConfig, AimdSampling, AimdState, AimdStats};
pub use bucket::{constant, hook, Bucket, Hook, Stage, StageContext};
pub use capacity::{CapacityBucket, GlobalCapacityBucket, TargetCapacityBucket};
pub use dial::DialBucket;
pub use drain::{ContinueBucket, StopBucket};
pub use gate::GateBucket;
pub use history::{Column, History, HistoryRow};
pub use pipeline::{Pipeline, PipelineBuilder, RunOutcome, StopReason};
pub use rate::{RateBucket, RateState};
pub use record::{MoveSize, Observation, TickRecord};
pub use sampling::{SampleOutcome, SamplingPolicy, SamplingRateBucket, DEFAULT_RESOLVE_STAGES};
pub use threshold::ThresholdBucket;
pub use token::{IoToken, ResidentSet, Stamp, TokenStamps};
pub use tracer::{Tracer, TransitRow, Visit};
