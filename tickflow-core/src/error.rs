//! Error types for tickflow.
//!
//! The simulated world is deterministic, so every error here reflects a defect
//! in a policy or in pipeline assembly. Nothing is retried.

use crate::types::{Tick, TokenId};

/// The result type for tickflow operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while assembling or running a pipeline.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// A bucket needed a policy hook that was never supplied.
    #[error("bucket '{bucket}' has no '{hook}' hook")]
    MissingHook {
        /// The bucket that invoked the hook.
        bucket: String,
        /// The hook name.
        hook: &'static str,
    },

    /// The event loop computed a next tick that does not advance the clock.
    #[error("bucket '{bucket}' scheduled tick {next} at or before current tick {current}")]
    NonMonotonicTick {
        /// The tick being processed.
        current: Tick,
        /// The tick that was reported.
        next: Tick,
        /// The bucket that reported it.
        bucket: String,
    },

    /// A bucket name was looked up that is not part of the pipeline.
    #[error("bucket not found: {name}")]
    BucketNotFound {
        /// The requested name.
        name: String,
    },

    /// Two buckets in the same pipeline share a name.
    #[error("duplicate bucket name: {name}")]
    DuplicateBucket {
        /// The duplicated name.
        name: String,
    },

    /// A token was admitted to a bucket that already holds the same id.
    #[error("token {id} admitted twice to bucket '{bucket}'")]
    DuplicateToken {
        /// The token id.
        id: TokenId,
        /// The bucket that rejected it.
        bucket: String,
    },

    /// A pipeline was built without any bucket.
    #[error("pipeline has no buckets")]
    EmptyPipeline,

    /// A number could not be parsed as an exact rational.
    #[error("not an exact number: '{input}'")]
    InvalidRatio {
        /// The rejected input.
        input: String,
    },

    /// Exact arithmetic left the representable range.
    #[error("arithmetic overflow in {operation}")]
    Overflow {
        /// What was being computed.
        operation: &'static str,
    },

    /// A rate could not be represented exactly.
    #[error("invalid rate '{input}': {reason}")]
    InvalidRate {
        /// The rejected input.
        input: String,
        /// Why it was rejected.
        reason: &'static str,
    },
}
