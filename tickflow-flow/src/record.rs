//! Per-tick observations recorded by each bucket.

use std::collections::BTreeMap;

use serde::Serialize;
use tickflow_core::{Rate, Ratio, Tick, TokenId};

/// A requested move count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveSize {
    /// Move at most this many tokens.
    Limited(u64),
    /// Move every resident token.
    Unbounded,
}

impl MoveSize {
    /// Clamps the request to `available` tokens.
    #[must_use]
    pub fn clamp_to(self, available: usize) -> usize {
        match self {
            Self::Limited(n) => usize::try_from(n).map_or(available, |n| n.min(available)),
            Self::Unbounded => available,
        }
    }

    /// Returns true if the request asks for more than `available` tokens.
    #[must_use]
    pub fn exceeds(self, available: usize) -> bool {
        match self {
            Self::Limited(n) => usize::try_from(n).map_or(true, |n| n > available),
            Self::Unbounded => false,
        }
    }
}

/// A stage-specific observed value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Observation {
    /// A count.
    Count(u64),
    /// A boolean flag.
    Flag(bool),
    /// An exact fractional value.
    Ratio(Ratio),
    /// A rate.
    Rate(Rate),
    /// A tick.
    Tick(Tick),
    /// A token reference.
    Token(TokenId),
}

/// What one bucket observed during one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickRecord {
    /// Tokens moved to the target bucket.
    pub moved: u64,

    /// Tokens the policy asked to move, when the policy expresses a request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wanted: Option<MoveSize>,

    /// Resident tokens after the move.
    pub size: u64,

    /// Policy-specific fields.
    #[serde(flatten)]
    pub fields: BTreeMap<&'static str, Observation>,
}

impl TickRecord {
    /// Sets a policy-specific field.
    pub fn set(&mut self, key: &'static str, value: Observation) {
        self.fields.insert(key, value);
    }

    /// Returns a policy-specific field.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Observation> {
        self.fields.get(key)
    }

    /// Returns a flag field, treating a missing field as false.
    #[must_use]
    pub fn flag(&self, key: &str) -> bool {
        matches!(self.get(key), Some(Observation::Flag(true)))
    }
}
