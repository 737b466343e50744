//! Invariants checked against the history of a pipeline run.
//!
//! Each check walks every visited tick and reports all violations it finds
//! rather than stopping at the first one.

use std::fmt;

use tickflow_core::Tick;
use tickflow_flow::{History, RunOutcome};

/// A property violation found in a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyViolation {
    /// The total resident count at a tick differs from the seeded count.
    TokensNotConserved {
        /// The tick.
        tick: Tick,
        /// Tokens seeded.
        expected: u64,
        /// Tokens resident across all buckets.
        actual: u64,
    },
    /// A visited tick is not later than the one before it.
    NonMonotonicTick {
        /// The earlier tick.
        previous: Tick,
        /// The tick that followed it.
        next: Tick,
    },
    /// More tokens sit between a global-capacity bucket and the sink than
    /// its bound allows.
    CapacityExceeded {
        /// The tick.
        tick: Tick,
        /// The global-capacity bucket.
        bucket: String,
        /// Tokens in flight after the tick.
        in_flight: u64,
        /// The bucket's bound.
        bound: u64,
    },
    /// A bucket named in a check is not part of the history.
    UnknownBucket {
        /// The missing name.
        bucket: String,
    },
}

impl fmt::Display for PropertyViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TokensNotConserved {
                tick,
                expected,
                actual,
            } => write!(
                f,
                "TokenConservation violated at tick {tick}: {actual} resident, {expected} seeded"
            ),
            Self::NonMonotonicTick { previous, next } => {
                write!(f, "MonotonicClock violated: tick {next} followed {previous}")
            }
            Self::CapacityExceeded {
                tick,
                bucket,
                in_flight,
                bound,
            } => write!(
                f,
                "InFlightBound violated at tick {tick}: '{bucket}' allows {bound}, found {in_flight}"
            ),
            Self::UnknownBucket { bucket } => write!(f, "bucket '{bucket}' is not in the history"),
        }
    }
}

/// Checks run histories against the pipeline invariants.
#[derive(Debug, Clone, Default)]
pub struct PropertyChecker {
    capacity_bounds: Vec<(String, u64)>,
}

impl PropertyChecker {
    /// Creates a checker with no capacity bounds registered.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a global-capacity bucket whose in-flight bound `check_all`
    /// should verify.
    #[must_use]
    pub fn with_capacity_bound(mut self, bucket: &str, bound: u64) -> Self {
        self.capacity_bounds.push((bucket.to_string(), bound));
        self
    }

    /// Every visited tick accounts for all `total` tokens.
    #[must_use]
    pub fn check_conservation(history: &History, total: u64) -> Vec<PropertyViolation> {
        history
            .ticks()
            .iter()
            .filter_map(|&tick| {
                let actual = history.total_size_at(tick);
                (actual != total).then_some(PropertyViolation::TokensNotConserved {
                    tick,
                    expected: total,
                    actual,
                })
            })
            .collect()
    }

    /// Visited ticks strictly increase.
    #[must_use]
    pub fn check_monotonic_clock(history: &History) -> Vec<PropertyViolation> {
        history
            .ticks()
            .windows(2)
            .filter(|pair| pair[0] >= pair[1])
            .map(|pair| PropertyViolation::NonMonotonicTick {
                previous: pair[0],
                next: pair[1],
            })
            .collect()
    }

    /// Tokens resident strictly between `bucket` and the sink never exceed
    /// `bound` after any tick.
    #[must_use]
    pub fn check_global_capacity(
        history: &History,
        bucket: &str,
        bound: u64,
    ) -> Vec<PropertyViolation> {
        let names: Vec<&str> = history.names().collect();
        let Some(position) = names.iter().position(|n| *n == bucket) else {
            return vec![PropertyViolation::UnknownBucket {
                bucket: bucket.to_string(),
            }];
        };
        let downstream = &names[position + 1..names.len().saturating_sub(1).max(position + 1)];

        history
            .ticks()
            .iter()
            .filter_map(|&tick| {
                let in_flight: u64 = downstream
                    .iter()
                    .filter_map(|name| history.record(name, tick))
                    .map(|r| r.size)
                    .sum();
                (in_flight > bound).then(|| PropertyViolation::CapacityExceeded {
                    tick,
                    bucket: bucket.to_string(),
                    in_flight,
                    bound,
                })
            })
            .collect()
    }

    /// Runs every check against a finished run of a fresh pipeline.
    #[must_use]
    pub fn check_all(&self, outcome: &RunOutcome) -> Vec<PropertyViolation> {
        let history = &outcome.history;
        let mut violations = Self::check_conservation(history, outcome.tokens);
        violations.extend(Self::check_monotonic_clock(history));
        for (bucket, bound) in &self.capacity_bounds {
            violations.extend(Self::check_global_capacity(history, bucket, *bound));
        }
        violations
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use tickflow_flow::{Column, TickRecord};

    use super::*;

    fn column(name: &str, sizes: &[(Tick, u64)]) -> Column {
        let records: BTreeMap<Tick, TickRecord> = sizes
            .iter()
            .map(|&(tick, size)| {
                (
                    tick,
                    TickRecord {
                        size,
                        ..TickRecord::default()
                    },
                )
            })
            .collect();
        Column {
            name: name.to_string(),
            records,
        }
    }

    #[test]
    fn test_conservation_detects_loss() {
        let history = History::new(
            vec![
                column("source", &[(0, 3), (1, 1)]),
                column("sink", &[(0, 1), (1, 1)]),
            ],
            vec![0, 1],
        );
        let violations = PropertyChecker::check_conservation(&history, 4);
        assert_eq!(
            violations,
            vec![PropertyViolation::TokensNotConserved {
                tick: 1,
                expected: 4,
                actual: 2,
            }]
        );
    }

    #[test]
    fn test_monotonic_clock() {
        let good = History::new(vec![], vec![0, 3, 9]);
        assert!(PropertyChecker::check_monotonic_clock(&good).is_empty());

        let bad = History::new(vec![], vec![0, 3, 3]);
        let violations = PropertyChecker::check_monotonic_clock(&bad);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].to_string().contains("tick 3 followed 3"));
    }

    #[test]
    fn test_global_capacity_counts_only_stages_before_sink() {
        let history = History::new(
            vec![
                column("submit", &[(0, 5)]),
                column("queue", &[(0, 2)]),
                column("device", &[(0, 2)]),
                column("sink", &[(0, 9)]),
            ],
            vec![0],
        );
        assert!(PropertyChecker::check_global_capacity(&history, "submit", 4).is_empty());

        let violations = PropertyChecker::check_global_capacity(&history, "submit", 3);
        assert_eq!(
            violations,
            vec![PropertyViolation::CapacityExceeded {
                tick: 0,
                bucket: "submit".to_string(),
                in_flight: 4,
                bound: 3,
            }]
        );
    }

    #[test]
    fn test_global_capacity_unknown_bucket() {
        let history = History::new(vec![column("sink", &[(0, 1)])], vec![0]);
        let violations = PropertyChecker::check_global_capacity(&history, "missing", 1);
        assert!(matches!(violations[0], PropertyViolation::UnknownBucket { .. }));
    }
}
