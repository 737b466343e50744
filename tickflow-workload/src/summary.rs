//! Running a profile and summarizing the result.

use std::fmt;

use serde::Serialize;
use tickflow_core::Tick;
use tickflow_flow::{Pipeline, RunOutcome, StopReason, TransitRow};

use crate::profiles::{ProfileError, ScenarioProfile};

/// Final state of one bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BucketSummary {
    /// Bucket name.
    pub name: String,
    /// Policy kind.
    pub kind: &'static str,
    /// Tokens ever admitted.
    pub admitted: u64,
    /// Tokens resident at the end of the run.
    pub resident: u64,
    /// Ticks at which the bucket moved anything.
    pub activations: u64,
}

/// What a scenario run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// Profile name.
    pub profile: String,
    /// Why the run stopped.
    pub reason: StopReason,
    /// Last tick processed.
    pub final_tick: Tick,
    /// Number of ticks visited.
    pub ticks_visited: u64,
    /// Tokens submitted.
    pub tokens: u64,
    /// Tokens that reached the sink.
    pub delivered: u64,
    /// Per-bucket final state.
    pub buckets: Vec<BucketSummary>,
    /// Transitions of traced tokens.
    pub transit: Vec<TransitRow>,
}

impl RunSummary {
    /// Summarizes a finished run.
    #[must_use]
    pub fn new(profile: &str, pipeline: &Pipeline, outcome: &RunOutcome) -> Self {
        let buckets = pipeline
            .stages()
            .iter()
            .map(|stage| BucketSummary {
                name: stage.name().to_string(),
                kind: pipeline.kind(stage.name()).unwrap_or("unknown"),
                admitted: stage.counter(),
                resident: stage.len() as u64,
                activations: outcome.history.activations(stage.name()).len() as u64,
            })
            .collect();
        Self {
            profile: profile.to_string(),
            reason: outcome.reason,
            final_tick: outcome.final_tick,
            ticks_visited: outcome.history.ticks().len() as u64,
            tokens: outcome.tokens,
            delivered: outcome.delivered,
            buckets,
            transit: pipeline.tracer().transit_table(),
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "profile:      {}", self.profile)?;
        writeln!(f, "stop reason:  {:?}", self.reason)?;
        writeln!(f, "final tick:   {}us", self.final_tick)?;
        writeln!(f, "ticks:        {}", self.ticks_visited)?;
        writeln!(f, "delivered:    {}/{}", self.delivered, self.tokens)?;
        writeln!(f)?;
        writeln!(
            f,
            "{:<16} {:<16} {:>10} {:>10} {:>12}",
            "bucket", "kind", "admitted", "resident", "activations"
        )?;
        for b in &self.buckets {
            writeln!(
                f,
                "{:<16} {:<16} {:>10} {:>10} {:>12}",
                b.name, b.kind, b.admitted, b.resident, b.activations
            )?;
        }
        if !self.transit.is_empty() {
            writeln!(f)?;
            writeln!(f, "{:<10} {:<16} {:<16} {:>10}", "token", "from", "to", "ticks")?;
            for row in &self.transit {
                writeln!(
                    f,
                    "{:<10} {:<16} {:<16} {:>10}",
                    row.token.to_string(),
                    row.from,
                    row.to,
                    row.duration
                )?;
            }
        }
        Ok(())
    }
}

/// A profile run: the pipeline in its final state plus the outcome.
#[derive(Debug)]
pub struct ScenarioRun {
    /// The pipeline after the run.
    pub pipeline: Pipeline,
    /// The run outcome.
    pub outcome: RunOutcome,
}

impl ScenarioRun {
    /// Summarizes the run.
    #[must_use]
    pub fn summary(&self, profile: &str) -> RunSummary {
        RunSummary::new(profile, &self.pipeline, &self.outcome)
    }
}

/// Builds and runs a profile.
///
/// # Errors
///
/// Returns an error if the profile is invalid or the run fails.
pub fn run_profile(profile: &ScenarioProfile) -> Result<ScenarioRun, ProfileError> {
    let mut pipeline = profile.build_pipeline()?;
    let outcome = pipeline.run(profile.tokens(), profile.duration)?;
    Ok(ScenarioRun { pipeline, outcome })
}
