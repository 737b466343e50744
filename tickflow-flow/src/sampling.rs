//! Sampling rate bucket: probe-then-adapt online rate control.
//!
//! The bucket keeps exactly one "sample" token in flight. When the sample is
//! observed to have reached a resolving stage (by default `completed` or
//! `consumed`), the policy's `adjust` hook runs with the sample's outcome and
//! may change the rate. A fresh sample is then dispatched ahead of the
//! rate-limited batch. Adjustments therefore happen at most once per observed
//! completion.

use tickflow_core::{Error, Rate, Result, Tick, TokenId};
use tracing::trace;

use crate::bucket::{Bucket, StageContext};
use crate::rate::RateState;
use crate::record::{Observation, TickRecord};

/// Stages whose arrival resolves a sample unless configured otherwise.
pub const DEFAULT_RESOLVE_STAGES: [&str; 2] = ["completed", "consumed"];

/// What happened to a resolved sample token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleOutcome {
    /// The sample token.
    pub token: TokenId,
    /// Tick at which it left the sampling bucket.
    pub dispatched_at: Tick,
    /// Tick at which it was first observed at a resolving stage.
    pub observed_at: Tick,
}

impl SampleOutcome {
    /// Ticks between dispatch and observed resolution.
    #[must_use]
    pub const fn latency(&self) -> Tick {
        self.observed_at.saturating_sub(self.dispatched_at)
    }
}

/// Policy hooks for a [`SamplingRateBucket`].
pub trait SamplingPolicy {
    /// The live rate.
    ///
    /// # Errors
    ///
    /// Propagates lookup failures.
    fn rate(&mut self, ctx: &StageContext<'_>) -> Result<Rate>;

    /// Recalibrates after a sample resolved. `outcome` is `None` on the very
    /// first call, before any sample was dispatched.
    ///
    /// # Errors
    ///
    /// Propagates lookup failures.
    fn adjust(&mut self, ctx: &StageContext<'_>, outcome: Option<&SampleOutcome>) -> Result<()>;
}

#[derive(Debug, Clone, Copy)]
struct Sample {
    token: TokenId,
    dispatched_at: Tick,
}

/// A rate bucket whose rate is recalibrated each time a probe resolves.
pub struct SamplingRateBucket {
    policy: Option<Box<dyn SamplingPolicy>>,
    state: RateState,
    resolve_stages: Vec<String>,
    sample: Option<Sample>,
    started: bool,
    awaiting_dispatch: bool,
    adjustments: u64,
}

impl Default for SamplingRateBucket {
    fn default() -> Self {
        Self {
            policy: None,
            state: RateState::new(),
            resolve_stages: DEFAULT_RESOLVE_STAGES.iter().map(|s| (*s).to_string()).collect(),
            sample: None,
            started: false,
            awaiting_dispatch: false,
            adjustments: 0,
        }
    }
}

impl SamplingRateBucket {
    /// Creates a sampling bucket driven by `policy`.
    #[must_use]
    pub fn new<P: SamplingPolicy + 'static>(policy: P) -> Self {
        Self {
            policy: Some(Box::new(policy)),
            ..Self::default()
        }
    }

    /// Overrides the stages whose arrival resolves a sample.
    #[must_use]
    pub fn with_resolve_stages<I, S>(mut self, stages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.resolve_stages = stages.into_iter().map(Into::into).collect();
        self
    }

    /// The sample currently in flight.
    #[must_use]
    pub fn outstanding_sample(&self) -> Option<TokenId> {
        self.sample.map(|s| s.token)
    }

    /// Number of times `adjust` has run.
    #[must_use]
    pub const fn adjustments(&self) -> u64 {
        self.adjustments
    }

    /// The volume accumulator.
    #[must_use]
    pub const fn state(&self) -> &RateState {
        &self.state
    }

    /// Earliest chain position that counts as resolved.
    fn resolve_boundary(&self, ctx: &StageContext<'_>) -> Result<usize> {
        self.resolve_stages
            .iter()
            .filter_map(|name| ctx.position(name).ok())
            .min()
            .ok_or_else(|| Error::BucketNotFound {
                name: self.resolve_stages.join("|"),
            })
    }

    /// Returns true if the outstanding sample reached or passed a resolving
    /// stage.
    fn sample_resolved(&self, ctx: &StageContext<'_>) -> Result<bool> {
        let Some(sample) = self.sample else {
            return Ok(false);
        };
        let boundary = self.resolve_boundary(ctx)?;
        Ok(ctx.locate(sample.token).is_some_and(|at| at >= boundary))
    }

    fn needs_adjust(&self, ctx: &StageContext<'_>) -> Result<bool> {
        if !self.started {
            return Ok(true);
        }
        self.sample_resolved(ctx)
    }
}

impl Bucket for SamplingRateBucket {
    fn kind(&self) -> &'static str {
        "sampling_rate"
    }

    fn to_move(&mut self, ctx: &StageContext<'_>, record: &mut TickRecord) -> Result<Vec<TokenId>> {
        if self.policy.is_none() {
            return Err(ctx.missing_hook("adjust"));
        }
        let tick = ctx.tick();

        let adjusted = self.needs_adjust(ctx)?;
        if adjusted {
            let outcome = self.sample.take().map(|s| SampleOutcome {
                token: s.token,
                dispatched_at: s.dispatched_at,
                observed_at: tick,
            });
            if let Some(policy) = self.policy.as_mut() {
                policy.adjust(ctx, outcome.as_ref())?;
            }
            self.started = true;
            self.awaiting_dispatch = true;
            self.adjustments += 1;
            trace!(
                bucket = ctx.name(),
                tick,
                latency = outcome.map(|o| o.latency()),
                "Sampling adjustment"
            );
        }

        let rate = match self.policy.as_mut() {
            Some(policy) => policy.rate(ctx)?,
            None => return Err(ctx.missing_hook("rate")),
        };
        self.state.refill(tick, rate)?;

        let residents = ctx.stage().residents();
        let mut moving = Vec::new();
        if self.awaiting_dispatch {
            if let Some(token) = residents.ids().next() {
                self.sample = Some(Sample {
                    token,
                    dispatched_at: tick,
                });
                self.awaiting_dispatch = false;
                moving.push(token);
            }
        }
        if !rate.is_zero() {
            let budget = self.state.allowance().saturating_sub(moving.len());
            let sample = self.outstanding_sample();
            moving.extend(
                residents
                    .ids()
                    .filter(|id| Some(*id) != sample)
                    .take(budget),
            );
        }
        self.state.debit(moving.len())?;

        self.state.observe(record);
        record.set("adjusted", Observation::Flag(adjusted));
        if let Some(sample) = self.sample {
            record.set("sample", Observation::Token(sample.token));
        }
        Ok(moving)
    }

    fn next_action(&mut self, ctx: &StageContext<'_>) -> Result<Option<Tick>> {
        let pending_dispatch = self.awaiting_dispatch && !ctx.stage().is_empty();
        if pending_dispatch || self.sample_resolved(ctx)? {
            return Ok(Some(ctx.next_tick()));
        }
        if self.state.last_rate().map_or(true, |r| r.is_zero()) {
            // Woken by the sample resolving, not by polling.
            return Ok(None);
        }
        self.state.next_action(ctx.tick(), ctx.stage().len())
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::testing::{chain, next, step};

    /// Records every adjustment and serves a fixed rate.
    struct Recording {
        rate: Rate,
        outcomes: Rc<RefCell<Vec<Option<SampleOutcome>>>>,
    }

    impl SamplingPolicy for Recording {
        fn rate(&mut self, _ctx: &StageContext<'_>) -> Result<Rate> {
            Ok(self.rate)
        }

        fn adjust(&mut self, _ctx: &StageContext<'_>, outcome: Option<&SampleOutcome>) -> Result<()> {
            self.outcomes.borrow_mut().push(outcome.copied());
            Ok(())
        }
    }

    fn recording(rate: Rate) -> (SamplingRateBucket, Rc<RefCell<Vec<Option<SampleOutcome>>>>) {
        let outcomes = Rc::new(RefCell::new(Vec::new()));
        let bucket = SamplingRateBucket::new(Recording {
            rate,
            outcomes: Rc::clone(&outcomes),
        });
        (bucket, outcomes)
    }

    #[test]
    fn test_first_step_adjusts_and_dispatches_sample() {
        let stages = chain(&[("sampler", vec![1, 2, 3]), ("completed", vec![]), ("stop", vec![])]);
        let (mut bucket, outcomes) = recording(Rate::per_us(1, 10).unwrap());

        let (ids, record) = step(&mut bucket, &stages, 0, 0);
        assert_eq!(ids, vec![1]);
        assert!(record.flag("adjusted"));
        assert_eq!(bucket.outstanding_sample(), Some(TokenId::new(1)));
        assert_eq!(*outcomes.borrow(), vec![None]);
    }

    #[test]
    fn test_zero_rate_waits_for_sample() {
        let stages = chain(&[("sampler", vec![2, 3]), ("completed", vec![]), ("stop", vec![1])]);
        let (mut bucket, _) = recording(Rate::ZERO);

        let (ids, _) = step(&mut bucket, &stages, 0, 0);
        assert_eq!(ids, vec![2]);

        // Sample 2 sits in "middle", upstream of "completed": nothing to do.
        let stages = chain(&[("sampler", vec![3]), ("middle", vec![2]), ("completed", vec![]), ("stop", vec![1])]);
        assert_eq!(next(&mut bucket, &stages, 0, 0), None);
        let (ids, record) = step(&mut bucket, &stages, 0, 5);
        assert!(ids.is_empty());
        assert!(!record.flag("adjusted"));
    }

    #[test]
    fn test_resolved_sample_triggers_adjust_with_outcome() {
        let stages = chain(&[("sampler", vec![1, 2, 3]), ("completed", vec![]), ("stop", vec![])]);
        let (mut bucket, outcomes) = recording(Rate::ZERO);
        step(&mut bucket, &stages, 0, 0);

        // Token 1 arrives at "completed" by tick 7.
        let stages = chain(&[("sampler", vec![2, 3]), ("completed", vec![1]), ("stop", vec![])]);
        assert_eq!(next(&mut bucket, &stages, 0, 7), Some(8));

        let (ids, record) = step(&mut bucket, &stages, 0, 8);
        assert_eq!(ids, vec![2]);
        assert!(record.flag("adjusted"));
        assert_eq!(bucket.adjustments(), 2);

        let last = outcomes.borrow().last().copied().flatten().unwrap();
        assert_eq!(last.token, TokenId::new(1));
        assert_eq!(last.latency(), 8);
    }

    #[test]
    fn test_sample_passing_resolve_stage_counts() {
        let stages = chain(&[("sampler", vec![1, 2]), ("consumed", vec![]), ("stop", vec![])]);
        let (mut bucket, _) = recording(Rate::ZERO);
        step(&mut bucket, &stages, 0, 0);

        // Already past "consumed" and into the sink.
        let stages = chain(&[("sampler", vec![2]), ("consumed", vec![]), ("stop", vec![1])]);
        let (ids, _) = step(&mut bucket, &stages, 0, 4);
        assert_eq!(ids, vec![2]);
    }

    #[test]
    fn test_rate_moves_batch_behind_sample() {
        let ids: Vec<u64> = (0..10).collect();
        let stages = chain(&[("sampler", ids.clone()), ("completed", vec![]), ("stop", vec![])]);
        let (mut bucket, _) = recording(Rate::per_us(1, 1).unwrap());

        let (first, _) = step(&mut bucket, &stages, 0, 0);
        assert_eq!(first, vec![0]);

        let stages = chain(&[("sampler", ids[1..].to_vec()), ("middle", vec![0]), ("completed", vec![]), ("stop", vec![])]);
        // The sample overdrew the volume by one; one tick later it is back to zero.
        let (second, _) = step(&mut bucket, &stages, 0, 1);
        assert!(second.is_empty());
        let (third, _) = step(&mut bucket, &stages, 0, 2);
        assert_eq!(third.len(), 1);
    }

    #[test]
    fn test_missing_resolve_stage_is_lookup_error() {
        let stages = chain(&[("sampler", vec![1]), ("stop", vec![])]);
        let (mut bucket, _) = recording(Rate::ZERO);
        step(&mut bucket, &stages, 0, 0);

        let ctx = StageContext::new(1, 0, &stages);
        let result = bucket.to_move(&ctx, &mut TickRecord::default());
        assert!(matches!(result, Err(Error::BucketNotFound { .. })));
    }

    #[test]
    fn test_without_policy_fails() {
        let stages = chain(&[("sampler", vec![1]), ("completed", vec![])]);
        let ctx = StageContext::new(0, 0, &stages);
        let result = SamplingRateBucket::default().to_move(&ctx, &mut TickRecord::default());
        assert!(matches!(result, Err(Error::MissingHook { .. })));
    }
}
