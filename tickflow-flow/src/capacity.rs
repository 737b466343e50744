//! Capacity-constrained buckets.
//!
//! Each kind admits up to `slack` residents per step, where slack measures the
//! room left somewhere else in the pipeline:
//!
//! | Kind                     | Slack                                                   |
//! |--------------------------|---------------------------------------------------------|
//! | [`CapacityBucket`]       | `slack()` directly                                      |
//! | [`TargetCapacityBucket`] | `target_capacity() - target residents`                  |
//! | [`GlobalCapacityBucket`] | `max_buffers() - (target counter - terminal residents)` |
//!
//! All three saturate at zero and ask to run on the next tick only while they
//! have both slack and residents.

use tickflow_core::{Result, Tick, TokenId};

use crate::bucket::{hook, Bucket, Hook, StageContext};
use crate::record::{MoveSize, Observation, TickRecord};

/// Moves `min(residents, slack)` tokens and records the request.
fn release(ctx: &StageContext<'_>, slack: u64, record: &mut TickRecord) -> Vec<TokenId> {
    let residents = ctx.stage().residents();
    let wanted = MoveSize::Limited(slack);
    record.wanted = Some(wanted);
    record.set("slack", Observation::Count(slack));
    residents.first_n(wanted.clamp_to(residents.len()))
}

fn schedule(ctx: &StageContext<'_>, slack: u64) -> Option<Tick> {
    (slack > 0 && !ctx.stage().is_empty()).then(|| ctx.next_tick())
}

/// Evaluates a hook, mapping an absent hook to a configuration error.
fn eval(hook: &mut Option<Hook<u64>>, ctx: &StageContext<'_>, name: &'static str) -> Result<u64> {
    match hook.as_mut() {
        Some(f) => f(ctx),
        None => Err(ctx.missing_hook(name)),
    }
}

/// Moves as many residents as a policy-supplied slack allows.
#[derive(Default)]
pub struct CapacityBucket {
    slack: Option<Hook<u64>>,
}

impl CapacityBucket {
    /// Creates a capacity bucket with the given slack hook.
    #[must_use]
    pub fn new<F>(slack: F) -> Self
    where
        F: FnMut(&StageContext<'_>) -> Result<u64> + 'static,
    {
        Self {
            slack: Some(hook(slack)),
        }
    }
}

impl Bucket for CapacityBucket {
    fn kind(&self) -> &'static str {
        "capacity"
    }

    fn to_move(&mut self, ctx: &StageContext<'_>, record: &mut TickRecord) -> Result<Vec<TokenId>> {
        let slack = eval(&mut self.slack, ctx, "slack")?;
        Ok(release(ctx, slack, record))
    }

    fn next_action(&mut self, ctx: &StageContext<'_>) -> Result<Option<Tick>> {
        let slack = eval(&mut self.slack, ctx, "slack")?;
        Ok(schedule(ctx, slack))
    }
}

/// Keeps the downstream bucket filled up to a target occupancy.
#[derive(Default)]
pub struct TargetCapacityBucket {
    target_capacity: Option<Hook<u64>>,
}

impl TargetCapacityBucket {
    /// Creates a bucket with the given target-capacity hook.
    #[must_use]
    pub fn new<F>(target_capacity: F) -> Self
    where
        F: FnMut(&StageContext<'_>) -> Result<u64> + 'static,
    {
        Self {
            target_capacity: Some(hook(target_capacity)),
        }
    }

    /// Creates a bucket with a constant target capacity.
    #[must_use]
    pub fn fixed(capacity: u64) -> Self {
        Self::new(move |_| Ok(capacity))
    }

    fn slack(&mut self, ctx: &StageContext<'_>) -> Result<u64> {
        let capacity = eval(&mut self.target_capacity, ctx, "target_capacity")?;
        Ok(capacity.saturating_sub(ctx.target().len() as u64))
    }
}

impl Bucket for TargetCapacityBucket {
    fn kind(&self) -> &'static str {
        "target_capacity"
    }

    fn to_move(&mut self, ctx: &StageContext<'_>, record: &mut TickRecord) -> Result<Vec<TokenId>> {
        let slack = self.slack(ctx)?;
        Ok(release(ctx, slack, record))
    }

    fn next_action(&mut self, ctx: &StageContext<'_>) -> Result<Option<Tick>> {
        let slack = self.slack(ctx)?;
        Ok(schedule(ctx, slack))
    }
}

/// Bounds the number of tokens in flight between this bucket and the sink.
///
/// In-flight is measured as everything ever admitted downstream that has not
/// yet reached the terminal bucket, so the bound holds across any number of
/// intermediate stages.
#[derive(Default)]
pub struct GlobalCapacityBucket {
    max_buffers: Option<Hook<u64>>,
}

impl GlobalCapacityBucket {
    /// Creates a bucket with the given in-flight bound hook.
    #[must_use]
    pub fn new<F>(max_buffers: F) -> Self
    where
        F: FnMut(&StageContext<'_>) -> Result<u64> + 'static,
    {
        Self {
            max_buffers: Some(hook(max_buffers)),
        }
    }

    /// Creates a bucket with a constant in-flight bound.
    #[must_use]
    pub fn fixed(max_buffers: u64) -> Self {
        Self::new(move |_| Ok(max_buffers))
    }

    fn slack(&mut self, ctx: &StageContext<'_>) -> Result<u64> {
        let max_buffers = eval(&mut self.max_buffers, ctx, "max_buffers")?;
        let in_flight = ctx
            .target()
            .counter()
            .saturating_sub(ctx.terminal().len() as u64);
        Ok(max_buffers.saturating_sub(in_flight))
    }
}

impl Bucket for GlobalCapacityBucket {
    fn kind(&self) -> &'static str {
        "global_capacity"
    }

    fn to_move(&mut self, ctx: &StageContext<'_>, record: &mut TickRecord) -> Result<Vec<TokenId>> {
        let slack = self.slack(ctx)?;
        Ok(release(ctx, slack, record))
    }

    fn next_action(&mut self, ctx: &StageContext<'_>) -> Result<Option<Tick>> {
        let slack = self.slack(ctx)?;
        Ok(schedule(ctx, slack))
    }
}
