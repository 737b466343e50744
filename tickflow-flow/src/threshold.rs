//! Threshold bucket: batch release once occupancy reaches a threshold.

use tickflow_core::{Result, Tick, TokenId};

use crate::bucket::{hook, Bucket, Hook, StageContext};
use crate::record::{Observation, TickRecord};

/// Holds tokens until `threshold()` are resident, then releases all of them.
#[derive(Default)]
pub struct ThresholdBucket {
    threshold: Option<Hook<u64>>,
}

impl ThresholdBucket {
    /// Creates a threshold bucket with the given threshold hook.
    #[must_use]
    pub fn new<F>(threshold: F) -> Self
    where
        F: FnMut(&StageContext<'_>) -> Result<u64> + 'static,
    {
        Self {
            threshold: Some(hook(threshold)),
        }
    }

    /// Creates a bucket with a constant threshold.
    #[must_use]
    pub fn fixed(threshold: u64) -> Self {
        Self::new(move |_| Ok(threshold))
    }

    fn reached(&mut self, ctx: &StageContext<'_>) -> Result<(u64, bool)> {
        let threshold = match self.threshold.as_mut() {
            Some(f) => f(ctx)?,
            None => return Err(ctx.missing_hook("threshold")),
        };
        let residents = ctx.stage().len() as u64;
        Ok((threshold, residents > 0 && residents >= threshold))
    }
}

impl Bucket for ThresholdBucket {
    fn kind(&self) -> &'static str {
        "threshold"
    }

    fn to_move(&mut self, ctx: &StageContext<'_>, record: &mut TickRecord) -> Result<Vec<TokenId>> {
        let (threshold, reached) = self.reached(ctx)?;
        record.set("threshold", Observation::Count(threshold));
        record.set("released", Observation::Flag(reached));
        if !reached {
            return Ok(Vec::new());
        }
        Ok(ctx.stage().residents().ids().collect())
    }

    fn next_action(&mut self, ctx: &StageContext<'_>) -> Result<Option<Tick>> {
        let (_, reached) = self.reached(ctx)?;
        Ok(reached.then(|| ctx.next_tick()))
    }
}
