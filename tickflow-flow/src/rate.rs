//! Rate bucket: fractional-rate admission with exact accounting.
//!
//! The bucket accrues "volume" at rate `R` items per tick and releases
//! `floor(volume)` tokens per step. Volume is an exact rational, so a rate of
//! 1/3 releases exactly one token every three ticks forever, with no drift.
//!
//! To bound bursts after idle periods the volume is capped at one "rate
//! period" of capacity:
//!
//! ```text
//! maximum_volume = ceil(ceil(R) / R) * R
//! ```
//!
//! For `R <= 1` this is exactly one token; for `R = 2.5` it is five tokens
//! (two ticks' worth).

use tickflow_core::{Error, Rate, Ratio, Result, Tick, TokenId};

use crate::bucket::{hook, Bucket, Hook, StageContext};
use crate::record::{Observation, TickRecord};

const fn overflow(operation: &'static str) -> Error {
    Error::Overflow { operation }
}

/// Volume accumulator shared by the rate-limited bucket kinds.
#[derive(Debug, Clone, Default)]
pub struct RateState {
    /// Accrued, unspent volume. May go negative when a caller moves more
    /// than the allowance.
    volume: Ratio,

    /// Rate in effect since `last_tick`.
    last_rate: Option<Rate>,

    /// Tick of the last refill.
    last_tick: Option<Tick>,
}

impl RateState {
    /// Creates an empty accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Volume ceiling for `rate`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Overflow` if the ceiling does not fit.
    pub fn maximum_volume(rate: Rate) -> Result<Ratio> {
        let r = rate.per_tick();
        if r.is_zero() {
            return Ok(Ratio::ZERO);
        }
        Ratio::from_integer(r.ceil())
            .checked_div(r)
            .and_then(|periods| Ratio::from_integer(periods.ceil()).checked_mul(r))
            .ok_or(overflow("volume ceiling"))
    }

    /// Current volume.
    #[must_use]
    pub const fn volume(&self) -> Ratio {
        self.volume
    }

    /// Rate observed at the last refill.
    #[must_use]
    pub const fn last_rate(&self) -> Option<Rate> {
        self.last_rate
    }

    /// Accrues volume for the ticks elapsed since the last refill at the rate
    /// that was in effect, then adopts `rate` for the next interval.
    ///
    /// # Errors
    ///
    /// Returns `Error::Overflow` if the volume leaves the exact range.
    pub fn refill(&mut self, tick: Tick, rate: Rate) -> Result<()> {
        if let (Some(last_tick), Some(last_rate)) = (self.last_tick, self.last_rate) {
            let accrued = last_rate.volume_over(tick.saturating_sub(last_tick))?;
            self.volume = self
                .volume
                .checked_add(accrued)
                .ok_or(overflow("volume refill"))?;
        }
        self.volume = self.volume.min(Self::maximum_volume(rate)?);
        self.last_rate = Some(rate);
        self.last_tick = Some(tick);
        Ok(())
    }

    /// Whole tokens the current volume allows.
    #[must_use]
    pub fn allowance(&self) -> usize {
        usize::try_from(self.volume.floor().max(0)).unwrap_or(usize::MAX)
    }

    /// Spends volume on `count` moved tokens.
    ///
    /// # Errors
    ///
    /// Returns `Error::Overflow` if the volume leaves the exact range.
    pub fn debit(&mut self, count: usize) -> Result<()> {
        self.volume = self
            .volume
            .checked_sub(Ratio::from(count as u64))
            .ok_or(overflow("volume debit"))?;
        Ok(())
    }

    /// Soonest tick at which another step could make progress.
    ///
    /// - zero rate: never
    /// - empty and saturated: never
    /// - empty: when volume reaches the ceiling
    /// - at least one whole token of volume: the next tick
    /// - otherwise: when volume reaches one
    ///
    /// # Errors
    ///
    /// Returns `Error::Overflow` if the wait cannot be computed exactly.
    pub fn next_action(&self, tick: Tick, residents: usize) -> Result<Option<Tick>> {
        let Some(rate) = self.last_rate.filter(|r| !r.is_zero()) else {
            return Ok(None);
        };
        let target = if residents == 0 {
            let ceiling = Self::maximum_volume(rate)?;
            if self.volume >= ceiling {
                return Ok(None);
            }
            ceiling
        } else if self.volume >= Ratio::ONE {
            return Ok(Some(tick.saturating_add(1)));
        } else {
            Ratio::ONE
        };
        let shortfall = target
            .checked_sub(self.volume)
            .ok_or(overflow("volume shortfall"))?;
        Ok(rate
            .ticks_to_accumulate(shortfall)
            .map(|wait| tick.saturating_add(wait.max(1))))
    }

    /// Writes the accumulator fields into a tick record.
    pub fn observe(&self, record: &mut TickRecord) {
        record.set("volume", Observation::Ratio(self.volume));
        if let Some(rate) = self.last_rate {
            record.set("rate", Observation::Rate(rate));
        }
    }
}

/// Releases tokens at an exact rational rate.
#[derive(Default)]
pub struct RateBucket {
    rate: Option<Hook<Rate>>,
    state: RateState,
}

impl RateBucket {
    /// Creates a rate bucket with the given rate hook.
    #[must_use]
    pub fn new<F>(rate: F) -> Self
    where
        F: FnMut(&StageContext<'_>) -> Result<Rate> + 'static,
    {
        Self {
            rate: Some(hook(rate)),
            state: RateState::new(),
        }
    }

    /// Creates a bucket with a constant rate.
    #[must_use]
    pub fn fixed(rate: Rate) -> Self {
        Self::new(move |_| Ok(rate))
    }

    /// The volume accumulator.
    #[must_use]
    pub const fn state(&self) -> &RateState {
        &self.state
    }
}

impl Bucket for RateBucket {
    fn kind(&self) -> &'static str {
        "rate"
    }

    fn to_move(&mut self, ctx: &StageContext<'_>, record: &mut TickRecord) -> Result<Vec<TokenId>> {
        let rate = match self.rate.as_mut() {
            Some(f) => f(ctx)?,
            None => return Err(ctx.missing_hook("rate")),
        };
        self.state.refill(ctx.tick(), rate)?;

        let residents = ctx.stage().residents();
        let moving = residents.first_n(self.state.allowance().min(residents.len()));
        self.state.debit(moving.len())?;
        self.state.observe(record);
        Ok(moving)
    }

    fn next_action(&mut self, ctx: &StageContext<'_>) -> Result<Option<Tick>> {
        self.state.next_action(ctx.tick(), ctx.stage().len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{chain, next, step};

    fn rate(num: u64, den: u64) -> Rate {
        Rate::per_us(num, den).unwrap()
    }

    #[test]
    fn test_maximum_volume() {
        let ceiling = |r| RateState::maximum_volume(r).unwrap();
        assert_eq!(ceiling(rate(1, 3)), Ratio::ONE);
        assert_eq!(ceiling(rate(1, 1)), Ratio::ONE);
        assert_eq!(ceiling(rate(5, 2)), Ratio::from(5u64));
        assert_eq!(ceiling(rate(3, 1)), Ratio::from(3u64));
        assert_eq!(ceiling(Rate::ZERO), Ratio::ZERO);
    }

    #[test]
    fn test_one_token_every_three_ticks() {
        let ids: Vec<u64> = (0..10).collect();
        let stages = chain(&[("rate", ids.clone()), ("stop", vec![])]);
        let mut bucket = RateBucket::fixed(rate(1, 3));

        let (moved, _) = step(&mut bucket, &stages, 0, 0);
        assert!(moved.is_empty());
        assert_eq!(next(&mut bucket, &stages, 0, 0), Some(3));

        let (moved, _) = step(&mut bucket, &stages, 0, 3);
        assert_eq!(moved.len(), 1);
        assert_eq!(next(&mut bucket, &stages, 0, 3), Some(6));
    }

    #[test]
    fn test_idle_volume_is_capped() {
        let ids: Vec<u64> = (0..10).collect();
        let stages = chain(&[("rate", ids.clone()), ("stop", vec![])]);
        let mut bucket = RateBucket::fixed(rate(1, 3));

        step(&mut bucket, &stages, 0, 0);
        // A long idle gap banks at most one token.
        let (moved, record) = step(&mut bucket, &stages, 0, 1_000);
        assert_eq!(moved.len(), 1);
        assert_eq!(record.get("volume"), Some(&Observation::Ratio(Ratio::ZERO)));
    }

    #[test]
    fn test_fractional_rate_above_one() {
        let ids: Vec<u64> = (0..100).collect();
        let stages = chain(&[("rate", ids.clone()), ("stop", vec![])]);
        let mut bucket = RateBucket::fixed(rate(5, 2));

        step(&mut bucket, &stages, 0, 0);
        let (first, _) = step(&mut bucket, &stages, 0, 1);
        let (second, _) = step(&mut bucket, &stages, 0, 2);
        // 2.5 per tick: 2 then 3 (the half carries over).
        assert_eq!(first.len(), 2);
        assert_eq!(second.len(), 3);
    }

    #[test]
    fn test_empty_bucket_wakes_when_saturated() {
        let stages = chain(&[("rate", vec![]), ("stop", vec![])]);
        let mut bucket = RateBucket::fixed(rate(1, 4));

        step(&mut bucket, &stages, 0, 0);
        assert_eq!(next(&mut bucket, &stages, 0, 0), Some(4));

        step(&mut bucket, &stages, 0, 4);
        assert_eq!(next(&mut bucket, &stages, 0, 4), None);
    }

    #[test]
    fn test_zero_rate_never_schedules() {
        let stages = chain(&[("rate", vec![1, 2]), ("stop", vec![])]);
        let mut bucket = RateBucket::fixed(Rate::ZERO);

        let (moved, _) = step(&mut bucket, &stages, 0, 0);
        assert!(moved.is_empty());
        assert_eq!(next(&mut bucket, &stages, 0, 0), None);
    }

    #[test]
    fn test_rate_change_applies_to_next_interval() {
        let mut state = RateState::new();
        state.refill(0, rate(1, 10)).unwrap();
        // The first ten ticks accrue at 1/10, not at the new rate.
        state.refill(10, rate(1, 1)).unwrap();
        assert_eq!(state.volume(), Ratio::ONE);
        assert_eq!(state.last_rate(), Some(rate(1, 1)));
    }
}
