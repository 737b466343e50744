//! Dial bucket: fixed residency latency per token.

use std::collections::BTreeMap;

use tickflow_core::{Result, Tick, TokenId};

use crate::bucket::{hook, Bucket, Hook, StageContext};
use crate::record::{Observation, TickRecord};
use crate::token::IoToken;

/// Holds every token for `latency()` ticks after admission.
///
/// Models fixed-latency stages such as submission overhead or device
/// completion time. A token admitted at tick `t` becomes movable at exactly
/// `t + latency` and not before.
#[derive(Default)]
pub struct DialBucket {
    latency: Option<Hook<Tick>>,
    eligible: BTreeMap<TokenId, Tick>,
}

impl DialBucket {
    /// Creates a dial with the given latency hook.
    #[must_use]
    pub fn new<F>(latency: F) -> Self
    where
        F: FnMut(&StageContext<'_>) -> Result<Tick> + 'static,
    {
        Self {
            latency: Some(hook(latency)),
            eligible: BTreeMap::new(),
        }
    }

    /// Creates a dial with a constant latency.
    #[must_use]
    pub fn fixed(latency: Tick) -> Self {
        Self::new(move |_| Ok(latency))
    }

    /// The tick at which a resident becomes movable.
    #[must_use]
    pub fn eligible_at(&self, id: TokenId) -> Option<Tick> {
        self.eligible.get(&id).copied()
    }
}

impl Bucket for DialBucket {
    fn kind(&self) -> &'static str {
        "dial"
    }

    fn to_move(&mut self, ctx: &StageContext<'_>, record: &mut TickRecord) -> Result<Vec<TokenId>> {
        let now = ctx.tick();
        let ready: Vec<TokenId> = self
            .eligible
            .iter()
            .filter(|(_, at)| **at <= now)
            .map(|(id, _)| *id)
            .collect();
        record.set("pending", Observation::Count((self.eligible.len() - ready.len()) as u64));
        Ok(ready)
    }

    fn next_action(&mut self, _ctx: &StageContext<'_>) -> Result<Option<Tick>> {
        Ok(self.eligible.values().copied().min())
    }

    fn on_admit(&mut self, ctx: &StageContext<'_>, token: &mut IoToken) -> Result<()> {
        let latency = match self.latency.as_mut() {
            Some(f) => f(ctx)?,
            None => return Err(ctx.missing_hook("latency")),
        };
        self.eligible
            .insert(token.id(), ctx.tick().saturating_add(latency));
        Ok(())
    }

    fn on_remove(&mut self, _ctx: &StageContext<'_>, token: &IoToken) {
        self.eligible.remove(&token.id());
    }
}
