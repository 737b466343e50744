//! The bucket contract.
//!
//! A pipeline stage is split in two halves:
//!
//! - [`Stage`] is the state the engine owns: name, resident set, lifetime
//!   admission counter, current tick, and the per-tick record series.
//! - [`Bucket`] is the movement policy. Each tick the engine asks it which
//!   residents to move and when it next needs attention.
//!
//! Policies only ever see other stages through a read-only [`StageContext`],
//! so feedback between stages is expressed by reading sizes and counters,
//! never by mutating another stage.

use std::collections::BTreeMap;

use tickflow_core::{Error, Result, Tick, TokenId};

use crate::record::TickRecord;
use crate::token::{IoToken, ResidentSet, Stamp};

/// A policy hook evaluated against the current stage context.
pub type Hook<T> = Box<dyn FnMut(&StageContext<'_>) -> Result<T>>;

/// Boxes a closure as a [`Hook`].
pub fn hook<T, F>(f: F) -> Hook<T>
where
    F: FnMut(&StageContext<'_>) -> Result<T> + 'static,
{
    Box::new(f)
}

/// A hook that always returns `value`.
pub fn constant<T: Clone + 'static>(value: T) -> Hook<T> {
    Box::new(move |_| Ok(value.clone()))
}

/// Engine-owned state of one pipeline stage.
#[derive(Debug)]
pub struct Stage {
    name: String,
    residents: ResidentSet,
    target: usize,
    counter: u64,
    tick: Tick,
    stamp: Option<Stamp>,
    records: BTreeMap<Tick, TickRecord>,
}

impl Stage {
    pub(crate) fn new(name: String, target: usize, stamp: Option<Stamp>) -> Self {
        Self {
            name,
            residents: ResidentSet::new(),
            target,
            counter: 0,
            tick: 0,
            stamp,
            records: BTreeMap::new(),
        }
    }

    /// Returns the stage name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the resident set.
    #[must_use]
    pub const fn residents(&self) -> &ResidentSet {
        &self.residents
    }

    /// Number of resident tokens.
    #[must_use]
    pub fn len(&self) -> usize {
        self.residents.len()
    }

    /// Returns true if nothing is resident.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.residents.is_empty()
    }

    /// Returns true if `id` is resident.
    #[must_use]
    pub fn contains(&self, id: TokenId) -> bool {
        self.residents.contains(id)
    }

    /// Total tokens ever admitted. Never decremented.
    #[must_use]
    pub const fn counter(&self) -> u64 {
        self.counter
    }

    /// The tick most recently set by the pipeline.
    #[must_use]
    pub const fn tick(&self) -> Tick {
        self.tick
    }

    /// Index of the downstream stage. The terminal stage targets itself.
    #[must_use]
    pub const fn target_index(&self) -> usize {
        self.target
    }

    /// The per-tick record series.
    #[must_use]
    pub const fn records(&self) -> &BTreeMap<Tick, TickRecord> {
        &self.records
    }

    pub(crate) fn set_tick(&mut self, tick: Tick) {
        self.tick = tick;
    }

    pub(crate) fn take(&mut self, id: TokenId) -> Option<IoToken> {
        self.residents.remove(id)
    }

    /// Admits a token, stamping it and bumping the lifetime counter.
    ///
    /// Returns false if a token with the same id was already resident.
    pub(crate) fn admit(&mut self, mut token: IoToken, tick: Tick) -> bool {
        if let Some(stamp) = self.stamp {
            token.apply(stamp, tick);
        }
        let admitted = self.residents.insert(token).is_ok();
        if admitted {
            self.counter += 1;
        }
        admitted
    }

    pub(crate) fn record(&mut self, tick: Tick, record: TickRecord) {
        self.records.insert(tick, record);
    }

    pub(crate) fn take_records(&mut self) -> BTreeMap<Tick, TickRecord> {
        std::mem::take(&mut self.records)
    }
}

/// Read-only view of the pipeline from one stage's point of view.
#[derive(Debug, Clone, Copy)]
pub struct StageContext<'a> {
    tick: Tick,
    index: usize,
    stages: &'a [Stage],
}

impl<'a> StageContext<'a> {
    /// Creates a context for the stage at `index`.
    ///
    /// `index` must be a valid position in `stages`.
    #[must_use]
    pub const fn new(tick: Tick, index: usize, stages: &'a [Stage]) -> Self {
        Self {
            tick,
            index,
            stages,
        }
    }

    /// The current tick.
    #[must_use]
    pub const fn tick(&self) -> Tick {
        self.tick
    }

    /// Position of this stage in the chain.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    /// This stage.
    #[must_use]
    pub fn stage(&self) -> &'a Stage {
        &self.stages[self.index]
    }

    /// This stage's name.
    #[must_use]
    pub fn name(&self) -> &'a str {
        self.stage().name()
    }

    /// The downstream stage.
    #[must_use]
    pub fn target(&self) -> &'a Stage {
        &self.stages[self.stage().target_index()]
    }

    /// The terminal sink.
    #[must_use]
    pub fn terminal(&self) -> &'a Stage {
        &self.stages[self.stages.len() - 1]
    }

    /// Looks up a stage by name.
    ///
    /// # Errors
    ///
    /// Returns `Error::BucketNotFound` if no stage has that name.
    pub fn lookup(&self, name: &str) -> Result<&'a Stage> {
        self.position(name).map(|i| &self.stages[i])
    }

    /// Position of a named stage.
    ///
    /// # Errors
    ///
    /// Returns `Error::BucketNotFound` if no stage has that name.
    pub fn position(&self, name: &str) -> Result<usize> {
        self.stages
            .iter()
            .position(|s| s.name() == name)
            .ok_or_else(|| Error::BucketNotFound {
                name: name.to_string(),
            })
    }

    /// Position of the stage currently holding `id`.
    #[must_use]
    pub fn locate(&self, id: TokenId) -> Option<usize> {
        self.stages.iter().position(|s| s.contains(id))
    }

    /// The next tick.
    #[must_use]
    pub const fn next_tick(&self) -> Tick {
        self.tick.saturating_add(1)
    }

    /// Error for a hook this stage needed but was never given.
    #[must_use]
    pub fn missing_hook(&self, hook: &'static str) -> Error {
        Error::MissingHook {
            bucket: self.name().to_string(),
            hook,
        }
    }
}

/// A bucket movement policy.
///
/// Implementations decide which residents leave each tick and when the
/// bucket next needs to run. The engine performs the actual transfer.
pub trait Bucket {
    /// Short name of the bucket kind, used in logs.
    fn kind(&self) -> &'static str;

    /// Returns the residents to move to the target this tick.
    ///
    /// Implementations may write policy-specific fields into `record`.
    ///
    /// # Errors
    ///
    /// The default fails with `Error::MissingHook`: a bucket kind that
    /// moves tokens must override it.
    fn to_move(&mut self, ctx: &StageContext<'_>, _record: &mut TickRecord) -> Result<Vec<TokenId>> {
        Err(ctx.missing_hook("to_move"))
    }

    /// Soonest tick at which this bucket needs to run again, or `None` for
    /// never. Called after every bucket has stepped.
    ///
    /// # Errors
    ///
    /// Propagates hook failures.
    fn next_action(&mut self, _ctx: &StageContext<'_>) -> Result<Option<Tick>> {
        Ok(None)
    }

    /// Called when a token is admitted, before it joins the resident set.
    ///
    /// # Errors
    ///
    /// Propagates hook failures.
    fn on_admit(&mut self, _ctx: &StageContext<'_>, _token: &mut IoToken) -> Result<()> {
        Ok(())
    }

    /// Called after a token has left the resident set.
    fn on_remove(&mut self, _ctx: &StageContext<'_>, _token: &IoToken) {}
}
