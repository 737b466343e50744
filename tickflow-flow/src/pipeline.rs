//! The pipeline: an ordered chain of buckets and the event loop that drives
//! them.
//!
//! # Event loop
//!
//! ```text
//!   seed first bucket with every token
//!   loop:
//!     set every bucket's tick
//!     step every bucket in chain order      (to_move, transfer, record)
//!     terminal holds every token?           -> Completed
//!     next = min(next_action of every bucket)
//!     no bucket needs a tick?               -> Stalled
//!     next <= tick?                         -> NonMonotonicTick error
//!     next > duration?                      -> DurationElapsed
//!     tick = next
//! ```
//!
//! Only ticks at which some bucket asked to run are visited, so a run over
//! hours of simulated time costs as many iterations as there are events.

use serde::Serialize;
use tickflow_core::{Error, Result, Tick, TokenId};
use tracing::{debug, info, trace, warn};

use crate::bucket::{Bucket, Stage, StageContext};
use crate::history::{Column, History};
use crate::record::TickRecord;
use crate::token::{IoToken, Stamp};
use crate::tracer::Tracer;

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Every token reached the terminal bucket.
    Completed,
    /// The next event lay beyond the requested duration.
    DurationElapsed,
    /// No bucket asked for another tick.
    Stalled,
}

/// The result of one [`Pipeline::run`].
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Why the run stopped.
    pub reason: StopReason,
    /// The last tick processed.
    pub final_tick: Tick,
    /// Tokens submitted to the run.
    pub tokens: u64,
    /// Tokens in the terminal bucket when the run stopped.
    pub delivered: u64,
    /// Every bucket's per-tick records.
    pub history: History,
}

impl RunOutcome {
    /// Returns true if every token reached the terminal bucket.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        matches!(self.reason, StopReason::Completed)
    }
}

/// Builds a [`Pipeline`] from ordered `(name, bucket)` pairs.
///
/// Each bucket targets the one added after it; the last one is the terminal
/// sink and targets itself.
#[derive(Default)]
pub struct PipelineBuilder {
    entries: Vec<(String, Box<dyn Bucket>, Option<Stamp>)>,
}

impl PipelineBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a bucket.
    #[must_use]
    pub fn stage<B: Bucket + 'static>(self, name: impl Into<String>, bucket: B) -> Self {
        self.boxed_stage(name, Box::new(bucket), None)
    }

    /// Appends a bucket that stamps every token it admits.
    #[must_use]
    pub fn stamped_stage<B: Bucket + 'static>(
        self,
        name: impl Into<String>,
        bucket: B,
        stamp: Stamp,
    ) -> Self {
        self.boxed_stage(name, Box::new(bucket), Some(stamp))
    }

    /// Appends an already boxed bucket.
    #[must_use]
    pub fn boxed_stage(
        mut self,
        name: impl Into<String>,
        bucket: Box<dyn Bucket>,
        stamp: Option<Stamp>,
    ) -> Self {
        self.entries.push((name.into(), bucket, stamp));
        self
    }

    /// Wires the chain.
    ///
    /// # Errors
    ///
    /// Returns `Error::EmptyPipeline` without buckets and
    /// `Error::DuplicateBucket` if two buckets share a name.
    pub fn build(self) -> Result<Pipeline> {
        if self.entries.is_empty() {
            return Err(Error::EmptyPipeline);
        }
        let last = self.entries.len() - 1;
        let mut stages: Vec<Stage> = Vec::with_capacity(self.entries.len());
        let mut buckets = Vec::with_capacity(self.entries.len());

        for (i, (name, bucket, stamp)) in self.entries.into_iter().enumerate() {
            if stages.iter().any(|s| s.name() == name) {
                return Err(Error::DuplicateBucket { name });
            }
            stages.push(Stage::new(name, (i + 1).min(last), stamp));
            buckets.push(bucket);
        }

        Ok(Pipeline {
            stages,
            buckets,
            tracer: Tracer::new(),
            tick: 0,
        })
    }
}

/// An ordered chain of buckets.
pub struct Pipeline {
    stages: Vec<Stage>,
    buckets: Vec<Box<dyn Bucket>>,
    tracer: Tracer,
    tick: Tick,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stages)
            .field("tick", &self.tick)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Starts a builder.
    #[must_use]
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    /// Number of buckets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Always false: a built pipeline has at least one bucket.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// The current tick.
    #[must_use]
    pub const fn tick(&self) -> Tick {
        self.tick
    }

    /// Every stage in chain order.
    #[must_use]
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Looks up a bucket's state by name.
    ///
    /// # Errors
    ///
    /// Returns `Error::BucketNotFound` for an unknown name.
    pub fn bucket(&self, name: &str) -> Result<&Stage> {
        self.context(0).lookup(name)
    }

    /// Kind of the named bucket's policy.
    ///
    /// # Errors
    ///
    /// Returns `Error::BucketNotFound` for an unknown name.
    pub fn kind(&self, name: &str) -> Result<&'static str> {
        let index = self.context(0).position(name)?;
        Ok(self.buckets[index].kind())
    }

    /// The terminal sink.
    #[must_use]
    pub fn terminal(&self) -> &Stage {
        self.context(0).terminal()
    }

    /// Transit events of traced tokens.
    #[must_use]
    pub const fn tracer(&self) -> &Tracer {
        &self.tracer
    }

    /// Tokens resident anywhere in the pipeline.
    #[must_use]
    pub fn resident_tokens(&self) -> u64 {
        self.stages.iter().map(|s| s.len() as u64).sum()
    }

    fn context(&self, index: usize) -> StageContext<'_> {
        StageContext::new(self.tick, index, &self.stages)
    }

    /// Seeds the first bucket with `tokens` and runs until every token
    /// reaches the terminal bucket, no bucket needs another tick, or the next
    /// event lies beyond `duration`.
    ///
    /// # Errors
    ///
    /// Returns `Error::NonMonotonicTick` if a bucket schedules a tick that
    /// does not advance the clock, `Error::DuplicateToken` if a token id is
    /// already resident, and any error raised by a policy hook.
    pub fn run(&mut self, tokens: Vec<IoToken>, duration: Option<Tick>) -> Result<RunOutcome> {
        let submitted = tokens.len() as u64;
        info!(
            tokens = submitted,
            buckets = self.stages.len(),
            start = self.tick,
            duration,
            "Starting pipeline run"
        );

        for token in tokens {
            self.admit(0, token)?;
        }

        let total = self.resident_tokens();
        let mut visited = Vec::new();
        let reason = loop {
            let tick = self.tick;
            for stage in &mut self.stages {
                stage.set_tick(tick);
            }

            let mut moved = 0;
            for index in 0..self.stages.len() {
                moved += self.step(index)?;
            }
            visited.push(tick);
            debug!(tick, moved, "Processed tick");

            if self.terminal().len() as u64 == total {
                break StopReason::Completed;
            }

            let Some((next, index)) = self.next_event()? else {
                warn!(tick, in_flight = total - self.terminal().len() as u64, "Pipeline stalled");
                break StopReason::Stalled;
            };
            if next <= tick {
                return Err(Error::NonMonotonicTick {
                    current: tick,
                    next,
                    bucket: self.stages[index].name().to_string(),
                });
            }
            if duration.is_some_and(|limit| next > limit) {
                warn!(tick, next, duration, "Run stopped at duration bound");
                break StopReason::DurationElapsed;
            }
            self.tick = next;
        };

        let delivered = self.terminal().len() as u64;
        info!(
            reason = ?reason,
            ticks = visited.len(),
            final_tick = self.tick,
            delivered,
            "Pipeline run finished"
        );

        let columns = self
            .stages
            .iter_mut()
            .map(|s| Column {
                name: s.name().to_string(),
                records: s.take_records(),
            })
            .collect();
        Ok(RunOutcome {
            reason,
            final_tick: self.tick,
            tokens: submitted,
            delivered,
            history: History::new(columns, visited),
        })
    }

    /// Runs one bucket's movement step and returns the number moved.
    fn step(&mut self, index: usize) -> Result<u64> {
        let tick = self.tick;
        let mut record = TickRecord::default();
        let ids = {
            let ctx = StageContext::new(tick, index, &self.stages);
            self.buckets[index].to_move(&ctx, &mut record)?
        };

        let target = self.stages[index].target_index();
        let mut moved = 0;
        for id in ids {
            if self.transfer(index, target, id)? {
                moved += 1;
            }
        }

        record.moved = moved;
        record.size = self.stages[index].len() as u64;
        self.stages[index].record(tick, record);
        Ok(moved)
    }

    /// Moves one token from `from` to `to`. Returns false if the policy named
    /// a token that is not resident.
    fn transfer(&mut self, from: usize, to: usize, id: TokenId) -> Result<bool> {
        let Some(token) = self.stages[from].take(id) else {
            trace!(bucket = self.stages[from].name(), token = %id, "Skipping non-resident token");
            return Ok(false);
        };
        {
            let ctx = StageContext::new(self.tick, from, &self.stages);
            self.buckets[from].on_remove(&ctx, &token);
        }
        if token.is_traced() {
            self.tracer.removed(id, self.stages[from].name(), self.tick);
        }
        self.admit(to, token)?;
        Ok(true)
    }

    /// Admits a token to bucket `index`, running its admission hook.
    fn admit(&mut self, index: usize, mut token: IoToken) -> Result<()> {
        {
            let ctx = StageContext::new(self.tick, index, &self.stages);
            self.buckets[index].on_admit(&ctx, &mut token)?;
        }
        let id = token.id();
        let traced = token.is_traced();
        let stage = &mut self.stages[index];
        if !stage.admit(token, self.tick) {
            return Err(Error::DuplicateToken {
                id,
                bucket: stage.name().to_string(),
            });
        }
        if traced {
            self.tracer.admitted(id, self.stages[index].name(), self.tick);
        }
        Ok(())
    }

    /// Earliest requested tick and the first bucket that requested it.
    fn next_event(&mut self) -> Result<Option<(Tick, usize)>> {
        let mut earliest: Option<(Tick, usize)> = None;
        for index in 0..self.stages.len() {
            let ctx = StageContext::new(self.tick, index, &self.stages);
            let Some(next) = self.buckets[index].next_action(&ctx)? else {
                continue;
            };
            if earliest.map_or(true, |(t, _)| next < t) {
                earliest = Some((next, index));
            }
        }
        Ok(earliest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dial::DialBucket;
    use crate::drain::{ContinueBucket, StopBucket};
    use crate::gate::GateBucket;

    /// Schedules the current tick again.
    struct Stuck;

    impl Bucket for Stuck {
        fn kind(&self) -> &'static str {
            "stuck"
        }

        fn to_move(&mut self, _ctx: &StageContext<'_>, _record: &mut TickRecord) -> Result<Vec<TokenId>> {
            Ok(Vec::new())
        }

        fn next_action(&mut self, ctx: &StageContext<'_>) -> Result<Option<Tick>> {
            Ok(Some(ctx.tick()))
        }
    }

    #[test]
    fn test_build_wires_targets() {
        let pipeline = Pipeline::builder()
            .stage("a", ContinueBucket)
            .stage("b", ContinueBucket)
            .stage("c", StopBucket)
            .build()
            .unwrap();

        let targets: Vec<usize> = pipeline.stages().iter().map(Stage::target_index).collect();
        assert_eq!(targets, vec![1, 2, 2]);
        assert_eq!(pipeline.terminal().name(), "c");
        assert_eq!(pipeline.kind("b").unwrap(), "continue");
    }

    #[test]
    fn test_build_rejects_empty_and_duplicates() {
        assert!(matches!(Pipeline::builder().build(), Err(Error::EmptyPipeline)));
        let result = Pipeline::builder()
            .stage("a", ContinueBucket)
            .stage("a", StopBucket)
            .build();
        assert!(matches!(result, Err(Error::DuplicateBucket { name }) if name == "a"));
    }

    #[test]
    fn test_lookup_unknown_bucket() {
        let pipeline = Pipeline::builder().stage("stop", StopBucket).build().unwrap();
        assert!(matches!(
            pipeline.bucket("nope"),
            Err(Error::BucketNotFound { .. })
        ));
    }

    #[test]
    fn test_continue_chain_completes_in_one_tick() {
        let mut pipeline = Pipeline::builder()
            .stage("a", ContinueBucket)
            .stage("b", ContinueBucket)
            .stage("stop", StopBucket)
            .build()
            .unwrap();

        let outcome = pipeline.run(IoToken::batch(5), None).unwrap();
        assert_eq!(outcome.reason, StopReason::Completed);
        assert_eq!(outcome.final_tick, 0);
        assert_eq!(outcome.delivered, 5);
        assert_eq!(outcome.history.ticks(), &[0]);
        assert_eq!(pipeline.bucket("stop").unwrap().counter(), 5);
    }

    #[test]
    fn test_single_bucket_pipeline_completes_immediately() {
        let mut pipeline = Pipeline::builder().stage("stop", StopBucket).build().unwrap();
        let outcome = pipeline.run(IoToken::batch(3), None).unwrap();
        assert!(outcome.is_complete());
    }

    #[test]
    fn test_gate_alone_stalls() {
        let mut pipeline = Pipeline::builder()
            .stage("gate", GateBucket::fixed(1))
            .stage("stop", StopBucket)
            .build()
            .unwrap();

        let outcome = pipeline.run(IoToken::batch(3), None).unwrap();
        assert_eq!(outcome.reason, StopReason::Stalled);
        assert_eq!(outcome.delivered, 1);
    }

    #[test]
    fn test_non_monotonic_schedule_fails() {
        let mut pipeline = Pipeline::builder()
            .stage("stuck", Stuck)
            .stage("stop", StopBucket)
            .build()
            .unwrap();

        let err = pipeline.run(IoToken::batch(1), None).unwrap_err();
        assert_eq!(
            err,
            Error::NonMonotonicTick {
                current: 0,
                next: 0,
                bucket: "stuck".to_string(),
            }
        );
    }

    #[test]
    fn test_duration_bound_stops_early() {
        let mut pipeline = Pipeline::builder()
            .stage("dial", DialBucket::fixed(100))
            .stage("stop", StopBucket)
            .build()
            .unwrap();

        let outcome = pipeline.run(IoToken::batch(2), Some(50)).unwrap();
        assert_eq!(outcome.reason, StopReason::DurationElapsed);
        assert_eq!(outcome.final_tick, 0);
        assert_eq!(outcome.delivered, 0);
        assert_eq!(pipeline.resident_tokens(), 2);
    }

    #[test]
    fn test_duplicate_token_rejected() {
        let mut pipeline = Pipeline::builder().stage("stop", StopBucket).build().unwrap();
        let tokens = vec![IoToken::new(TokenId::new(1)), IoToken::new(TokenId::new(1))];
        assert!(matches!(
            pipeline.run(tokens, None),
            Err(Error::DuplicateToken { .. })
        ));
    }

    #[test]
    fn test_missing_hook_surfaces_from_run() {
        let mut pipeline = Pipeline::builder()
            .stage("gate", GateBucket::default())
            .stage("stop", StopBucket)
            .build()
            .unwrap();
        assert!(matches!(
            pipeline.run(IoToken::batch(1), None),
            Err(Error::MissingHook { .. })
        ));
    }

    #[test]
    fn test_stamps_and_tracing() {
        let mut pipeline = Pipeline::builder()
            .stamped_stage("submit", DialBucket::fixed(2), Stamp::Submitted)
            .stage("device", DialBucket::fixed(3))
            .stamped_stage("completed", StopBucket, Stamp::Completed)
            .build()
            .unwrap();

        let tokens = vec![IoToken::traced(TokenId::new(0)), IoToken::new(TokenId::new(1))];
        let outcome = pipeline.run(tokens, None).unwrap();
        assert!(outcome.is_complete());
        assert_eq!(outcome.final_tick, 5);

        let done = pipeline.bucket("completed").unwrap();
        let token = done.residents().get(TokenId::new(1)).unwrap();
        assert_eq!(token.stamps().submitted_at, Some(0));
        assert_eq!(token.stamps().completed_at, Some(5));

        let table = pipeline.tracer().transit_table();
        assert_eq!(table.len(), 2);
        assert_eq!(table[0].duration, 2);
        assert_eq!(table[1].duration, 3);
        assert!(pipeline.tracer().visits().get(&TokenId::new(1)).is_none());
    }
}
