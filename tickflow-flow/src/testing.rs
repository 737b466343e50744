//! Helpers for unit tests that drive a single bucket by hand.

use tickflow_core::{Tick, TokenId};

use crate::bucket::{Bucket, Stage, StageContext};
use crate::record::TickRecord;
use crate::token::IoToken;

/// Builds a linear chain of stages, each seeded with the given token ids.
pub fn chain(layout: &[(&str, Vec<u64>)]) -> Vec<Stage> {
    let last = layout.len() - 1;
    layout
        .iter()
        .enumerate()
        .map(|(i, (name, ids))| {
            let mut stage = Stage::new((*name).to_string(), (i + 1).min(last), None);
            for id in ids {
                stage.admit(IoToken::new(TokenId::new(*id)), 0);
            }
            stage
        })
        .collect()
}

/// Runs `to_move` for stage `index` and returns the chosen ids and record.
pub fn step<B: Bucket>(
    bucket: &mut B,
    stages: &[Stage],
    index: usize,
    tick: Tick,
) -> (Vec<u64>, TickRecord) {
    let ctx = StageContext::new(tick, index, stages);
    let mut record = TickRecord::default();
    let ids = bucket.to_move(&ctx, &mut record).unwrap();
    (ids.into_iter().map(TokenId::get).collect(), record)
}

/// Runs `next_action` for stage `index`.
pub fn next<B: Bucket>(bucket: &mut B, stages: &[Stage], index: usize, tick: Tick) -> Option<Tick> {
    let ctx = StageContext::new(tick, index, stages);
    bucket.next_action(&ctx).unwrap()
}

/// Admits a token into stage `index`, running the bucket's admission hook.
pub fn admit<B: Bucket>(bucket: &mut B, stages: &mut [Stage], index: usize, id: u64, tick: Tick) {
    let mut token = IoToken::new(TokenId::new(id));
    {
        let ctx = StageContext::new(tick, index, stages);
        bucket.on_admit(&ctx, &mut token).unwrap();
    }
    stages[index].admit(token, tick);
}

/// Removes a token from stage `index`, running the bucket's removal hook.
pub fn remove<B: Bucket>(bucket: &mut B, stages: &mut [Stage], index: usize, id: u64, tick: Tick) {
    let token = stages[index].take(TokenId::new(id)).unwrap();
    let ctx = StageContext::new(tick, index, stages);
    bucket.on_remove(&ctx, &token);
}
