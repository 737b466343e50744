//! Unconditional buckets: drain everything, or hold everything.

use tickflow_core::{Result, TokenId};

use crate::bucket::{Bucket, StageContext};
use crate::record::TickRecord;

/// Moves every resident to its target each time it runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct ContinueBucket;

impl Bucket for ContinueBucket {
    fn kind(&self) -> &'static str {
        "continue"
    }

    fn to_move(&mut self, ctx: &StageContext<'_>, _record: &mut TickRecord) -> Result<Vec<TokenId>> {
        Ok(ctx.stage().residents().ids().collect())
    }
}

/// Terminal sink. Tokens that arrive here stay forever.
#[derive(Debug, Default, Clone, Copy)]
pub struct StopBucket;

impl Bucket for StopBucket {
    fn kind(&self) -> &'static str {
        "stop"
    }

    fn to_move(&mut self, _ctx: &StageContext<'_>, _record: &mut TickRecord) -> Result<Vec<TokenId>> {
        Ok(Vec::new())
    }
}
