//! Gate bucket: moves a policy-chosen number of tokens per activation.

use tickflow_core::{Result, TokenId};

use crate::bucket::{hook, Bucket, Hook, StageContext};
use crate::record::{MoveSize, Observation, TickRecord};

/// Moves up to `wanted_move_size()` residents each time it runs.
///
/// When the request exceeds what is resident the record carries a `wait`
/// flag, which instrumentation reads as "the consumer was starved".
#[derive(Default)]
pub struct GateBucket {
    wanted_move_size: Option<Hook<MoveSize>>,
}

impl GateBucket {
    /// Creates a gate with the given request hook.
    #[must_use]
    pub fn new<F>(wanted_move_size: F) -> Self
    where
        F: FnMut(&StageContext<'_>) -> Result<MoveSize> + 'static,
    {
        Self {
            wanted_move_size: Some(hook(wanted_move_size)),
        }
    }

    /// Creates a gate that always requests `n` tokens.
    #[must_use]
    pub fn fixed(n: u64) -> Self {
        Self::new(move |_| Ok(MoveSize::Limited(n)))
    }
}

impl Bucket for GateBucket {
    fn kind(&self) -> &'static str {
        "gate"
    }

    fn to_move(&mut self, ctx: &StageContext<'_>, record: &mut TickRecord) -> Result<Vec<TokenId>> {
        let wanted = match self.wanted_move_size.as_mut() {
            Some(f) => f(ctx)?,
            None => return Err(ctx.missing_hook("wanted_move_size")),
        };
        let residents = ctx.stage().residents();
        let available = residents.len();

        record.wanted = Some(wanted);
        record.set("wait", Observation::Flag(wanted.exceeds(available)));

        Ok(residents.first_n(wanted.clamp_to(available)))
    }
}
