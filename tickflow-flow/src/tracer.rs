//! Per-token transit tracing.
//!
//! Traced tokens report every admission and removal to the pipeline's
//! [`Tracer`]. The tracer keeps, for each token, the ordered list of stages it
//! visited and when it entered and left each one.

use std::collections::BTreeMap;

use serde::Serialize;
use tickflow_core::{Tick, TokenId};

/// One stay of a token in one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Visit {
    /// Stage name.
    pub stage: String,
    /// Tick of admission.
    pub entered: Tick,
    /// Tick of removal, if the token has left.
    pub left: Option<Tick>,
}

/// One row of the transit table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransitRow {
    /// The token.
    pub token: TokenId,
    /// Stage the token left.
    pub from: String,
    /// Stage it entered next.
    pub to: String,
    /// Tick it entered `from`.
    pub entered: Tick,
    /// Tick it entered `to`.
    pub arrived: Tick,
    /// Ticks spent in `from`.
    pub duration: Tick,
}

/// Collects admission and removal events from traced tokens.
#[derive(Debug, Clone, Default)]
pub struct Tracer {
    visits: BTreeMap<TokenId, Vec<Visit>>,
}

impl Tracer {
    /// Creates an empty tracer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `token` entered `stage`.
    pub fn admitted(&mut self, token: TokenId, stage: &str, tick: Tick) {
        self.visits.entry(token).or_default().push(Visit {
            stage: stage.to_string(),
            entered: tick,
            left: None,
        });
    }

    /// Records that `token` left `stage`.
    pub fn removed(&mut self, token: TokenId, stage: &str, tick: Tick) {
        let open = self
            .visits
            .get_mut(&token)
            .and_then(|visits| visits.iter_mut().rev().find(|v| v.stage == stage && v.left.is_none()));
        if let Some(visit) = open {
            visit.left = Some(tick);
        }
    }

    /// Every traced token's visits, in order.
    #[must_use]
    pub const fn visits(&self) -> &BTreeMap<TokenId, Vec<Visit>> {
        &self.visits
    }

    /// Tick at which `token` first entered `stage`.
    #[must_use]
    pub fn entered(&self, token: TokenId, stage: &str) -> Option<Tick> {
        self.visits
            .get(&token)?
            .iter()
            .find(|v| v.stage == stage)
            .map(|v| v.entered)
    }

    /// Stage-to-stage transitions of every traced token, ordered by token.
    #[must_use]
    pub fn transit_table(&self) -> Vec<TransitRow> {
        self.visits
            .iter()
            .flat_map(|(token, visits)| {
                visits.windows(2).map(move |pair| TransitRow {
                    token: *token,
                    from: pair[0].stage.clone(),
                    to: pair[1].stage.clone(),
                    entered: pair[0].entered,
                    arrived: pair[1].entered,
                    duration: pair[1].entered.saturating_sub(pair[0].entered),
                })
            })
            .collect()
    }

    /// Ticks between entering `from` and entering `to`, per traced token
    /// that did both.
    #[must_use]
    pub fn durations(&self, from: &str, to: &str) -> BTreeMap<TokenId, Tick> {
        self.visits
            .keys()
            .filter_map(|token| {
                let start = self.entered(*token, from)?;
                let end = self.entered(*token, to)?;
                Some((*token, end.saturating_sub(start)))
            })
            .collect()
    }

    /// Forgets everything.
    pub fn clear(&mut self) {
        self.visits.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transit_table() {
        let mut tracer = Tracer::new();
        let id = TokenId::new(3);
        tracer.admitted(id, "gate", 0);
        tracer.removed(id, "gate", 4);
        tracer.admitted(id, "dial", 4);
        tracer.removed(id, "dial", 9);
        tracer.admitted(id, "stop", 9);

        let table = tracer.transit_table();
        assert_eq!(table.len(), 2);
        assert_eq!(table[0].from, "gate");
        assert_eq!(table[0].to, "dial");
        assert_eq!(table[0].duration, 4);
        assert_eq!(table[1].duration, 5);

        assert_eq!(tracer.visits()[&id][1].left, Some(9));
        assert_eq!(tracer.visits()[&id][2].left, None);
    }

    #[test]
    fn test_durations_between_stages() {
        let mut tracer = Tracer::new();
        tracer.admitted(TokenId::new(1), "a", 0);
        tracer.admitted(TokenId::new(1), "c", 7);
        tracer.admitted(TokenId::new(2), "a", 2);

        let durations = tracer.durations("a", "c");
        assert_eq!(durations.len(), 1);
        assert_eq!(durations[&TokenId::new(1)], 7);
    }

    #[test]
    fn test_removal_without_admission_is_ignored() {
        let mut tracer = Tracer::new();
        tracer.removed(TokenId::new(1), "a", 3);
        assert!(tracer.visits().is_empty());
        assert!(tracer.transit_table().is_empty());
    }
}
