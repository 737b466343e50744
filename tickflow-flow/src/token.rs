//! IO tokens and the ordered resident sets that own them.
//!
//! A token is owned by exactly one resident set at any instant. Moving a
//! token between buckets removes it from one set by value and inserts it into
//! another; tokens are never cloned by the engine.

use std::collections::BTreeMap;

use serde::Serialize;
use tickflow_core::{Tick, TokenId};

/// Observation fields policies may stamp onto a token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TokenStamps {
    /// Tick at which the token was submitted.
    pub submitted_at: Option<Tick>,

    /// Tick at which the token completed.
    pub completed_at: Option<Tick>,

    /// Whether the token was served from cache.
    pub cached: bool,
}

/// A field a bucket writes onto every token it admits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stamp {
    /// Sets `submitted_at` to the admission tick.
    Submitted,
    /// Sets `completed_at` to the admission tick.
    Completed,
    /// Sets the `cached` flag.
    Cached,
}

/// A unit of simulated work.
#[derive(Debug, PartialEq, Eq)]
pub struct IoToken {
    id: TokenId,
    stamps: TokenStamps,
    traced: bool,
}

impl IoToken {
    /// Creates an untraced token.
    #[must_use]
    pub fn new(id: TokenId) -> Self {
        Self {
            id,
            stamps: TokenStamps::default(),
            traced: false,
        }
    }

    /// Creates a token whose admissions and removals are reported to the
    /// pipeline's tracer.
    #[must_use]
    pub fn traced(id: TokenId) -> Self {
        Self {
            traced: true,
            ..Self::new(id)
        }
    }

    /// Creates `count` untraced tokens with ids `0..count`.
    #[must_use]
    pub fn batch(count: u64) -> Vec<Self> {
        (0..count).map(|i| Self::new(TokenId::new(i))).collect()
    }

    /// Returns the token id.
    #[must_use]
    pub const fn id(&self) -> TokenId {
        self.id
    }

    /// Returns true if the token reports to a tracer.
    #[must_use]
    pub const fn is_traced(&self) -> bool {
        self.traced
    }

    /// Enables or disables tracing for this token.
    pub fn set_traced(&mut self, traced: bool) {
        self.traced = traced;
    }

    /// Returns the stamped observation fields.
    #[must_use]
    pub const fn stamps(&self) -> &TokenStamps {
        &self.stamps
    }

    /// Returns the stamped observation fields for writing.
    pub fn stamps_mut(&mut self) -> &mut TokenStamps {
        &mut self.stamps
    }

    /// Applies `stamp` at `tick`.
    pub fn apply(&mut self, stamp: Stamp, tick: Tick) {
        match stamp {
            Stamp::Submitted => self.stamps.submitted_at = Some(tick),
            Stamp::Completed => self.stamps.completed_at = Some(tick),
            Stamp::Cached => self.stamps.cached = true,
        }
    }
}

/// The tokens currently owned by a bucket, iterated in ascending id order.
#[derive(Debug, Default)]
pub struct ResidentSet {
    tokens: BTreeMap<TokenId, IoToken>,
}

impl ResidentSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a token. Returns the token back if its id is already resident.
    ///
    /// # Errors
    ///
    /// Returns the rejected token when a token with the same id is present.
    pub fn insert(&mut self, token: IoToken) -> Result<(), IoToken> {
        if self.tokens.contains_key(&token.id()) {
            return Err(token);
        }
        self.tokens.insert(token.id(), token);
        Ok(())
    }

    /// Removes and returns a token.
    pub fn remove(&mut self, id: TokenId) -> Option<IoToken> {
        self.tokens.remove(&id)
    }

    /// Returns true if `id` is resident.
    #[must_use]
    pub fn contains(&self, id: TokenId) -> bool {
        self.tokens.contains_key(&id)
    }

    /// Returns a resident token.
    #[must_use]
    pub fn get(&self, id: TokenId) -> Option<&IoToken> {
        self.tokens.get(&id)
    }

    /// Number of resident tokens.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Returns true if nothing is resident.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Iterates resident ids in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = TokenId> + '_ {
        self.tokens.keys().copied()
    }

    /// Iterates resident tokens in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = &IoToken> + '_ {
        self.tokens.values()
    }

    /// Returns the first `n` ids in iteration order.
    #[must_use]
    pub fn first_n(&self, n: usize) -> Vec<TokenId> {
        self.ids().take(n).collect()
    }
}
