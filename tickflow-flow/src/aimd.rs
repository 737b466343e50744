//! AIMD (Additive Increase Multiplicative Decrease) sampling policy.
//!
//! Drives a [`SamplingRateBucket`](crate::SamplingRateBucket) the way TCP
//! congestion control drives a window:
//!
//! 1. **Additive Increase**: when a sample resolves within the latency
//!    threshold, the rate grows by a fixed step.
//! 2. **Multiplicative Decrease**: when a sample takes longer than the
//!    threshold, the rate is multiplied by a factor below one.
//!
//! The result is a sawtooth that probes for the rate the downstream stages
//! can absorb. All arithmetic is exact, so a run is reproducible bit for bit.
//!
//! A decreased rate is rounded down to a whole number of items per second.
//! Every rate the policy emits therefore has a denominator dividing the lcm
//! of one second, the step, and the bounds, however many samples resolve.

use tickflow_core::{Error, Rate, RateUnit, Ratio, Result, Tick};

use crate::bucket::StageContext;
use crate::sampling::{SampleOutcome, SamplingPolicy};

/// Configuration for the AIMD policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AimdConfig {
    /// Rate before the first sample resolves.
    pub initial_rate: Rate,

    /// Minimum rate (floor).
    pub min_rate: Rate,

    /// Maximum rate (ceiling).
    pub max_rate: Rate,

    /// Added to the rate after each fast sample.
    pub additive_increase: Rate,

    /// Multiplies the rate after each slow sample. Must lie in `[0, 1]`.
    pub multiplicative_decrease: Ratio,

    /// Sample latency (ticks) above which the pipeline counts as congested.
    pub latency_threshold: Tick,
}

impl AimdConfig {
    /// Creates a configuration that halves on congestion and steps up by
    /// `min_rate`.
    #[must_use]
    pub const fn new(initial_rate: Rate, min_rate: Rate, max_rate: Rate) -> Self {
        Self {
            initial_rate,
            min_rate,
            max_rate,
            additive_increase: min_rate,
            multiplicative_decrease: Ratio::HALF,
            latency_threshold: 100,
        }
    }

    /// Sets the additive increase step.
    #[must_use]
    pub const fn with_additive_increase(mut self, step: Rate) -> Self {
        self.additive_increase = step;
        self
    }

    /// Sets the multiplicative decrease factor.
    #[must_use]
    pub const fn with_multiplicative_decrease(mut self, factor: Ratio) -> Self {
        self.multiplicative_decrease = factor;
        self
    }

    /// Sets the latency threshold.
    #[must_use]
    pub const fn with_latency_threshold(mut self, threshold: Tick) -> Self {
        self.latency_threshold = threshold;
        self
    }

    /// Creates a configuration for testing: 1/10 per tick, bounded to
    /// `[1/100, 1]`, stepping by 1/100, congested above 20 ticks.
    #[must_use]
    pub const fn for_testing() -> Self {
        Self {
            initial_rate: Rate::from_fraction(1, 10),
            min_rate: Rate::from_fraction(1, 100),
            max_rate: Rate::from_fraction(1, 1),
            additive_increase: Rate::from_fraction(1, 100),
            multiplicative_decrease: Ratio::HALF,
            latency_threshold: 20,
        }
    }

    fn clamp(&self, rate: Rate) -> Rate {
        rate.max(self.min_rate).min(self.max_rate)
    }
}

/// Phase of the AIMD policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AimdState {
    /// Probing for more capacity (additive increase phase).
    Probing,
    /// Recovering from congestion (after multiplicative decrease).
    Recovering,
    /// Stable at the current rate.
    Stable,
}

/// Statistics about the AIMD policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AimdStats {
    /// Current rate.
    pub current_rate: Rate,
    /// Current phase.
    pub state: AimdState,
    /// Consecutive fast samples.
    pub consecutive_successes: u32,
    /// Consecutive slow samples.
    pub consecutive_congestions: u32,
    /// Total rate increases performed.
    pub total_increases: u64,
    /// Total rate decreases performed.
    pub total_decreases: u64,
    /// Latency of the most recent sample.
    pub last_latency: Option<Tick>,
}

/// AIMD rate policy for a sampling bucket.
#[derive(Debug, Clone)]
pub struct AimdSampling {
    config: AimdConfig,
    current_rate: Rate,
    state: AimdState,
    consecutive_successes: u32,
    consecutive_congestions: u32,
    total_increases: u64,
    total_decreases: u64,
    last_latency: Option<Tick>,
}

impl AimdSampling {
    /// Creates a policy starting at the configured initial rate.
    #[must_use]
    pub fn new(config: AimdConfig) -> Self {
        let current_rate = config.clamp(config.initial_rate);
        Self {
            config,
            current_rate,
            state: AimdState::Probing,
            consecutive_successes: 0,
            consecutive_congestions: 0,
            total_increases: 0,
            total_decreases: 0,
            last_latency: None,
        }
    }

    /// Returns the current rate.
    #[must_use]
    pub const fn current_rate(&self) -> Rate {
        self.current_rate
    }

    /// Returns the current phase.
    #[must_use]
    pub const fn state(&self) -> AimdState {
        self.state
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &AimdConfig {
        &self.config
    }

    /// Applies one observed sample latency and returns the new rate.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRate` if the configured factor is negative and
    /// `Error::Overflow` if the new rate cannot be represented exactly.
    pub fn observe(&mut self, latency: Tick) -> Result<Rate> {
        self.last_latency = Some(latency);
        if latency > self.config.latency_threshold {
            self.decrease()?;
            self.consecutive_successes = 0;
            self.consecutive_congestions += 1;
            self.state = AimdState::Recovering;
        } else {
            self.increase()?;
            self.consecutive_successes += 1;
            self.consecutive_congestions = 0;

            // Transition to stable after several fast samples.
            if self.consecutive_successes >= 5 {
                self.state = AimdState::Stable;
            } else if self.state == AimdState::Recovering && self.consecutive_successes >= 2 {
                self.state = AimdState::Probing;
            }
        }
        Ok(self.current_rate)
    }

    fn increase(&mut self) -> Result<()> {
        let raised = self
            .current_rate
            .checked_add(self.config.additive_increase)
            .ok_or(Error::Overflow {
                operation: "aimd additive increase",
            })?;
        self.current_rate = self.config.clamp(raised);
        self.total_increases += 1;
        Ok(())
    }

    fn decrease(&mut self) -> Result<()> {
        let lowered = self
            .current_rate
            .scaled(self.config.multiplicative_decrease)?
            .floor_to(RateUnit::PerSecond)?;
        self.current_rate = self.config.clamp(lowered);
        self.total_decreases += 1;
        Ok(())
    }

    /// Returns statistics about the policy.
    #[must_use]
    pub const fn stats(&self) -> AimdStats {
        AimdStats {
            current_rate: self.current_rate,
            state: self.state,
            consecutive_successes: self.consecutive_successes,
            consecutive_congestions: self.consecutive_congestions,
            total_increases: self.total_increases,
            total_decreases: self.total_decreases,
            last_latency: self.last_latency,
        }
    }
}

impl SamplingPolicy for AimdSampling {
    fn rate(&mut self, _ctx: &StageContext<'_>) -> Result<Rate> {
        Ok(self.current_rate)
    }

    fn adjust(&mut self, _ctx: &StageContext<'_>, outcome: Option<&SampleOutcome>) -> Result<()> {
        if let Some(outcome) = outcome {
            self.observe(outcome.latency())?;
        }
        Ok(())
    }
}
