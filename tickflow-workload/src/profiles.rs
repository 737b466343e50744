//! Scenario profiles.
//!
//! A profile names a pipeline shape (an ordered list of stages with constant
//! policy parameters), the number of tokens to push through it, and an
//! optional duration bound. Profiles load from TOML or from the built-in set.
//!
//! # Example
//!
//! ```
//! use tickflow_workload::profiles::load_profile;
//!
//! let profile = load_profile("gate-dial").unwrap();
//! let mut pipeline = profile.build_pipeline().unwrap();
//! let outcome = pipeline.run(profile.tokens(), profile.duration).unwrap();
//! assert!(outcome.is_complete());
//! ```
//!
//! # TOML layout
//!
//! ```toml
//! name = "prefetch"
//! tokens = 64
//!
//! [[stages]]
//! name = "fetch"
//! kind = "target_capacity"
//! capacity = 8
//!
//! [[stages]]
//! name = "consumer"
//! kind = "rate"
//! rate = "1/4 per us"
//!
//! [[stages]]
//! name = "consumed"
//! kind = "stop"
//! stamp = "completed"
//! ```

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tickflow_core::{Rate, Ratio, Tick, TokenId};
use tickflow_flow::{
    AimdConfig, AimdSampling, Bucket, CapacityBucket, ContinueBucket, DialBucket, GateBucket,
    GlobalCapacityBucket, IoToken, MoveSize, Pipeline, RateBucket, SamplingRateBucket, Stamp,
    StopBucket, TargetCapacityBucket, ThresholdBucket,
};

const fn default_decrease() -> Ratio {
    Ratio::HALF
}

const fn default_latency_threshold() -> Tick {
    100
}

/// Parameters of an AIMD-driven sampling bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamplingConfig {
    /// Rate before the first sample resolves.
    pub initial_rate: Rate,
    /// Floor.
    pub min_rate: Rate,
    /// Ceiling.
    pub max_rate: Rate,
    /// Step after a fast sample. Defaults to `min_rate`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additive_increase: Option<Rate>,
    /// Factor applied after a slow sample.
    #[serde(default = "default_decrease")]
    pub multiplicative_decrease: Ratio,
    /// Sample latency above which the rate backs off.
    #[serde(default = "default_latency_threshold")]
    pub latency_threshold: Tick,
    /// Stages whose arrival resolves a sample. Empty means the defaults.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resolve_stages: Vec<String>,
}

impl SamplingConfig {
    fn aimd(&self) -> AimdConfig {
        let config = AimdConfig::new(self.initial_rate, self.min_rate, self.max_rate)
            .with_multiplicative_decrease(self.multiplicative_decrease)
            .with_latency_threshold(self.latency_threshold);
        match self.additive_increase {
            Some(step) => config.with_additive_increase(step),
            None => config,
        }
    }

    fn validate(&self) -> Result<(), String> {
        if self.min_rate > self.max_rate {
            return Err(format!(
                "min_rate {} exceeds max_rate {}",
                self.min_rate, self.max_rate
            ));
        }
        let factor = self.multiplicative_decrease;
        if factor.is_negative() || factor > Ratio::ONE {
            return Err(format!("multiplicative_decrease {factor} is outside [0, 1]"));
        }
        Ok(())
    }
}

/// A bucket kind with constant policy parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BucketConfig {
    /// Moves `count` tokens per activation, or everything when absent.
    Gate {
        /// Tokens per activation.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        count: Option<u64>,
    },
    /// Holds each token for `latency` ticks.
    Dial {
        /// Residency in ticks.
        latency: Tick,
    },
    /// Drains everything each step.
    Continue,
    /// Terminal sink.
    Stop,
    /// Fractional-rate release.
    Rate {
        /// Release rate, e.g. `"1/3 per us"`.
        rate: Rate,
    },
    /// Probe-driven AIMD rate release.
    Sampling(SamplingConfig),
    /// Batch release once `threshold` tokens are resident.
    Threshold {
        /// Release threshold.
        threshold: u64,
    },
    /// Moves up to `slack` tokens per step.
    Capacity {
        /// Per-step slack.
        slack: u64,
    },
    /// Fills the next stage up to `capacity`.
    TargetCapacity {
        /// Target occupancy of the next stage.
        capacity: u64,
    },
    /// Bounds tokens in flight between the next stage and the sink.
    GlobalCapacity {
        /// In-flight bound.
        max_buffers: u64,
    },
}

impl BucketConfig {
    /// Instantiates the bucket.
    #[must_use]
    pub fn build(&self) -> Box<dyn Bucket> {
        match self {
            Self::Gate { count: Some(n) } => Box::new(GateBucket::fixed(*n)),
            Self::Gate { count: None } => Box::new(GateBucket::new(|_| Ok(MoveSize::Unbounded))),
            Self::Dial { latency } => Box::new(DialBucket::fixed(*latency)),
            Self::Continue => Box::new(ContinueBucket),
            Self::Stop => Box::new(StopBucket),
            Self::Rate { rate } => Box::new(RateBucket::fixed(*rate)),
            Self::Sampling(config) => {
                let bucket = SamplingRateBucket::new(AimdSampling::new(config.aimd()));
                if config.resolve_stages.is_empty() {
                    Box::new(bucket)
                } else {
                    Box::new(bucket.with_resolve_stages(config.resolve_stages.clone()))
                }
            }
            Self::Threshold { threshold } => Box::new(ThresholdBucket::fixed(*threshold)),
            Self::Capacity { slack } => {
                let slack = *slack;
                Box::new(CapacityBucket::new(move |_| Ok(slack)))
            }
            Self::TargetCapacity { capacity } => Box::new(TargetCapacityBucket::fixed(*capacity)),
            Self::GlobalCapacity { max_buffers } => {
                Box::new(GlobalCapacityBucket::fixed(*max_buffers))
            }
        }
    }
}

/// One named stage of a profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageConfig {
    /// Stage name, unique within the profile.
    pub name: String,
    /// Field stamped onto every admitted token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stamp: Option<Stamp>,
    /// Bucket kind and parameters.
    #[serde(flatten)]
    pub bucket: BucketConfig,
}

impl StageConfig {
    /// Creates an unstamped stage.
    #[must_use]
    pub fn new(name: &str, bucket: BucketConfig) -> Self {
        Self {
            name: name.to_string(),
            stamp: None,
            bucket,
        }
    }

    /// Stamps every token this stage admits.
    #[must_use]
    pub fn with_stamp(mut self, stamp: Stamp) -> Self {
        self.stamp = Some(stamp);
        self
    }
}

/// A complete simulation scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioProfile {
    /// Profile name.
    pub name: String,
    /// Description of what this profile exercises.
    pub description: String,
    /// Tokens seeded into the first stage.
    pub tokens: u64,
    /// Stop once the next event lies beyond this tick.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<Tick>,
    /// Token ids whose transit is traced.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub traced: Vec<u64>,
    /// Stages in chain order; the last one is the sink.
    pub stages: Vec<StageConfig>,
}

impl Default for ScenarioProfile {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            description: "Gate feeding a fixed-latency stage".to_string(),
            tokens: 10,
            duration: None,
            traced: Vec::new(),
            stages: vec![
                StageConfig::new("gate", BucketConfig::Gate { count: Some(2) }),
                StageConfig::new("dial", BucketConfig::Dial { latency: 5 }),
                StageConfig::new("stop", BucketConfig::Stop),
            ],
        }
    }
}

impl ScenarioProfile {
    /// Load a profile from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ProfileError> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| ProfileError::Io {
            path: path.as_ref().display().to_string(),
            source: e,
        })?;
        Self::from_toml(&contents)
    }

    /// Parse a profile from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML cannot be parsed.
    pub fn from_toml(toml: &str) -> Result<Self, ProfileError> {
        toml::from_str(toml).map_err(|e| ProfileError::Parse {
            message: e.to_string(),
        })
    }

    /// Serialize the profile to a TOML string.
    #[must_use]
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }

    /// Checks the profile for mistakes the pipeline builder cannot see.
    ///
    /// # Errors
    ///
    /// Returns `ProfileError::Invalid` describing the first problem found.
    pub fn validate(&self) -> Result<(), ProfileError> {
        let invalid = |message: String| ProfileError::Invalid {
            name: self.name.clone(),
            message,
        };
        if self.stages.is_empty() {
            return Err(invalid("profile has no stages".to_string()));
        }
        if let Some(id) = self.traced.iter().find(|id| **id >= self.tokens) {
            return Err(invalid(format!(
                "traced token {id} is outside 0..{}",
                self.tokens
            )));
        }
        for stage in &self.stages {
            if let BucketConfig::Sampling(config) = &stage.bucket {
                config
                    .validate()
                    .map_err(|m| invalid(format!("stage '{}': {m}", stage.name)))?;
            }
        }
        Ok(())
    }

    /// Assembles the pipeline described by the stage list.
    ///
    /// # Errors
    ///
    /// Returns `ProfileError::Invalid` for an inconsistent profile and
    /// `ProfileError::Flow` if the pipeline cannot be built.
    pub fn build_pipeline(&self) -> Result<Pipeline, ProfileError> {
        self.validate()?;
        let pipeline = self
            .stages
            .iter()
            .fold(Pipeline::builder(), |builder, stage| {
                builder.boxed_stage(stage.name.clone(), stage.bucket.build(), stage.stamp)
            })
            .build()?;
        Ok(pipeline)
    }

    /// The tokens to seed, with traced ids marked.
    #[must_use]
    pub fn tokens(&self) -> Vec<IoToken> {
        (0..self.tokens)
            .map(|i| {
                let mut token = IoToken::new(TokenId::new(i));
                token.set_traced(self.traced.contains(&i));
                token
            })
            .collect()
    }
}

/// Error type for profile operations.
#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    /// I/O error reading profile file.
    #[error("failed to read profile from {path}: {source}")]
    Io {
        /// File path.
        path: String,
        /// Underlying error.
        source: std::io::Error,
    },
    /// Parse error in TOML.
    #[error("failed to parse profile: {message}")]
    Parse {
        /// Error message.
        message: String,
    },
    /// Profile not found.
    #[error("profile not found: {name}")]
    NotFound {
        /// Profile name.
        name: String,
    },
    /// Profile parsed but describes an impossible scenario.
    #[error("invalid profile '{name}': {message}")]
    Invalid {
        /// Profile name.
        name: String,
        /// What is wrong.
        message: String,
    },
    /// Pipeline assembly or run failure.
    #[error(transparent)]
    Flow(#[from] tickflow_core::Error),
}

const fn per_us(num: u64, den: u64) -> Rate {
    Rate::from_fraction(num, den)
}

fn profile(
    name: &str,
    desc: &str,
    tokens: u64,
    traced: &[u64],
    stages: Vec<StageConfig>,
) -> ScenarioProfile {
    ScenarioProfile {
        name: name.to_string(),
        description: desc.to_string(),
        tokens,
        duration: None,
        traced: traced.to_vec(),
        stages,
    }
}

/// Built-in scenario profiles.
#[must_use]
pub fn builtin_profiles() -> HashMap<&'static str, ScenarioProfile> {
    use BucketConfig as B;

    HashMap::from([
        (
            "gate-dial",
            profile("gate-dial", "Two tokens per activation through a 5us stage", 10, &[0, 9], vec![
                StageConfig::new("gate", B::Gate { count: Some(2) }),
                StageConfig::new("dial", B::Dial { latency: 5 }),
                StageConfig::new("stop", B::Stop),
            ]),
        ),
        (
            "rate-limited",
            profile("rate-limited", "Exact fractional rate of one token per 3us", 100, &[], vec![
                StageConfig::new("submit", B::Rate { rate: per_us(1, 3) })
                    .with_stamp(Stamp::Submitted),
                StageConfig::new("completed", B::Stop).with_stamp(Stamp::Completed),
            ]),
        ),
        (
            "prefetch-window",
            profile("prefetch-window", "Bounded in-flight prefetch ahead of a slower consumer", 64, &[0, 63], vec![
                StageConfig::new("prefetch", B::GlobalCapacity { max_buffers: 8 })
                    .with_stamp(Stamp::Submitted),
                StageConfig::new("device", B::Dial { latency: 20 }),
                StageConfig::new("consumer", B::Rate { rate: per_us(1, 4) }),
                StageConfig::new("consumed", B::Stop).with_stamp(Stamp::Completed),
            ]),
        ),
        (
            "batched",
            profile("batched", "Steady feed released to the device in batches of 8", 64, &[], vec![
                StageConfig::new("feed", B::Rate { rate: per_us(1, 1) }),
                StageConfig::new("batch", B::Threshold { threshold: 8 }),
                StageConfig::new("device", B::Dial { latency: 3 }),
                StageConfig::new("stop", B::Stop),
            ]),
        ),
        (
            "adaptive",
            profile("adaptive", "AIMD sampling rate adapting to device latency", 200, &[0], vec![
                StageConfig::new("sampler", B::Sampling(SamplingConfig {
                    initial_rate: per_us(1, 10),
                    min_rate: per_us(1, 100),
                    max_rate: per_us(1, 1),
                    additive_increase: Some(per_us(1, 50)),
                    multiplicative_decrease: default_decrease(),
                    latency_threshold: 15,
                    resolve_stages: Vec::new(),
                })),
                StageConfig::new("device", B::Dial { latency: 10 }),
                StageConfig::new("completed", B::Stop).with_stamp(Stamp::Completed),
            ]),
        ),
    ])
}

/// Load a built-in profile by name.
///
/// # Errors
///
/// Returns an error if the profile name is not found.
pub fn load_profile(name: &str) -> Result<ScenarioProfile, ProfileError> {
    builtin_profiles()
        .remove(name)
        .ok_or_else(|| ProfileError::NotFound {
            name: name.to_string(),
        })
}

/// List all available built-in profile names.
#[must_use]
pub fn list_profiles() -> Vec<&'static str> {
    let mut names: Vec<_> = builtin_profiles().keys().copied().collect();
    names.sort_unstable();
    names
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tickflow_flow::StopReason;

    use super::*;

    #[test]
    fn test_default_profile() {
        let profile = ScenarioProfile::default();
        assert_eq!(profile.tokens, 10);
        assert_eq!(profile.stages.len(), 3);
    }

    #[test]
    fn test_builtin_profiles() {
        assert_eq!(
            list_profiles(),
            vec!["adaptive", "batched", "gate-dial", "prefetch-window", "rate-limited"]
        );
    }

    #[test]
    fn test_every_builtin_completes() {
        for name in list_profiles() {
            let profile = load_profile(name).unwrap();
            let mut pipeline = profile.build_pipeline().unwrap();
            let outcome = pipeline.run(profile.tokens(), profile.duration).unwrap();
            assert_eq!(outcome.reason, StopReason::Completed, "profile {name}");
            assert_eq!(outcome.delivered, profile.tokens, "profile {name}");
        }
    }

    #[test]
    fn test_builtin_rates_are_positive() {
        for (name, profile) in builtin_profiles() {
            for stage in &profile.stages {
                let rates = match &stage.bucket {
                    BucketConfig::Rate { rate } => vec![*rate],
                    BucketConfig::Sampling(config) => {
                        assert_eq!(config.validate(), Ok(()), "{name}/{}", stage.name);
                        vec![config.initial_rate, config.min_rate, config.max_rate]
                    }
                    _ => Vec::new(),
                };
                for rate in rates {
                    assert!(!rate.is_zero(), "{name}/{} has a zero rate", stage.name);
                }
            }
        }
        assert_eq!(default_decrease(), Ratio::new(1, 2).unwrap());
    }

    #[test]
    fn test_profile_not_found() {
        let result = load_profile("nonexistent");
        assert!(matches!(result, Err(ProfileError::NotFound { .. })));
    }

    #[test]
    fn test_parse_stage_kinds() {
        let toml = r#"
            name = "custom"
            tokens = 4
            duration = 1000

            [[stages]]
            name = "gate"
            kind = "gate"

            [[stages]]
            name = "rate"
            kind = "rate"
            rate = "0.5 per us"
            stamp = "submitted"

            [[stages]]
            name = "sampler"
            kind = "sampling"
            initial_rate = "1 per ms"
            min_rate = "1/10 per ms"
            max_rate = "10 per ms"
            multiplicative_decrease = "0.75"

            [[stages]]
            name = "done"
            kind = "stop"
        "#;
        let profile = ScenarioProfile::from_toml(toml).unwrap();
        assert_eq!(profile.duration, Some(1000));
        assert_eq!(profile.stages[0].bucket, BucketConfig::Gate { count: None });
        assert_eq!(profile.stages[1].stamp, Some(Stamp::Submitted));
        assert_eq!(
            profile.stages[1].bucket,
            BucketConfig::Rate { rate: Rate::per_us(1, 2).unwrap() }
        );
        let BucketConfig::Sampling(sampling) = &profile.stages[2].bucket else {
            panic!("expected a sampling stage");
        };
        assert_eq!(sampling.multiplicative_decrease, Ratio::new(3, 4).unwrap());
        assert_eq!(sampling.latency_threshold, 100);
        assert!(profile.build_pipeline().is_ok());
    }

    #[test]
    fn test_parse_errors() {
        let bad_kind = "[[stages]]\nname = \"x\"\nkind = \"teleport\"\n";
        assert!(matches!(
            ScenarioProfile::from_toml(bad_kind),
            Err(ProfileError::Parse { .. })
        ));
        let bad_rate = "[[stages]]\nname = \"x\"\nkind = \"rate\"\nrate = \"fast\"\n";
        assert!(matches!(
            ScenarioProfile::from_toml(bad_rate),
            Err(ProfileError::Parse { .. })
        ));
    }

    #[test]
    fn test_validation() {
        let mut profile = ScenarioProfile::default();
        profile.traced = vec![10];
        assert!(matches!(profile.validate(), Err(ProfileError::Invalid { .. })));

        profile.traced.clear();
        profile.stages.clear();
        assert!(matches!(profile.build_pipeline(), Err(ProfileError::Invalid { .. })));

        let mut sampling = load_profile("adaptive").unwrap();
        if let BucketConfig::Sampling(config) = &mut sampling.stages[0].bucket {
            config.multiplicative_decrease = Ratio::from(2u64);
        }
        assert!(matches!(sampling.validate(), Err(ProfileError::Invalid { .. })));
    }

    #[test]
    fn test_duplicate_stage_names_surface_flow_error() {
        let mut profile = ScenarioProfile::default();
        profile.stages[1].name = "gate".to_string();
        assert!(matches!(
            profile.build_pipeline(),
            Err(ProfileError::Flow(tickflow_core::Error::DuplicateBucket { .. }))
        ));
    }

    #[test]
    fn test_traced_tokens() {
        let profile = load_profile("gate-dial").unwrap();
        let tokens = profile.tokens();
        assert_eq!(tokens.len(), 10);
        assert!(tokens[0].is_traced());
        assert!(!tokens[1].is_traced());
        assert!(tokens[9].is_traced());
    }

    #[test]
    fn test_toml_roundtrip() {
        let profile = load_profile("adaptive").unwrap();
        let toml = profile.to_toml();
        let parsed = ScenarioProfile::from_toml(&toml).unwrap();
        assert_eq!(parsed, profile);
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(load_profile("batched").unwrap().to_toml().as_bytes())
            .unwrap();
        let profile = ScenarioProfile::from_file(file.path()).unwrap();
        assert_eq!(profile.name, "batched");

        let missing = ScenarioProfile::from_file("/nonexistent/profile.toml");
        assert!(matches!(missing, Err(ProfileError::Io { .. })));
    }

    #[test]
    fn test_shipped_profile_file_parses() {
        let profile =
            ScenarioProfile::from_toml(include_str!("../profiles/deep-queue.toml")).unwrap();
        let mut pipeline = profile.build_pipeline().unwrap();
        let outcome = pipeline.run(profile.tokens(), profile.duration).unwrap();
        assert!(outcome.is_complete());
    }
}
