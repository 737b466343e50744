//! Seeded pipeline generators.
//!
//! Generated profiles reuse the workload crate's `ScenarioProfile`, so every
//! randomized failure can be dumped as TOML and replayed with `tickflow-sim`.

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use tickflow_core::{Rate, Ratio};
use tickflow_workload::profiles::{BucketConfig, SamplingConfig, ScenarioProfile, StageConfig};

/// Seeds that must keep passing across changes.
pub mod seeds {
    /// Fixed regression seeds.
    pub const REGRESSION_SEEDS: &[u64] = &[
        42,
        12345,
        0xDEAD_BEEF,
        999,
        7777,
        0x1337,
        0xCAFE_BABE,
        1,
        u64::MAX,
        0,
    ];

    /// Number of sequential seeds run in CI.
    pub const CI_SEED_COUNT: u64 = 64;
}

/// Name of the sink every generated profile ends with. It also resolves
/// sampling probes.
pub const SINK: &str = "completed";

fn random_rate(rng: &mut ChaCha8Rng) -> Rate {
    Rate::from_fraction(rng.gen_range(1..=5), rng.gen_range(1..=8))
}

fn random_sampling(rng: &mut ChaCha8Rng) -> BucketConfig {
    BucketConfig::Sampling(SamplingConfig {
        initial_rate: random_rate(rng),
        min_rate: Rate::from_fraction(1, 10),
        max_rate: Rate::from_fraction(2, 1),
        additive_increase: None,
        multiplicative_decrease: Ratio::HALF,
        latency_threshold: rng.gen_range(1..=30),
        resolve_stages: Vec::new(),
    })
}

/// A bucket that always makes progress on its own or drains into one that
/// does. `feeds_sink` excludes kinds that would wait on the sink forever.
fn live_bucket(rng: &mut ChaCha8Rng, feeds_sink: bool) -> BucketConfig {
    let kinds = if feeds_sink { 6 } else { 7 };
    match rng.gen_range(0..kinds) {
        0 => BucketConfig::Dial {
            latency: rng.gen_range(1..=20),
        },
        1 => BucketConfig::Rate {
            rate: random_rate(rng),
        },
        2 => BucketConfig::Capacity {
            slack: rng.gen_range(1..=4),
        },
        3 => BucketConfig::Continue,
        4 => BucketConfig::GlobalCapacity {
            max_buffers: rng.gen_range(1..=8),
        },
        5 => random_sampling(rng),
        _ => BucketConfig::TargetCapacity {
            capacity: rng.gen_range(1..=8),
        },
    }
}

/// A bucket that may strand tokens: gates never schedule and thresholds
/// hold a short remainder.
fn any_bucket(rng: &mut ChaCha8Rng, feeds_sink: bool) -> BucketConfig {
    match rng.gen_range(0..4) {
        0 => BucketConfig::Gate {
            count: rng.gen_bool(0.5).then(|| rng.gen_range(1..=4)),
        },
        1 => BucketConfig::Threshold {
            threshold: rng.gen_range(1..=6),
        },
        _ => live_bucket(rng, feeds_sink),
    }
}

fn generate(
    rng: &mut ChaCha8Rng,
    name: &str,
    mut pick: impl FnMut(&mut ChaCha8Rng, bool) -> BucketConfig,
) -> ScenarioProfile {
    let depth = rng.gen_range(1..=4);
    let mut stages: Vec<StageConfig> = (0..depth)
        .map(|i| {
            let bucket = pick(rng, i + 1 == depth);
            StageConfig::new(&format!("stage-{i}"), bucket)
        })
        .collect();
    stages.push(StageConfig::new(SINK, BucketConfig::Stop));

    ScenarioProfile {
        name: name.to_string(),
        description: "Generated pipeline".to_string(),
        tokens: rng.gen_range(1..=200),
        duration: None,
        traced: vec![0],
        stages,
    }
}

/// A pipeline that always delivers every token to the sink.
#[must_use]
pub fn live_profile(rng: &mut ChaCha8Rng) -> ScenarioProfile {
    generate(rng, "live", live_bucket)
}

/// A pipeline that may stall with tokens stranded upstream.
#[must_use]
pub fn any_profile(rng: &mut ChaCha8Rng) -> ScenarioProfile {
    generate(rng, "any", any_bucket)
}

/// Global-capacity buckets of a profile with their bounds.
#[must_use]
pub fn capacity_bounds(profile: &ScenarioProfile) -> Vec<(String, u64)> {
    profile
        .stages
        .iter()
        .filter_map(|stage| match stage.bucket {
            BucketConfig::GlobalCapacity { max_buffers } => Some((stage.name.clone(), max_buffers)),
            _ => None,
        })
        .collect()
}
