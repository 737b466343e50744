//! Randomized pipeline tests.
//!
//! Each test derives pipelines from a seed with `ChaCha8Rng`, runs them to
//! completion or stall, and checks every property against the history.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tickflow_flow::{RunOutcome, StopReason};
use tickflow_workload::profiles::ScenarioProfile;

use crate::properties::{PropertyChecker, PropertyViolation};
use crate::scenarios::{any_profile, capacity_bounds, live_profile, seeds};

fn run(profile: &ScenarioProfile) -> RunOutcome {
    let mut pipeline = profile
        .build_pipeline()
        .unwrap_or_else(|e| panic!("{e}\n{}", profile.to_toml()));
    pipeline
        .run(profile.tokens(), profile.duration)
        .unwrap_or_else(|e| panic!("{e}\n{}", profile.to_toml()))
}

fn check(profile: &ScenarioProfile, outcome: &RunOutcome) -> Vec<PropertyViolation> {
    capacity_bounds(profile)
        .iter()
        .fold(PropertyChecker::new(), |checker, (bucket, bound)| {
            checker.with_capacity_bound(bucket, *bound)
        })
        .check_all(outcome)
}

fn assert_live(seed: u64) {
    let profile = live_profile(&mut ChaCha8Rng::seed_from_u64(seed));
    let outcome = run(&profile);

    let violations = check(&profile, &outcome);
    assert!(
        violations.is_empty(),
        "seed {seed}: {violations:?}\n{}",
        profile.to_toml()
    );
    assert_eq!(
        outcome.reason,
        StopReason::Completed,
        "seed {seed} did not complete\n{}",
        profile.to_toml()
    );
    assert_eq!(outcome.delivered, profile.tokens);
}

#[test]
fn test_random_live_pipelines_regression_seeds() {
    for &seed in seeds::REGRESSION_SEEDS {
        assert_live(seed);
    }
}

#[test]
fn test_random_live_pipelines_ci_seeds() {
    for seed in 0..seeds::CI_SEED_COUNT {
        assert_live(seed.wrapping_mul(0x9E37_79B9_7F4A_7C15));
    }
}

#[test]
fn test_random_stalling_pipelines_conserve_tokens() {
    for seed in 0..seeds::CI_SEED_COUNT {
        let profile = any_profile(&mut ChaCha8Rng::seed_from_u64(seed));
        let outcome = run(&profile);

        let violations = check(&profile, &outcome);
        assert!(
            violations.is_empty(),
            "seed {seed}: {violations:?}\n{}",
            profile.to_toml()
        );
        assert_ne!(outcome.reason, StopReason::DurationElapsed);
        assert!(outcome.delivered <= profile.tokens);
        if outcome.reason == StopReason::Stalled {
            assert!(outcome.delivered < profile.tokens);
        }
    }
}

#[test]
fn test_random_duration_bound() {
    for &seed in seeds::REGRESSION_SEEDS {
        let mut profile = live_profile(&mut ChaCha8Rng::seed_from_u64(seed));
        profile.duration = Some(5);
        let outcome = run(&profile);

        assert!(check(&profile, &outcome).is_empty(), "seed {seed}");
        assert!(outcome.final_tick <= 5, "seed {seed}");
        if outcome.reason != StopReason::Completed {
            assert_eq!(outcome.reason, StopReason::DurationElapsed, "seed {seed}");
        }
    }
}

#[test]
fn test_random_replay_is_identical() {
    for &seed in seeds::REGRESSION_SEEDS {
        let profile = live_profile(&mut ChaCha8Rng::seed_from_u64(seed));
        let first = run(&profile);
        let second = run(&profile);
        assert_eq!(first.history, second.history, "seed {seed}");
        assert_eq!(first.final_tick, second.final_tick);
    }
}
