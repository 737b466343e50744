//! Tickflow Workload: scenario profiles and the simulation driver.
//!
//! A profile is a declarative description of a pipeline (stages, their
//! constant policy parameters, token count, duration bound). This crate loads
//! profiles from TOML or a built-in set, assembles the pipeline, runs it, and
//! summarizes the outcome. The `tickflow-sim` binary is a thin CLI over it.
//!
//! # Example
//!
//! ```
//! use tickflow_workload::{load_profile, run_profile};
//!
//! let profile = load_profile("rate-limited").unwrap();
//! let run = run_profile(&profile).unwrap();
//! println!("{}", run.summary(&profile.name));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod profiles;
mod summary;

pub use profiles::{
    builtin_profiles, list_profiles, load_profile, BucketConfig, ProfileError, SamplingConfig,
    ScenarioProfile, StageConfig,
};
pub use summary::{run_profile, BucketSummary, RunSummary, ScenarioRun};
