//! Core domain models
//!
//! Configuration, run options, the typed pipeline context, and the stage
//! and job state machines.

pub mod config;
pub mod context;
pub mod options;
pub mod stage;
pub mod state;

pub use config::{EomConfig, Timing};
pub use context::*;
pub use options::{DeployMode, DeployPlan, EnvironmentId, OptionSet, RunOptions, StageFlags, Timeouts};
pub use stage::{Stage, StageOutcome};
pub use state::*;
