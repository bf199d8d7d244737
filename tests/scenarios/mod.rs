//! Scenario-based tests for the provisioning pipeline

mod barrier;
mod config_errors;
mod job_failure;
mod ordering;
mod resume;
mod skip_flags;
mod validation_failure;
