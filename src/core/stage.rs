//! Stage model

use crate::core::PipelineContext;
use crate::error::PipelineError;
use crate::execution::StageRuntime;
use async_trait::async_trait;

/// How a stage ended when it did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    /// Work done, continue with the next stage
    Advance,
    /// Nothing to do; recorded in the context
    Skipped { reason: String },
}

impl StageOutcome {
    pub fn skipped(reason: impl Into<String>) -> Self {
        StageOutcome::Skipped {
            reason: reason.into(),
        }
    }
}

/// One numbered step of the provisioning pipeline
///
/// Returning `Err` is the fatal outcome: the pipeline stops and the process
/// exits with the error's exit code.
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &str;

    async fn run(
        &self,
        ctx: &mut PipelineContext,
        rt: &mut StageRuntime,
    ) -> Result<StageOutcome, PipelineError>;
}
