//! Re-image and database-generation operations

use crate::error::PipelineError;
use crate::execution::job::{OperationOutcome, RemoteOperation};
use crate::execution::CommandExecutor;
use crate::remote::SharedChannel;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{info, warn};

/// Output sentinel for a failed database generation
pub const DBGEN_ERROR_SENTINEL: &str = "Error";

/// Re-image the environment, cool down, then verify
#[derive(Debug, Clone)]
pub struct ReimageOperation {
    pub command: String,
    pub timeout: Duration,
    pub cooldown: Duration,
    pub verify_command: String,
    pub verify_timeout: Duration,
}

#[async_trait]
impl RemoteOperation for ReimageOperation {
    fn kind(&self) -> &'static str {
        "reimage"
    }

    async fn run(
        &self,
        executor: &CommandExecutor,
        channel: &SharedChannel,
    ) -> Result<OperationOutcome, PipelineError> {
        let result = executor.run(channel, &self.command, self.timeout).await?;
        if result.is_timed_out() {
            warn!("Re-image operation timed out");
            return Ok(OperationOutcome::TimedOut {
                detail: format!(
                    "re-image did not finish within {} seconds",
                    self.timeout.as_secs()
                ),
            });
        }

        info!(
            "Re-image complete, sleeping {} seconds",
            self.cooldown.as_secs()
        );
        tokio::time::sleep(self.cooldown).await;

        info!("Verifying re-imaging of roles");
        let verify = executor
            .run(channel, &self.verify_command, self.verify_timeout)
            .await?;
        if verify.is_timed_out() {
            return Ok(OperationOutcome::TimedOut {
                detail: format!(
                    "re-image verification did not finish within {} seconds",
                    self.verify_timeout.as_secs()
                ),
            });
        }

        Ok(OperationOutcome::Completed {
            summary: verify.before().trim().to_string(),
        })
    }
}

/// Generate the environment database
///
/// The command carries its own `--timeout`, a safety margin below the
/// channel timeout, so the tool gives up first.
#[derive(Debug, Clone)]
pub struct DbGenOperation {
    pub command: String,
    pub timeout: Duration,
}

impl DbGenOperation {
    /// Seconds to pass to the tool's own `--timeout`
    pub fn tool_timeout(channel_timeout: Duration, margin: Duration) -> u64 {
        channel_timeout.saturating_sub(margin).as_secs()
    }
}

#[async_trait]
impl RemoteOperation for DbGenOperation {
    fn kind(&self) -> &'static str {
        "dbgen"
    }

    async fn run(
        &self,
        executor: &CommandExecutor,
        channel: &SharedChannel,
    ) -> Result<OperationOutcome, PipelineError> {
        let result = executor.run(channel, &self.command, self.timeout).await?;

        // The sentinel counts whether or not the prompt came back
        if let Some(line) = result
            .before()
            .lines()
            .skip(1)
            .find(|line| line.contains(DBGEN_ERROR_SENTINEL))
        {
            warn!("dbgen encountered an error");
            return Err(PipelineError::remote_tool("dbgen", line.trim()));
        }

        if result.is_timed_out() {
            warn!(
                "dbgen did not complete within {} seconds",
                self.timeout.as_secs()
            );
            return Ok(OperationOutcome::TimedOut {
                detail: format!(
                    "dbgen did not complete within {} seconds",
                    self.timeout.as_secs()
                ),
            });
        }

        Ok(OperationOutcome::Completed {
            summary: result.before().trim().to_string(),
        })
    }
}
