//! Command executor - the single call surface stages use to run commands

use crate::remote::{ChannelError, ExpectOptions, MatchResult, PatternSet, SharedChannel};
use std::time::Duration;
use tracing::{debug, warn};

/// Runs commands on a shared channel
///
/// A timeout is reported as [`MatchResult::TimedOut`] and logged as a
/// warning; deciding whether it is fatal is left to the calling stage.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandExecutor {
    diagnostics: bool,
}

impl CommandExecutor {
    pub fn new(diagnostics: bool) -> Self {
        Self { diagnostics }
    }

    pub fn diagnostics(&self) -> bool {
        self.diagnostics
    }

    /// Run a command and wait for the prompt
    pub async fn run(
        &self,
        channel: &SharedChannel,
        command: &str,
        timeout: Duration,
    ) -> Result<MatchResult, ChannelError> {
        self.execute(channel, command, timeout, PatternSet::prompt())
            .await
    }

    /// Run a command and wait for one of `patterns`
    pub async fn execute(
        &self,
        channel: &SharedChannel,
        command: &str,
        timeout: Duration,
        patterns: PatternSet,
    ) -> Result<MatchResult, ChannelError> {
        self.execute_with(channel, command, timeout, patterns, ExpectOptions::default())
            .await
    }

    pub async fn execute_with(
        &self,
        channel: &SharedChannel,
        command: &str,
        timeout: Duration,
        patterns: PatternSet,
        options: ExpectOptions,
    ) -> Result<MatchResult, ChannelError> {
        debug!("Executing: {}", command);

        let channel = channel.clone();
        let line = command.to_string();
        let result = tokio::task::spawn_blocking(move || {
            let mut channel = channel
                .lock()
                .map_err(|_| ChannelError::Internal("channel lock poisoned".to_string()))?;
            channel.send_and_expect(&line, &patterns, timeout, options)
        })
        .await
        .map_err(|e| ChannelError::Internal(format!("command task failed: {}", e)))??;

        if self.diagnostics {
            debug!("before: {:?}", result.before());
            debug!("after: {:?}", result.after());
        }

        if result.is_timed_out() {
            warn!(
                "'{}' produced no expected output within {} seconds",
                command,
                timeout.as_secs()
            );
        }

        Ok(result)
    }
}
