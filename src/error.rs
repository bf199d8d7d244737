//! Stage-layer error taxonomy
//!
//! Channel and executor code never terminate the process; they return
//! [`ChannelError`]s and outcomes. Stages decide what is fatal and surface it
//! as a `PipelineError`, which maps onto the process exit status.

use crate::credentials::CredentialError;
use crate::remote::ChannelError;
use crate::tickets::TicketError;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid environment id '{0}' (expected letters followed by two digits)")]
    InvalidEnvironment(String),

    #[error("Unknown release '{0}'")]
    UnknownRelease(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Ticket creation failed: {0}")]
    TicketCreation(#[source] TicketError),

    #[error("Invalid or no ticket specified for restart: {0}")]
    InvalidResume(String),

    #[error("Could not read build info for '{label}': {reason}")]
    BuildInfo { label: String, reason: String },

    #[error("Environment validation failed: {0}")]
    ValidationFailed(String),

    #[error("Environment validation timed out after {} seconds", .0.as_secs())]
    ValidationTimeout(Duration),

    #[error("Deployment timed out after {} seconds", .0.as_secs())]
    DeployTimeout(Duration),

    #[error("'{command}' produced no expected output within {} seconds", .timeout.as_secs())]
    ChannelTimeout { command: String, timeout: Duration },

    #[error("{tool} reported an error: {detail}")]
    RemoteTool { tool: String, detail: String },

    #[error("Job '{job}' failed: {reason}")]
    JobFailure { job: String, reason: String },

    #[error(transparent)]
    Channel(ChannelError),
}

impl PipelineError {
    /// Process exit status for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            PipelineError::Config(_)
            | PipelineError::ValidationFailed(_)
            | PipelineError::ValidationTimeout(_)
            | PipelineError::DeployTimeout(_) => 1,
            _ => 2,
        }
    }

    pub fn remote_tool(tool: impl Into<String>, detail: impl Into<String>) -> Self {
        PipelineError::RemoteTool {
            tool: tool.into(),
            detail: detail.into(),
        }
    }
}

impl From<ChannelError> for PipelineError {
    fn from(err: ChannelError) -> Self {
        match err {
            ChannelError::Auth { .. } => PipelineError::Auth(err.to_string()),
            ChannelError::Connection { .. } => PipelineError::Connection(err.to_string()),
            other => PipelineError::Channel(other),
        }
    }
}

impl From<CredentialError> for PipelineError {
    fn from(err: CredentialError) -> Self {
        PipelineError::Auth(err.to_string())
    }
}
