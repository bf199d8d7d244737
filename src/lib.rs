//! envomatic - provision, validate and deploy virtual environments
//!
//! A staged pipeline drives commands over interactive SSH sessions on a
//! registration host. Long operations (re-image, database generation) run
//! as concurrent jobs that the validation stage waits for.

pub mod cli;
pub mod core;
pub mod credentials;
pub mod error;
pub mod execution;
pub mod remote;
pub mod stages;
pub mod tickets;

// Re-export commonly used types
pub use core::{EomConfig, ExecutionStatus, PipelineContext, RunOptions, Stage, StageOutcome};
pub use error::PipelineError;
pub use execution::{CommandExecutor, ExecutionEvent, StagePipeline, StageRuntime};
pub use remote::{Channel, ChannelConnector, ChannelError, MatchResult, PatternSet, Transport};
pub use tickets::{TicketId, TicketSystem};
