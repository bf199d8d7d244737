//! Pipeline execution engine

pub mod engine;
pub mod executor;
pub mod job;
pub mod operations;
pub mod scheduler;

pub use engine::{EventBus, EventHandler, ExecutionEvent, StagePipeline, StageRuntime};
pub use executor::CommandExecutor;
pub use job::{ChannelSource, Job, JobHandle, OperationOutcome, RemoteOperation};
pub use operations::{DbGenOperation, ReimageOperation};
pub use scheduler::{JobSet, MAX_CONCURRENT_JOBS};
