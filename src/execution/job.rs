//! Jobs - long-running remote operations on their own task
//!
//! A job runs a [`RemoteOperation`] against either a channel it was handed
//! or a fresh one it opens (and always closes) itself. Its state is published
//! through a watch channel; the scheduling task observes it with
//! [`JobHandle::join`]. Faults inside the operation, panics included, end up
//! as [`JobState::Errored`] and never propagate to the scheduler.

use crate::core::{JobReport, JobState};
use crate::error::PipelineError;
use crate::execution::CommandExecutor;
use crate::remote::session::{close_channel, open_channel};
use crate::remote::{ChannelConnector, SharedChannel};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, info_span, warn, Instrument};

/// How an operation ended when it did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationOutcome {
    Completed { summary: String },
    TimedOut { detail: String },
}

/// A kind-specific command sequence run by a job
#[async_trait]
pub trait RemoteOperation: Send + Sync {
    fn kind(&self) -> &'static str;

    async fn run(
        &self,
        executor: &CommandExecutor,
        channel: &SharedChannel,
    ) -> Result<OperationOutcome, PipelineError>;
}

/// Where a job gets its channel from
#[derive(Clone)]
pub enum ChannelSource {
    /// An established channel; not closed by the job
    Shared(SharedChannel),
    /// Opened, logged in and elevated by the job, closed when it ends
    Fresh(Arc<dyn ChannelConnector>),
}

impl ChannelSource {
    pub fn shared(&self) -> Option<&SharedChannel> {
        match self {
            ChannelSource::Shared(channel) => Some(channel),
            ChannelSource::Fresh(_) => None,
        }
    }
}

/// A job that has not started yet
pub struct Job {
    name: String,
    operation: Arc<dyn RemoteOperation>,
    source: ChannelSource,
    executor: CommandExecutor,
}

impl Job {
    pub fn new(
        name: impl Into<String>,
        operation: Arc<dyn RemoteOperation>,
        source: ChannelSource,
        executor: CommandExecutor,
    ) -> Self {
        Self {
            name: name.into(),
            operation,
            source,
            executor,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &ChannelSource {
        &self.source
    }

    /// Spawn the job; consuming `self` means it can only start once
    pub fn start(self) -> JobHandle {
        let started_at = Utc::now();
        let (state_tx, state_rx) = watch::channel(JobState::Running { started_at });
        let shared = self.source.shared().cloned();
        let name = self.name.clone();
        let span = info_span!("job", name = %self.name);

        info!("Starting job {} ({})", self.name, self.operation.kind());

        let Job {
            name: job_name,
            operation,
            source,
            executor,
        } = self;

        let task = tokio::spawn(
            async move {
                let body = tokio::spawn(
                    run_operation(operation, source, executor).in_current_span(),
                );

                let terminal = match body.await {
                    Ok(Ok(OperationOutcome::Completed { summary })) => {
                        info!("Job {} completed", job_name);
                        JobState::Completed {
                            started_at,
                            finished_at: Utc::now(),
                            summary,
                        }
                    }
                    Ok(Ok(OperationOutcome::TimedOut { detail })) => {
                        warn!("Job {} timed out: {}", job_name, detail);
                        JobState::TimedOut {
                            started_at,
                            finished_at: Utc::now(),
                            detail,
                        }
                    }
                    Ok(Err(e)) => {
                        error!("Job {} failed: {}", job_name, e);
                        JobState::Errored {
                            finished_at: Utc::now(),
                            error: e.to_string(),
                        }
                    }
                    Err(e) => {
                        let failure = PipelineError::JobFailure {
                            job: job_name.clone(),
                            reason: if e.is_panic() {
                                "operation panicked".to_string()
                            } else {
                                format!("task aborted: {}", e)
                            },
                        };
                        error!("{}", failure);
                        JobState::Errored {
                            finished_at: Utc::now(),
                            error: failure.to_string(),
                        }
                    }
                };

                state_tx.send_replace(terminal);
            }
            .instrument(span),
        );

        JobHandle {
            name,
            state: state_rx,
            shared,
            _task: task,
        }
    }
}

async fn run_operation(
    operation: Arc<dyn RemoteOperation>,
    source: ChannelSource,
    executor: CommandExecutor,
) -> Result<OperationOutcome, PipelineError> {
    match source {
        ChannelSource::Shared(channel) => operation.run(&executor, &channel).await,
        ChannelSource::Fresh(connector) => {
            let channel = open_channel(connector).await?.shared();
            let result = operation.run(&executor, &channel).await;
            close_channel(&channel).await;
            result
        }
    }
}

/// A started job
pub struct JobHandle {
    name: String,
    state: watch::Receiver<JobState>,
    shared: Option<SharedChannel>,
    _task: JoinHandle<()>,
}

impl JobHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> JobState {
        self.state.borrow().clone()
    }

    pub fn is_finished(&self) -> bool {
        self.state.borrow().is_terminal()
    }

    /// Whether this job was handed `channel`
    pub fn uses_channel(&self, channel: &SharedChannel) -> bool {
        self.shared
            .as_ref()
            .is_some_and(|own| Arc::ptr_eq(own, channel))
    }

    /// Wait up to `timeout` for a terminal state
    ///
    /// Returns `None` if the job is still running; safe to call repeatedly.
    pub async fn join(&mut self, timeout: Duration) -> Option<JobState> {
        match tokio::time::timeout(timeout, self.state.wait_for(JobState::is_terminal)).await {
            Ok(Ok(state)) => Some(state.clone()),
            Ok(Err(_)) => Some(JobState::Errored {
                finished_at: Utc::now(),
                error: "job ended without reporting a result".to_string(),
            }),
            Err(_) => None,
        }
    }

    pub fn report(&self) -> JobReport {
        JobReport {
            name: self.name.clone(),
            state: self.state(),
        }
    }
}
