//! Stage pipeline - runs the numbered stages in order against one context

use crate::core::config::EomConfig;
use crate::core::{ExecutionStatus, JobState, PipelineContext, Stage, StageOutcome, StageState, Timing};
use crate::error::PipelineError;
use crate::execution::job::Job;
use crate::execution::scheduler::{JobSet, MAX_CONCURRENT_JOBS};
use crate::execution::CommandExecutor;
use crate::remote::session::close_channel;
use crate::remote::{ChannelConnector, ChannelError, MatchResult, PatternSet, SharedChannel};
use crate::tickets::{TicketId, TicketSystem};
use chrono::Utc;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Events that can occur during pipeline execution
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    PipelineStarted {
        run_id: Uuid,
        environment: String,
    },
    StageStarted {
        sequence: u32,
        name: String,
    },
    StageCompleted {
        sequence: u32,
        name: String,
    },
    StageSkipped {
        sequence: u32,
        name: String,
        reason: String,
    },
    StageFailed {
        sequence: u32,
        name: String,
        error: String,
    },
    JobLaunched {
        name: String,
    },
    JobsWaiting {
        pending: Vec<String>,
    },
    JobFinished {
        name: String,
        state: JobState,
    },
    PipelineCompleted {
        run_id: Uuid,
        status: ExecutionStatus,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(ExecutionEvent) + Send + Sync>;

/// Fan-out of execution events to registered handlers
#[derive(Clone, Default)]
pub struct EventBus {
    handlers: Arc<Mutex<Vec<EventHandler>>>,
}

impl EventBus {
    /// Add an event handler
    pub fn add_handler<F>(&self, handler: F)
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        if let Ok(mut handlers) = self.handlers.lock() {
            handlers.push(Arc::new(handler));
        }
    }

    /// Emit an event to all handlers
    pub fn emit(&self, event: ExecutionEvent) {
        let handlers = match self.handlers.lock() {
            Ok(handlers) => handlers.clone(),
            Err(_) => return,
        };
        for handler in handlers.iter() {
            handler(event.clone());
        }
    }
}

/// Collaborators and settings shared by all stages
pub struct StageRuntime {
    pub executor: CommandExecutor,
    pub connector: Arc<dyn ChannelConnector>,
    /// The pipeline's own channel, opened by the login stage
    pub session: Option<SharedChannel>,
    pub tickets: Arc<dyn TicketSystem>,
    pub jobs: JobSet,
    pub config: EomConfig,
    pub timing: Timing,
    pub events: EventBus,
}

impl StageRuntime {
    pub fn new(
        config: EomConfig,
        connector: Arc<dyn ChannelConnector>,
        tickets: Arc<dyn TicketSystem>,
        executor: CommandExecutor,
    ) -> Self {
        let timing = config.timing();
        Self {
            executor,
            connector,
            session: None,
            tickets,
            jobs: JobSet::new(MAX_CONCURRENT_JOBS, timing.job_poll_interval),
            config,
            timing,
            events: EventBus::default(),
        }
    }

    /// Replace the fixed waits
    pub fn with_timing(mut self, timing: Timing) -> Self {
        self.timing = timing;
        self.jobs = JobSet::new(MAX_CONCURRENT_JOBS, timing.job_poll_interval);
        self
    }

    /// The pipeline channel; only available after login
    pub fn session(&self) -> Result<&SharedChannel, PipelineError> {
        self.session
            .as_ref()
            .ok_or(PipelineError::Channel(ChannelError::NotLoggedIn))
    }

    /// Run a command on the pipeline channel and wait for the prompt
    pub async fn run_command(
        &self,
        command: &str,
        timeout: Duration,
    ) -> Result<MatchResult, PipelineError> {
        self.expect(command, timeout, PatternSet::prompt()).await
    }

    /// Run a command on the pipeline channel and wait for `patterns`
    pub async fn expect(
        &self,
        command: &str,
        timeout: Duration,
        patterns: PatternSet,
    ) -> Result<MatchResult, PipelineError> {
        let session = self.session()?;
        Ok(self
            .executor
            .execute(session, command, timeout, patterns)
            .await?)
    }

    /// Start a job and announce it
    pub async fn launch(&mut self, job: Job) -> Result<(), PipelineError> {
        let name = job.name().to_string();
        self.jobs.launch(job).await?;
        self.events.emit(ExecutionEvent::JobLaunched { name });
        Ok(())
    }

    /// Best-effort comment on the run's primary ticket
    pub async fn comment(&self, ctx: &PipelineContext, text: &str) {
        if let Some(ticket) = ctx.tickets.primary() {
            self.comment_on(ticket, text).await;
        }
    }

    /// Best-effort comment on a specific ticket
    pub async fn comment_on(&self, ticket: &TicketId, text: &str) {
        if let Err(e) = self.tickets.add_comment(ticket, text).await {
            warn!("Could not comment on {}: {}", ticket, e);
        }
    }

    /// Close the pipeline channel
    pub async fn close_session(&mut self) {
        if let Some(session) = self.session.take() {
            close_channel(&session).await;
        }
    }
}

/// The ordered collection of stages
pub struct StagePipeline {
    stages: Vec<(u32, Box<dyn Stage>)>,
}

impl StagePipeline {
    /// Sort registrations by sequence number; numbers must be unique
    pub fn new(mut registrations: Vec<(u32, Box<dyn Stage>)>) -> Result<Self, PipelineError> {
        registrations.sort_by_key(|(sequence, _)| *sequence);

        let mut seen = HashSet::new();
        for (sequence, stage) in &registrations {
            if !seen.insert(*sequence) {
                return Err(PipelineError::Config(format!(
                    "duplicate stage sequence number {} ({})",
                    sequence,
                    stage.name()
                )));
            }
        }

        Ok(Self {
            stages: registrations,
        })
    }

    /// `(sequence, name)` in execution order
    pub fn plan(&self) -> Vec<(u32, &str)> {
        self.stages
            .iter()
            .map(|(sequence, stage)| (*sequence, stage.name()))
            .collect()
    }

    /// Execute the entire pipeline
    ///
    /// Stops at the first fatal stage, after a best-effort comment on the
    /// primary ticket. The pipeline channel is closed either way.
    pub async fn execute(
        &self,
        ctx: &mut PipelineContext,
        rt: &mut StageRuntime,
    ) -> Result<(), PipelineError> {
        let run_id = ctx.state.run_id;
        info!("Starting pipeline for {} ({})", ctx.environment, run_id);
        ctx.state.start();
        rt.events.emit(ExecutionEvent::PipelineStarted {
            run_id,
            environment: ctx.environment.to_string(),
        });

        for (sequence, stage) in &self.stages {
            ctx.record_stage(*sequence, stage.name(), StageState::Pending);
        }

        for (sequence, stage) in &self.stages {
            let sequence = *sequence;
            let name = stage.name().to_string();
            let started_at = Utc::now();

            info!("Stage {} ({}) entry", sequence, name);
            ctx.record_stage(sequence, &name, StageState::Running { started_at });
            rt.events.emit(ExecutionEvent::StageStarted {
                sequence,
                name: name.clone(),
            });

            match stage.run(ctx, rt).await {
                Ok(StageOutcome::Advance) => {
                    ctx.record_stage(
                        sequence,
                        &name,
                        StageState::Completed {
                            started_at,
                            completed_at: Utc::now(),
                        },
                    );
                    rt.events.emit(ExecutionEvent::StageCompleted { sequence, name });
                }
                Ok(StageOutcome::Skipped { reason }) => {
                    info!("Stage {} ({}) skipped: {}", sequence, name, reason);
                    ctx.record_stage(
                        sequence,
                        &name,
                        StageState::Skipped {
                            reason: reason.clone(),
                            skipped_at: Utc::now(),
                        },
                    );
                    rt.events.emit(ExecutionEvent::StageSkipped {
                        sequence,
                        name,
                        reason,
                    });
                }
                Err(e) => {
                    error!("Stage {} ({}) failed: {}", sequence, name, e);
                    ctx.record_stage(
                        sequence,
                        &name,
                        StageState::Fatal {
                            error: e.to_string(),
                            failed_at: Utc::now(),
                        },
                    );
                    rt.events.emit(ExecutionEvent::StageFailed {
                        sequence,
                        name: name.clone(),
                        error: e.to_string(),
                    });

                    rt.comment(
                        ctx,
                        &format!(
                            "env-o-matic stopped at stage {} ({}) for {}: {}",
                            sequence, name, ctx.environment, e
                        ),
                    )
                    .await;

                    ctx.state.fail();
                    rt.close_session().await;
                    rt.events.emit(ExecutionEvent::PipelineCompleted {
                        run_id,
                        status: ExecutionStatus::Failed,
                    });
                    return Err(e);
                }
            }
        }

        ctx.state.complete();
        rt.close_session().await;
        info!("Pipeline finished for {}", ctx.environment);
        rt.events.emit(ExecutionEvent::PipelineCompleted {
            run_id,
            status: ExecutionStatus::Completed,
        });
        Ok(())
    }
}
