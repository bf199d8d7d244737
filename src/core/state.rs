//! Execution state models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Overall pipeline execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    /// Pipeline has not started
    Pending,
    /// Pipeline is currently running
    Running,
    /// Every stage completed or was skipped
    Completed,
    /// A stage ended fatally
    Failed,
}

/// State of a single stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StageState {
    Pending,
    Running {
        started_at: DateTime<Utc>,
    },
    Completed {
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
    },
    Skipped {
        reason: String,
        skipped_at: DateTime<Utc>,
    },
    /// The only terminal state that aborts the pipeline
    Fatal {
        error: String,
        failed_at: DateTime<Utc>,
    },
}

impl StageState {
    /// Check if stage is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StageState::Completed { .. } | StageState::Skipped { .. } | StageState::Fatal { .. }
        )
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, StageState::Skipped { .. })
    }
}

/// What happened to one stage of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub sequence: u32,
    pub name: String,
    pub state: StageState,
}

/// State of a long-running job
///
/// Moves `Created → Running → {Completed, TimedOut, Errored}` and never
/// leaves a terminal state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JobState {
    Created,
    Running {
        started_at: DateTime<Utc>,
    },
    Completed {
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        summary: String,
    },
    TimedOut {
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        detail: String,
    },
    Errored {
        finished_at: DateTime<Utc>,
        error: String,
    },
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed { .. } | JobState::TimedOut { .. } | JobState::Errored { .. }
        )
    }

    /// When the job reached its terminal state
    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        match self {
            JobState::Completed { finished_at, .. }
            | JobState::TimedOut { finished_at, .. }
            | JobState::Errored { finished_at, .. } => Some(*finished_at),
            JobState::Created | JobState::Running { .. } => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            JobState::Created => "created",
            JobState::Running { .. } => "running",
            JobState::Completed { .. } => "completed",
            JobState::TimedOut { .. } => "timed out",
            JobState::Errored { .. } => "errored",
        }
    }
}

/// Terminal outcome of a job, as copied into the pipeline context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobReport {
    pub name: String,
    pub state: JobState,
}

/// Overall pipeline state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineState {
    /// Unique run ID
    pub run_id: Uuid,

    pub status: ExecutionStatus,

    pub started_at: Option<DateTime<Utc>>,

    pub completed_at: Option<DateTime<Utc>>,
}

impl PipelineState {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            status: ExecutionStatus::Pending,
            started_at: None,
            completed_at: None,
        }
    }

    pub fn start(&mut self) {
        self.status = ExecutionStatus::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn complete(&mut self) {
        self.status = ExecutionStatus::Completed;
        self.completed_at = Some(Utc::now());
    }

    pub fn fail(&mut self) {
        self.status = ExecutionStatus::Failed;
        self.completed_at = Some(Utc::now());
    }
}

impl Default for PipelineState {
    fn default() -> Self {
        Self::new()
    }
}
