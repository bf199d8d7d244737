//! Pipeline context - the typed state threaded through every stage
//!
//! Owned by the scheduling task. Job outcomes are copied in only after the
//! barrier stage has joined the jobs.

use crate::core::options::{DeployPlan, EnvironmentId, RunOptions, StageFlags, Timeouts};
use crate::core::state::{JobReport, PipelineState, StageRecord, StageState};
use crate::tickets::TicketId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A ticket reference that may not be known yet
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TicketRef {
    Resolved(TicketId),
    #[default]
    Unresolved,
}

impl TicketRef {
    pub fn resolved(&self) -> Option<&TicketId> {
        match self {
            TicketRef::Resolved(id) => Some(id),
            TicketRef::Unresolved => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, TicketRef::Resolved(_))
    }
}

impl From<Option<TicketId>> for TicketRef {
    fn from(id: Option<TicketId>) -> Self {
        id.map_or(TicketRef::Unresolved, TicketRef::Resolved)
    }
}

/// Tracking identifiers for the run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketSet {
    pub provisioning: TicketRef,
    pub db_task: TicketRef,
    pub env_request: TicketRef,
}

impl TicketSet {
    /// Where run progress is reported: the env request if known, else the
    /// provisioning ticket
    pub fn primary(&self) -> Option<&TicketId> {
        self.env_request
            .resolved()
            .or_else(|| self.provisioning.resolved())
    }
}

/// Build metadata reported by the build-info tool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildInfo {
    pub build_label: String,
    pub build_tree_iteration: Option<String>,
    pub build_tree_id: Option<String>,
}

impl BuildInfo {
    /// Parse the JSON object printed by the build-info tool
    ///
    /// The object may be wrapped across several terminal lines.
    pub fn from_output(output: &str) -> Result<Self, String> {
        let joined: String = output
            .split('\n')
            .map(|line| line.trim_end_matches('\r'))
            .collect::<Vec<_>>()
            .join(" ");
        let start = joined.find('{').ok_or("no JSON object in output")?;
        let end = joined.rfind('}').ok_or("unterminated JSON object")?;
        if end < start {
            return Err("unterminated JSON object".to_string());
        }

        let value: Value =
            serde_json::from_str(&joined[start..=end]).map_err(|e| e.to_string())?;

        let text = |key: &str| match value.get(key) {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };

        Ok(Self {
            build_label: text("build_label").ok_or("build_label missing")?,
            build_tree_iteration: text("build_tree_iteration"),
            build_tree_id: text("build_tree_id"),
        })
    }
}

/// Job outcomes, written only after the barrier join
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobReports {
    pub reimage: Option<JobReport>,
    pub dbgen: Option<JobReport>,
}

/// Execution context for a pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineContext {
    pub state: PipelineState,

    pub user: String,
    pub environment: EnvironmentId,
    /// Release id as given (`rb1306`)
    pub release: String,
    /// Tracker name for the release, set by the login stage
    pub release_name: Option<String>,
    pub deploy: DeployPlan,
    pub flags: StageFlags,
    pub timeouts: Timeouts,

    pub tickets: TicketSet,
    /// Ticket id to resume from, bypassing ticket creation
    pub resume_from: Option<TicketId>,

    pub validation_passed: bool,
    pub deploy_succeeded: bool,
    pub build_info: Option<BuildInfo>,
    pub deploy_logs: Option<String>,

    pub jobs: JobReports,
    /// When the validation command went out
    pub validation_issued_at: Option<DateTime<Utc>>,

    pub stages: BTreeMap<u32, StageRecord>,
}

impl PipelineContext {
    pub fn new(options: RunOptions) -> Self {
        let tickets = TicketSet {
            env_request: options.envreq.map(TicketId::new).into(),
            ..TicketSet::default()
        };

        Self {
            state: PipelineState::new(),
            user: options.user,
            environment: options.environment,
            release: options.release,
            release_name: None,
            deploy: options.deploy,
            flags: options.flags,
            timeouts: options.timeouts,
            tickets,
            resume_from: options.restart.map(TicketId::new),
            validation_passed: false,
            deploy_succeeded: false,
            build_info: None,
            deploy_logs: None,
            jobs: JobReports::default(),
            validation_issued_at: None,
            stages: BTreeMap::new(),
        }
    }

    /// Record a stage transition
    pub fn record_stage(&mut self, sequence: u32, name: &str, state: StageState) {
        self.stages.insert(
            sequence,
            StageRecord {
                sequence,
                name: name.to_string(),
                state,
            },
        );
    }

    pub fn stage_state(&self, sequence: u32) -> Option<&StageState> {
        self.stages.get(&sequence).map(|r| &r.state)
    }

    /// Release name, falling back to the raw id before the login stage ran
    pub fn release_label(&self) -> &str {
        self.release_name.as_deref().unwrap_or(&self.release)
    }
}
