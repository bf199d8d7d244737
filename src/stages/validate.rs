//! Stage 500: the job barrier, then environment validation

use crate::core::{JobState, PipelineContext, Stage, StageOutcome};
use crate::error::PipelineError;
use crate::execution::{ExecutionEvent, StageRuntime};
use crate::stages::render_command;
use async_trait::async_trait;
use chrono::Utc;
use regex::Regex;
use tracing::{info, warn};

/// Printed by the validator when every check passed
pub const PASS_SENTINEL: &str = r"env-validate\[[0-9]*\] results: PASS";

/// Warnings that fail the run even with `--ignorewarnings`
pub const UNRECOVERABLE_WARNINGS: &[&str] = &[
    r"env-validate\[[0-9]*\] PRIORITY=WARNING .+sudo test",
    r"env-validate\[[0-9]*\] PRIORITY=WARNING .+ssh test",
    r"env-validate\[[0-9]*\] PRIORITY=WARNING .+D(08|19|16)DE[0-9]{2}.+Failed",
];

/// What the validator output means for the run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Passed,
    /// Not a pass, but nothing unrecoverable and warnings are ignored
    WarningsIgnored,
    Failed(String),
}

fn compile(pattern: &str) -> Result<Regex, PipelineError> {
    Regex::new(pattern)
        .map_err(|e| PipelineError::Config(format!("bad sentinel '{}': {}", pattern, e)))
}

/// Classify validator output
pub fn assess(output: &str, ignore_warnings: bool) -> Result<Verdict, PipelineError> {
    if compile(PASS_SENTINEL)?.is_match(output) {
        return Ok(Verdict::Passed);
    }

    for pattern in UNRECOVERABLE_WARNINGS {
        if let Some(found) = compile(pattern)?.find(output) {
            return Ok(Verdict::Failed(format!(
                "unrecoverable warning: {}",
                found.as_str().trim()
            )));
        }
    }

    if ignore_warnings {
        Ok(Verdict::WarningsIgnored)
    } else {
        Ok(Verdict::Failed("validation did not pass".to_string()))
    }
}

/// Waits for every job, then runs the validator
pub struct ValidateStage;

impl ValidateStage {
    /// Block until all jobs are terminal and copy their outcomes in
    async fn barrier(ctx: &mut PipelineContext, rt: &mut StageRuntime) {
        if rt.jobs.is_empty() {
            return;
        }

        info!("Waiting for {} job(s) to finish", rt.jobs.len());
        let events = rt.events.clone();
        let reports = rt
            .jobs
            .join_all(|pending| {
                events.emit(ExecutionEvent::JobsWaiting {
                    pending: pending.to_vec(),
                })
            })
            .await;

        for report in reports {
            let ticket = match report.name.as_str() {
                "reimage" => ctx.tickets.provisioning.resolved(),
                "dbgen" => ctx.tickets.db_task.resolved(),
                _ => None,
            };
            let note = match &report.state {
                JobState::Completed { summary, .. } => {
                    info!("Job {} done", report.name);
                    format!("{} completed\n{}", report.name, summary)
                }
                JobState::TimedOut { detail, .. } => format!("{} timed out: {}", report.name, detail),
                JobState::Errored { error, .. } => {
                    warn!("Job {} failed, validating anyway: {}", report.name, error);
                    format!("{} failed: {}", report.name, error)
                }
                other => format!("{} ended in state {}", report.name, other.label()),
            };
            if let Some(ticket) = ticket {
                rt.comment_on(ticket, &note).await;
            }

            rt.events.emit(ExecutionEvent::JobFinished {
                name: report.name.clone(),
                state: report.state.clone(),
            });
            match report.name.as_str() {
                "reimage" => ctx.jobs.reimage = Some(report),
                "dbgen" => ctx.jobs.dbgen = Some(report),
                _ => {}
            }
        }
    }

    fn command(ctx: &PipelineContext, rt: &StageRuntime) -> String {
        let mut options = Vec::new();
        if let Some(domain) = ctx.environment.validation_domain() {
            options.push(format!("-d {}", domain));
        }
        options.push(format!("-e {}", ctx.environment.number()));
        render_command(
            &rt.config.commands.validate,
            ctx,
            &[("options", options.join(" ").as_str())],
        )
    }
}

#[async_trait]
impl Stage for ValidateStage {
    fn name(&self) -> &str {
        "validate"
    }

    async fn run(
        &self,
        ctx: &mut PipelineContext,
        rt: &mut StageRuntime,
    ) -> Result<StageOutcome, PipelineError> {
        Self::barrier(ctx, rt).await;

        info!("Performing automatic validation of {}", ctx.environment);
        let command = Self::command(ctx, rt);
        let timeout = ctx.timeouts.verify;
        ctx.validation_issued_at = Some(Utc::now());
        let result = rt.run_command(&command, timeout).await?;

        if result.is_timed_out() {
            rt.comment(
                ctx,
                &format!("env-validate timed out after {} seconds.", timeout.as_secs()),
            )
            .await;
            return Err(PipelineError::ValidationTimeout(timeout));
        }

        rt.comment(ctx, &format!("Automatic env-validation\n{}", result.before()))
            .await;

        match assess(result.before(), ctx.flags.ignore_warnings)? {
            Verdict::Passed => {
                info!("env-validation PASS for {}", ctx.environment);
                ctx.validation_passed = true;
            }
            Verdict::WarningsIgnored => {
                warn!("Warnings present, proceeding anyway");
            }
            Verdict::Failed(reason) => return Err(PipelineError::ValidationFailed(reason)),
        }

        Ok(StageOutcome::Advance)
    }
}
