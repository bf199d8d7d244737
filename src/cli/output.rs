//! CLI output formatting

use crate::core::{ExecutionStatus, JobState, RunOptions, StageRecord, StageState};
use crate::execution::ExecutionEvent;
use console::Emoji;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "!");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");
pub static SKIP: Emoji<'_, '_> = Emoji("⏭️  ", "- ");

/// Format a stage state for display
pub fn format_stage_state(state: &StageState) -> String {
    match state {
        StageState::Pending => style("PENDING").dim().to_string(),
        StageState::Running { .. } => style("RUNNING").yellow().to_string(),
        StageState::Completed { .. } => style("COMPLETED").green().to_string(),
        StageState::Skipped { reason, .. } => {
            format!("{} ({})", style("SKIPPED").dim(), style(reason).dim())
        }
        StageState::Fatal { .. } => style("FATAL").red().to_string(),
    }
}

/// Format a job state for display
pub fn format_job_state(state: &JobState) -> String {
    match state {
        JobState::Completed { .. } => style(state.label()).green().to_string(),
        JobState::TimedOut { .. } => style(state.label()).yellow().to_string(),
        JobState::Errored { error, .. } => {
            format!("{}: {}", style(state.label()).red(), style(error).dim())
        }
        other => style(other.label()).dim().to_string(),
    }
}

/// One line per stage: number, name, state
pub fn format_stage_report(records: &[&StageRecord]) -> String {
    records
        .iter()
        .map(|record| {
            format!(
                "  {:>5} {:<16} {}",
                style(record.sequence).dim(),
                record.name,
                format_stage_state(&record.state)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Resolved run options, as printed by `eom plan`
pub fn format_run_options(options: &RunOptions) -> String {
    let mut lines = vec![
        format!("  Environment:   {}", style(options.environment.upper()).bold()),
        format!("  Release:       {}", options.release),
        format!("  User:          {}", options.user),
        format!(
            "  Deploy:        {}",
            options
                .deploy
                .modes()
                .iter()
                .map(|m| m.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        ),
    ];
    if let Some(label) = options.deploy.build_label() {
        lines.push(format!("  Build label:   {}", label));
    }
    if let Some(request) = &options.envreq {
        lines.push(format!("  Env request:   {}", request));
    }
    if let Some(restart) = &options.restart {
        lines.push(format!("  Restart from:  {}", style(restart).yellow()));
    }

    let flags = options.flags;
    let switches = [
        ("skipreimage", flags.skip_reimage),
        ("skipdbgen", flags.skip_dbgen),
        ("noprepatch", flags.no_prepatch),
        ("nopostpatch", flags.no_postpatch),
        ("withsiebel", flags.with_siebel),
        ("content_refresh", flags.content_refresh),
        ("content_tool", flags.content_tool),
        ("validate_bigip", flags.validate_bigip),
        ("close_tickets", flags.close_tickets),
        ("ignorewarnings", flags.ignore_warnings),
    ];
    let on: Vec<&str> = switches
        .iter()
        .filter(|(_, enabled)| *enabled)
        .map(|(name, _)| *name)
        .collect();
    lines.push(format!(
        "  Switches:      {}",
        if on.is_empty() { "none".to_string() } else { on.join(", ") }
    ));

    let t = options.timeouts;
    lines.push(format!(
        "  Timeouts (s):  reimage {}, dbgen {}, verify {}, deploy {}, content {}",
        t.reimage.as_secs(),
        t.dbgen.as_secs(),
        t.verify.as_secs(),
        t.deploy.as_secs(),
        t.content.as_secs()
    ));

    lines.join("\n")
}

/// Format an execution event for display
pub fn format_execution_event(event: &ExecutionEvent) -> String {
    match event {
        ExecutionEvent::PipelineStarted {
            run_id,
            environment,
        } => format!(
            "{} Provisioning {} ({})",
            ROCKET,
            style(environment.to_uppercase()).bold(),
            style(&run_id.to_string()[..8]).dim()
        ),
        ExecutionEvent::StageStarted { sequence, name } => {
            format!("{} {} {}", SPINNER, style(sequence).dim(), style(name).cyan())
        }
        ExecutionEvent::StageCompleted { sequence, name } => {
            format!("{} {} {}", CHECK, style(sequence).dim(), style(name).green())
        }
        ExecutionEvent::StageSkipped {
            sequence,
            name,
            reason,
        } => format!(
            "{} {} {} ({})",
            SKIP,
            style(sequence).dim(),
            style(name).dim(),
            style(reason).dim()
        ),
        ExecutionEvent::StageFailed {
            sequence,
            name,
            error,
        } => format!(
            "{} {} {}: {}",
            CROSS,
            style(sequence).dim(),
            style(name).red(),
            style(error).dim()
        ),
        ExecutionEvent::JobLaunched { name } => {
            format!("{} job {} started", INFO, style(name).cyan())
        }
        ExecutionEvent::JobsWaiting { pending } => {
            format!("{} waiting for {}", SPINNER, style(pending.join(", ")).yellow())
        }
        ExecutionEvent::JobFinished { name, state } => {
            let icon = match state {
                JobState::Completed { .. } => CHECK,
                JobState::TimedOut { .. } => WARN,
                _ => CROSS,
            };
            format!("{} job {} {}", icon, style(name).bold(), format_job_state(state))
        }
        ExecutionEvent::PipelineCompleted { run_id, status } => {
            let status_str = match status {
                ExecutionStatus::Completed => format!("{} completed", style("successfully").green()),
                ExecutionStatus::Failed => style("failed").red().to_string(),
                _ => format!("{:?}", status),
            };
            format!(
                "{} Run ({}) {}",
                INFO,
                style(&run_id.to_string()[..8]).dim(),
                status_str
            )
        }
    }
}
