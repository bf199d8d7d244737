//! Test: validation waits for every provisioning job

use crate::helpers::*;
use envomatic::core::{JobState, OptionSet};
use envomatic::execution::ExecutionEvent;
use std::time::Duration;

/// Slow jobs hold validation back until both have finished
#[tokio::test]
async fn test_validation_waits_for_jobs() {
    let host = ScriptedHost::standard()
        .reply_after("^time provision", "reimage done", Duration::from_millis(300))
        .reply_after("^time dbgen", "dbgen done", Duration::from_millis(150));

    let result = run_pipeline(
        run_options(OptionSet::default()),
        host,
        RecordingTicketSystem::default(),
    )
    .await;

    assert_pipeline_completed(&result);

    let reimage = result.ctx.jobs.reimage.as_ref().expect("reimage report");
    let dbgen = result.ctx.jobs.dbgen.as_ref().expect("dbgen report");
    assert!(matches!(reimage.state, JobState::Completed { .. }));
    assert!(matches!(dbgen.state, JobState::Completed { .. }));

    let validate_sent = result
        .host
        .sent_at("^env-validate")
        .expect("validation command sent");
    for report in [reimage, dbgen] {
        let finished = report.state.finished_at().unwrap();
        assert!(
            finished <= validate_sent,
            "{} finished at {} after validation was sent at {}",
            report.name,
            finished,
            validate_sent
        );
    }
    assert!(result.ctx.validation_issued_at.unwrap() >= reimage.state.finished_at().unwrap());

    assert!(result
        .events
        .iter()
        .any(|event| matches!(event, ExecutionEvent::JobsWaiting { pending } if !pending.is_empty())));
    let finished: Vec<&str> = result
        .events
        .iter()
        .filter_map(|event| match event {
            ExecutionEvent::JobFinished { name, .. } => Some(name.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(finished.len(), 2);
}

/// Each job's outcome is noted on its own ticket
#[tokio::test]
async fn test_job_outcomes_are_commented() {
    let result = run_pipeline(
        run_options(OptionSet::default()),
        ScriptedHost::standard().reply("^time dbgen", "VDB srwd05 provisioned"),
        RecordingTicketSystem::default(),
    )
    .await;

    assert_pipeline_completed(&result);
    assert!(result
        .tickets
        .comments_on("DB-2")
        .iter()
        .any(|text| text.starts_with("dbgen completed") && text.contains("VDB srwd05 provisioned")));
    assert!(result
        .tickets
        .comments_on("PROPROJ-1")
        .iter()
        .any(|text| text.starts_with("reimage completed")));
}
