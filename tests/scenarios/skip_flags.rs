//! Test: skip switches for the provisioning jobs

use crate::helpers::*;
use envomatic::core::OptionSet;
use envomatic::execution::ExecutionEvent;

/// `--skipreimage --skipdbgen` starts no jobs and validates straight away
#[tokio::test]
async fn test_skipped_jobs_are_never_started() {
    let options = run_options(OptionSet {
        skipreimage: Some(true),
        skipdbgen: Some(true),
        ..OptionSet::default()
    });

    let result = run_pipeline(
        options,
        ScriptedHost::standard(),
        RecordingTicketSystem::default(),
    )
    .await;

    assert_pipeline_completed(&result);
    assert!(result.is_skipped(400));
    assert!(result.is_skipped(410));
    assert!(result.is_completed(500));

    assert!(result.launched_jobs().is_empty());
    assert!(!result
        .events
        .iter()
        .any(|event| matches!(event, ExecutionEvent::JobsWaiting { .. } | ExecutionEvent::JobFinished { .. })));
    assert!(result.ctx.jobs.reimage.is_none());
    assert!(result.ctx.jobs.dbgen.is_none());

    assert!(result.host.sent("^time provision").is_empty());
    assert!(result.host.sent("^time dbgen").is_empty());
    assert_eq!(result.channels_opened, 1);

    // Only the provisioning ticket; no database task
    assert!(result.ctx.tickets.provisioning.is_resolved());
    assert!(!result.ctx.tickets.db_task.is_resolved());
    assert_eq!(result.tickets.created.lock().unwrap().len(), 1);
}

/// Patch scripts are skipped by their own switches
#[tokio::test]
async fn test_prepatch_switch() {
    let options = run_options(OptionSet {
        skipreimage: Some(true),
        skipdbgen: Some(true),
        noprepatch: Some(true),
        ..OptionSet::default()
    });

    let result = run_pipeline(
        options,
        ScriptedHost::standard(),
        RecordingTicketSystem::default(),
    )
    .await;

    assert_pipeline_completed(&result);
    assert!(result.is_skipped(600));
    assert!(result.host.sent("envpatch").is_empty());
    assert_eq!(result.host.sent("^eom-rabbit-deploy").len(), 1);
}

/// Each job that does run logs in on a channel of its own
#[tokio::test]
async fn test_each_job_opens_its_own_channel() {
    let options = run_options(OptionSet {
        skipreimage: Some(true),
        ..OptionSet::default()
    });

    let result = run_pipeline(
        options,
        ScriptedHost::standard(),
        RecordingTicketSystem::default(),
    )
    .await;

    assert_pipeline_completed(&result);
    assert_eq!(result.launched_jobs(), ["dbgen"]);
    assert_eq!(result.channels_opened, 2);
    assert_eq!(result.host.sent("^sudo -i -u relmgt").len(), 2);
}
