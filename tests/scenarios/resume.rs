//! Test: restarting from an existing ticket

use crate::helpers::*;
use envomatic::core::OptionSet;
use envomatic::tickets::TicketId;
use envomatic::PipelineError;

/// A provisioning ticket with no database task forces the dbgen stage to skip
#[tokio::test]
async fn test_resume_without_db_task_skips_dbgen() {
    let options = run_options(OptionSet {
        restart: Some("PROPROJ-77".to_string()),
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
    assert_eq!(
        result.ctx.tickets.provisioning.resolved(),
        Some(&TicketId::new("PROPROJ-77"))
    );
    assert!(!result.ctx.tickets.db_task.is_resolved());
    assert!(result.is_skipped(410));
    assert!(result.host.sent("^time dbgen").is_empty());
    assert!(result.tickets.created.lock().unwrap().is_empty());
}

/// Linked tickets are picked up from the env request
#[tokio::test]
async fn test_resume_follows_links() {
    let tickets = RecordingTicketSystem::with_links(&[
        ("ENV-5", "PROPROJ-40"),
        ("PROPROJ-40", "DB-41"),
    ]);
    let options = run_options(OptionSet {
        restart: Some("ENV-5".to_string()),
        skipreimage: Some(true),
        ..OptionSet::default()
    });

    let result = run_pipeline(options, ScriptedHost::standard(), tickets).await;

    assert_pipeline_completed(&result);
    assert_eq!(
        result.ctx.tickets.db_task.resolved(),
        Some(&TicketId::new("DB-41"))
    );
    assert!(result.is_completed(410));
    assert_eq!(result.host.sent("^time dbgen").len(), 1);
    // No status changes on a restart
    assert!(!result
        .tickets
        .transitions()
        .iter()
        .any(|(_, target)| target == "App Deployment" || target == "Verify"));
}

#[tokio::test]
async fn test_malformed_resume_ticket() {
    let options = run_options(OptionSet {
        restart: Some("not a ticket".to_string()),
        ..OptionSet::default()
    });

    let result = run_pipeline(
        options,
        ScriptedHost::standard(),
        RecordingTicketSystem::default(),
    )
    .await;

    assert_pipeline_failed(&result, 2);
    assert!(matches!(result.result, Err(PipelineError::InvalidResume(_))));
}
