//! Test: stage ordering and the happy path

use crate::helpers::*;
use envomatic::core::{ExecutionStatus, OptionSet};
use envomatic::stages;

/// A full run with an env request walks every stage and moves the request along
#[tokio::test]
async fn test_full_run_completes_in_order() {
    let options = run_options(OptionSet {
        envreq: Some("ENV-9".to_string()),
        ..OptionSet::default()
    });

    let result = run_pipeline(
        options,
        ScriptedHost::standard(),
        RecordingTicketSystem::default(),
    )
    .await;

    assert_pipeline_completed(&result);
    assert_eq!(result.ctx.state.status, ExecutionStatus::Completed);
    assert_eq!(
        result.started_order(),
        [100, 200, 300, 400, 410, 500, 600, 700, 800, 810, 900, 950, 1000]
    );

    assert!(result.ctx.validation_passed);
    assert!(result.ctx.deploy_succeeded);
    assert_eq!(result.ctx.release_name.as_deref(), Some("ecomm_13.6"));
    assert_eq!(result.ctx.deploy_logs.as_deref(), Some("Deployment logs: /logs/9"));

    // Pipeline session plus one channel per job
    assert_eq!(result.channels_opened, 3);
    let mut jobs = result.launched_jobs();
    jobs.sort();
    assert_eq!(jobs, ["dbgen", "reimage"]);

    let transitions: Vec<String> = result
        .tickets
        .transitions()
        .into_iter()
        .filter(|(id, _)| id == "ENV-9")
        .map(|(_, target)| target)
        .collect();
    assert_eq!(transitions, ["Provisioning", "App Deployment", "Verify"]);

    assert_eq!(result.tickets.created.lock().unwrap().len(), 2);
    assert!(result
        .tickets
        .comments_on("ENV-9")
        .iter()
        .any(|text| text.starts_with("Automatic env-validation")));

    let deploys = result.host.sent("^eom-rabbit-deploy");
    assert_eq!(deploys.len(), 1);
    assert!(deploys[0].contains("--full-deploy --tree 3"));
}

/// Registration order doesn't matter; stages always run by sequence number
#[tokio::test]
async fn test_reversed_registration_still_runs_ascending() {
    let mut registrations = stages::catalog();
    registrations.reverse();

    let result = run_stages(
        registrations,
        run_options(OptionSet::default()),
        ScriptedHost::standard(),
        RecordingTicketSystem::default(),
    )
    .await;

    assert_pipeline_completed(&result);
    let order = result.started_order();
    let mut sorted = order.clone();
    sorted.sort();
    assert_eq!(order, sorted);
    assert_eq!(order.len(), 13);
}

/// Stages after a disabled one still run, and reserved slots skip
#[tokio::test]
async fn test_reserved_and_optional_stages_skip() {
    let result = run_pipeline(
        run_options(OptionSet::default()),
        ScriptedHost::standard(),
        RecordingTicketSystem::default(),
    )
    .await;

    assert_pipeline_completed(&result);
    for sequence in [300, 800, 810, 900, 950] {
        assert!(result.is_skipped(sequence), "stage {} should skip", sequence);
    }
    assert!(result.is_completed(1000));
    assert!(result.host.sent("^/nas/reg/bin/validate_bigip").is_empty());
}
