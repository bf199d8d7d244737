//! Test: validation verdicts

use crate::helpers::*;
use envomatic::core::{OptionSet, StageState};
use envomatic::PipelineError;

/// An ssh warning fails the run with exit 1 and a stop notice on the ticket
#[tokio::test]
async fn test_unrecoverable_warning_stops_run() {
    let host = ScriptedHost::standard().reply("^env-validate", SSH_WARNING);

    let result = run_pipeline(
        run_options(OptionSet {
            skipreimage: Some(true),
            skipdbgen: Some(true),
            ..OptionSet::default()
        }),
        host,
        RecordingTicketSystem::default(),
    )
    .await;

    assert_pipeline_failed(&result, 1);
    assert!(matches!(result.result, Err(PipelineError::ValidationFailed(_))));
    assert!(matches!(result.stage_state(500), StageState::Fatal { .. }));
    assert!(matches!(result.stage_state(700), StageState::Pending));

    assert!(result.host.sent("^eom-rabbit-deploy").is_empty());
    assert!(result
        .tickets
        .comments_on("PROPROJ-1")
        .iter()
        .any(|text| text.contains("stage 500")));
}

/// The ssh warning is unrecoverable even with `--ignorewarnings`
#[tokio::test]
async fn test_ignorewarnings_does_not_cover_ssh() {
    let host = ScriptedHost::standard().reply("^env-validate", SSH_WARNING);

    let result = run_pipeline(
        run_options(OptionSet {
            skipreimage: Some(true),
            skipdbgen: Some(true),
            ignorewarnings: Some(true),
            ..OptionSet::default()
        }),
        host,
        RecordingTicketSystem::default(),
    )
    .await;

    assert_pipeline_failed(&result, 1);
}

/// Other warnings are tolerated with `--ignorewarnings`
#[tokio::test]
async fn test_ignorewarnings_proceeds_past_plain_warning() {
    let host = ScriptedHost::standard().reply("^env-validate", PLAIN_WARNING);

    let result = run_pipeline(
        run_options(OptionSet {
            skipreimage: Some(true),
            skipdbgen: Some(true),
            ignorewarnings: Some(true),
            ..OptionSet::default()
        }),
        host,
        RecordingTicketSystem::default(),
    )
    .await;

    assert_pipeline_completed(&result);
    assert!(!result.ctx.validation_passed);
    assert_eq!(result.host.sent("^eom-rabbit-deploy").len(), 1);
}

/// A validator that never returns times out with exit 1
#[tokio::test]
async fn test_validation_timeout() {
    let host = ScriptedHost::standard().hang("^env-validate");

    let result = run_pipeline(
        run_options(OptionSet {
            skipreimage: Some(true),
            skipdbgen: Some(true),
            verify_to: Some(1),
            ..OptionSet::default()
        }),
        host,
        RecordingTicketSystem::default(),
    )
    .await;

    assert_pipeline_failed(&result, 1);
    assert!(matches!(result.result, Err(PipelineError::ValidationTimeout(_))));
}
