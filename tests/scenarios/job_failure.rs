//! Test: a failed job is reported but doesn't stop validation

use crate::helpers::*;
use envomatic::core::{JobState, OptionSet};

#[tokio::test]
async fn test_dbgen_error_is_recorded() {
    let host = ScriptedHost::standard().reply(
        "^time dbgen",
        "Provisioning VDB...\r\nError: snapshot not found",
    );

    let result = run_pipeline(
        run_options(OptionSet::default()),
        host,
        RecordingTicketSystem::default(),
    )
    .await;

    assert_pipeline_completed(&result);
    let dbgen = result.ctx.jobs.dbgen.as_ref().expect("dbgen report");
    match &dbgen.state {
        JobState::Errored { error, .. } => assert!(error.contains("snapshot not found")),
        other => panic!("dbgen should have errored, was {:?}", other),
    }
    assert!(result.is_completed(500));
    assert!(result
        .tickets
        .comments_on("DB-2")
        .iter()
        .any(|text| text.starts_with("dbgen failed")));
}

/// A re-image that never returns times out without holding up the run
#[tokio::test]
async fn test_reimage_timeout_is_recorded() {
    let host = ScriptedHost::standard().hang("^time provision");

    let result = run_pipeline(
        run_options(OptionSet {
            reimage_to: Some(1),
            skipdbgen: Some(true),
            ..OptionSet::default()
        }),
        host,
        RecordingTicketSystem::default(),
    )
    .await;

    assert_pipeline_completed(&result);
    let reimage = result.ctx.jobs.reimage.as_ref().expect("reimage report");
    assert!(matches!(reimage.state, JobState::TimedOut { .. }));
    assert!(result.host.sent("^verify-reimage").is_empty());
}
