//! Test: option and configuration errors

use crate::helpers::*;
use envomatic::core::{OptionSet, RunOptions};
use envomatic::{EomConfig, PipelineError};

/// A default full deploy with no build label is refused with exit 1
#[test]
fn test_deploy_without_build_label_is_config_error() {
    let options = OptionSet {
        env: Some("srwd05".to_string()),
        release: Some("rb1306".to_string()),
        ..OptionSet::default()
    };

    let err = RunOptions::resolve(options, None, "relmgt").unwrap_err();
    assert!(
        matches!(err, PipelineError::Config(ref reason) if reason.contains("build label")),
        "unexpected error {:?}",
        err
    );
    assert_eq!(err.exit_code(), 1);

    assert_eq!(
        EomConfig::default().release_name("rb1306").as_deref(),
        Some("ecomm_13.6")
    );
}

/// `--deploy no` needs no build label
#[test]
fn test_no_deploy_needs_no_label() {
    let options = OptionSet {
        env: Some("srwd05".to_string()),
        release: Some("rb1306".to_string()),
        deploy: Some(vec!["no".to_string()]),
        ..OptionSet::default()
    };
    let resolved = RunOptions::resolve(options, None, "relmgt").unwrap();
    assert!(resolved.deploy.is_no());
}

#[test]
fn test_malformed_environment_is_rejected() {
    let err = RunOptions::resolve(
        OptionSet {
            env: Some("srwd5".to_string()),
            ..OptionSet::default()
        },
        Some(&base_options()),
        "relmgt",
    )
    .unwrap_err();
    assert!(matches!(err, PipelineError::InvalidEnvironment(_)));
    assert_eq!(err.exit_code(), 2);
}

/// A release the config doesn't know stops the run before any connection
#[tokio::test]
async fn test_unknown_release_stops_at_login() {
    let options = run_options(OptionSet {
        release: Some("rb9999".to_string()),
        ..OptionSet::default()
    });

    let result = run_pipeline(
        options,
        ScriptedHost::standard(),
        RecordingTicketSystem::default(),
    )
    .await;

    assert_pipeline_failed(&result, 2);
    assert!(matches!(result.result, Err(PipelineError::UnknownRelease(_))));
    assert_eq!(result.channels_opened, 0);
    assert!(result.host.commands().is_empty());
    assert!(result.tickets.created.lock().unwrap().is_empty());
}
