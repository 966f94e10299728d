//! Test: Rollback - cleanup after a failed stage

use crate::helpers::*;
use teflo::core::{RunState, Stage};
use teflo::{RunOptions, TefloError};

fn scenario(asset_extra: &str, action_rc: i32, cleanup_rc: i32) -> String {
    format!(
        r#"
name: rollback
provision:
  - name: web
    provisioner: mock
    groups: web
{asset_extra}
orchestrate:
  - name: setup
    hosts: web
    mock_rc: {action_rc}
    cleanup:
      name: teardown
      mock_rc: {cleanup_rc}
execute:
  - name: tests
    hosts: all
"#
    )
}

#[tokio::test]
async fn test_failed_orchestrate_rolls_back() {
    let mut harness = Harness::new(&scenario("", 1, 0));

    let (report, outcome) = harness.run(&RunOptions::default()).await;
    assert!(matches!(
        outcome,
        Err(TefloError::StageExecution { ref stage, .. }) if stage == "orchestrate"
    ));
    assert!(report.rolled_back);
    assert_eq!(report.state, RunState::Failed(Stage::Orchestrate));

    let entries = harness.log.entries();
    let teardown = entries.iter().position(|e| e == "orchestrate:teardown@web").unwrap();
    let delete = entries.iter().position(|e| e == "delete:web").unwrap();
    assert!(teardown < delete, "action cleanup runs before asset deletion: {entries:?}");
    assert!(harness.log.with_prefix("execute:").is_empty());

    let cleanup = report.stages.iter().find(|s| s.stage == Stage::Cleanup).unwrap();
    assert!(cleanup.failed.is_empty());
}

#[tokio::test]
async fn test_action_cleanup_failure_is_ignored_in_rollback() {
    let mut harness = Harness::new(&scenario("", 1, 5));

    let (report, outcome) = harness.run(&RunOptions::default()).await;
    assert!(matches!(outcome, Err(TefloError::StageExecution { .. })));
    assert!(report.rolled_back);
    assert_eq!(harness.log.with_prefix("delete:"), vec!["delete:web"]);

    let cleanup = report.stages.iter().find(|s| s.stage == Stage::Cleanup).unwrap();
    assert!(cleanup.failed.is_empty());
    assert!(cleanup.passed.iter().any(|t| t == "cleanup:setup"));
}

#[tokio::test]
async fn test_asset_delete_failure_fails_rollback() {
    let mut harness = Harness::new(&scenario("    mock_fail_delete: true", 1, 0));

    let (report, outcome) = harness.run(&RunOptions::default()).await;
    match outcome {
        Err(TefloError::Rollback(message)) => assert!(message.contains("cannot delete web")),
        other => panic!("unexpected outcome {other:?}"),
    }
    assert!(report.rolled_back);
    assert_eq!(report.state, RunState::Failed(Stage::Orchestrate));
}

#[tokio::test]
async fn test_failed_provision_rolls_back() {
    let mut harness = Harness::new(&scenario("    mock_fail: true", 0, 0));

    let (report, outcome) = harness.run(&RunOptions::default()).await;
    assert!(matches!(
        outcome,
        Err(TefloError::StageExecution { ref stage, .. }) if stage == "provision"
    ));
    assert!(report.rolled_back);
    assert_eq!(harness.log.with_prefix("delete:"), vec!["delete:web"]);
    assert!(harness.log.with_prefix("orchestrate:setup").is_empty());
}

#[tokio::test]
async fn test_no_rollback_without_cleanup_stage() {
    let mut harness = Harness::new(&scenario("", 1, 0));
    let options = RunOptions::with_stages(&[Stage::Provision, Stage::Orchestrate, Stage::Execute]);

    let (report, outcome) = harness.run(&options).await;
    assert!(outcome.is_err());
    assert!(!report.rolled_back);
    assert!(harness.log.with_prefix("delete:").is_empty());
    assert!(harness.log.with_prefix("orchestrate:teardown").is_empty());
}

#[tokio::test]
async fn test_no_rollback_before_provision() {
    let sdf = r#"
name: early
provision:
  - name: web
    provisioner: mock
execute:
  - name: tests
    hosts: missing
"#;
    let mut harness = Harness::new(sdf);

    let (report, outcome) = harness.run(&RunOptions::default()).await;
    assert!(matches!(
        outcome,
        Err(TefloError::StageExecution { ref stage, .. }) if stage == "validate"
    ));
    assert!(!report.rolled_back);
    assert!(harness.log.with_prefix("create:").is_empty());
    assert!(harness.log.with_prefix("delete:").is_empty());
}

#[tokio::test]
async fn test_unusable_provision_result_fails_the_stage() {
    let sdf = r#"
name: addresses
provision:
  - name: web
    provisioner: mock
    mock_address_list: true
execute:
  - name: tests
    hosts: all
notifications:
  - name: provision-failed
    on_success: false
    on_tasks: [provision]
"#;
    let mut harness = Harness::new(sdf);

    let (report, outcome) = harness.run(&RunOptions::default()).await;
    match outcome {
        Err(TefloError::StageExecution { ref stage, ref failed_tasks, .. }) => {
            assert_eq!(stage, "provision");
            assert_eq!(failed_tasks, &vec!["provision:web".to_string()]);
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(report.state, RunState::Failed(Stage::Provision));
    assert_eq!(report.failed_stages(), vec![Stage::Provision]);
    assert!(report.rolled_back);
    assert_eq!(harness.log.with_prefix("delete:"), vec!["delete:web"]);

    let root = harness.root_results().await;
    assert_eq!(strings(&root["failed_tasks"]), vec!["provision"]);
    assert_eq!(
        harness.log.with_prefix("notify:"),
        vec!["notify:provision-failed:on_complete:1"]
    );
}

#[tokio::test]
async fn test_failed_teardown_still_deletes_assets() {
    let mut harness = Harness::new(&scenario("", 0, 5));

    let (report, outcome) = harness.run(&RunOptions::default()).await;
    assert!(matches!(
        outcome,
        Err(TefloError::StageExecution { ref stage, .. }) if stage == "cleanup"
    ));
    assert!(!report.rolled_back);
    assert_eq!(report.state, RunState::Failed(Stage::Cleanup));

    let entries = harness.log.entries();
    let teardown = entries.iter().position(|e| e == "orchestrate:teardown@web").unwrap();
    let delete = entries.iter().position(|e| e == "delete:web").unwrap();
    assert!(teardown < delete, "assets are deleted after the failed teardown: {entries:?}");

    let cleanup = report.stages.iter().find(|s| s.stage == Stage::Cleanup).unwrap();
    assert_eq!(cleanup.failed, vec!["cleanup:setup"]);
    assert!(cleanup.passed.iter().any(|t| t == "cleanup:web"));
}
