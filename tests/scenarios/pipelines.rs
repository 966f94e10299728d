//! Test: Pipelines - stage tasks, expansion and serial failure handling

use crate::helpers::*;
use serde_yaml::Value;
use teflo::core::{RunState, Stage};
use teflo::{RunOptions, TefloError};

const EXPANDING: &str = r#"
name: expanding
provision:
  - name: a
    provisioner: mock
  - name: b
    provisioner: mock
    groups: web
    count: 2
  - name: c
    provisioner: mock
orchestrate:
  - name: setup
    hosts: web
execute:
  - name: tests
    hosts: all
report:
  - name: results
    importer: mock
    executes: tests
"#;

#[tokio::test]
async fn test_expanded_assets_keep_declaration_order() {
    let mut harness = Harness::new(EXPANDING);

    harness.run(&RunOptions::with_stages(&[Stage::Provision])).await.1.unwrap();

    assert_eq!(harness.asset_names(), vec!["a", "b_0", "b_1", "c"]);
    let b1 = &harness.graph.root().assets[2];
    assert_eq!(b1.address().as_deref(), Some("10.0.1.2"));
    assert_eq!(b1.groups, vec!["web"]);
    assert!(!b1.params.contains_key("count"));
}

#[tokio::test]
async fn test_later_stages_see_expanded_hosts() {
    let mut harness = Harness::new(EXPANDING);
    let options = RunOptions::with_stages(&[Stage::Provision, Stage::Orchestrate, Stage::Execute, Stage::Report]);

    let (report, outcome) = harness.run(&options).await;
    outcome.unwrap();
    assert_eq!(report.state, RunState::Done);

    assert_eq!(harness.log.with_prefix("orchestrate:"), vec!["orchestrate:setup@b_0+b_1"]);
    assert_eq!(harness.log.with_prefix("execute:"), vec!["execute:tests"]);
    assert_eq!(harness.log.with_prefix("import:"), vec!["import:results"]);

    let root = harness.graph.root();
    assert_eq!(root.executes[0].artifact_locations, vec!["artifacts/tests.xml"]);
    assert_eq!(root.reports[0].import_results.len(), 1);
    assert_eq!(root.reports[0].status, 0);
}

#[tokio::test]
async fn test_serial_stage_stops_at_first_failure() {
    let sdf = r#"
name: serial
orchestrate:
  - name: first
    hosts: all
    mock_rc: 2
  - name: second
    hosts: all
execute:
  - name: tests
    hosts: all
provision:
  - name: local
    ip_address: 127.0.0.1
"#;
    let mut harness = Harness::new(sdf);
    let options = RunOptions::with_stages(&[Stage::Orchestrate, Stage::Execute]);

    let (report, outcome) = harness.run(&options).await;
    match outcome {
        Err(TefloError::StageExecution { stage, failed_tasks, message }) => {
            assert_eq!(stage, "orchestrate");
            assert_eq!(failed_tasks, vec!["orchestrate:first"]);
            assert!(message.contains("returned 2"));
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(harness.log.with_prefix("orchestrate:"), vec!["orchestrate:first@local"]);
    assert!(harness.log.with_prefix("execute:").is_empty());
    assert_eq!(report.state, RunState::Failed(Stage::Orchestrate));
    assert_eq!(harness.graph.root().actions[0].status, 1);
}

#[tokio::test]
async fn test_invalid_return_code_fails_execute() {
    let sdf = r#"
name: rc
provision:
  - name: local
    ip_address: 127.0.0.1
execute:
  - name: allowed
    hosts: all
    mock_rc: 3
    valid_rc: [0, 3]
  - name: rejected
    hosts: all
    mock_rc: 3
"#;
    let mut harness = Harness::new(sdf);

    let (report, outcome) = harness.run(&RunOptions::with_stages(&[Stage::Execute])).await;
    assert!(outcome.is_err());
    assert_eq!(report.stages[0].passed, vec!["execute:allowed"]);
    assert_eq!(report.stages[0].failed, vec!["execute:rejected"]);

    let executes = &harness.graph.root().executes;
    assert_eq!(executes[0].status, 0);
    assert_eq!(executes[1].status, 1);
}

#[tokio::test]
async fn test_validate_reports_dangling_hosts() {
    let sdf = r#"
name: dangling
provision:
  - name: local
    ip_address: 127.0.0.1
execute:
  - name: tests
    hosts: nowhere
"#;
    let mut harness = Harness::new(sdf);

    let (report, outcome) = harness.run(&RunOptions::with_stages(&[Stage::Validate])).await;
    assert!(matches!(outcome, Err(TefloError::StageExecution { .. })));
    assert!(report.stages[0].failed.iter().any(|t| t == "validate:dangling"));

    let doc = harness.root_results().await;
    assert_eq!(doc["overall_status"], Value::from(1));
}
