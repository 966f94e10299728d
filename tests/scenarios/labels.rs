//! Test: Labels - resource selection and up-front rejection

use crate::helpers::*;
use teflo::core::{RunState, Stage};
use teflo::{RunOptions, TefloError};

const LABELLED: &str = r#"
name: labelled
provision:
  - name: a
    provisioner: mock
    labels: front
  - name: b
    provisioner: mock
    labels: back
  - name: c
    provisioner: mock
    labels: [front, extra]
"#;

fn provision_with(labels: &[&str], skip_labels: &[&str]) -> RunOptions {
    RunOptions {
        labels: labels.iter().map(|l| l.to_string()).collect(),
        skip_labels: skip_labels.iter().map(|l| l.to_string()).collect(),
        ..RunOptions::with_stages(&[Stage::Provision])
    }
}

fn created(harness: &Harness) -> Vec<String> {
    let mut created = harness.log.with_prefix("create:");
    created.sort();
    created
}

#[tokio::test]
async fn test_labels_select_resources() {
    let mut harness = Harness::new(LABELLED);

    harness.run(&provision_with(&["front"], &[])).await.1.unwrap();
    assert_eq!(created(&harness), vec!["create:a", "create:c"]);
}

#[tokio::test]
async fn test_skip_labels_exclude_resources() {
    let mut harness = Harness::new(LABELLED);

    harness.run(&provision_with(&[], &["front"])).await.1.unwrap();
    assert_eq!(created(&harness), vec!["create:b"]);
}

#[tokio::test]
async fn test_filtering_keeps_unselected_resources_in_place() {
    let mut harness = Harness::new(LABELLED);

    harness.run(&provision_with(&["back"], &[])).await.1.unwrap();
    assert_eq!(harness.asset_names(), vec!["a", "b", "c"]);
    assert!(harness.graph.root().assets[0].address().is_none());
    assert_eq!(harness.graph.root().assets[1].address().as_deref(), Some("10.0.0.1"));
}

#[tokio::test]
async fn test_unknown_label_aborts_before_any_stage() {
    let mut harness = Harness::new(LABELLED);

    let (report, outcome) = harness.run(&provision_with(&["front", "nope"], &[])).await;
    match outcome {
        Err(TefloError::LabelMismatch { labels }) => assert_eq!(labels, vec!["nope"]),
        other => panic!("unexpected outcome {other:?}"),
    }
    assert!(harness.log.entries().is_empty());
    assert!(report.stages.is_empty());
    assert_eq!(report.state, RunState::NotStarted);
    assert!(harness.results.file_names().await.is_empty());
}

#[tokio::test]
async fn test_unknown_skip_label_is_rejected_too() {
    let mut harness = Harness::new(LABELLED);

    let (_, outcome) = harness.run(&provision_with(&[], &["missing"])).await;
    assert!(matches!(outcome, Err(TefloError::LabelMismatch { .. })));
    assert!(harness.log.entries().is_empty());
}

#[tokio::test]
async fn test_unknown_plugin_aborts_before_any_stage() {
    let sdf = r#"
name: unknown
provision:
  - name: a
    provisioner: mock
  - name: b
    provisioner: nowhere
"#;
    let mut harness = Harness::new(sdf);

    let (report, outcome) = harness.run(&RunOptions::default()).await;
    assert!(matches!(outcome, Err(TefloError::UnknownPlugin { .. })));
    assert!(harness.log.entries().is_empty());
    assert!(report.stages.is_empty());
}
