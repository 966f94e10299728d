//! Test: Graph Include - building and walking the scenario graph

use crate::helpers::*;
use teflo::core::Stage;
use teflo::error::IncludeErrorKind;
use teflo::{RunOptions, TefloError, TraversalOrder};

fn node(name: &str, includes: &[&str]) -> String {
    let mut text = format!(
        "name: {name}\nprovision:\n  - name: {name}-host\n    provisioner: mock\n"
    );
    if !includes.is_empty() {
        text.push_str(&format!("include: [{}]\n", includes.join(", ")));
    }
    text
}

fn tree() -> Vec<(&'static str, String)> {
    vec![
        ("main.yml", node("main", &["a.yml", "b.yml"])),
        ("a.yml", node("a", &["c.yml"])),
        ("b.yml", node("b", &["d.yml"])),
        ("c.yml", node("c", &[])),
        ("d.yml", node("d", &[])),
    ]
}

fn harness() -> Harness {
    let files = tree();
    let refs: Vec<(&str, &str)> = files.iter().map(|(p, t)| (*p, t.as_str())).collect();
    Harness::with_files(&refs)
}

fn names(harness: &Harness, order: TraversalOrder) -> Vec<String> {
    harness.graph.iter_order(order).map(|s| s.name.clone()).collect()
}

#[test]
fn test_include_cycle_is_rejected() {
    let workspace = Workspace::new();
    workspace.write("main.yml", "name: main\ninclude: [a.yml]\n");
    workspace.write("a.yml", "name: a\ninclude: [b.yml]\n");
    workspace.write("b.yml", "name: b\ninclude: [a.yml]\n");
    let config = workspace.config();

    let err = workspace.load(&config, "main.yml").unwrap_err();
    assert!(matches!(
        err,
        TefloError::GraphInclude {
            kind: IncludeErrorKind::Cycle,
            ..
        }
    ));
}

#[test]
fn test_missing_include_is_reported() {
    let workspace = Workspace::new();
    workspace.write("main.yml", "name: main\ninclude: [gone.yml]\n");
    let config = workspace.config();

    let err = workspace.load(&config, "main.yml").unwrap_err();
    assert!(matches!(
        err,
        TefloError::GraphInclude {
            kind: IncludeErrorKind::Missing,
            ..
        }
    ));
}

#[test]
fn test_traversal_orders_visit_every_node() {
    let harness = harness();
    assert_eq!(harness.graph.node_count(), 5);

    assert_eq!(names(&harness, TraversalOrder::ByDepth), vec!["c", "a", "d", "b", "main"]);
    assert_eq!(names(&harness, TraversalOrder::ByLevel), vec!["c", "d", "a", "b", "main"]);
}

#[test]
fn test_traversal_can_be_repeated() {
    let harness = harness();
    let first = names(&harness, TraversalOrder::ByLevel);
    let second = names(&harness, TraversalOrder::ByLevel);
    assert_eq!(first, second);
    assert_eq!(first.last().map(String::as_str), Some("main"));
}

#[tokio::test]
async fn test_stages_walk_children_first_and_cleanup_reverses() {
    let mut harness = harness();
    let options = RunOptions::with_stages(&[Stage::Provision, Stage::Cleanup]);

    let (report, outcome) = harness.run(&options).await;
    outcome.unwrap();
    assert!(report.succeeded());

    let created = harness.log.with_prefix("create:");
    assert_eq!(
        created,
        vec!["create:c-host", "create:a-host", "create:d-host", "create:b-host", "create:main-host"]
    );

    let deleted = harness.log.with_prefix("delete:");
    let mut expected: Vec<String> = created.iter().map(|c| c.replace("create:", "delete:")).collect();
    expected.reverse();
    assert_eq!(deleted, expected);
}

#[tokio::test]
async fn test_by_level_run_follows_level_order() {
    let mut harness = harness();
    let options = RunOptions {
        order: TraversalOrder::ByLevel,
        ..RunOptions::with_stages(&[Stage::Provision])
    };

    harness.run(&options).await.1.unwrap();
    assert_eq!(
        harness.log.with_prefix("create:"),
        vec!["create:c-host", "create:d-host", "create:a-host", "create:b-host", "create:main-host"]
    );
}
