//! Test: Results - results files, profile round-trip and inventory

use crate::helpers::*;
use serde_yaml::Value;
use std::sync::Arc;
use teflo::core::resource::{AnyResource, ResourceKind};
use teflo::core::Stage;
use teflo::persistence::inventory::inventory_file_name;
use teflo::persistence::ResultsBackend;
use teflo::RunOptions;

const ROOT: &str = r#"
name: root
include: [child.yml]
provision:
  - name: db
    provisioner: mock
    groups: [database]
    count: 2
    ansible_params:
      ansible_user: cloud
"#;

const CHILD: &str = r#"
name: child
provision:
  - name: app
    provisioner: mock
    groups: web
execute:
  - name: smoke
    hosts: web
"#;

fn harness() -> Harness {
    Harness::with_files(&[("main.yml", ROOT), ("child.yml", CHILD)])
}

#[tokio::test]
async fn test_results_file_per_node_with_include_list() {
    let mut harness = harness();

    harness.run(&RunOptions::with_stages(&[Stage::Validate])).await.1.unwrap();

    assert_eq!(harness.results.file_names().await, vec!["child_results.yml", "results.yml"]);
    let root = harness.root_results().await;
    assert_eq!(strings(&root["include"]), vec!["child_results.yml"]);
    assert_eq!(strings(&root["passed_tasks"]), vec!["validate"]);
    assert_eq!(root["overall_status"], Value::from(0));

    let child = harness.results.load("child_results.yml").await.unwrap().unwrap();
    assert!(child.get("include").is_none());
    assert_eq!(child["name"], Value::from("child"));
}

#[tokio::test]
async fn test_results_carry_expanded_assets() {
    let mut harness = harness();

    harness.run(&RunOptions::with_stages(&[Stage::Provision])).await.1.unwrap();

    let root = harness.root_results().await;
    let provision = root["provision"].as_sequence().unwrap();
    let names: Vec<&str> = provision.iter().filter_map(|a| a["name"].as_str()).collect();
    assert_eq!(names, vec!["db_0", "db_1"]);
    assert!(provision.iter().all(|a| a.get("count").is_none()));
    assert_eq!(provision[1]["ip_address"], Value::from("10.0.1.2"));
}

#[tokio::test]
async fn test_profile_round_trips() {
    let mut harness = harness();
    harness.run(&RunOptions::with_stages(&[Stage::Provision])).await.1.unwrap();

    let asset = &harness.graph.root().assets[0];
    let profile = teflo::core::Resource::profile(asset);
    let rebuilt = AnyResource::from_profile(ResourceKind::Asset, &profile, Arc::clone(&harness.config)).unwrap();
    assert_eq!(rebuilt.name(), "db_0");
    assert_eq!(profile["groups"], Value::Sequence(vec![Value::from("database")]));
    assert_eq!(rebuilt.profile(), profile);
}

#[tokio::test]
async fn test_inventory_written_after_provision() {
    let mut harness = harness();

    harness.run(&RunOptions::with_stages(&[Stage::Provision])).await.1.unwrap();

    let path = harness.config.inventory_folder().join(inventory_file_name("root"));
    let inventory = std::fs::read_to_string(&path).unwrap();
    assert!(inventory.starts_with("[all]\n"));
    assert!(inventory.contains("app ansible_host=10.0.0.1\n"));
    assert!(inventory.contains("db_0 ansible_host=10.0.1.1 ansible_user=cloud\n"));
    assert!(inventory.contains("[web]\napp\n"));
    assert!(inventory.contains("[database]\ndb_0\ndb_1\n"));
    assert!(!harness.config.inventory_folder().join(".inventory.lock").exists());
}

#[tokio::test]
async fn test_no_inventory_without_provision() {
    let mut harness = harness();

    harness.run(&RunOptions::with_stages(&[Stage::Validate])).await.1.unwrap();

    let path = harness.config.inventory_folder().join(inventory_file_name("root"));
    assert!(!path.exists());
}

#[tokio::test]
async fn test_same_file_name_in_two_folders_keeps_both_results() {
    let mut harness = Harness::with_files(&[
        ("main.yml", "name: root\ninclude: [a/child.yml, b/child.yml]\n"),
        ("a/child.yml", "name: first\n"),
        ("b/child.yml", "name: second\n"),
    ]);

    harness.run(&RunOptions::with_stages(&[Stage::Validate])).await.1.unwrap();

    assert_eq!(
        harness.results.file_names().await,
        vec!["a_child_results.yml", "b_child_results.yml", "results.yml"]
    );
    let root = harness.root_results().await;
    assert_eq!(strings(&root["include"]), vec!["a_child_results.yml", "b_child_results.yml"]);

    let first = harness.results.load("a_child_results.yml").await.unwrap().unwrap();
    let second = harness.results.load("b_child_results.yml").await.unwrap().unwrap();
    assert_eq!(first["name"], Value::from("first"));
    assert_eq!(second["name"], Value::from("second"));
}
