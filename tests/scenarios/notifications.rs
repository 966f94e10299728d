//! Test: Notifications - trigger selection at start, completion and on demand

use crate::helpers::*;
use teflo::RunOptions;

fn scenario(execute_rc: i32) -> String {
    format!(
        r#"
name: notify
provision:
  - name: local
    ip_address: 127.0.0.1
execute:
  - name: tests
    hosts: all
    mock_rc: {execute_rc}
notifications:
  - name: start
    on_start: true
  - name: always
  - name: exec-success
    on_failure: false
    on_tasks: [execute]
  - name: exec-failure
    on_success: false
    on_tasks: execute
  - name: report-only
    on_tasks: [report]
  - name: demand
    on_demand: true
"#
    )
}

fn notified(harness: &Harness) -> Vec<String> {
    let mut entries = harness.log.with_prefix("notify:");
    entries.sort();
    entries
}

#[tokio::test]
async fn test_successful_run_selection() {
    let mut harness = Harness::new(&scenario(0));

    harness.run(&RunOptions::default()).await.1.unwrap();
    assert_eq!(
        notified(&harness),
        vec![
            "notify:always:on_complete:0",
            "notify:exec-success:on_complete:0",
            "notify:start:on_start:0",
        ]
    );
}

#[tokio::test]
async fn test_failed_run_selection() {
    let mut harness = Harness::new(&scenario(1));

    let (_, outcome) = harness.run(&RunOptions::default()).await;
    assert!(outcome.is_err());
    assert_eq!(
        notified(&harness),
        vec![
            "notify:always:on_complete:1",
            "notify:exec-failure:on_complete:1",
            "notify:start:on_start:0",
        ]
    );
}

#[tokio::test]
async fn test_skip_notify_and_no_notify() {
    let mut harness = Harness::new(&scenario(0));
    let options = RunOptions {
        skip_notify: vec!["always".to_string(), "start".to_string()],
        ..Default::default()
    };
    harness.run(&options).await.1.unwrap();
    assert_eq!(notified(&harness), vec!["notify:exec-success:on_complete:0"]);

    let mut quiet = Harness::new(&scenario(0));
    let options = RunOptions {
        no_notify: true,
        ..Default::default()
    };
    quiet.run(&options).await.1.unwrap();
    assert!(notified(&quiet).is_empty());
}

#[tokio::test]
async fn test_on_demand_fires_only_demand_notifications() {
    let mut harness = Harness::new(&scenario(0));

    let results = harness
        .engine
        .notify(&mut harness.graph, &RunOptions::default())
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].task, "notify:demand");
    assert_eq!(harness.log.entries(), vec!["notify:demand:on_demand:0"]);
}
