//! Per-stage task lists
//!
//! A [`Pipeline`] is built fresh every time a stage runs on a scenario node.
//! Each [`Task`] carries its own copy of the resource it operates on, with
//! host and execute references already resolved against the whole graph.

use crate::core::resource::{Resource, ResourceId, ResourceKind};
use crate::core::{Action, Asset, Execute, Notification, Report, RunOptions, Stage, TaskClass, TaskSpec, Trigger};
use crate::error::{Result, TefloError};
use crate::execution::labels;
use crate::graph::{NodePath, ScenarioGraph};
use crate::plugins::NotificationContext;
use tracing::debug;

/// What a task operates on
#[derive(Debug, Clone)]
pub enum Package {
    /// Scenario-level reference check
    Scenario { name: String, dangling: Vec<String> },
    Asset(Asset),
    Action { action: Action, hosts: Vec<Asset> },
    Execute { execute: Execute, hosts: Vec<Asset> },
    Report { report: Report, executes: Vec<Execute> },
    Notification { notification: Notification, context: NotificationContext },
}

impl Package {
    pub fn name(&self) -> &str {
        match self {
            Package::Scenario { name, .. } => name,
            Package::Asset(asset) => asset.name(),
            Package::Action { action, .. } => action.name(),
            Package::Execute { execute, .. } => execute.name(),
            Package::Report { report, .. } => report.name(),
            Package::Notification { notification, .. } => notification.name(),
        }
    }
}

/// Where a task's resource lives in the graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
    pub node: NodePath,
    /// `None` for the scenario's own tasks
    pub kind: Option<ResourceKind>,
    pub id: ResourceId,
}

/// A task bound to its package
#[derive(Debug, Clone)]
pub struct Task {
    pub spec: TaskSpec,
    pub package: Package,
    pub origin: Origin,
}

/// Ordered tasks of one stage (or trigger) for one scenario node
#[derive(Debug, Clone)]
pub struct Pipeline {
    /// Stage or trigger name
    pub name: String,
    pub class: TaskClass,
    pub concurrent: bool,
    pub tasks: Vec<Task>,
}

impl Pipeline {
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn task_names(&self) -> Vec<&str> {
        self.tasks.iter().map(|t| t.spec.name.as_str()).collect()
    }
}

/// Assets of the whole graph matching any host reference, in graph order
pub fn resolve_hosts(hosts: &[String], graph: &ScenarioGraph) -> Vec<Asset> {
    graph
        .get_assets()
        .into_iter()
        .filter(|asset| hosts.iter().any(|h| asset.matches_host(h)))
        .cloned()
        .collect()
}

/// Executes of the whole graph named in `names`
pub fn resolve_executes(names: &[String], graph: &ScenarioGraph) -> Vec<Execute> {
    graph
        .get_executes()
        .into_iter()
        .filter(|execute| names.iter().any(|n| n == execute.name()))
        .cloned()
        .collect()
}

/// References of a node that resolve to nothing in the graph
pub fn dangling_references(graph: &ScenarioGraph, path: &[usize]) -> Vec<String> {
    let Some(scenario) = graph.node(path) else {
        return Vec::new();
    };
    let assets = graph.get_assets();
    let executes = graph.get_executes();
    let host_known = |host: &String| assets.iter().any(|a| a.matches_host(host));

    let mut dangling = Vec::new();
    let action_hosts = scenario.actions.iter().flat_map(|action| {
        let cleanup = action.cleanup.iter().flat_map(|c| c.hosts.iter().map(move |h| (c.name(), h)));
        action.hosts.iter().map(move |h| (action.name(), h)).chain(cleanup)
    });
    let execute_hosts = scenario
        .executes
        .iter()
        .flat_map(|e| e.hosts.iter().map(move |h| (e.name(), h)));
    for (owner, host) in action_hosts.chain(execute_hosts) {
        if !host_known(host) {
            dangling.push(format!("{}: unknown host '{}'", owner, host));
        }
    }
    for report in &scenario.reports {
        for name in &report.executes {
            if !executes.iter().any(|e| e.name() == name) {
                dangling.push(format!("{}: unknown execute '{}'", report.name(), name));
            }
        }
    }
    dangling
}

fn origin(path: &[usize], kind: Option<ResourceKind>, id: ResourceId) -> Origin {
    Origin {
        node: path.to_vec(),
        kind,
        id,
    }
}

fn matching<'a>(tasks: &'a [TaskSpec], class: TaskClass) -> impl Iterator<Item = &'a TaskSpec> {
    tasks.iter().filter(move |t| t.class == class)
}

/// Builds the pipeline of one stage
#[derive(Debug, Clone)]
pub struct PipelineBuilder {
    stage: Stage,
}

impl PipelineBuilder {
    /// Fails with `InvalidTask` unless `name` is one of the six stages
    pub fn new(name: &str) -> Result<Self> {
        Ok(Self { stage: name.parse()? })
    }

    pub fn for_stage(stage: Stage) -> Self {
        Self { stage }
    }

    pub fn is_task_valid(name: &str) -> bool {
        Stage::is_valid(name)
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Assemble the tasks of the node at `path`
    ///
    /// Scenario tasks first, then assets, actions, executes, reports and
    /// notifications, each list filtered by the run's labels. The cleanup
    /// pipeline is reversed.
    pub fn build(&self, graph: &ScenarioGraph, path: &[usize], options: &RunOptions) -> Result<Pipeline> {
        let scenario = graph
            .node(path)
            .ok_or_else(|| TefloError::InvalidTask(format!("no scenario at {:?}", path)))?;
        let class = TaskClass::from(self.stage);
        let mut tasks = Vec::new();

        for spec in matching(scenario.tasks(), class) {
            tasks.push(Task {
                spec: spec.clone(),
                package: Package::Scenario {
                    name: scenario.name.clone(),
                    dangling: dangling_references(graph, path),
                },
                origin: origin(path, None, scenario.id()),
            });
        }

        for asset in labels::filter(&scenario.assets, options) {
            for spec in matching(asset.tasks(), class) {
                tasks.push(Task {
                    spec: spec.clone(),
                    package: Package::Asset(asset.clone()),
                    origin: origin(path, Some(ResourceKind::Asset), asset.id()),
                });
            }
        }

        for action in labels::filter(&scenario.actions, options) {
            for spec in matching(action.tasks(), class) {
                let target_hosts = match (class, &action.cleanup) {
                    (TaskClass::Cleanup, Some(cleanup)) => &cleanup.hosts,
                    _ => &action.hosts,
                };
                tasks.push(Task {
                    spec: spec.clone(),
                    package: Package::Action {
                        action: action.clone(),
                        hosts: resolve_hosts(target_hosts, graph),
                    },
                    origin: origin(path, Some(ResourceKind::Action), action.id()),
                });
            }
        }

        for execute in labels::filter(&scenario.executes, options) {
            for spec in matching(execute.tasks(), class) {
                tasks.push(Task {
                    spec: spec.clone(),
                    package: Package::Execute {
                        execute: execute.clone(),
                        hosts: resolve_hosts(&execute.hosts, graph),
                    },
                    origin: origin(path, Some(ResourceKind::Execute), execute.id()),
                });
            }
        }

        for report in labels::filter(&scenario.reports, options) {
            for spec in matching(report.tasks(), class) {
                tasks.push(Task {
                    spec: spec.clone(),
                    package: Package::Report {
                        report: report.clone(),
                        executes: resolve_executes(&report.executes, graph),
                    },
                    origin: origin(path, Some(ResourceKind::Report), report.id()),
                });
            }
        }

        for notification in labels::filter(&scenario.notifications, options) {
            for spec in matching(notification.tasks(), class) {
                tasks.push(Task {
                    spec: spec.clone(),
                    package: Package::Notification {
                        notification: notification.clone(),
                        context: NotificationContext {
                            scenario: scenario.name.clone(),
                            ..Default::default()
                        },
                    },
                    origin: origin(path, Some(ResourceKind::Notification), notification.id()),
                });
            }
        }

        if self.stage == Stage::Cleanup {
            tasks.reverse();
        }

        debug!("Built {} pipeline for '{}' with {} task(s)", self.stage, scenario.name, tasks.len());
        Ok(Pipeline {
            name: self.stage.to_string(),
            class,
            concurrent: scenario.config().concurrency_for(class),
            tasks,
        })
    }
}

/// Builds the notify pipeline of one trigger
#[derive(Debug, Clone)]
pub struct NotificationPipelineBuilder {
    trigger: Trigger,
}

impl NotificationPipelineBuilder {
    /// Fails with `InvalidTask` unless `name` is a notification trigger
    pub fn new(name: &str) -> Result<Self> {
        Ok(Self { trigger: name.parse()? })
    }

    pub fn for_trigger(trigger: Trigger) -> Self {
        Self { trigger }
    }

    pub fn is_task_valid(name: &str) -> bool {
        name.parse::<Trigger>().is_ok()
    }

    pub fn trigger(&self) -> Trigger {
        self.trigger
    }

    /// Whether `notification` fires for this trigger given the task outcomes
    pub fn selects(&self, notification: &Notification, passed: &[String], failed: &[String]) -> bool {
        match self.trigger {
            Trigger::OnStart => notification.is_on_start(),
            Trigger::OnDemand => notification.is_on_demand(),
            Trigger::OnComplete => {
                if notification.is_on_start() || notification.is_on_demand() {
                    return false;
                }
                let hits = |outcomes: &[String]| {
                    notification
                        .interest()
                        .iter()
                        .any(|stage| outcomes.iter().any(|o| o == stage.as_str()))
                };
                let on_success = notification.on_success == Some(true);
                let on_failure = notification.on_failure == Some(true);
                match (on_success, on_failure) {
                    (true, true) => hits(passed) || hits(failed),
                    (true, false) => hits(passed) && !hits(failed),
                    (false, true) => hits(failed),
                    (false, false) => false,
                }
            }
        }
    }

    /// Notify tasks of the node at `path`
    pub fn build(
        &self,
        graph: &ScenarioGraph,
        path: &[usize],
        options: &RunOptions,
        passed: &[String],
        failed: &[String],
    ) -> Result<Pipeline> {
        let scenario = graph
            .node(path)
            .ok_or_else(|| TefloError::InvalidTask(format!("no scenario at {:?}", path)))?;
        let mut tasks = Vec::new();

        if !options.no_notify {
            let context = NotificationContext {
                scenario: scenario.name.clone(),
                trigger: Some(self.trigger),
                passed_tasks: passed.to_vec(),
                failed_tasks: failed.to_vec(),
                overall_status: scenario.overall_status,
            };
            for notification in labels::filter(&scenario.notifications, options) {
                if options.skip_notify.iter().any(|n| n == notification.name()) {
                    debug!("Skipping notification '{}'", notification.name());
                    continue;
                }
                if !self.selects(notification, passed, failed) {
                    continue;
                }
                for spec in matching(notification.tasks(), TaskClass::Notify) {
                    tasks.push(Task {
                        spec: spec.clone(),
                        package: Package::Notification {
                            notification: notification.clone(),
                            context: context.clone(),
                        },
                        origin: origin(path, Some(ResourceKind::Notification), notification.id()),
                    });
                }
            }
        }

        Ok(Pipeline {
            name: self.trigger.to_string(),
            class: TaskClass::Notify,
            concurrent: scenario.config().concurrency_for(TaskClass::Notify),
            tasks,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Descriptor, TefloConfig};
    use std::path::Path;
    use std::sync::Arc;

    const SDF: &str = r#"
name: pipeline-test
provision:
  - name: a
    provisioner: beaker
    groups: web
    labels: label1
  - name: b
    provisioner: beaker
    groups: db
    labels: label2
  - name: c
    provisioner: beaker
    groups: web
    labels: label1
orchestrate:
  - name: setup
    hosts: web
    labels: label1
    cleanup:
      name: teardown
      hosts: db
execute:
  - name: tests
    hosts: all
    labels: label2
report:
  - name: results
    importer: polarion
    executes: tests
notifications:
  - name: on-provision
    on_failure: false
    on_tasks: [provision]
  - name: on-execute
    on_failure: false
    on_tasks: [execute]
  - name: started
    on_start: true
  - name: manual
    on_demand: true
"#;

    fn graph(text: &str) -> ScenarioGraph {
        let descriptor = Descriptor::parse(text, Path::new("/ws/main.yml"), "main.yml").unwrap();
        ScenarioGraph::new(descriptor.into_scenario(Arc::new(TefloConfig::default())).unwrap())
    }

    fn build(stage: &str, graph: &ScenarioGraph, options: &RunOptions) -> Pipeline {
        PipelineBuilder::new(stage).unwrap().build(graph, &[], options).unwrap()
    }

    #[test]
    fn test_invalid_stage_is_rejected() {
        assert!(matches!(PipelineBuilder::new("deploy"), Err(TefloError::InvalidTask(_))));
        assert!(NotificationPipelineBuilder::new("provision").is_err());
        assert!(PipelineBuilder::is_task_valid("Cleanup"));
        assert!(NotificationPipelineBuilder::is_task_valid("on_demand"));
    }

    #[test]
    fn test_validate_pipeline_order() {
        let g = graph(SDF);
        let pipeline = build("validate", &g, &RunOptions::default());
        assert_eq!(
            pipeline.task_names(),
            vec![
                "validate:pipeline-test",
                "validate:a",
                "validate:b",
                "validate:c",
                "validate:setup",
                "validate:tests",
                "validate:results",
                "validate:on-provision",
                "validate:on-execute",
                "validate:started",
                "validate:manual",
            ]
        );
        assert!(pipeline.concurrent);
    }

    #[test]
    fn test_cleanup_is_reverse_of_provision() {
        let g = graph(SDF);
        let provision = build("provision", &g, &RunOptions::default());
        let cleanup = build("cleanup", &g, &RunOptions::default());

        let provisioned: Vec<_> = provision.tasks.iter().map(|t| t.package.name().to_string()).collect();
        let cleaned: Vec<_> = cleanup
            .tasks
            .iter()
            .filter(|t| matches!(t.package, Package::Asset(_)))
            .map(|t| t.package.name().to_string())
            .collect();
        let mut reversed = provisioned.clone();
        reversed.reverse();
        assert_eq!(cleaned, reversed);
        assert_eq!(cleanup.task_names()[0], "cleanup:setup");
        assert!(!cleanup.concurrent);
    }

    #[test]
    fn test_hosts_resolved_by_group_and_all() {
        let g = graph(SDF);
        let orchestrate = build("orchestrate", &g, &RunOptions::default());
        match &orchestrate.tasks[0].package {
            Package::Action { hosts, .. } => {
                let names: Vec<_> = hosts.iter().map(|h| h.name()).collect();
                assert_eq!(names, vec!["a", "c"]);
            }
            other => panic!("unexpected package {other:?}"),
        }

        let cleanup = build("cleanup", &g, &RunOptions::default());
        match &cleanup.tasks[0].package {
            Package::Action { hosts, .. } => {
                assert_eq!(hosts.iter().map(|h| h.name()).collect::<Vec<_>>(), vec!["b"]);
            }
            other => panic!("unexpected package {other:?}"),
        }

        let execute = build("execute", &g, &RunOptions::default());
        match &execute.tasks[0].package {
            Package::Execute { hosts, .. } => assert_eq!(hosts.len(), 3),
            other => panic!("unexpected package {other:?}"),
        }

        let report = build("report", &g, &RunOptions::default());
        match &report.tasks[0].package {
            Package::Report { executes, .. } => assert_eq!(executes[0].name(), "tests"),
            other => panic!("unexpected package {other:?}"),
        }
    }

    #[test]
    fn test_labels_filter_pipeline() {
        let g = graph(SDF);
        let options = RunOptions {
            labels: vec!["label2".to_string()],
            ..Default::default()
        };
        let provision = build("provision", &g, &options);
        assert_eq!(provision.task_names(), vec!["provision:b"]);
        let validate = build("validate", &g, &options);
        // scenario task is never label filtered
        assert_eq!(validate.task_names(), vec!["validate:pipeline-test", "validate:b", "validate:tests"]);
    }

    #[test]
    fn test_dangling_references() {
        let g = graph("name: x\norchestrate:\n  - name: setup\n    hosts: ghost\nreport:\n  - name: r\n    importer: polarion\n    executes: nothing\n");
        let validate = build("validate", &g, &RunOptions::default());
        match &validate.tasks[0].package {
            Package::Scenario { dangling, .. } => assert_eq!(dangling.len(), 2),
            other => panic!("unexpected package {other:?}"),
        }
    }

    fn notified(trigger: &str, g: &ScenarioGraph, passed: &[&str], failed: &[&str]) -> Vec<String> {
        let passed: Vec<String> = passed.iter().map(|s| s.to_string()).collect();
        let failed: Vec<String> = failed.iter().map(|s| s.to_string()).collect();
        NotificationPipelineBuilder::new(trigger)
            .unwrap()
            .build(g, &[], &RunOptions::default(), &passed, &failed)
            .unwrap()
            .tasks
            .iter()
            .map(|t| t.package.name().to_string())
            .collect()
    }

    #[test]
    fn test_notification_trigger_selection() {
        let g = graph(SDF);
        assert_eq!(notified("on_complete", &g, &["validate", "provision"], &[]), vec!["on-provision"]);
        assert_eq!(notified("on_start", &g, &[], &[]), vec!["started"]);
        assert_eq!(notified("on_demand", &g, &[], &[]), vec!["manual"]);
        // success-only notifications stay quiet when their stage failed
        assert!(notified("on_complete", &g, &["validate"], &["provision"]).is_empty());
    }

    #[test]
    fn test_notify_toggles() {
        let g = graph(SDF);
        let passed = vec!["provision".to_string()];
        let no_notify = RunOptions {
            no_notify: true,
            ..Default::default()
        };
        let builder = NotificationPipelineBuilder::for_trigger(Trigger::OnComplete);
        assert!(builder.build(&g, &[], &no_notify, &passed, &[]).unwrap().is_empty());

        let skip = RunOptions {
            skip_notify: vec!["on-provision".to_string()],
            ..Default::default()
        };
        assert!(builder.build(&g, &[], &skip, &passed, &[]).unwrap().is_empty());
    }

    #[test]
    fn test_failure_only_notification() {
        let g = graph("name: x\nnotifications:\n  - name: alarm\n    on_success: false\n");
        assert!(notified("on_complete", &g, &["validate"], &[]).is_empty());
        assert_eq!(notified("on_complete", &g, &["validate"], &["execute"]), vec!["alarm"]);
    }
}
