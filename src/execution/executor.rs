//! Task runner - executes the tasks of a pipeline against their plugins
//!
//! Every task works on its own copy of its resource and hands back an
//! immutable [`TaskResult`]. Folding results into the scenario graph is the
//! caller's job.

use crate::core::resource::{AnyResource, PluginRef, Resource};
use crate::core::{Asset, TaskClass, TaskOutcome, TefloConfig};
use crate::execution::pipeline::{Origin, Package, Pipeline, Task};
use crate::execution::scheduler::SchedulingStrategy;
use crate::plugins::{Executor, Importer, Notifier, Orchestrator, PluginError, PluginRegistry, Provisioner};
use serde_yaml::Mapping;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// Outcome of one task, returned to the coordinator
#[derive(Debug, Clone)]
pub struct TaskResult {
    pub task: String,
    pub class: TaskClass,
    pub origin: Origin,
    pub outcome: TaskOutcome,

    /// Profiles replacing the resource (count expansion)
    pub rvalue: Option<Vec<Mapping>>,

    /// The resource as the task left it
    pub resource: Option<AnyResource>,

    pub duration: Duration,
}

/// Whether the pipeline runs as ordinary forward work or as rollback cleanup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    #[default]
    Normal,
    /// Orchestrator cleanup failures are suppressed and serial pipelines keep going
    Rollback,
}

struct Dispatched {
    outcome: TaskOutcome,
    rvalue: Option<Vec<Mapping>>,
    resource: Option<AnyResource>,
}

impl Dispatched {
    fn passed(resource: Option<AnyResource>) -> Self {
        Self {
            outcome: TaskOutcome::Passed,
            rvalue: None,
            resource,
        }
    }

    fn failed(message: impl Into<String>, resource: Option<AnyResource>) -> Self {
        Self {
            outcome: TaskOutcome::Failed(message.into()),
            rvalue: None,
            resource,
        }
    }

    fn from_call(result: Result<(), PluginError>, resource: Option<AnyResource>) -> Self {
        match result {
            Ok(()) => Self::passed(resource),
            Err(e) => Self::failed(e.to_string(), resource),
        }
    }
}

macro_rules! plugin {
    ($registry:expr, $binding:expr, $lookup:ident) => {
        match resolve(&$binding, |name| $registry.$lookup(name)) {
            Ok(plugin) => plugin,
            Err(message) => return Dispatched::failed(message, None),
        }
    };
}

fn resolve<P: ?Sized>(
    binding: &PluginRef<P>,
    lookup: impl FnOnce(&str) -> crate::error::Result<Arc<P>>,
) -> Result<Arc<P>, String> {
    match binding.plugin() {
        Some(plugin) => Ok(Arc::clone(plugin)),
        None => lookup(binding.name()).map_err(|e| e.to_string()),
    }
}

/// Runs pipelines on a pool of tokio tasks
#[derive(Clone)]
pub struct TaskRunner {
    config: Arc<TefloConfig>,
    registry: Arc<PluginRegistry>,
}

impl TaskRunner {
    pub fn new(config: Arc<TefloConfig>, registry: Arc<PluginRegistry>) -> Self {
        Self { config, registry }
    }

    /// Run every task of `pipeline`; results come back in pipeline order
    ///
    /// A sequential pipeline stops at its first failed task unless running in
    /// rollback mode or tearing things down.
    pub async fn run_pipeline(&self, pipeline: Pipeline, mode: RunMode) -> Vec<TaskResult> {
        let strategy = SchedulingStrategy::for_pipeline(&pipeline, &self.config);
        info!(
            "Running {} pipeline: {} task(s), {:?}",
            pipeline.name,
            pipeline.len(),
            strategy
        );

        if strategy.is_sequential() {
            let mut results = Vec::with_capacity(pipeline.len());
            for task in pipeline.tasks {
                let result = Self::run_task(Arc::clone(&self.registry), task, mode).await;
                let stop =
                    result.outcome.is_failure() && mode == RunMode::Normal && pipeline.class != TaskClass::Cleanup;
                results.push(result);
                if stop {
                    warn!("Stopping {} pipeline after first failure", pipeline.name);
                    break;
                }
            }
            return results;
        }

        let semaphore = strategy.limit().map(|n| Arc::new(Semaphore::new(n)));
        let mut pending: Vec<(String, TaskClass, Origin)> = Vec::with_capacity(pipeline.len());
        let mut set = JoinSet::new();

        for (idx, task) in pipeline.tasks.into_iter().enumerate() {
            pending.push((task.spec.name.clone(), task.spec.class, task.origin.clone()));
            let registry = Arc::clone(&self.registry);
            let semaphore = semaphore.clone();
            set.spawn(async move {
                let _permit = match semaphore {
                    Some(s) => s.acquire_owned().await.ok(),
                    None => None,
                };
                (idx, Self::run_task(registry, task, mode).await)
            });
        }

        let mut slots: Vec<Option<TaskResult>> = vec![None; pending.len()];
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((idx, result)) => slots[idx] = Some(result),
                Err(e) => error!("Task worker crashed: {}", e),
            }
        }

        slots
            .into_iter()
            .zip(pending)
            .map(|(slot, (task, class, origin))| {
                slot.unwrap_or_else(|| TaskResult {
                    task,
                    class,
                    origin,
                    outcome: TaskOutcome::Failed("task worker crashed".to_string()),
                    rvalue: None,
                    resource: None,
                    duration: Duration::ZERO,
                })
            })
            .collect()
    }

    /// Run one task under its timeout
    pub async fn run_task(registry: Arc<PluginRegistry>, task: Task, mode: RunMode) -> TaskResult {
        let started = Instant::now();
        let Task { spec, package, origin } = task;
        info!("Starting task {}", spec.name);

        let dispatched = match timeout(spec.timeout, dispatch(&registry, spec.class, package, mode)).await {
            Ok(dispatched) => dispatched,
            Err(_) => Dispatched::failed(format!("timed out after {}s", spec.timeout.as_secs()), None),
        };

        match &dispatched.outcome {
            TaskOutcome::Passed => info!("Task {} passed", spec.name),
            TaskOutcome::Failed(e) => error!("Task {} failed: {}", spec.name, e),
            TaskOutcome::Suppressed(e) => warn!("Task {} failed during rollback (ignored): {}", spec.name, e),
        }

        TaskResult {
            task: spec.name,
            class: spec.class,
            origin,
            outcome: dispatched.outcome,
            rvalue: dispatched.rvalue,
            resource: dispatched.resource,
            duration: started.elapsed(),
        }
    }
}

async fn dispatch(registry: &PluginRegistry, class: TaskClass, package: Package, mode: RunMode) -> Dispatched {
    match (class, package) {
        (TaskClass::Validate, Package::Scenario { dangling, .. }) => {
            if dangling.is_empty() {
                Dispatched::passed(None)
            } else {
                Dispatched::failed(format!("unresolved references: {}", dangling.join("; ")), None)
            }
        }

        (TaskClass::Validate, Package::Asset(asset)) => {
            if asset.is_static() {
                if asset.address().is_none() {
                    return Dispatched::failed(format!("static asset '{}' has no ip_address", asset.name()), None);
                }
                return Dispatched::passed(None);
            }
            let provisioner: Arc<dyn Provisioner> = plugin!(registry, asset_binding(&asset), provisioner);
            Dispatched::from_call(provisioner.validate(&asset).await, None)
        }
        (TaskClass::Provision, Package::Asset(asset)) => provision(registry, asset).await,
        (TaskClass::Cleanup, Package::Asset(asset)) => {
            let provisioner: Arc<dyn Provisioner> = plugin!(registry, asset_binding(&asset), provisioner);
            let result = provisioner.delete(&asset).await;
            Dispatched::from_call(result, Some(asset.into()))
        }

        (TaskClass::Validate, Package::Action { action, .. }) => {
            let orchestrator: Arc<dyn Orchestrator> = plugin!(registry, action.orchestrator, orchestrator);
            Dispatched::from_call(orchestrator.validate(&action).await, None)
        }
        (TaskClass::Orchestrate, Package::Action { mut action, hosts }) => {
            let orchestrator: Arc<dyn Orchestrator> = plugin!(registry, action.orchestrator, orchestrator);
            debug!("Action {} targets {} host(s)", action.name(), hosts.len());
            let result = orchestrator.run(&action, &hosts).await;
            action.status = if matches!(result, Ok(0)) { 0 } else { 1 };
            match result {
                Ok(0) => Dispatched::passed(Some(action.into())),
                Ok(rc) => Dispatched::failed(format!("orchestrator returned {}", rc), Some(action.into())),
                Err(e) => Dispatched::failed(e.to_string(), Some(action.into())),
            }
        }
        (TaskClass::Cleanup, Package::Action { action, hosts }) => {
            let Some(cleanup) = action.cleanup.as_deref() else {
                return Dispatched::passed(None);
            };
            let orchestrator: Arc<dyn Orchestrator> = plugin!(registry, cleanup.orchestrator, orchestrator);
            let message = match orchestrator.run(cleanup, &hosts).await {
                Ok(0) => return Dispatched::passed(None),
                Ok(rc) => format!("cleanup {} returned {}", cleanup.name(), rc),
                Err(e) => e.to_string(),
            };
            match mode {
                RunMode::Rollback => Dispatched {
                    outcome: TaskOutcome::Suppressed(message),
                    rvalue: None,
                    resource: None,
                },
                RunMode::Normal => Dispatched::failed(message, None),
            }
        }

        (TaskClass::Validate, Package::Execute { execute, .. }) => {
            let executor: Arc<dyn Executor> = plugin!(registry, execute.executor, executor);
            Dispatched::from_call(executor.validate(&execute).await, None)
        }
        (TaskClass::Execute, Package::Execute { mut execute, hosts }) => {
            let executor: Arc<dyn Executor> = plugin!(registry, execute.executor, executor);
            match executor.run(&mut execute, &hosts).await {
                Ok(rc) if execute.rc_is_valid(rc) => {
                    execute.status = 0;
                    Dispatched::passed(Some(execute.into()))
                }
                Ok(rc) => {
                    execute.status = 1;
                    Dispatched::failed(format!("executor returned {}", rc), Some(execute.into()))
                }
                Err(e) => {
                    execute.status = 1;
                    Dispatched::failed(e.to_string(), Some(execute.into()))
                }
            }
        }

        (TaskClass::Validate, Package::Report { report, .. }) => {
            let importer: Arc<dyn Importer> = plugin!(registry, report.importer, importer);
            Dispatched::from_call(importer.validate(&report).await, None)
        }
        (TaskClass::Report, Package::Report { mut report, executes }) => {
            if !report.do_import {
                info!("Import disabled for report {}", report.name());
                return Dispatched::passed(None);
            }
            let importer: Arc<dyn Importer> = plugin!(registry, report.importer, importer);
            let result = async {
                importer.validate_artifacts(&report, &executes).await?;
                importer.import_artifacts(&mut report, &executes).await?;
                importer.cleanup_artifacts(&report).await
            }
            .await;
            report.status = if result.is_ok() { 0 } else { 1 };
            Dispatched::from_call(result, Some(report.into()))
        }

        (TaskClass::Validate, Package::Notification { notification, .. }) => {
            let notifier: Arc<dyn Notifier> = plugin!(registry, notification.notifier, notifier);
            Dispatched::from_call(notifier.validate(&notification).await, None)
        }
        (TaskClass::Notify, Package::Notification { notification, context }) => {
            let notifier: Arc<dyn Notifier> = plugin!(registry, notification.notifier, notifier);
            Dispatched::from_call(notifier.notify(&notification, &context).await, None)
        }

        (class, package) => Dispatched::failed(format!("{} has no {} task", package.name(), class), None),
    }
}

fn asset_binding(asset: &Asset) -> PluginRef<dyn Provisioner> {
    asset
        .provisioner
        .clone()
        .unwrap_or_else(|| PluginRef::named(""))
}

async fn provision(registry: &PluginRegistry, asset: Asset) -> Dispatched {
    let provisioner: Arc<dyn Provisioner> = plugin!(registry, asset_binding(&asset), provisioner);
    if let Err(e) = provisioner.authenticate(&asset).await {
        return Dispatched::failed(format!("authentication failed: {}", e), None);
    }
    match provisioner.create(&asset).await {
        Ok(created) if created.is_empty() => Dispatched::passed(Some(asset.into())),
        Ok(created) => {
            debug!("Provisioner created {} host(s) for {}", created.len(), asset.name());
            Dispatched {
                outcome: TaskOutcome::Passed,
                rvalue: Some(created.iter().map(|host| asset.expand(host)).collect()),
                resource: None,
            }
        }
        Err(e) => Dispatched::failed(e.to_string(), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Descriptor, RunOptions, Stage};
    use crate::execution::pipeline::PipelineBuilder;
    use crate::graph::ScenarioGraph;
    use async_trait::async_trait;
    use serde_yaml::Value;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Cloud {
        delay_ms: u64,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Provisioner for Cloud {
        fn name(&self) -> &str {
            "cloud"
        }

        async fn validate(&self, _asset: &Asset) -> Result<(), PluginError> {
            Ok(())
        }

        async fn create(&self, asset: &Asset) -> Result<Vec<Mapping>, PluginError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            if asset.name() == "broken" {
                return Err(PluginError::Failed("quota exceeded".to_string()));
            }
            let count = asset.params.get("count").and_then(Value::as_u64).unwrap_or(0);
            Ok((0..count)
                .map(|i| {
                    let mut host = Mapping::new();
                    host.insert(Value::from("name"), Value::from(format!("{}_{}", asset.name(), i)));
                    host
                })
                .collect())
        }

        async fn delete(&self, _asset: &Asset) -> Result<(), PluginError> {
            Ok(())
        }
    }

    fn setup(sdf: &str, delay_ms: u64) -> (ScenarioGraph, TaskRunner, Arc<Cloud>) {
        let config = Arc::new(TefloConfig::default());
        let cloud = Arc::new(Cloud {
            delay_ms,
            calls: AtomicUsize::new(0),
        });
        let mut registry = PluginRegistry::with_builtins(Arc::clone(&config));
        let shared = Arc::clone(&cloud);
        registry.register_provisioner("cloud", move |_| shared.clone() as Arc<dyn Provisioner>);
        let descriptor = Descriptor::parse(sdf, Path::new("/ws/main.yml"), "main.yml").unwrap();
        let graph = ScenarioGraph::new(descriptor.into_scenario(Arc::clone(&config)).unwrap());
        (graph, TaskRunner::new(config, Arc::new(registry)), cloud)
    }

    fn pipeline(graph: &ScenarioGraph, stage: Stage) -> Pipeline {
        PipelineBuilder::for_stage(stage)
            .build(graph, &[], &RunOptions::default())
            .unwrap()
    }

    #[tokio::test]
    async fn test_provision_expansion_rvalue() {
        let (graph, runner, _) = setup(
            "name: s\nprovision:\n  - name: web\n    provisioner: cloud\n    count: 2\n  - name: db\n    provisioner: cloud\n",
            0,
        );
        let results = runner.run_pipeline(pipeline(&graph, Stage::Provision), RunMode::Normal).await;
        assert_eq!(results.len(), 2);
        let rvalue = results[0].rvalue.as_ref().unwrap();
        let names: Vec<_> = rvalue.iter().filter_map(|p| p.get("name").and_then(Value::as_str)).collect();
        assert_eq!(names, vec!["web_0", "web_1"]);
        assert!(results[1].rvalue.is_none());
        assert!(matches!(results[1].resource, Some(AnyResource::Asset(_))));
    }

    #[tokio::test]
    async fn test_parallel_results_keep_pipeline_order() {
        let (graph, runner, cloud) = setup(
            "name: s\nprovision:\n  - name: a\n    provisioner: cloud\n  - name: broken\n    provisioner: cloud\n  - name: c\n    provisioner: cloud\n",
            20,
        );
        let results = runner.run_pipeline(pipeline(&graph, Stage::Provision), RunMode::Normal).await;
        let names: Vec<_> = results.iter().map(|r| r.task.as_str()).collect();
        assert_eq!(names, vec!["provision:a", "provision:broken", "provision:c"]);
        assert!(results[1].outcome.is_failure());
        assert_eq!(cloud.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_serial_pipeline_stops_at_first_failure() {
        let (graph, runner, _) = setup(
            "name: s\nprovision:\n  - name: h\n    ip_address: 127.0.0.1\norchestrate:\n  - name: one\n    orchestrator: shell\n    hosts: h\n    shell: ['exit 1']\n  - name: two\n    orchestrator: shell\n    hosts: h\n    shell: ['true']\n",
            0,
        );
        let results = runner.run_pipeline(pipeline(&graph, Stage::Orchestrate), RunMode::Normal).await;
        assert_eq!(results.len(), 1);
        assert!(results[0].outcome.is_failure());
        match &results[0].resource {
            Some(AnyResource::Action(action)) => assert_eq!(action.status, 1),
            other => panic!("unexpected resource {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_rollback_suppresses_action_cleanup_failures() {
        let (graph, runner, _) = setup(
            "name: s\nprovision:\n  - name: h\n    ip_address: 127.0.0.1\norchestrate:\n  - name: one\n    orchestrator: shell\n    hosts: h\n    shell: ['true']\n    cleanup:\n      shell: ['exit 3']\n",
            0,
        );
        let normal = runner.run_pipeline(pipeline(&graph, Stage::Cleanup), RunMode::Normal).await;
        assert!(normal[0].outcome.is_failure());
        let rollback = runner.run_pipeline(pipeline(&graph, Stage::Cleanup), RunMode::Rollback).await;
        assert!(matches!(rollback[0].outcome, TaskOutcome::Suppressed(_)));
    }

    #[tokio::test]
    async fn test_cleanup_pipeline_keeps_going_after_failure() {
        let (graph, runner, _) = setup(
            "name: s\nprovision:\n  - name: h\n    ip_address: 127.0.0.1\norchestrate:\n  - name: one\n    orchestrator: shell\n    hosts: h\n    shell: ['true']\n    cleanup:\n      shell: ['true']\n  - name: two\n    orchestrator: shell\n    hosts: h\n    shell: ['true']\n    cleanup:\n      shell: ['exit 3']\n",
            0,
        );
        let results = runner.run_pipeline(pipeline(&graph, Stage::Cleanup), RunMode::Normal).await;
        let outcomes: Vec<_> = results
            .iter()
            .filter(|r| r.task == "cleanup:one" || r.task == "cleanup:two")
            .map(|r| (r.task.as_str(), r.outcome.is_failure()))
            .collect();
        assert_eq!(outcomes, vec![("cleanup:two", true), ("cleanup:one", false)]);
    }

    #[tokio::test]
    async fn test_timeout_fails_task() {
        let config = TefloConfig {
            timeouts: [("provision".to_string(), 0)].into_iter().collect(),
            ..Default::default()
        };
        let config = Arc::new(config);
        let cloud = Arc::new(Cloud {
            delay_ms: 200,
            calls: AtomicUsize::new(0),
        });
        let mut registry = PluginRegistry::new(Arc::clone(&config));
        registry.register_provisioner("cloud", move |_| cloud.clone() as Arc<dyn Provisioner>);
        let descriptor =
            Descriptor::parse("name: s\nprovision:\n  - name: slow\n    provisioner: cloud\n", Path::new("/m.yml"), "m.yml")
                .unwrap();
        let graph = ScenarioGraph::new(descriptor.into_scenario(Arc::clone(&config)).unwrap());
        let runner = TaskRunner::new(config, Arc::new(registry));

        let results = runner.run_pipeline(pipeline(&graph, Stage::Provision), RunMode::Normal).await;
        assert!(results[0].outcome.error().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_unknown_plugin_fails_task() {
        let (graph, runner, _) = setup("name: s\nprovision:\n  - name: h\n    provisioner: nowhere-cloud-xyz\n", 0);
        let results = runner.run_pipeline(pipeline(&graph, Stage::Provision), RunMode::Normal).await;
        assert!(results[0].outcome.error().unwrap().contains("no provisioner plugin"));
    }
}
