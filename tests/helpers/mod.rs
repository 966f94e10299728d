//! Test utility functions for teflo scenarios

use async_trait::async_trait;
use serde_yaml::{Mapping, Value};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use teflo::core::resource::Resource;
use teflo::core::{Action, Asset, Execute, Notification, Report, RunReport};
use teflo::execution::Teflo;
use teflo::persistence::{InMemoryResults, ResultsBackend};
use teflo::plugins::{
    Executor, Importer, NotificationContext, Notifier, Orchestrator, PluginError, PluginRegistry, Provisioner,
};
use teflo::{Result, RunOptions, ScenarioGraph, TefloConfig, VariableContext};
use tempfile::TempDir;

/// Shared record of plugin calls, in call order
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    /// Entries starting with `prefix`
    pub fn with_prefix(&self, prefix: &str) -> Vec<String> {
        self.entries().into_iter().filter(|e| e.starts_with(prefix)).collect()
    }
}

fn flag(params: &Mapping, key: &str) -> bool {
    params.get(key).and_then(Value::as_bool).unwrap_or(false)
}

/// Provisioner creating `count` hosts (default one) with fake addresses
///
/// `mock_fail: true` fails create, `mock_fail_delete: true` fails delete and
/// `mock_address_list: true` answers with an address list no asset accepts.
pub struct MockCloud(pub CallLog);

#[async_trait]
impl Provisioner for MockCloud {
    fn name(&self) -> &str {
        "mock"
    }

    async fn validate(&self, asset: &Asset) -> std::result::Result<(), PluginError> {
        self.0.push(format!("validate:{}", asset.name()));
        Ok(())
    }

    async fn create(&self, asset: &Asset) -> std::result::Result<Vec<Mapping>, PluginError> {
        self.0.push(format!("create:{}", asset.name()));
        if flag(&asset.params, "mock_fail") {
            return Err(PluginError::Failed(format!("cannot create {}", asset.name())));
        }
        if flag(&asset.params, "mock_address_list") {
            let mut host = Mapping::new();
            host.insert(
                "ip_address".into(),
                Value::Sequence(vec!["10.0.0.1".into(), "10.0.0.2".into()]),
            );
            return Ok(vec![host]);
        }
        let count = asset.params.get("count").and_then(Value::as_u64);
        let hosts = match count {
            None => {
                let mut host = Mapping::new();
                host.insert("ip_address".into(), "10.0.0.1".into());
                vec![host]
            }
            Some(n) => (0..n)
                .map(|i| {
                    let mut host = Mapping::new();
                    host.insert("name".into(), format!("{}_{}", asset.name(), i).into());
                    host.insert("ip_address".into(), format!("10.0.1.{}", i + 1).into());
                    host
                })
                .collect(),
        };
        Ok(hosts)
    }

    async fn delete(&self, asset: &Asset) -> std::result::Result<(), PluginError> {
        self.0.push(format!("delete:{}", asset.name()));
        if flag(&asset.params, "mock_fail_delete") {
            return Err(PluginError::Failed(format!("cannot delete {}", asset.name())));
        }
        Ok(())
    }
}

/// Orchestrator recording each run; `mock_rc` sets the exit code
pub struct MockOrchestrator(pub CallLog);

#[async_trait]
impl Orchestrator for MockOrchestrator {
    fn name(&self) -> &str {
        "mock"
    }

    async fn validate(&self, _action: &Action) -> std::result::Result<(), PluginError> {
        Ok(())
    }

    async fn run(&self, action: &Action, hosts: &[Asset]) -> std::result::Result<i32, PluginError> {
        let names: Vec<&str> = hosts.iter().map(|h| h.name()).collect();
        self.0.push(format!("orchestrate:{}@{}", action.name(), names.join("+")));
        Ok(action.params.get("mock_rc").and_then(Value::as_i64).unwrap_or(0) as i32)
    }
}

/// Executor recording each run and reporting one artifact
pub struct MockExecutor(pub CallLog);

#[async_trait]
impl Executor for MockExecutor {
    fn name(&self) -> &str {
        "mock"
    }

    async fn validate(&self, _execute: &Execute) -> std::result::Result<(), PluginError> {
        Ok(())
    }

    async fn run(&self, execute: &mut Execute, _hosts: &[Asset]) -> std::result::Result<i32, PluginError> {
        self.0.push(format!("execute:{}", execute.name()));
        execute.artifact_locations = vec![format!("artifacts/{}.xml", execute.name())];
        Ok(execute.params.get("mock_rc").and_then(Value::as_i64).unwrap_or(0) as i32)
    }
}

/// Importer copying the artifact locations of its executes into the report
pub struct MockImporter(pub CallLog);

#[async_trait]
impl Importer for MockImporter {
    fn name(&self) -> &str {
        "mock"
    }

    async fn validate(&self, _report: &Report) -> std::result::Result<(), PluginError> {
        Ok(())
    }

    async fn validate_artifacts(&self, _report: &Report, executes: &[Execute]) -> std::result::Result<(), PluginError> {
        if executes.iter().all(|e| e.artifact_locations.is_empty()) {
            return Err(PluginError::Invalid("no artifacts to import".to_string()));
        }
        Ok(())
    }

    async fn import_artifacts(&self, report: &mut Report, executes: &[Execute]) -> std::result::Result<(), PluginError> {
        self.0.push(format!("import:{}", report.name()));
        for execute in executes {
            let mut result = Mapping::new();
            result.insert("execute".into(), execute.name().into());
            result.insert("artifacts".into(), execute.artifact_locations.len().into());
            report.import_results.push(result);
        }
        Ok(())
    }
}

/// Notifier recording the trigger and outcome it was called with
pub struct MockNotifier(pub CallLog);

#[async_trait]
impl Notifier for MockNotifier {
    fn name(&self) -> &str {
        "mock"
    }

    async fn validate(&self, _notification: &Notification) -> std::result::Result<(), PluginError> {
        Ok(())
    }

    async fn notify(
        &self,
        notification: &Notification,
        context: &NotificationContext,
    ) -> std::result::Result<(), PluginError> {
        let trigger = context.trigger.map(|t| t.to_string()).unwrap_or_default();
        self.0.push(format!("notify:{}:{}:{}", notification.name(), trigger, context.overall_status));
        Ok(())
    }
}

/// Registry with the built-ins plus every mock under the name `mock`
pub fn mock_registry(config: Arc<TefloConfig>, log: &CallLog) -> PluginRegistry {
    let mut registry = PluginRegistry::with_builtins(config);
    let l = log.clone();
    registry.register_provisioner("mock", move |_| Arc::new(MockCloud(l.clone())) as Arc<dyn Provisioner>);
    let l = log.clone();
    registry.register_orchestrator("mock", move |_| Arc::new(MockOrchestrator(l.clone())) as Arc<dyn Orchestrator>);
    let l = log.clone();
    registry.register_executor("mock", move |_| Arc::new(MockExecutor(l.clone())) as Arc<dyn Executor>);
    let l = log.clone();
    registry.register_importer("mock", move |_| Arc::new(MockImporter(l.clone())) as Arc<dyn Importer>);
    let l = log.clone();
    registry.register_notifier("mock", move |_| Arc::new(MockNotifier(l.clone())) as Arc<dyn Notifier>);
    registry
}

/// Temporary workspace holding descriptors and the run's data folder
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Write a descriptor relative to the workspace
    pub fn write(&self, relative: &str, text: &str) -> PathBuf {
        let path = self.dir.path().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, text).unwrap();
        path
    }

    pub fn config(&self) -> Arc<TefloConfig> {
        let config = TefloConfig {
            workspace: self.dir.path().to_path_buf(),
            data_folder: self.dir.path().join(".teflo"),
            default_orchestrator: "mock".to_string(),
            default_executor: "mock".to_string(),
            default_notifier: "mock".to_string(),
            run_id: "itest".to_string(),
            ..Default::default()
        };
        Arc::new(config.finalize().unwrap())
    }

    pub fn load(&self, config: &Arc<TefloConfig>, relative: &str) -> Result<ScenarioGraph> {
        teflo::graph::GraphBuilder::new(Arc::clone(config), VariableContext::new())
            .build(&self.dir.path().join(relative))
    }
}

/// Everything a scenario test needs: engine, graph, plugin log and results
pub struct Harness {
    pub workspace: Workspace,
    pub config: Arc<TefloConfig>,
    pub engine: Teflo,
    pub graph: ScenarioGraph,
    pub log: CallLog,
    pub results: Arc<InMemoryResults>,
}

impl Harness {
    /// Harness over a single descriptor written as `main.yml`
    pub fn new(sdf: &str) -> Self {
        Self::with_files(&[("main.yml", sdf)])
    }

    /// Harness over several files; the first one is the root descriptor
    pub fn with_files(files: &[(&str, &str)]) -> Self {
        let workspace = Workspace::new();
        for (relative, text) in files {
            workspace.write(relative, text);
        }
        let config = workspace.config();
        let graph = workspace.load(&config, files[0].0).unwrap();
        let log = CallLog::default();
        let results = Arc::new(InMemoryResults::new());
        let engine = Teflo::new(Arc::clone(&config), mock_registry(Arc::clone(&config), &log))
            .with_results(Arc::clone(&results) as Arc<dyn ResultsBackend>);
        Self {
            workspace,
            config,
            engine,
            graph,
            log,
            results,
        }
    }

    pub async fn run(&mut self, options: &RunOptions) -> (RunReport, Result<()>) {
        self.engine.run_with_report(&mut self.graph, options).await
    }

    pub async fn root_results(&self) -> Mapping {
        self.results.load("results.yml").await.unwrap().expect("results.yml written")
    }

    pub fn asset_names(&self) -> Vec<String> {
        self.graph.root().assets.iter().map(|a| a.name().to_string()).collect()
    }
}

/// String items of a YAML sequence
pub fn strings(value: &Value) -> Vec<String> {
    value
        .as_sequence()
        .map(|seq| seq.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default()
}
