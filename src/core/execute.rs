//! Test runs

use crate::core::config::TefloConfig;
use crate::core::resource::{require_name, Fields, PluginRef, Profile, Resource, ResourceId, ResourceKind};
use crate::core::task::{build_tasks, TaskClass, TaskSpec};
use crate::error::{Result, TefloError};
use crate::plugins::{Executor, PluginRegistry};
use serde_yaml::{Mapping, Value};
use std::sync::Arc;

/// An entry under `execute:`
#[derive(Debug, Clone)]
pub struct Execute {
    id: ResourceId,
    name: String,
    pub description: Option<String>,
    pub labels: Vec<String>,
    pub executor: PluginRef<dyn Executor>,
    pub hosts: Vec<String>,

    /// Artifact paths to collect from the hosts
    pub artifacts: Vec<String>,

    /// Where collected artifacts ended up, filled in by the executor
    pub artifact_locations: Vec<String>,

    /// Aggregate test results, filled in by the executor
    pub testrun_results: Option<Mapping>,

    /// Treat any exit code as success
    pub ignore_rc: bool,

    /// Exit codes treated as success
    pub valid_rc: Vec<i32>,

    pub status: i32,
    pub params: Mapping,
    tasks: Vec<TaskSpec>,
    config: Arc<TefloConfig>,
}

const CORE_KEYS: &[&str] = &[
    "labels",
    "executor",
    "hosts",
    "artifacts",
    "artifact_locations",
    "testrun_results",
    "ignore_rc",
    "valid_rc",
    "status",
];

impl Execute {
    pub fn new(data: &Mapping, config: Arc<TefloConfig>) -> Result<Self> {
        let name = require_name(data, ResourceKind::Execute)?;
        let executor = PluginRef::named(config.default_executor.clone());
        let mut execute = Self {
            id: ResourceId::new(),
            name,
            description: None,
            labels: Vec::new(),
            executor,
            hosts: Vec::new(),
            artifacts: Vec::new(),
            artifact_locations: Vec::new(),
            testrun_results: None,
            ignore_rc: false,
            valid_rc: vec![0],
            status: 0,
            params: Mapping::new(),
            tasks: Vec::new(),
            config,
        };
        execute.load(data)?;
        if execute.hosts.is_empty() {
            return Err(TefloError::construction(
                ResourceKind::Execute,
                &execute.name,
                "at least one host is required",
            ));
        }
        Ok(execute)
    }

    /// Whether an executor exit code counts as a pass
    pub fn rc_is_valid(&self, rc: i32) -> bool {
        self.ignore_rc || self.valid_rc.contains(&rc)
    }

    pub fn config(&self) -> &Arc<TefloConfig> {
        &self.config
    }

    pub fn resolve_plugins(&mut self, registry: &PluginRegistry) -> Result<()> {
        let plugin = registry.executor(self.executor.name())?;
        self.executor.resolve(plugin);
        Ok(())
    }
}

impl Resource for Execute {
    const KIND: ResourceKind = ResourceKind::Execute;
    const FIELDS: &'static [&'static str] = &["shell", "playbook", "script", "git", "ansible_options", "environment"];

    fn id(&self) -> ResourceId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn labels(&self) -> &[String] {
        &self.labels
    }

    fn tasks(&self) -> &[TaskSpec] {
        &self.tasks
    }

    fn valid_task_types(&self) -> Vec<TaskClass> {
        vec![TaskClass::Validate, TaskClass::Execute]
    }

    fn load(&mut self, data: &Mapping) -> Result<()> {
        let fields = Fields::new(data, Self::KIND, &self.name);

        if fields.has("description") {
            self.description = fields.string("description")?;
        }
        if let Some(labels) = fields.list("labels")? {
            self.labels = labels;
        }
        if let Some(executor) = fields.string("executor")? {
            self.executor = PluginRef::named(executor);
        }
        if let Some(hosts) = fields.list("hosts")? {
            self.hosts = hosts;
        }
        if let Some(artifacts) = fields.list("artifacts")? {
            self.artifacts = artifacts;
        }
        if let Some(locations) = fields.list("artifact_locations")? {
            self.artifact_locations = locations;
        }
        if fields.has("testrun_results") {
            self.testrun_results = fields.mapping("testrun_results")?;
        }
        if let Some(ignore) = fields.boolean("ignore_rc")? {
            self.ignore_rc = ignore;
        }
        if let Some(codes) = fields.list("valid_rc")? {
            self.valid_rc = codes
                .iter()
                .map(|c| {
                    c.parse::<i32>().map_err(|_| {
                        TefloError::construction(Self::KIND, &self.name, format!("invalid return code '{}'", c))
                    })
                })
                .collect::<Result<Vec<_>>>()?;
        }
        if let Some(status) = fields.int32("status")? {
            self.status = status;
        }

        let plugin = self.executor.name().to_string();
        let params = fields.params(CORE_KEYS, Self::FIELDS, Some(&plugin));
        for (key, value) in params {
            self.params.insert(key, value);
        }

        self.reload_tasks();
        Ok(())
    }

    fn reload_tasks(&mut self) {
        self.tasks = build_tasks(&self.valid_task_types(), &self.name, &self.config);
    }

    fn profile(&self) -> Mapping {
        let valid_rc = self.valid_rc.iter().map(|rc| Value::from(*rc)).collect();
        Profile::new(&self.name)
            .opt_str("description", self.description.as_deref())
            .value("executor", Value::from(self.executor.name()))
            .list("hosts", &self.hosts)
            .list("artifacts", &self.artifacts)
            .list("artifact_locations", &self.artifact_locations)
            .opt_value("testrun_results", self.testrun_results.clone().map(Value::Mapping))
            .opt_bool("ignore_rc", self.ignore_rc.then_some(true))
            .value("valid_rc", Value::Sequence(valid_rc))
            .value("status", Value::from(self.status))
            .list("labels", &self.labels)
            .params(&self.params)
            .build()
    }
}
