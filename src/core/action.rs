//! Orchestration steps run against provisioned hosts

use crate::core::config::TefloConfig;
use crate::core::resource::{require_name, Fields, PluginRef, Profile, Resource, ResourceId, ResourceKind};
use crate::core::task::{build_tasks, TaskClass, TaskSpec};
use crate::error::{Result, TefloError};
use crate::plugins::{Orchestrator, PluginRegistry};
use serde_yaml::{Mapping, Value};
use std::sync::Arc;

/// An entry under `orchestrate:`
#[derive(Debug, Clone)]
pub struct Action {
    id: ResourceId,
    name: String,
    pub description: Option<String>,
    pub labels: Vec<String>,
    pub orchestrator: PluginRef<dyn Orchestrator>,

    /// Target hosts: asset names, group names or `all`
    pub hosts: Vec<String>,

    /// Undo step run during cleanup
    pub cleanup: Option<Box<Action>>,

    pub status: i32,
    pub params: Mapping,
    tasks: Vec<TaskSpec>,
    config: Arc<TefloConfig>,
}

const CORE_KEYS: &[&str] = &["labels", "orchestrator", "hosts", "cleanup", "status"];

impl Action {
    pub fn new(data: &Mapping, config: Arc<TefloConfig>) -> Result<Self> {
        let name = require_name(data, ResourceKind::Action)?;
        let orchestrator = PluginRef::named(config.default_orchestrator.clone());
        let mut action = Self {
            id: ResourceId::new(),
            name,
            description: None,
            labels: Vec::new(),
            orchestrator,
            hosts: Vec::new(),
            cleanup: None,
            status: 0,
            params: Mapping::new(),
            tasks: Vec::new(),
            config,
        };
        action.load(data)?;
        if action.hosts.is_empty() {
            return Err(TefloError::construction(
                ResourceKind::Action,
                &action.name,
                "at least one host is required",
            ));
        }
        Ok(action)
    }

    /// Build the nested cleanup action, inheriting hosts and orchestrator
    fn build_cleanup(&self, data: &Mapping) -> Result<Action> {
        let mut data = data.clone();
        if !data.contains_key("name") {
            data.insert(Value::from("name"), Value::from(format!("{}_cleanup", self.name)));
        }
        if !data.contains_key("hosts") {
            let hosts = self.hosts.iter().map(|h| Value::from(h.as_str())).collect();
            data.insert(Value::from("hosts"), Value::Sequence(hosts));
        }
        if !data.contains_key("orchestrator") {
            data.insert(Value::from("orchestrator"), Value::from(self.orchestrator.name()));
        }
        Action::new(&data, Arc::clone(&self.config))
    }

    pub fn config(&self) -> &Arc<TefloConfig> {
        &self.config
    }

    pub fn resolve_plugins(&mut self, registry: &PluginRegistry) -> Result<()> {
        let plugin = registry.orchestrator(self.orchestrator.name())?;
        self.orchestrator.resolve(plugin);
        if let Some(cleanup) = self.cleanup.as_mut() {
            cleanup.resolve_plugins(registry)?;
        }
        Ok(())
    }
}

impl Resource for Action {
    const KIND: ResourceKind = ResourceKind::Action;
    const FIELDS: &'static [&'static str] = &[
        "ansible_playbook",
        "ansible_script",
        "ansible_shell",
        "ansible_options",
        "ansible_galaxy_options",
        "ansible_group_vars",
        "playbook",
        "script",
        "shell",
        "environment",
    ];

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
        let mut classes = vec![TaskClass::Validate, TaskClass::Orchestrate];
        if self.cleanup.is_some() {
            classes.push(TaskClass::Cleanup);
        }
        classes
    }

    fn load(&mut self, data: &Mapping) -> Result<()> {
        let fields = Fields::new(data, Self::KIND, &self.name);

        if fields.has("description") {
            self.description = fields.string("description")?;
        }
        if let Some(labels) = fields.list("labels")? {
            self.labels = labels;
        }
        if let Some(orchestrator) = fields.string("orchestrator")? {
            self.orchestrator = PluginRef::named(orchestrator);
        }
        if let Some(hosts) = fields.list("hosts")? {
            self.hosts = hosts;
        }
        if let Some(status) = fields.int32("status")? {
            self.status = status;
        }
        if let Some(cleanup) = fields.mapping("cleanup")? {
            self.cleanup = Some(Box::new(self.build_cleanup(&cleanup)?));
        }

        let plugin = self.orchestrator.name().to_string();
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
        Profile::new(&self.name)
            .opt_str("description", self.description.as_deref())
            .value("orchestrator", Value::from(self.orchestrator.name()))
            .list("hosts", &self.hosts)
            .opt_value("cleanup", self.cleanup.as_ref().map(|c| Value::Mapping(c.profile())))
            .value("status", Value::from(self.status))
            .list("labels", &self.labels)
            .params(&self.params)
            .build()
    }
}
