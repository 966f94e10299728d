//! Event-triggered messages

use crate::core::config::TefloConfig;
use crate::core::resource::{require_name, Fields, PluginRef, Profile, Resource, ResourceId, ResourceKind};
use crate::core::task::{build_tasks, Stage, TaskClass, TaskSpec};
use crate::error::{Result, TefloError};
use crate::plugins::{Notifier, PluginRegistry};
use serde_yaml::{Mapping, Value};
use std::sync::Arc;

/// An entry under `notifications:`
///
/// Trigger flags are constrained: `on_start` clears the completion flags,
/// `on_demand` clears every other trigger. A cleared flag is `None`.
#[derive(Debug, Clone)]
pub struct Notification {
    id: ResourceId,
    name: String,
    pub description: Option<String>,
    pub labels: Vec<String>,
    pub notifier: PluginRef<dyn Notifier>,
    pub on_start: Option<bool>,
    pub on_success: Option<bool>,
    pub on_failure: Option<bool>,

    /// Stages whose outcome this notification cares about
    pub on_tasks: Option<Vec<Stage>>,

    pub on_demand: Option<bool>,
    pub params: Mapping,
    tasks: Vec<TaskSpec>,
    config: Arc<TefloConfig>,
}

const CORE_KEYS: &[&str] = &["labels", "notifier", "on_start", "on_success", "on_failure", "on_tasks", "on_demand"];

impl Notification {
    pub fn new(data: &Mapping, config: Arc<TefloConfig>) -> Result<Self> {
        let name = require_name(data, ResourceKind::Notification)?;
        let notifier = PluginRef::named(config.default_notifier.clone());
        let mut notification = Self {
            id: ResourceId::new(),
            name,
            description: None,
            labels: Vec::new(),
            notifier,
            on_start: Some(false),
            on_success: Some(true),
            on_failure: Some(true),
            on_tasks: Some(Stage::ALL.to_vec()),
            on_demand: Some(false),
            params: Mapping::new(),
            tasks: Vec::new(),
            config,
        };
        notification.load(data)?;
        Ok(notification)
    }

    pub fn is_on_start(&self) -> bool {
        self.on_start == Some(true)
    }

    pub fn is_on_demand(&self) -> bool {
        self.on_demand == Some(true)
    }

    /// Stages of interest, empty when the flag was cleared
    pub fn interest(&self) -> &[Stage] {
        self.on_tasks.as_deref().unwrap_or(&[])
    }

    fn apply_trigger_constraints(&mut self) {
        if self.is_on_demand() {
            self.on_start = None;
            self.on_success = None;
            self.on_failure = None;
            self.on_tasks = None;
        } else if self.is_on_start() {
            self.on_success = None;
            self.on_failure = None;
        }
    }

    pub fn config(&self) -> &Arc<TefloConfig> {
        &self.config
    }

    pub fn resolve_plugins(&mut self, registry: &PluginRegistry) -> Result<()> {
        let plugin = registry.notifier(self.notifier.name())?;
        self.notifier.resolve(plugin);
        Ok(())
    }
}

impl Resource for Notification {
    const KIND: ResourceKind = ResourceKind::Notification;
    const FIELDS: &'static [&'static str] = &[
        "to",
        "from",
        "subject",
        "message_body",
        "message_template",
        "credential",
        "url",
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
        vec![TaskClass::Validate, TaskClass::Notify]
    }

    fn load(&mut self, data: &Mapping) -> Result<()> {
        let fields = Fields::new(data, Self::KIND, &self.name);

        if fields.has("description") {
            self.description = fields.string("description")?;
        }
        if let Some(labels) = fields.list("labels")? {
            self.labels = labels;
        }
        if let Some(notifier) = fields.string("notifier")? {
            self.notifier = PluginRef::named(notifier);
        }
        for (key, flag) in [
            ("on_start", &mut self.on_start),
            ("on_success", &mut self.on_success),
            ("on_failure", &mut self.on_failure),
            ("on_demand", &mut self.on_demand),
        ] {
            if let Some(value) = fields.boolean(key)? {
                *flag = Some(value);
            }
        }
        if let Some(stages) = fields.list("on_tasks")? {
            let parsed = stages
                .iter()
                .map(|s| {
                    s.parse::<Stage>().map_err(|_| {
                        TefloError::construction(Self::KIND, &self.name, format!("'{}' in on_tasks is not a stage", s))
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            self.on_tasks = Some(parsed);
        }

        let plugin = self.notifier.name().to_string();
        let params = fields.params(CORE_KEYS, Self::FIELDS, Some(&plugin));
        for (key, value) in params {
            self.params.insert(key, value);
        }

        self.apply_trigger_constraints();
        self.reload_tasks();
        Ok(())
    }

    fn reload_tasks(&mut self) {
        self.tasks = build_tasks(&self.valid_task_types(), &self.name, &self.config);
    }

    fn profile(&self) -> Mapping {
        let on_tasks = self
            .on_tasks
            .as_ref()
            .map(|stages| Value::Sequence(stages.iter().map(|s| Value::from(s.as_str())).collect()));
        Profile::new(&self.name)
            .opt_str("description", self.description.as_deref())
            .value("notifier", Value::from(self.notifier.name()))
            .opt_bool("on_start", self.on_start)
            .opt_bool("on_success", self.on_success)
            .opt_bool("on_failure", self.on_failure)
            .opt_value("on_tasks", on_tasks)
            .opt_bool("on_demand", self.on_demand)
            .list("labels", &self.labels)
            .params(&self.params)
            .build()
    }
}
