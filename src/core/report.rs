//! Artifact imports

use crate::core::config::TefloConfig;
use crate::core::resource::{require_name, Fields, PluginRef, Profile, Resource, ResourceId, ResourceKind};
use crate::core::task::{build_tasks, TaskClass, TaskSpec};
use crate::error::{Result, TefloError};
use crate::plugins::{Importer, PluginRegistry};
use serde_yaml::{Mapping, Value};
use std::sync::Arc;

/// An entry under `report:`
#[derive(Debug, Clone)]
pub struct Report {
    id: ResourceId,
    name: String,
    pub description: Option<String>,
    pub labels: Vec<String>,
    pub importer: PluginRef<dyn Importer>,

    /// Names of the executes whose artifacts are imported
    pub executes: Vec<String>,

    /// Outcome of the import, filled in by the importer
    pub import_results: Vec<Mapping>,

    pub do_import: bool,
    pub status: i32,
    pub params: Mapping,
    tasks: Vec<TaskSpec>,
    config: Arc<TefloConfig>,
}

const CORE_KEYS: &[&str] = &["labels", "importer", "executes", "import_results", "do_import", "status"];

impl Report {
    pub fn new(data: &Mapping, config: Arc<TefloConfig>) -> Result<Self> {
        let name = require_name(data, ResourceKind::Report)?;
        let importer = match data.get("importer").and_then(Value::as_str) {
            Some(importer) => PluginRef::named(importer),
            None => {
                return Err(TefloError::construction(
                    ResourceKind::Report,
                    name,
                    "an importer is required",
                ))
            }
        };
        let mut report = Self {
            id: ResourceId::new(),
            name,
            description: None,
            labels: Vec::new(),
            importer,
            executes: Vec::new(),
            import_results: Vec::new(),
            do_import: true,
            status: 0,
            params: Mapping::new(),
            tasks: Vec::new(),
            config,
        };
        report.load(data)?;
        Ok(report)
    }

    pub fn config(&self) -> &Arc<TefloConfig> {
        &self.config
    }

    pub fn resolve_plugins(&mut self, registry: &PluginRegistry) -> Result<()> {
        let plugin = registry.importer(self.importer.name())?;
        self.importer.resolve(plugin);
        Ok(())
    }
}

impl Resource for Report {
    const KIND: ResourceKind = ResourceKind::Report;
    const FIELDS: &'static [&'static str] = &["provider", "credential", "artifacts"];

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
        vec![TaskClass::Validate, TaskClass::Report]
    }

    fn load(&mut self, data: &Mapping) -> Result<()> {
        let fields = Fields::new(data, Self::KIND, &self.name);

        if fields.has("description") {
            self.description = fields.string("description")?;
        }
        if let Some(labels) = fields.list("labels")? {
            self.labels = labels;
        }
        if let Some(importer) = fields.string("importer")? {
            self.importer = PluginRef::named(importer);
        }
        if let Some(executes) = fields.list("executes")? {
            self.executes = executes;
        }
        if let Some(results) = fields.mappings("import_results")? {
            self.import_results = results;
        }
        if let Some(do_import) = fields.boolean("do_import")? {
            self.do_import = do_import;
        }
        if let Some(status) = fields.int32("status")? {
            self.status = status;
        }

        let plugin = self.importer.name().to_string();
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
        let results: Vec<Value> = self.import_results.iter().cloned().map(Value::Mapping).collect();
        Profile::new(&self.name)
            .opt_str("description", self.description.as_deref())
            .value("importer", Value::from(self.importer.name()))
            .list("executes", &self.executes)
            .opt_value("import_results", (!results.is_empty()).then(|| Value::Sequence(results)))
            .value("do_import", Value::from(self.do_import))
            .value("status", Value::from(self.status))
            .list("labels", &self.labels)
            .params(&self.params)
            .build()
    }
}
