//! Scenario: one descriptor's resources plus its included children

use crate::core::config::TefloConfig;
use crate::core::resource::{AnyResource, Resource, ResourceId, ResourceKind};
use crate::core::task::{build_tasks, TaskClass, TaskSpec};
use crate::core::{Action, Asset, Execute, Notification, Report};
use crate::error::Result;
use crate::plugins::PluginRegistry;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

/// Services and checks to run before provisioning
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceCheck {
    pub monitored_services: Vec<String>,
    pub playbook: Vec<Mapping>,
    pub script: Vec<Mapping>,
}

impl ResourceCheck {
    pub fn is_empty(&self) -> bool {
        self.monitored_services.is_empty() && self.playbook.is_empty() && self.script.is_empty()
    }
}

/// A git repository searched for includes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteWorkspace {
    pub workspace_url: String,
    pub alias: String,
}

/// A node of the scenario graph
#[derive(Debug, Clone)]
pub struct Scenario {
    id: ResourceId,
    pub name: String,
    pub description: Option<String>,

    /// Absolute path of the descriptor
    pub path: PathBuf,

    /// Descriptor path relative to the workspace
    pub relative_path: String,

    pub resource_check: ResourceCheck,
    pub remote_workspace: Vec<RemoteWorkspace>,

    /// Top-level descriptor keys with no dedicated meaning
    pub metadata: Mapping,

    pub assets: Vec<Asset>,
    pub actions: Vec<Action>,
    pub executes: Vec<Execute>,
    pub reports: Vec<Report>,
    pub notifications: Vec<Notification>,

    pub child_scenarios: Vec<Scenario>,

    pub passed_tasks: Vec<String>,
    pub failed_tasks: Vec<String>,
    pub overall_status: i32,

    tasks: Vec<TaskSpec>,
    config: Arc<TefloConfig>,
}

impl Scenario {
    pub fn new(name: impl Into<String>, config: Arc<TefloConfig>) -> Self {
        let name = name.into();
        let tasks = build_tasks(&[TaskClass::Validate], &name, &config);
        Self {
            id: ResourceId::new(),
            name,
            description: None,
            path: PathBuf::new(),
            relative_path: String::new(),
            resource_check: ResourceCheck::default(),
            remote_workspace: Vec::new(),
            metadata: Mapping::new(),
            assets: Vec::new(),
            actions: Vec::new(),
            executes: Vec::new(),
            reports: Vec::new(),
            notifications: Vec::new(),
            child_scenarios: Vec::new(),
            passed_tasks: Vec::new(),
            failed_tasks: Vec::new(),
            overall_status: 0,
            tasks,
            config,
        }
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn tasks(&self) -> &[TaskSpec] {
        &self.tasks
    }

    pub fn config(&self) -> &Arc<TefloConfig> {
        &self.config
    }

    /// Results file name of this node
    pub fn results_file_name(&self) -> String {
        let stem = std::path::Path::new(&self.relative_path)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&self.name);
        format!("{}_results.yml", stem)
    }

    /// Results file name built from the whole relative path, `a/child.yml`
    /// becomes `a_child_results.yml`
    pub fn qualified_results_file_name(&self) -> String {
        let without_ext = std::path::Path::new(&self.relative_path).with_extension("");
        let qualified: String = without_ext
            .to_string_lossy()
            .chars()
            .map(|c| if c == '/' || c == '\\' || c == '.' { '_' } else { c })
            .collect();
        let qualified = qualified.trim_matches('_');
        if qualified.is_empty() {
            format!("{}_results.yml", self.name)
        } else {
            format!("{}_results.yml", qualified)
        }
    }

    pub fn add_resource(&mut self, resource: AnyResource) {
        match resource {
            AnyResource::Asset(r) => self.assets.push(r),
            AnyResource::Action(r) => self.actions.push(r),
            AnyResource::Execute(r) => self.executes.push(r),
            AnyResource::Report(r) => self.reports.push(r),
            AnyResource::Notification(r) => self.notifications.push(r),
        }
    }

    /// Overwrite the resource at `idx` of the matching list
    pub fn replace_resource(&mut self, resource: AnyResource, idx: usize) {
        fn put<T>(list: &mut Vec<T>, item: T, idx: usize) {
            match list.get_mut(idx) {
                Some(slot) => *slot = item,
                None => list.push(item),
            }
        }
        match resource {
            AnyResource::Asset(r) => put(&mut self.assets, r, idx),
            AnyResource::Action(r) => put(&mut self.actions, r, idx),
            AnyResource::Execute(r) => put(&mut self.executes, r, idx),
            AnyResource::Report(r) => put(&mut self.reports, r, idx),
            AnyResource::Notification(r) => put(&mut self.notifications, r, idx),
        }
    }

    /// Insert before `idx` of the matching list, appending past the end
    pub fn insert_resource(&mut self, resource: AnyResource, idx: usize) {
        fn put<T>(list: &mut Vec<T>, item: T, idx: usize) {
            let idx = idx.min(list.len());
            list.insert(idx, item);
        }
        match resource {
            AnyResource::Asset(r) => put(&mut self.assets, r, idx),
            AnyResource::Action(r) => put(&mut self.actions, r, idx),
            AnyResource::Execute(r) => put(&mut self.executes, r, idx),
            AnyResource::Report(r) => put(&mut self.reports, r, idx),
            AnyResource::Notification(r) => put(&mut self.notifications, r, idx),
        }
    }

    /// Current position of a resource, looked up by identity
    pub fn get_resource_idx(&self, kind: ResourceKind, id: ResourceId) -> Option<usize> {
        fn find<T: Resource>(list: &[T], id: ResourceId) -> Option<usize> {
            list.iter().position(|r| r.id() == id)
        }
        match kind {
            ResourceKind::Asset => find(&self.assets, id),
            ResourceKind::Action => find(&self.actions, id),
            ResourceKind::Execute => find(&self.executes, id),
            ResourceKind::Report => find(&self.reports, id),
            ResourceKind::Notification => find(&self.notifications, id),
        }
    }

    /// Every label carried by a resource of this node
    pub fn labels(&self) -> Vec<String> {
        let mut labels: Vec<String> = Vec::new();
        let all = self
            .assets
            .iter()
            .map(|r| r.labels())
            .chain(self.actions.iter().map(|r| r.labels()))
            .chain(self.executes.iter().map(|r| r.labels()))
            .chain(self.reports.iter().map(|r| r.labels()))
            .chain(self.notifications.iter().map(|r| r.labels()));
        for set in all {
            for label in set {
                if !labels.contains(label) {
                    labels.push(label.clone());
                }
            }
        }
        labels
    }

    /// Number of resources across all lists
    pub fn resource_count(&self) -> usize {
        self.assets.len() + self.actions.len() + self.executes.len() + self.reports.len() + self.notifications.len()
    }

    /// Bind every resource of this node to its plugin implementation
    pub fn resolve_plugins(&mut self, registry: &PluginRegistry) -> Result<()> {
        for asset in &mut self.assets {
            asset.resolve_plugins(registry)?;
        }
        for action in &mut self.actions {
            action.resolve_plugins(registry)?;
        }
        for execute in &mut self.executes {
            execute.resolve_plugins(registry)?;
        }
        for report in &mut self.reports {
            report.resolve_plugins(registry)?;
        }
        for notification in &mut self.notifications {
            notification.resolve_plugins(registry)?;
        }
        Ok(())
    }

    /// Mapping written to the results file
    pub fn profile(&self) -> Mapping {
        fn section<T: Resource>(list: &[T]) -> Value {
            Value::Sequence(list.iter().map(|r| Value::Mapping(r.profile())).collect())
        }

        let mut map = Mapping::new();
        map.insert(Value::from("name"), Value::from(self.name.as_str()));
        if let Some(description) = &self.description {
            map.insert(Value::from("description"), Value::from(description.as_str()));
        }
        if !self.resource_check.is_empty() {
            if let Some(value) = section_value("resource_check", &self.resource_check) {
                map.insert(Value::from("resource_check"), value);
            }
        }
        if !self.remote_workspace.is_empty() {
            if let Some(value) = section_value("remote_workspace", &self.remote_workspace) {
                map.insert(Value::from("remote_workspace"), value);
            }
        }
        for (key, value) in &self.metadata {
            map.insert(key.clone(), value.clone());
        }

        let sections = [
            (ResourceKind::Asset, section(&self.assets), self.assets.is_empty()),
            (ResourceKind::Action, section(&self.actions), self.actions.is_empty()),
            (ResourceKind::Execute, section(&self.executes), self.executes.is_empty()),
            (ResourceKind::Report, section(&self.reports), self.reports.is_empty()),
            (ResourceKind::Notification, section(&self.notifications), self.notifications.is_empty()),
        ];
        for (kind, value, empty) in sections {
            if !empty {
                map.insert(Value::from(kind.section()), value);
            }
        }

        let as_seq = |items: &[String]| Value::Sequence(items.iter().map(|s| Value::from(s.as_str())).collect());
        map.insert(Value::from("passed_tasks"), as_seq(&self.passed_tasks));
        map.insert(Value::from("failed_tasks"), as_seq(&self.failed_tasks));
        map.insert(Value::from("overall_status"), Value::from(self.overall_status));
        map
    }
}

fn section_value<T: Serialize>(key: &str, section: &T) -> Option<Value> {
    match serde_yaml::to_value(section) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Leaving '{}' out of the scenario profile: {}", key, e);
            None
        }
    }
}
