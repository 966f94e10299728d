//! Provisionable hosts

use crate::core::config::TefloConfig;
use crate::core::resource::{require_name, Fields, PluginRef, Profile, Resource, ResourceId, ResourceKind};
use crate::core::task::{build_tasks, TaskClass, TaskSpec};
use crate::error::{Result, TefloError};
use crate::plugins::{PluginRegistry, Provisioner};
use serde_yaml::{Mapping, Value};
use std::sync::Arc;

/// A host declared under `provision:`
#[derive(Debug, Clone)]
pub struct Asset {
    id: ResourceId,
    name: String,
    pub description: Option<String>,
    pub labels: Vec<String>,

    /// Inventory groups the host belongs to
    pub groups: Vec<String>,

    pub provisioner: Option<PluginRef<dyn Provisioner>>,

    /// Provider settings handed to the provisioner
    pub provider: Option<Mapping>,

    /// Either an address string or a mapping with `public`/`private` keys
    pub ip_address: Option<Value>,

    /// Plugin parameters
    pub params: Mapping,

    tasks: Vec<TaskSpec>,
    config: Arc<TefloConfig>,
}

const CORE_KEYS: &[&str] = &["labels", "groups", "provisioner", "provider", "ip_address"];

impl Asset {
    pub fn new(data: &Mapping, config: Arc<TefloConfig>) -> Result<Self> {
        let name = require_name(data, ResourceKind::Asset)?;
        let mut asset = Self {
            id: ResourceId::new(),
            name,
            description: None,
            labels: Vec::new(),
            groups: Vec::new(),
            provisioner: None,
            provider: None,
            ip_address: None,
            params: Mapping::new(),
            tasks: Vec::new(),
            config,
        };
        asset.load(data)?;
        Ok(asset)
    }

    /// A static asset already exists and is never provisioned or deleted
    pub fn is_static(&self) -> bool {
        self.provisioner.is_none() && self.provider.is_none()
    }

    /// Address used to reach the host
    pub fn address(&self) -> Option<String> {
        match self.ip_address.as_ref()? {
            Value::String(s) => Some(s.clone()),
            Value::Mapping(m) => ["public", "private"]
                .iter()
                .find_map(|key| m.get(*key).and_then(Value::as_str))
                .map(str::to_string),
            _ => None,
        }
    }

    /// Whether a host reference (`all`, a name or a group) selects this asset
    pub fn matches_host(&self, host: &str) -> bool {
        host == "all" || self.name == host || self.groups.iter().any(|g| g == host)
    }

    /// Profile of one machine a provisioner created for this asset
    pub fn expand(&self, created: &Mapping) -> Mapping {
        let mut profile = self.profile();
        profile.remove("count");
        for (key, value) in created {
            profile.insert(key.clone(), value.clone());
        }
        profile
    }

    pub fn config(&self) -> &Arc<TefloConfig> {
        &self.config
    }

    pub fn resolve_plugins(&mut self, registry: &PluginRegistry) -> Result<()> {
        if let Some(binding) = self.provisioner.as_mut() {
            let plugin = registry.provisioner(binding.name())?;
            binding.resolve(plugin);
        }
        Ok(())
    }
}

impl Resource for Asset {
    const KIND: ResourceKind = ResourceKind::Asset;
    const FIELDS: &'static [&'static str] = &["ansible_params", "metadata", "count", "role", "hostname", "connection"];

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
        if self.is_static() {
            vec![TaskClass::Validate]
        } else {
            vec![TaskClass::Validate, TaskClass::Provision, TaskClass::Cleanup]
        }
    }

    fn load(&mut self, data: &Mapping) -> Result<()> {
        let fields = Fields::new(data, Self::KIND, &self.name);

        if fields.has("description") {
            self.description = fields.string("description")?;
        }
        if let Some(labels) = fields.list("labels")? {
            self.labels = labels;
        }
        if let Some(groups) = fields.list("groups")? {
            self.groups = groups;
        }
        if fields.has("provider") {
            self.provider = fields.mapping("provider")?;
        }
        if fields.has("provisioner") {
            self.provisioner = fields.string("provisioner")?.map(PluginRef::named);
        }
        if self.provisioner.is_none() {
            let from_provider = self
                .provider
                .as_ref()
                .and_then(|p| p.get("name"))
                .and_then(Value::as_str)
                .map(PluginRef::named);
            self.provisioner = from_provider;
        }
        if let Some(ip) = fields.get("ip_address") {
            match ip {
                Value::Null => self.ip_address = None,
                Value::String(_) | Value::Mapping(_) => self.ip_address = Some(ip.clone()),
                _ => {
                    return Err(TefloError::construction(
                        Self::KIND,
                        &self.name,
                        "'ip_address' must be a string or a mapping",
                    ))
                }
            }
        }

        let plugin = self.provisioner.as_ref().map(|p| p.name().to_string());
        let params = fields.params(CORE_KEYS, Self::FIELDS, plugin.as_deref());
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
        let provisioner = self.provisioner.as_ref().map(|p| p.name());
        Profile::new(&self.name)
            .opt_str("description", self.description.as_deref())
            .list("groups", &self.groups)
            .opt_str("provisioner", provisioner)
            .opt_value("provider", self.provider.clone().map(Value::Mapping))
            .opt_value("ip_address", self.ip_address.clone())
            .list("labels", &self.labels)
            .params(&self.params)
            .build()
    }
}
