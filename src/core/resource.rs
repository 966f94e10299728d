//! Identity, labels, plugin bindings and field loading shared by all resources

use crate::core::config::TefloConfig;
use crate::core::task::{TaskClass, TaskSpec};
use crate::core::{Action, Asset, Execute, Notification, Report};
use crate::error::{Result, TefloError};
use serde_yaml::{Mapping, Value};
use std::fmt;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Generated identity of a resource
///
/// Two resources may share a name transiently (count expansion), so lists are
/// searched by id, never by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceId(Uuid);

impl ResourceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ResourceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.0.simple().to_string()[..8])
    }
}

/// The five resource types a scenario holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Asset,
    Action,
    Execute,
    Report,
    Notification,
}

impl ResourceKind {
    /// Declaration order, also the order pipelines visit resource lists
    pub const ALL: [ResourceKind; 5] = [
        ResourceKind::Asset,
        ResourceKind::Action,
        ResourceKind::Execute,
        ResourceKind::Report,
        ResourceKind::Notification,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Asset => "asset",
            ResourceKind::Action => "action",
            ResourceKind::Execute => "execute",
            ResourceKind::Report => "report",
            ResourceKind::Notification => "notification",
        }
    }

    /// Top-level descriptor key holding resources of this kind
    pub fn section(&self) -> &'static str {
        match self {
            ResourceKind::Asset => "provision",
            ResourceKind::Action => "orchestrate",
            ResourceKind::Execute => "execute",
            ResourceKind::Report => "report",
            ResourceKind::Notification => "notifications",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Behaviour common to every scenario resource
pub trait Resource: Clone + fmt::Debug + Send + Sync + 'static {
    const KIND: ResourceKind;

    /// Plugin parameters `load` keeps besides the typed fields
    const FIELDS: &'static [&'static str];

    fn id(&self) -> ResourceId;
    fn name(&self) -> &str;
    fn labels(&self) -> &[String];
    fn tasks(&self) -> &[TaskSpec];

    /// Task classes this resource contributes, given its current fields
    fn valid_task_types(&self) -> Vec<TaskClass>;

    /// Assign every recognised key of `data`, then rebuild the tasks
    fn load(&mut self, data: &Mapping) -> Result<()>;

    /// Discard the task list and derive it again from the current fields
    fn reload_tasks(&mut self);

    /// Ordered mapping written back to the results file
    fn profile(&self) -> Mapping;
}

/// Any one of the five resources
#[derive(Debug, Clone)]
pub enum AnyResource {
    Asset(Asset),
    Action(Action),
    Execute(Execute),
    Report(Report),
    Notification(Notification),
}

impl AnyResource {
    /// Construct a resource of `kind` from a profile mapping
    pub fn from_profile(kind: ResourceKind, data: &Mapping, config: Arc<TefloConfig>) -> Result<Self> {
        Ok(match kind {
            ResourceKind::Asset => AnyResource::Asset(Asset::new(data, config)?),
            ResourceKind::Action => AnyResource::Action(Action::new(data, config)?),
            ResourceKind::Execute => AnyResource::Execute(Execute::new(data, config)?),
            ResourceKind::Report => AnyResource::Report(Report::new(data, config)?),
            ResourceKind::Notification => AnyResource::Notification(Notification::new(data, config)?),
        })
    }

    pub fn kind(&self) -> ResourceKind {
        match self {
            AnyResource::Asset(_) => ResourceKind::Asset,
            AnyResource::Action(_) => ResourceKind::Action,
            AnyResource::Execute(_) => ResourceKind::Execute,
            AnyResource::Report(_) => ResourceKind::Report,
            AnyResource::Notification(_) => ResourceKind::Notification,
        }
    }

    pub fn id(&self) -> ResourceId {
        match self {
            AnyResource::Asset(r) => r.id(),
            AnyResource::Action(r) => r.id(),
            AnyResource::Execute(r) => r.id(),
            AnyResource::Report(r) => r.id(),
            AnyResource::Notification(r) => r.id(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            AnyResource::Asset(r) => r.name(),
            AnyResource::Action(r) => r.name(),
            AnyResource::Execute(r) => r.name(),
            AnyResource::Report(r) => r.name(),
            AnyResource::Notification(r) => r.name(),
        }
    }

    pub fn profile(&self) -> Mapping {
        match self {
            AnyResource::Asset(r) => r.profile(),
            AnyResource::Action(r) => r.profile(),
            AnyResource::Execute(r) => r.profile(),
            AnyResource::Report(r) => r.profile(),
            AnyResource::Notification(r) => r.profile(),
        }
    }
}

impl From<Asset> for AnyResource {
    fn from(r: Asset) -> Self {
        AnyResource::Asset(r)
    }
}

impl From<Action> for AnyResource {
    fn from(r: Action) -> Self {
        AnyResource::Action(r)
    }
}

impl From<Execute> for AnyResource {
    fn from(r: Execute) -> Self {
        AnyResource::Execute(r)
    }
}

impl From<Report> for AnyResource {
    fn from(r: Report) -> Self {
        AnyResource::Report(r)
    }
}

impl From<Notification> for AnyResource {
    fn from(r: Notification) -> Self {
        AnyResource::Notification(r)
    }
}

/// Binding of a resource to a plugin
///
/// Holds the declared name until the registry resolves it; always reported by
/// name.
pub enum PluginRef<P: ?Sized> {
    Named(String),
    Resolved { name: String, plugin: Arc<P> },
}

impl<P: ?Sized> PluginRef<P> {
    pub fn named(name: impl Into<String>) -> Self {
        PluginRef::Named(name.into())
    }

    pub fn name(&self) -> &str {
        match self {
            PluginRef::Named(name) => name,
            PluginRef::Resolved { name, .. } => name,
        }
    }

    pub fn plugin(&self) -> Option<&Arc<P>> {
        match self {
            PluginRef::Named(_) => None,
            PluginRef::Resolved { plugin, .. } => Some(plugin),
        }
    }

    pub fn resolve(&mut self, plugin: Arc<P>) {
        *self = PluginRef::Resolved {
            name: self.name().to_string(),
            plugin,
        };
    }
}

impl<P: ?Sized> Clone for PluginRef<P> {
    fn clone(&self) -> Self {
        match self {
            PluginRef::Named(name) => PluginRef::Named(name.clone()),
            PluginRef::Resolved { name, plugin } => PluginRef::Resolved {
                name: name.clone(),
                plugin: Arc::clone(plugin),
            },
        }
    }
}

impl<P: ?Sized> fmt::Debug for PluginRef<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PluginRef::Named(name) => write!(f, "PluginRef::Named({})", name),
            PluginRef::Resolved { name, .. } => write!(f, "PluginRef::Resolved({})", name),
        }
    }
}

impl<P: ?Sized> PartialEq for PluginRef<P> {
    fn eq(&self, other: &Self) -> bool {
        self.name() == other.name()
    }
}

/// Split comma-separated labels, trim them and drop empty entries
pub fn normalize_labels(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => split_list(s),
        Value::Sequence(items) => items
            .iter()
            .flat_map(|item| match item {
                Value::String(s) => split_list(s),
                other => scalar_to_string(other).into_iter().collect(),
            })
            .collect(),
        Value::Null => Vec::new(),
        other => scalar_to_string(other).into_iter().collect(),
    }
}

fn split_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Prefix of plugin-scoped parameter keys, e.g. `ansible_` for `ansible`
pub fn plugin_prefix(plugin_name: &str) -> String {
    let normalized: String = plugin_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect();
    format!("{}_", normalized)
}

/// Typed accessors over a resource's input mapping
///
/// Type mismatches become construction errors naming the resource.
pub(crate) struct Fields<'a> {
    data: &'a Mapping,
    kind: ResourceKind,
    name: &'a str,
}

impl<'a> Fields<'a> {
    pub fn new(data: &'a Mapping, kind: ResourceKind, name: &'a str) -> Self {
        Self { data, kind, name }
    }

    pub fn get(&self, key: &str) -> Option<&'a Value> {
        self.data.get(key)
    }

    pub fn has(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    fn error(&self, key: &str, expected: &str) -> TefloError {
        TefloError::construction(self.kind, self.name, format!("'{}' must be {}", key, expected))
    }

    pub fn string(&self, key: &str) -> Result<Option<String>> {
        match self.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => scalar_to_string(value)
                .map(Some)
                .ok_or_else(|| self.error(key, "a string")),
        }
    }

    pub fn boolean(&self, key: &str) -> Result<Option<bool>> {
        match self.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(Value::String(s)) => match s.to_ascii_lowercase().as_str() {
                "true" | "yes" => Ok(Some(true)),
                "false" | "no" => Ok(Some(false)),
                _ => Err(self.error(key, "a boolean")),
            },
            Some(_) => Err(self.error(key, "a boolean")),
        }
    }

    pub fn integer(&self, key: &str) -> Result<Option<i64>> {
        match self.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(n)) => n.as_i64().map(Some).ok_or_else(|| self.error(key, "an integer")),
            Some(Value::String(s)) => s.trim().parse().map(Some).map_err(|_| self.error(key, "an integer")),
            Some(_) => Err(self.error(key, "an integer")),
        }
    }

    /// An integer that also has to fit in 32 bits, used for statuses
    pub fn int32(&self, key: &str) -> Result<Option<i32>> {
        self.integer(key)?
            .map(|n| i32::try_from(n).map_err(|_| self.error(key, "a 32 bit integer")))
            .transpose()
    }

    /// A list given either as a YAML sequence or as a comma-separated string
    pub fn list(&self, key: &str) -> Result<Option<Vec<String>>> {
        match self.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(value @ (Value::String(_) | Value::Sequence(_))) => Ok(Some(normalize_labels(value))),
            Some(_) => Err(self.error(key, "a list or a comma separated string")),
        }
    }

    pub fn mapping(&self, key: &str) -> Result<Option<Mapping>> {
        match self.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Mapping(m)) => Ok(Some(m.clone())),
            Some(_) => Err(self.error(key, "a mapping")),
        }
    }

    pub fn mappings(&self, key: &str) -> Result<Option<Vec<Mapping>>> {
        match self.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Sequence(items)) => items
                .iter()
                .map(|item| match item {
                    Value::Mapping(m) => Ok(m.clone()),
                    _ => Err(self.error(key, "a list of mappings")),
                })
                .collect::<Result<Vec<_>>>()
                .map(Some),
            Some(_) => Err(self.error(key, "a list of mappings")),
        }
    }

    /// Collect plugin parameters: allow-listed keys plus keys scoped to the
    /// bound plugin. Everything else is ignored.
    pub fn params(&self, core: &[&str], allowed: &[&str], plugin: Option<&str>) -> Mapping {
        let prefix = plugin.map(plugin_prefix);
        let mut params = Mapping::new();
        for (key, value) in self.data {
            let Some(key_str) = key.as_str() else {
                continue;
            };
            if key_str == "name" || key_str == "description" || core.contains(&key_str) {
                continue;
            }
            let scoped = prefix.as_deref().is_some_and(|p| key_str.starts_with(p));
            if allowed.contains(&key_str) || scoped {
                params.insert(key.clone(), value.clone());
            } else {
                debug!("Ignoring unknown key '{}' on {} '{}'", key_str, self.kind, self.name);
            }
        }
        params
    }
}

/// Read the mandatory `name` of a resource
pub(crate) fn require_name(data: &Mapping, kind: ResourceKind) -> Result<String> {
    match data.get("name") {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(TefloError::construction(kind, "<unnamed>", "a name is required")),
    }
}

/// Ordered mapping builder for profiles; skips empty values
pub(crate) struct Profile {
    map: Mapping,
}

impl Profile {
    pub fn new(name: &str) -> Self {
        let mut map = Mapping::new();
        map.insert(Value::from("name"), Value::from(name));
        Self { map }
    }

    pub fn value(mut self, key: &str, value: Value) -> Self {
        self.map.insert(Value::from(key), value);
        self
    }

    pub fn opt_str(self, key: &str, value: Option<&str>) -> Self {
        match value {
            Some(v) => self.value(key, Value::from(v)),
            None => self,
        }
    }

    pub fn opt_value(self, key: &str, value: Option<Value>) -> Self {
        match value {
            Some(v) => self.value(key, v),
            None => self,
        }
    }

    pub fn opt_bool(self, key: &str, value: Option<bool>) -> Self {
        self.opt_value(key, value.map(Value::from))
    }

    pub fn list(self, key: &str, items: &[String]) -> Self {
        if items.is_empty() {
            return self;
        }
        let seq = items.iter().map(|s| Value::from(s.as_str())).collect();
        self.value(key, Value::Sequence(seq))
    }

    pub fn params(mut self, params: &Mapping) -> Self {
        for (key, value) in params {
            self.map.insert(key.clone(), value.clone());
        }
        self
    }

    pub fn build(self) -> Mapping {
        self.map
    }
}
