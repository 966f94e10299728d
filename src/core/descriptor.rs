//! Scenario descriptor parsing and structural validation

use crate::core::config::TefloConfig;
use crate::core::resource::{AnyResource, ResourceKind};
use crate::core::scenario::{RemoteWorkspace, ResourceCheck, Scenario};
use crate::error::{Result, TefloError};
use serde_yaml::{Mapping, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Top-level keys with a dedicated meaning; anything else is scenario metadata
pub const RESERVED_KEYS: &[&str] = &[
    "name",
    "description",
    "provision",
    "orchestrate",
    "execute",
    "report",
    "notifications",
    "include",
    "resource_check",
    "remote_workspace",
];

/// A parsed and structurally valid scenario descriptor
#[derive(Debug, Clone)]
pub struct Descriptor {
    pub path: PathBuf,
    pub relative_path: String,
    document: Mapping,
}

impl Descriptor {
    /// Parse rendered descriptor text and validate its structure
    pub fn parse(text: &str, path: &Path, relative_path: impl Into<String>) -> Result<Self> {
        let relative_path = relative_path.into();
        let value: Value =
            serde_yaml::from_str(text).map_err(|e| TefloError::schema(&relative_path, e.to_string()))?;
        let document = validate(&value, &relative_path)?;
        Ok(Self {
            path: path.to_path_buf(),
            relative_path,
            document,
        })
    }

    pub fn name(&self) -> Option<&str> {
        self.document.get("name").and_then(Value::as_str)
    }

    /// Include entries in declaration order; empty strings are kept so the
    /// graph builder can report them
    pub fn includes(&self) -> Vec<String> {
        match self.document.get("include") {
            Some(Value::String(s)) => vec![s.clone()],
            Some(Value::Sequence(items)) => items
                .iter()
                .map(|item| item.as_str().unwrap_or_default().to_string())
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn remote_workspaces(&self) -> Result<Vec<RemoteWorkspace>> {
        match self.document.get("remote_workspace") {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(value) => serde_yaml::from_value(value.clone())
                .map_err(|e| TefloError::schema(&self.relative_path, format!("remote_workspace: {}", e))),
        }
    }

    /// Build the scenario node; includes are attached by the graph builder
    pub fn into_scenario(self, config: Arc<TefloConfig>) -> Result<Scenario> {
        let name = self
            .name()
            .map(str::to_string)
            .ok_or_else(|| TefloError::schema(&self.relative_path, "'name' is required"))?;
        let mut scenario = Scenario::new(name, Arc::clone(&config));
        scenario.path = self.path.clone();
        scenario.relative_path = self.relative_path.clone();
        scenario.description = self.document.get("description").and_then(Value::as_str).map(str::to_string);
        scenario.remote_workspace = self.remote_workspaces()?;

        if let Some(value) = self.document.get("resource_check") {
            scenario.resource_check = serde_yaml::from_value::<Option<ResourceCheck>>(value.clone())
                .map_err(|e| TefloError::schema(&self.relative_path, format!("resource_check: {}", e)))?
                .unwrap_or_default();
        }

        for (key, value) in &self.document {
            let reserved = key.as_str().is_some_and(|k| RESERVED_KEYS.contains(&k));
            if !reserved {
                scenario.metadata.insert(key.clone(), value.clone());
            }
        }

        for kind in ResourceKind::ALL {
            let Some(Value::Sequence(items)) = self.document.get(kind.section()) else {
                continue;
            };
            for item in items {
                if let Value::Mapping(data) = item {
                    let resource = AnyResource::from_profile(kind, data, Arc::clone(&config))?;
                    scenario.add_resource(resource);
                }
            }
        }

        Ok(scenario)
    }
}

/// Check the shape of a descriptor document
///
/// Field-level validation of each resource happens when it is constructed.
pub fn validate(document: &Value, path: &str) -> Result<Mapping> {
    let Value::Mapping(map) = document else {
        return Err(TefloError::schema(path, "descriptor must be a mapping"));
    };

    match map.get("name") {
        Some(Value::String(s)) if !s.trim().is_empty() => {}
        _ => return Err(TefloError::schema(path, "'name' is required")),
    }

    if let Some(value) = map.get("description") {
        if !matches!(value, Value::String(_) | Value::Null) {
            return Err(TefloError::schema(path, "'description' must be a string"));
        }
    }

    for kind in ResourceKind::ALL {
        let section = kind.section();
        match map.get(section) {
            None | Some(Value::Null) => {}
            Some(Value::Sequence(items)) => {
                for (idx, item) in items.iter().enumerate() {
                    let Value::Mapping(entry) = item else {
                        return Err(TefloError::schema(
                            path,
                            format!("{}[{}] must be a mapping", section, idx),
                        ));
                    };
                    if !entry.get("name").is_some_and(|n| n.is_string() || n.is_number()) {
                        return Err(TefloError::schema(path, format!("{}[{}] has no name", section, idx)));
                    }
                }
            }
            Some(_) => return Err(TefloError::schema(path, format!("'{}' must be a list", section))),
        }
    }

    match map.get("include") {
        None | Some(Value::Null) | Some(Value::String(_)) => {}
        Some(Value::Sequence(items)) if items.iter().all(|i| i.is_string() || i.is_null()) => {}
        Some(_) => return Err(TefloError::schema(path, "'include' must be a list of paths")),
    }

    if let Some(value) = map.get("resource_check") {
        if !matches!(value, Value::Mapping(_) | Value::Null) {
            return Err(TefloError::schema(path, "'resource_check' must be a mapping"));
        }
    }

    match map.get("remote_workspace") {
        None | Some(Value::Null) => {}
        Some(Value::Sequence(items)) => {
            for item in items {
                let ok = item.get("workspace_url").is_some_and(Value::is_string)
                    && item.get("alias").is_some_and(Value::is_string);
                if !ok {
                    return Err(TefloError::schema(
                        path,
                        "remote_workspace entries need 'workspace_url' and 'alias'",
                    ));
                }
            }
        }
        Some(_) => return Err(TefloError::schema(path, "'remote_workspace' must be a list")),
    }

    Ok(map.clone())
}
