//! Template variables for descriptor rendering

use crate::error::{Result, TefloError};
use regex::{Captures, Regex};
use serde_yaml::{Mapping, Value};
use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;
use tracing::debug;

/// Variables shared by every descriptor of a graph
///
/// Nested mappings are flattened into dotted keys (`a.b`).
#[derive(Debug, Clone, Default)]
pub struct VariableContext {
    /// Flattened variables
    pub variables: HashMap<String, String>,
}

fn placeholder() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\{\{\s*([A-Za-z0-9_.\-]+)\s*\}\}").expect("valid placeholder pattern"))
}

impl VariableContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_variable(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.variables.insert(key.into(), value.into());
    }

    pub fn get_variable(&self, key: &str) -> Option<&String> {
        self.variables.get(key)
    }

    /// Load every `--vars-data` entry in order; later entries win
    ///
    /// An entry is a YAML file, a directory of YAML files, or `key=value`.
    pub fn load_sources(sources: &[String], workspace: &Path) -> Result<Self> {
        let mut ctx = Self::new();
        for source in sources {
            ctx.load_source(source, workspace)?;
        }
        Ok(ctx)
    }

    fn load_source(&mut self, source: &str, workspace: &Path) -> Result<()> {
        let path = if Path::new(source).is_absolute() {
            Path::new(source).to_path_buf()
        } else {
            workspace.join(source)
        };

        if path.is_dir() {
            let mut files: Vec<_> = std::fs::read_dir(&path)?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| matches!(p.extension().and_then(|e| e.to_str()), Some("yml" | "yaml")))
                .collect();
            files.sort();
            for file in files {
                self.load_file(&file)?;
            }
        } else if path.is_file() {
            self.load_file(&path)?;
        } else if let Some((key, value)) = source.split_once('=') {
            self.set_variable(key.trim(), value.trim());
        } else {
            return Err(TefloError::Config(format!("variable source '{}' not found", source)));
        }
        Ok(())
    }

    fn load_file(&mut self, path: &Path) -> Result<()> {
        debug!("Loading variables from {}", path.display());
        let content = std::fs::read_to_string(path)?;
        match serde_yaml::from_str::<Value>(&content)? {
            Value::Mapping(map) => self.merge_mapping(&map),
            Value::Null => {}
            _ => {
                return Err(TefloError::Config(format!(
                    "variable file {} must contain a mapping",
                    path.display()
                )))
            }
        }
        Ok(())
    }

    /// Add a mapping, flattening nested keys
    pub fn merge_mapping(&mut self, map: &Mapping) {
        self.flatten("", map);
    }

    fn flatten(&mut self, prefix: &str, map: &Mapping) {
        for (key, value) in map {
            let Some(key) = scalar(key) else {
                continue;
            };
            let full = if prefix.is_empty() {
                key
            } else {
                format!("{}.{}", prefix, key)
            };
            match value {
                Value::Mapping(inner) => self.flatten(&full, inner),
                // Lists render in flow style so they stay valid inline YAML
                Value::Sequence(_) => {
                    self.variables.insert(full, serde_json::to_string(value).unwrap_or_default());
                }
                other => {
                    if let Some(text) = scalar(other) {
                        self.variables.insert(full, text);
                    }
                }
            }
        }
    }

    /// Replace `{{ key }}` placeholders; unknown keys are left as written
    pub fn render(&self, text: &str) -> String {
        placeholder()
            .replace_all(text, |caps: &Captures| match self.variables.get(&caps[1]) {
                Some(value) => value.clone(),
                None => {
                    debug!("No value for template variable '{}'", &caps[1]);
                    caps[0].to_string()
                }
            })
            .into_owned()
    }
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
