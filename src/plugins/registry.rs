//! Name to implementation lookup for plugins

use crate::core::TefloConfig;
use crate::error::{Result, TefloError};
use crate::plugins::builtin::{LogNotifier, ShellExecutor, ShellOrchestrator};
use crate::plugins::subprocess::SubprocessPlugin;
use crate::plugins::{Executor, Importer, Notifier, Orchestrator, Provisioner};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Builds a plugin instance from the run settings
pub type Factory<P> = Arc<dyn Fn(&TefloConfig) -> Arc<P> + Send + Sync>;

/// Constructors per capability, keyed by plugin name
///
/// Names not registered fall back to a `teflo-plugin-<name>` executable.
#[derive(Clone)]
pub struct PluginRegistry {
    config: Arc<TefloConfig>,
    provisioners: BTreeMap<String, Factory<dyn Provisioner>>,
    orchestrators: BTreeMap<String, Factory<dyn Orchestrator>>,
    executors: BTreeMap<String, Factory<dyn Executor>>,
    importers: BTreeMap<String, Factory<dyn Importer>>,
    notifiers: BTreeMap<String, Factory<dyn Notifier>>,
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("provisioners", &self.provisioners.keys().collect::<Vec<_>>())
            .field("orchestrators", &self.orchestrators.keys().collect::<Vec<_>>())
            .field("executors", &self.executors.keys().collect::<Vec<_>>())
            .field("importers", &self.importers.keys().collect::<Vec<_>>())
            .field("notifiers", &self.notifiers.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn lookup<P: ?Sized>(
    map: &BTreeMap<String, Factory<P>>,
    capability: &str,
    name: &str,
    config: &TefloConfig,
    external: impl FnOnce(SubprocessPlugin) -> Arc<P>,
) -> Result<Arc<P>> {
    if let Some(factory) = map.get(name) {
        return Ok(factory(config));
    }
    SubprocessPlugin::discover(name, config)
        .map(external)
        .ok_or_else(|| TefloError::UnknownPlugin {
            capability: capability.to_string(),
            name: name.to_string(),
        })
}

impl PluginRegistry {
    /// An empty registry; only subprocess plugins resolve
    pub fn new(config: Arc<TefloConfig>) -> Self {
        Self {
            config,
            provisioners: BTreeMap::new(),
            orchestrators: BTreeMap::new(),
            executors: BTreeMap::new(),
            importers: BTreeMap::new(),
            notifiers: BTreeMap::new(),
        }
    }

    /// A registry holding the built-in plugins
    pub fn with_builtins(config: Arc<TefloConfig>) -> Self {
        let mut registry = Self::new(config);
        registry.register_orchestrator("shell", |_| Arc::new(ShellOrchestrator));
        registry.register_executor("shell", |_| Arc::new(ShellExecutor));
        registry.register_notifier("log", |_| Arc::new(LogNotifier));
        registry
    }

    pub fn config(&self) -> &Arc<TefloConfig> {
        &self.config
    }

    pub fn register_provisioner<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&TefloConfig) -> Arc<dyn Provisioner> + Send + Sync + 'static,
    {
        self.provisioners.insert(name.into(), Arc::new(factory));
    }

    pub fn register_orchestrator<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&TefloConfig) -> Arc<dyn Orchestrator> + Send + Sync + 'static,
    {
        self.orchestrators.insert(name.into(), Arc::new(factory));
    }

    pub fn register_executor<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&TefloConfig) -> Arc<dyn Executor> + Send + Sync + 'static,
    {
        self.executors.insert(name.into(), Arc::new(factory));
    }

    pub fn register_importer<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&TefloConfig) -> Arc<dyn Importer> + Send + Sync + 'static,
    {
        self.importers.insert(name.into(), Arc::new(factory));
    }

    pub fn register_notifier<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&TefloConfig) -> Arc<dyn Notifier> + Send + Sync + 'static,
    {
        self.notifiers.insert(name.into(), Arc::new(factory));
    }

    pub fn provisioner(&self, name: &str) -> Result<Arc<dyn Provisioner>> {
        lookup(&self.provisioners, "provisioner", name, &self.config, |p| Arc::new(p) as Arc<dyn Provisioner>)
    }

    pub fn orchestrator(&self, name: &str) -> Result<Arc<dyn Orchestrator>> {
        lookup(&self.orchestrators, "orchestrator", name, &self.config, |p| Arc::new(p) as Arc<dyn Orchestrator>)
    }

    pub fn executor(&self, name: &str) -> Result<Arc<dyn Executor>> {
        lookup(&self.executors, "executor", name, &self.config, |p| Arc::new(p) as Arc<dyn Executor>)
    }

    pub fn importer(&self, name: &str) -> Result<Arc<dyn Importer>> {
        lookup(&self.importers, "importer", name, &self.config, |p| Arc::new(p) as Arc<dyn Importer>)
    }

    pub fn notifier(&self, name: &str) -> Result<Arc<dyn Notifier>> {
        lookup(&self.notifiers, "notifier", name, &self.config, |p| Arc::new(p) as Arc<dyn Notifier>)
    }

    /// Registered names per capability
    pub fn registered(&self) -> Vec<(&'static str, Vec<String>)> {
        vec![
            ("provisioner", self.provisioners.keys().cloned().collect()),
            ("orchestrator", self.orchestrators.keys().cloned().collect()),
            ("executor", self.executors.keys().cloned().collect()),
            ("importer", self.importers.keys().cloned().collect()),
            ("notifier", self.notifiers.keys().cloned().collect()),
        ]
    }
}
