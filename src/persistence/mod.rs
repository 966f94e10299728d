//! Persistence of run results, inventories and run artifacts

pub mod inventory;
pub mod lock;
pub mod store;

pub use inventory::InventoryWriter;
pub use lock::{FileLock, LockGuard};
pub use store::ResultsStore;

use crate::core::TefloConfig;
use crate::error::Result;
use crate::graph::ScenarioGraph;
use serde_yaml::{Mapping, Value};
use std::collections::{BTreeMap, HashMap};

/// Results file of the root scenario
pub const ROOT_RESULTS_FILE: &str = "results.yml";

/// One results file and its content
#[derive(Debug, Clone, PartialEq)]
pub struct ResultsDocument {
    pub file_name: String,
    pub document: Mapping,
}

/// Results documents for every node of the graph, root first
///
/// Each node's document is its profile; a node with children also carries an
/// `include` list naming the children's results files. Nodes whose file stems
/// collide are named after their whole relative path instead.
pub fn results_documents(graph: &ScenarioGraph) -> Vec<ResultsDocument> {
    let mut paths = graph.paths(graph.order());
    paths.sort_by_key(|path| !path.is_empty());

    let mut stems: HashMap<String, usize> = HashMap::new();
    for path in paths.iter().filter(|p| !p.is_empty()) {
        if let Some(node) = graph.node(path) {
            *stems.entry(node.results_file_name()).or_default() += 1;
        }
    }

    let file_name = |path: &[usize]| -> Option<String> {
        let node = graph.node(path)?;
        if path.is_empty() {
            return Some(ROOT_RESULTS_FILE.to_string());
        }
        let name = node.results_file_name();
        if stems.get(&name).copied().unwrap_or_default() > 1 {
            Some(node.qualified_results_file_name())
        } else {
            Some(name)
        }
    };

    paths
        .iter()
        .filter_map(|path| {
            let node = graph.node(path)?;
            let mut document = node.profile();
            if !node.child_scenarios.is_empty() {
                let includes = (0..node.child_scenarios.len())
                    .filter_map(|i| {
                        let mut child = path.clone();
                        child.push(i);
                        file_name(&child)
                    })
                    .map(Value::from)
                    .collect();
                document.insert(Value::from("include"), Value::Sequence(includes));
            }
            Some(ResultsDocument {
                file_name: file_name(path)?,
                document,
            })
        })
        .collect()
}

/// Where results go once a run finishes
#[async_trait::async_trait]
pub trait ResultsBackend: Send + Sync {
    /// Store the results documents of a run
    async fn save(&self, documents: &[ResultsDocument]) -> Result<()>;

    /// Load a previously stored document by file name
    async fn load(&self, file_name: &str) -> Result<Option<Mapping>>;

    /// Collect run artifacts (inventory, logs) next to the results
    async fn archive(&self, _config: &TefloConfig) -> Result<()> {
        Ok(())
    }
}

/// In-memory results (for testing or dry runs)
#[derive(Default)]
pub struct InMemoryResults {
    documents: tokio::sync::RwLock<BTreeMap<String, Mapping>>,
}

impl InMemoryResults {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn file_names(&self) -> Vec<String> {
        self.documents.read().await.keys().cloned().collect()
    }
}

#[async_trait::async_trait]
impl ResultsBackend for InMemoryResults {
    async fn save(&self, documents: &[ResultsDocument]) -> Result<()> {
        let mut stored = self.documents.write().await;
        for doc in documents {
            stored.insert(doc.file_name.clone(), doc.document.clone());
        }
        Ok(())
    }

    async fn load(&self, file_name: &str) -> Result<Option<Mapping>> {
        Ok(self.documents.read().await.get(file_name).cloned())
    }
}
