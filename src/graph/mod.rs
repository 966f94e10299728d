//! Scenario graph: the root scenario and its included children
//!
//! The graph owns the tree. Nodes are addressed by [`NodePath`], the list of
//! child indices leading from the root to the node.

pub mod builder;
pub mod remote;

pub use builder::GraphBuilder;

use crate::core::resource::{Resource, ResourceId};
use crate::core::{Asset, Execute, Scenario, TraversalOrder};
use crate::error::Result;
use crate::plugins::PluginRegistry;
use std::collections::{HashSet, VecDeque};

/// Child-index path from the root to a node; the root is `[]`
pub type NodePath = Vec<usize>;

#[derive(Debug, Clone)]
pub struct ScenarioGraph {
    root: Scenario,
    order: TraversalOrder,
}

impl ScenarioGraph {
    pub fn new(root: Scenario) -> Self {
        Self {
            root,
            order: TraversalOrder::default(),
        }
    }

    pub fn with_order(mut self, order: TraversalOrder) -> Self {
        self.order = order;
        self
    }

    pub fn order(&self) -> TraversalOrder {
        self.order
    }

    pub fn root(&self) -> &Scenario {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut Scenario {
        &mut self.root
    }

    pub fn node(&self, path: &[usize]) -> Option<&Scenario> {
        path.iter()
            .try_fold(&self.root, |node, idx| node.child_scenarios.get(*idx))
    }

    pub fn node_mut(&mut self, path: &[usize]) -> Option<&mut Scenario> {
        let mut node = &mut self.root;
        for idx in path {
            node = node.child_scenarios.get_mut(*idx)?;
        }
        Some(node)
    }

    /// Walk the graph in its configured order
    pub fn iter(&self) -> GraphIter<'_> {
        self.iter_order(self.order)
    }

    /// Walk the graph in `order`; each call is an independent full pass
    pub fn iter_order(&self, order: TraversalOrder) -> GraphIter<'_> {
        GraphIter {
            graph: self,
            paths: self.paths(order).into(),
            visited: HashSet::new(),
        }
    }

    /// Node paths in traversal order
    ///
    /// Both orders yield every descendant before its ancestor.
    pub fn paths(&self, order: TraversalOrder) -> Vec<NodePath> {
        match order {
            TraversalOrder::ByDepth => {
                let mut out = Vec::new();
                post_order(&self.root, &mut Vec::new(), &mut out);
                out
            }
            TraversalOrder::ByLevel => {
                let mut levels: Vec<Vec<NodePath>> = vec![vec![Vec::new()]];
                loop {
                    let mut next = Vec::new();
                    for path in levels.last().into_iter().flatten() {
                        if let Some(node) = self.node(path) {
                            for idx in 0..node.child_scenarios.len() {
                                let mut child = path.clone();
                                child.push(idx);
                                next.push(child);
                            }
                        }
                    }
                    if next.is_empty() {
                        break;
                    }
                    levels.push(next);
                }
                levels.into_iter().rev().flatten().collect()
            }
        }
    }

    /// Number of nodes, root included
    pub fn node_count(&self) -> usize {
        self.paths(TraversalOrder::ByDepth).len()
    }

    /// Assets of every node, in traversal order
    pub fn get_assets(&self) -> Vec<&Asset> {
        self.iter().flat_map(|node| node.assets.iter()).collect()
    }

    /// Executes of every node, in traversal order
    pub fn get_executes(&self) -> Vec<&Execute> {
        self.iter().flat_map(|node| node.executes.iter()).collect()
    }

    /// Labels carried by any resource anywhere in the graph
    pub fn labels(&self) -> Vec<String> {
        let mut labels = Vec::new();
        for node in self.iter() {
            for label in node.labels() {
                if !labels.contains(&label) {
                    labels.push(label);
                }
            }
        }
        labels
    }

    /// Find which node holds the resource with `id`
    pub fn locate(&self, id: ResourceId) -> Option<NodePath> {
        self.paths(TraversalOrder::ByDepth).into_iter().find(|path| {
            self.node(path).is_some_and(|node| {
                node.assets.iter().any(|r| r.id() == id)
                    || node.actions.iter().any(|r| r.id() == id)
                    || node.executes.iter().any(|r| r.id() == id)
                    || node.reports.iter().any(|r| r.id() == id)
                    || node.notifications.iter().any(|r| r.id() == id)
            })
        })
    }

    pub fn resolve_plugins(&mut self, registry: &PluginRegistry) -> Result<()> {
        for path in self.paths(TraversalOrder::ByDepth) {
            if let Some(node) = self.node_mut(&path) {
                node.resolve_plugins(registry)?;
            }
        }
        Ok(())
    }
}

fn post_order(node: &Scenario, path: &mut NodePath, out: &mut Vec<NodePath>) {
    for (idx, child) in node.child_scenarios.iter().enumerate() {
        path.push(idx);
        post_order(child, path, out);
        path.pop();
    }
    out.push(path.clone());
}

/// One full pass over the graph
pub struct GraphIter<'a> {
    graph: &'a ScenarioGraph,
    paths: VecDeque<NodePath>,
    visited: HashSet<ResourceId>,
}

impl<'a> Iterator for GraphIter<'a> {
    type Item = &'a Scenario;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(path) = self.paths.pop_front() {
            let Some(node) = self.graph.node(&path) else {
                continue;
            };
            if self.visited.insert(node.id()) {
                return Some(node);
            }
        }
        None
    }
}
