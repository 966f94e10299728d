//! Folding task results back into the scenario graph

use crate::core::resource::AnyResource;
use crate::error::{Result, TefloError};
use crate::execution::executor::TaskResult;
use crate::graph::ScenarioGraph;
use std::sync::Arc;
use tracing::{debug, warn};

/// Apply each result's resource changes to the node it came from
///
/// A result carrying profiles replaces its resource with the first profile
/// and inserts the rest right after it; a result carrying only a resource
/// overwrites it in place. Positions are looked up by identity for each
/// result, so earlier expansions never shift later writes onto the wrong
/// entry. Resources not named by any result are left alone.
///
/// A result whose profiles cannot be loaded leaves its resource untouched and
/// is returned with the error, the remaining results are still applied.
pub fn reconcile(graph: &mut ScenarioGraph, results: &[TaskResult]) -> Vec<(String, TefloError)> {
    let mut rejected = Vec::new();
    for result in results {
        let Some(kind) = result.origin.kind else {
            continue;
        };
        if result.rvalue.is_none() && result.resource.is_none() {
            continue;
        }
        let Some(node) = graph.node_mut(&result.origin.node) else {
            continue;
        };
        let Some(idx) = node.get_resource_idx(kind, result.origin.id) else {
            debug!("{} no longer present, skipping update", result.task);
            continue;
        };

        match (&result.rvalue, &result.resource) {
            (Some(profiles), _) if !profiles.is_empty() => {
                let config = Arc::clone(node.config());
                let expanded: Result<Vec<_>> = profiles
                    .iter()
                    .map(|profile| AnyResource::from_profile(kind, profile, Arc::clone(&config)))
                    .collect();
                let expanded = match expanded {
                    Ok(expanded) => expanded,
                    Err(e) => {
                        warn!("{} returned an unusable profile: {}", result.task, e);
                        rejected.push((result.task.clone(), e));
                        continue;
                    }
                };
                debug!("{} expanded into {} resource(s)", result.task, expanded.len());
                for (offset, resource) in expanded.into_iter().enumerate() {
                    if offset == 0 {
                        node.replace_resource(resource, idx);
                    } else {
                        node.insert_resource(resource, idx + offset);
                    }
                }
            }
            (_, Some(resource)) => node.replace_resource(resource.clone(), idx),
            _ => {}
        }
    }
    rejected
}
