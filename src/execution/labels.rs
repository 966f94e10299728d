//! Label selection of resources

use crate::core::resource::Resource;
use crate::core::RunOptions;
use crate::error::{Result, TefloError};
use crate::graph::ScenarioGraph;

/// Whether a resource carrying `labels` takes part in the run
///
/// `labels` takes priority over `skip_labels`; with neither set everything
/// is selected.
pub fn is_selected(labels: &[String], options: &RunOptions) -> bool {
    if !options.labels.is_empty() {
        return labels.iter().any(|l| options.labels.contains(l));
    }
    if !options.skip_labels.is_empty() {
        return !labels.iter().any(|l| options.skip_labels.contains(l));
    }
    true
}

/// Resources of `list` selected by the run's labels, in declaration order
pub fn filter<'a, R: Resource>(list: &'a [R], options: &RunOptions) -> Vec<&'a R> {
    list.iter().filter(|r| is_selected(r.labels(), options)).collect()
}

/// Fail when a requested label is carried by no resource anywhere in the graph
pub fn validate_labels(graph: &ScenarioGraph, options: &RunOptions) -> Result<()> {
    let requested = if !options.labels.is_empty() {
        &options.labels
    } else {
        &options.skip_labels
    };
    if requested.is_empty() {
        return Ok(());
    }

    let universe = graph.labels();
    let unknown: Vec<String> = requested
        .iter()
        .filter(|label| !universe.contains(label))
        .cloned()
        .collect();

    if unknown.is_empty() {
        Ok(())
    } else {
        Err(TefloError::LabelMismatch { labels: unknown })
    }
}
