//! Scenario-based tests for teflo

mod graph_include;
mod labels;
mod notifications;
mod pipelines;
mod results;
mod rollback;
