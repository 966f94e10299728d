//! Execution scheduler - decides how the tasks of a pipeline are dispatched

use crate::core::TefloConfig;
use crate::execution::pipeline::Pipeline;

/// Strategy for dispatching the tasks of one pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedulingStrategy {
    /// One task at a time, in pipeline order
    #[default]
    Sequential,

    /// All tasks at once
    Parallel,

    /// At most N tasks in flight
    LimitedParallel(usize),
}

impl SchedulingStrategy {
    /// Pick the strategy for `pipeline` from its concurrency flag and the run settings
    pub fn for_pipeline(pipeline: &Pipeline, config: &TefloConfig) -> Self {
        if !pipeline.concurrent || pipeline.len() <= 1 {
            return SchedulingStrategy::Sequential;
        }
        match config.max_parallel_tasks {
            0 => SchedulingStrategy::Parallel,
            1 => SchedulingStrategy::Sequential,
            n if n >= pipeline.len() => SchedulingStrategy::Parallel,
            n => SchedulingStrategy::LimitedParallel(n),
        }
    }

    pub fn is_sequential(&self) -> bool {
        matches!(self, SchedulingStrategy::Sequential)
    }

    /// Permits for the in-flight bound, `None` when unbounded
    pub fn limit(&self) -> Option<usize> {
        match self {
            SchedulingStrategy::Sequential => Some(1),
            SchedulingStrategy::Parallel => None,
            SchedulingStrategy::LimitedParallel(n) => Some(*n),
        }
    }
}
