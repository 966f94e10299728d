//! Stage execution: pipelines, task running and the scenario driver

pub mod engine;
pub mod executor;
pub mod labels;
pub mod pipeline;
pub mod reconcile;
pub mod scheduler;

pub use engine::{EventHandler, Teflo, TefloEvent};
pub use executor::{RunMode, TaskResult, TaskRunner};
pub use pipeline::{NotificationPipelineBuilder, Origin, Package, Pipeline, PipelineBuilder, Task};
pub use reconcile::reconcile;
pub use scheduler::SchedulingStrategy;
