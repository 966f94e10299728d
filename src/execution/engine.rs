//! Main execution engine - drives a scenario through its stages

use crate::core::{
    Clock, RunOptions, RunReport, RunState, Stage, StageReport, SystemClock, TaskOutcome, TefloConfig, Trigger,
    VariableContext,
};
use crate::error::{Result, TefloError};
use crate::execution::executor::{RunMode, TaskResult, TaskRunner};
use crate::execution::labels::validate_labels;
use crate::execution::pipeline::{NotificationPipelineBuilder, PipelineBuilder};
use crate::execution::reconcile::reconcile;
use crate::graph::{GraphBuilder, ScenarioGraph};
use crate::persistence::{results_documents, InventoryWriter, ResultsBackend, ResultsStore};
use crate::plugins::PluginRegistry;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

/// Events that can occur during a run
#[derive(Debug, Clone)]
pub enum TefloEvent {
    RunStarted {
        run_id: String,
        scenario: String,
    },
    StageStarted {
        stage: Stage,
    },
    StageSkipped {
        stage: Stage,
    },
    TaskCompleted {
        task: String,
        outcome: TaskOutcome,
        duration: Duration,
    },
    StageCompleted {
        stage: Stage,
        passed: usize,
        failed: usize,
    },
    RollbackStarted {
        failed_stage: Stage,
    },
    NotificationsSent {
        trigger: Trigger,
        count: usize,
    },
    RunCompleted {
        state: RunState,
        exit_code: i32,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(TefloEvent) + Send + Sync>;

struct StageRun {
    report: StageReport,
    errors: Vec<String>,
}

/// Scenario driver
pub struct Teflo {
    config: Arc<TefloConfig>,
    registry: Arc<PluginRegistry>,
    runner: TaskRunner,
    results: Arc<dyn ResultsBackend>,
    inventory: InventoryWriter,
    clock: Arc<dyn Clock>,
    event_handlers: Arc<Mutex<Vec<EventHandler>>>,
}

impl Teflo {
    pub fn new(config: Arc<TefloConfig>, registry: PluginRegistry) -> Self {
        let registry = Arc::new(registry);
        Self {
            runner: TaskRunner::new(Arc::clone(&config), Arc::clone(&registry)),
            results: Arc::new(ResultsStore::from_config(&config)),
            inventory: InventoryWriter::new(&config),
            clock: Arc::new(SystemClock),
            event_handlers: Arc::new(Mutex::new(Vec::new())),
            registry,
            config,
        }
    }

    /// Replace where results are written
    pub fn with_results(mut self, backend: Arc<dyn ResultsBackend>) -> Self {
        self.results = backend;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &Arc<TefloConfig> {
        &self.config
    }

    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    /// Add an event handler
    pub async fn add_event_handler<F>(&self, handler: F)
    where
        F: Fn(TefloEvent) + Send + Sync + 'static,
    {
        self.event_handlers.lock().await.push(Arc::new(handler));
    }

    /// Emit an event to all handlers
    async fn emit_event(&self, event: TefloEvent) {
        let handlers = self.event_handlers.lock().await;
        for handler in handlers.iter() {
            handler(event.clone());
        }
    }

    /// Build the scenario graph rooted at `sdf`
    pub fn load_graph(&self, sdf: &Path, vars: VariableContext) -> Result<ScenarioGraph> {
        GraphBuilder::new(Arc::clone(&self.config), vars).build(sdf)
    }

    /// Run the requested stages; any failure is returned after results are written
    pub async fn run(&self, graph: &mut ScenarioGraph, options: &RunOptions) -> Result<RunReport> {
        let (report, outcome) = self.run_with_report(graph, options).await;
        outcome.map(|_| report)
    }

    /// Run the requested stages, returning the report alongside the outcome
    ///
    /// Label and plugin errors abort before any stage runs. Otherwise the
    /// on-complete notifications, results files and artifact archive are
    /// always produced, whatever the stages did.
    pub async fn run_with_report(&self, graph: &mut ScenarioGraph, options: &RunOptions) -> (RunReport, Result<()>) {
        let mut report = RunReport::new(self.config.run_id.clone(), graph.root().name.clone());

        if let Err(e) = self.prepare(graph, options) {
            error!("{}", e);
            report.error = Some(e.to_string());
            return (report, Err(e));
        }

        report.started_at = Some(self.clock.now());
        info!("Starting run {} of scenario {}", report.run_id, report.scenario);
        self.emit_event(TefloEvent::RunStarted {
            run_id: report.run_id.clone(),
            scenario: report.scenario.clone(),
        })
        .await;

        if !options.no_notify {
            if let Err(e) = self.fire(graph, Trigger::OnStart, options, &[], &[]).await {
                warn!("On start notifications failed: {}", e);
            }
        }

        let mut outcome = self.run_stages(graph, options, &mut report).await;

        // Terminal reporting runs whatever happened above
        let passed: Vec<String> = report.passed_stages().iter().map(|s| s.to_string()).collect();
        let failed: Vec<String> = report.failed_stages().iter().map(|s| s.to_string()).collect();
        let status = if outcome.is_ok() && failed.is_empty() { 0 } else { 1 };
        for path in graph.paths(options.order) {
            if let Some(node) = graph.node_mut(&path) {
                node.passed_tasks = passed.clone();
                node.failed_tasks = failed.clone();
                node.overall_status = status;
            }
        }

        if !options.no_notify {
            if let Err(e) = self.fire(graph, Trigger::OnComplete, options, &passed, &failed).await {
                warn!("On complete notifications failed: {}", e);
            }
        }

        if let Err(e) = self.persist(graph).await {
            error!("Failed to write results: {}", e);
            if outcome.is_ok() {
                outcome = Err(e);
            }
        }

        if let Err(e) = &outcome {
            report.error = Some(e.to_string());
        }
        report.completed_at = Some(self.clock.now());
        info!(
            "Run {} finished: passed {:?}, failed {:?}",
            report.run_id, passed, failed
        );
        self.emit_event(TefloEvent::RunCompleted {
            state: report.state,
            exit_code: report.exit_code(),
        })
        .await;

        (report, outcome)
    }

    /// Fire the on-demand notifications
    pub async fn notify(&self, graph: &mut ScenarioGraph, options: &RunOptions) -> Result<Vec<TaskResult>> {
        self.prepare(graph, options)?;
        let root = graph.root();
        let (passed, failed) = (root.passed_tasks.clone(), root.failed_tasks.clone());
        self.fire(graph, Trigger::OnDemand, options, &passed, &failed).await
    }

    fn prepare(&self, graph: &mut ScenarioGraph, options: &RunOptions) -> Result<()> {
        validate_labels(graph, options)?;
        graph.resolve_plugins(&self.registry)
    }

    async fn run_stages(&self, graph: &mut ScenarioGraph, options: &RunOptions, report: &mut RunReport) -> Result<()> {
        let mut provisioned = false;

        for stage in options.ordered_stages() {
            report.state = RunState::RunningStage(stage);
            info!("Starting {} stage", stage);
            self.emit_event(TefloEvent::StageStarted { stage }).await;

            let failure = match self.run_stage(graph, stage, options, RunMode::Normal).await {
                Ok(run) => {
                    let failed = run.report.failed.clone();
                    self.emit_stage_end(&run.report).await;
                    report.stages.push(run.report);

                    if !failed.is_empty() {
                        Some(TefloError::StageExecution {
                            stage: stage.to_string(),
                            failed_tasks: failed,
                            message: run.errors.join("; "),
                        })
                    } else if stage == Stage::Provision {
                        provisioned = true;
                        self.inventory.write(graph).await.err()
                    } else {
                        None
                    }
                }
                Err(e) => Some(e),
            };

            let Some(failure) = failure else {
                continue;
            };
            error!("{}", failure);
            report.state = RunState::Failed(stage);

            if options.wants(Stage::Cleanup) && stage != Stage::Cleanup && (provisioned || stage == Stage::Provision) {
                let rollback = self.rollback(graph, options, report, stage).await;
                report.state = RunState::Failed(stage);
                rollback?;
            }
            return Err(failure);
        }

        report.state = RunState::Done;
        Ok(())
    }

    /// Best effort cleanup after a failed stage
    async fn rollback(
        &self,
        graph: &mut ScenarioGraph,
        options: &RunOptions,
        report: &mut RunReport,
        failed_stage: Stage,
    ) -> Result<()> {
        warn!("Stage {} failed, rolling back with cleanup", failed_stage);
        report.state = RunState::RollingBack;
        report.rolled_back = true;
        self.emit_event(TefloEvent::RollbackStarted { failed_stage }).await;

        let run = self
            .run_stage(graph, Stage::Cleanup, options, RunMode::Rollback)
            .await
            .map_err(|e| TefloError::Rollback(e.to_string()))?;
        self.emit_stage_end(&run.report).await;
        report.stages.push(run.report);

        if run.errors.is_empty() {
            Ok(())
        } else {
            Err(TefloError::Rollback(run.errors.join("; ")))
        }
    }

    /// Build and run the stage's pipeline on every node, folding results back
    async fn run_stage(
        &self,
        graph: &mut ScenarioGraph,
        stage: Stage,
        options: &RunOptions,
        mode: RunMode,
    ) -> Result<StageRun> {
        let builder = PipelineBuilder::for_stage(stage);
        let mut paths = graph.paths(options.order);
        if stage == Stage::Cleanup {
            paths.reverse();
        }

        let mut run = StageRun {
            report: StageReport {
                stage,
                passed: Vec::new(),
                failed: Vec::new(),
                skipped: true,
            },
            errors: Vec::new(),
        };

        for path in paths {
            let pipeline = builder.build(graph, &path, options)?;
            if pipeline.is_empty() {
                continue;
            }
            run.report.skipped = false;

            let mut results = self.runner.run_pipeline(pipeline, mode).await;
            for (task, e) in reconcile(graph, &results) {
                if let Some(result) = results.iter_mut().find(|r| r.task == task) {
                    result.outcome = TaskOutcome::Failed(e.to_string());
                }
            }
            for result in &results {
                match &result.outcome {
                    TaskOutcome::Failed(e) => {
                        run.report.failed.push(result.task.clone());
                        run.errors.push(format!("{}: {}", result.task, e));
                    }
                    TaskOutcome::Passed | TaskOutcome::Suppressed(_) => run.report.passed.push(result.task.clone()),
                }
                self.emit_event(TefloEvent::TaskCompleted {
                    task: result.task.clone(),
                    outcome: result.outcome.clone(),
                    duration: result.duration,
                })
                .await;
            }

            if mode == RunMode::Normal && stage != Stage::Cleanup && !run.report.failed.is_empty() {
                break;
            }
        }

        if run.report.skipped {
            warn!("Nothing selected for the {} stage, skipping", stage);
        }
        Ok(run)
    }

    async fn emit_stage_end(&self, report: &StageReport) {
        let event = if report.skipped {
            TefloEvent::StageSkipped { stage: report.stage }
        } else {
            TefloEvent::StageCompleted {
                stage: report.stage,
                passed: report.passed.len(),
                failed: report.failed.len(),
            }
        };
        self.emit_event(event).await;
    }

    /// Run the notify pipelines of `trigger` on every node
    async fn fire(
        &self,
        graph: &ScenarioGraph,
        trigger: Trigger,
        options: &RunOptions,
        passed: &[String],
        failed: &[String],
    ) -> Result<Vec<TaskResult>> {
        let builder = NotificationPipelineBuilder::for_trigger(trigger);
        let mut results = Vec::new();
        for path in graph.paths(options.order) {
            let pipeline = builder.build(graph, &path, options, passed, failed)?;
            if pipeline.is_empty() {
                continue;
            }
            results.extend(self.runner.run_pipeline(pipeline, RunMode::Normal).await);
        }

        for result in results.iter().filter(|r| r.outcome.is_failure()) {
            warn!("Notification {} failed: {}", result.task, result.outcome.error().unwrap_or_default());
        }
        if !results.is_empty() {
            info!("Sent {} {} notification(s)", results.len(), trigger);
        }
        self.emit_event(TefloEvent::NotificationsSent {
            trigger,
            count: results.len(),
        })
        .await;
        Ok(results)
    }

    async fn persist(&self, graph: &ScenarioGraph) -> Result<()> {
        self.results.save(&results_documents(graph)).await?;
        self.results.archive(&self.config).await
    }
}
