//! CLI output formatting

use crate::core::{RunReport, RunState, Scenario, TaskOutcome, TraversalOrder};
use crate::execution::{Pipeline, TefloEvent};
use crate::graph::ScenarioGraph;
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "!");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");

/// Spinner shown while a stage runs
pub fn stage_spinner(stage: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(template) = ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed}] {msg}") {
        spinner.set_style(template);
    }
    spinner.set_message(format!("{} stage", style(stage).cyan()));
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

pub fn format_state(state: RunState) -> String {
    match state {
        RunState::NotStarted => style("NOT STARTED").dim().to_string(),
        RunState::RunningStage(stage) => style(format!("RUNNING {}", stage)).yellow().to_string(),
        RunState::Failed(stage) => style(format!("FAILED in {}", stage)).red().to_string(),
        RunState::RollingBack => style("ROLLING BACK").yellow().to_string(),
        RunState::Done => style("DONE").green().to_string(),
    }
}

/// Format an engine event, `None` for events only the spinner reflects
pub fn format_event(event: &TefloEvent) -> Option<String> {
    match event {
        TefloEvent::RunStarted { run_id, scenario } => Some(format!(
            "{} Running scenario {} ({})",
            ROCKET,
            style(scenario).bold(),
            style(run_id).dim()
        )),
        TefloEvent::StageStarted { .. } => None,
        TefloEvent::StageSkipped { stage } => {
            Some(format!("{} {} skipped, nothing selected", WARN, style(stage).dim()))
        }
        TefloEvent::TaskCompleted { task, outcome, duration } => Some(match outcome {
            TaskOutcome::Passed => format!(
                "{} {} {}",
                CHECK,
                style(task).green(),
                style(format_duration(*duration)).dim()
            ),
            TaskOutcome::Failed(error) => format!("{} {}: {}", CROSS, style(task).red(), style(error).dim()),
            TaskOutcome::Suppressed(error) => {
                format!("{} {} (ignored): {}", WARN, style(task).yellow(), style(error).dim())
            }
        }),
        TefloEvent::StageCompleted { stage, passed, failed } => Some(if *failed == 0 {
            format!("{} {} stage passed ({} tasks)", CHECK, style(stage).bold(), passed)
        } else {
            format!(
                "{} {} stage failed ({} of {} tasks)",
                CROSS,
                style(stage).bold(),
                style(failed).red(),
                passed + failed
            )
        }),
        TefloEvent::RollbackStarted { failed_stage } => Some(format!(
            "{} {} failed, running cleanup",
            WARN,
            style(failed_stage).yellow()
        )),
        TefloEvent::NotificationsSent { trigger, count } => {
            (*count > 0).then(|| format!("{} {} {} notification(s)", INFO, count, style(trigger).dim()))
        }
        TefloEvent::RunCompleted { state, .. } => Some(format!("{} Run {}", INFO, format_state(*state))),
    }
}

/// Final summary of a run
pub fn format_report(report: &RunReport) -> String {
    let mut lines = vec![format!(
        "{} {} - {}",
        if report.succeeded() { CHECK } else { CROSS },
        style(&report.scenario).bold(),
        format_state(report.state)
    )];
    for stage in &report.stages {
        let status = if stage.skipped {
            style("skipped").dim().to_string()
        } else if stage.failed.is_empty() {
            style("passed").green().to_string()
        } else {
            style(format!("failed: {}", stage.failed.join(", "))).red().to_string()
        };
        lines.push(format!("  {:<12} {}", stage.stage.as_str(), status));
    }
    if report.rolled_back {
        lines.push(format!("  {}", style("cleanup ran as rollback").yellow()));
    }
    if let (Some(start), Some(end)) = (report.started_at, report.completed_at) {
        if let Ok(duration) = end.signed_duration_since(start).to_std() {
            lines.push(format!("  Duration: {}", style(format_duration(duration)).dim()));
        }
    }
    lines.join("\n")
}

fn push_tree(lines: &mut Vec<String>, node: &Scenario, depth: usize) {
    lines.push(format!(
        "{}{} {}",
        "  ".repeat(depth),
        style(&node.name).bold(),
        style(&node.relative_path).dim()
    ));
    for child in &node.child_scenarios {
        push_tree(lines, child, depth + 1);
    }
}

/// Include tree followed by the traversal order
pub fn format_graph(graph: &ScenarioGraph, order: TraversalOrder) -> String {
    let mut lines = Vec::new();
    push_tree(&mut lines, graph.root(), 0);
    let walk: Vec<&str> = graph.iter_order(order).map(|s| s.name.as_str()).collect();
    lines.push(String::new());
    lines.push(format!("{} {:?}: {}", INFO, order, walk.join(" -> ")));
    lines.join("\n")
}

/// One line per task of a pipeline
pub fn format_pipeline(node: &str, pipeline: &Pipeline) -> String {
    let mut lines = vec![format!(
        "{} {} @ {} ({})",
        INFO,
        style(&pipeline.name).bold(),
        node,
        if pipeline.concurrent { "parallel" } else { "serial" }
    )];
    for name in pipeline.task_names() {
        lines.push(format!("    {}", style(name).cyan()));
    }
    lines.join("\n")
}

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{}.{:01}s", secs, duration.subsec_millis() / 100)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
