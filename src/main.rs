use anyhow::{Context, Result};
use std::path::Path;
use std::sync::{Arc, Mutex};
use teflo::cli::commands::{GraphCommand, NotifyCommand, RunCommand, ScenarioArgs, ShowCommand, ValidateCommand};
use teflo::cli::output::*;
use teflo::cli::{Cli, Command};
use teflo::core::resource::Resource;
use teflo::core::{RunOptions, Stage};
use teflo::execution::labels;
use teflo::execution::PipelineBuilder;
use teflo::{PluginRegistry, ScenarioGraph, Teflo, TefloConfig, TefloEvent, VariableContext};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    let result = match &cli.command {
        Command::Run(cmd) => run_scenario(cmd, &cli).await,
        Command::Validate(cmd) => validate_scenario(cmd, &cli).await,
        Command::Notify(cmd) => notify(cmd, &cli).await,
        Command::Show(cmd) => show_scenario(cmd, &cli),
        Command::Graph(cmd) => show_graph(cmd, &cli),
    };

    match result {
        Ok(0) => Ok(()),
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("{} {}", CROSS, style(format!("{:#}", e)).red());
            std::process::exit(1);
        }
    }
}

/// Stderr logging plus, for runs, the scenario log file
fn init_logging(cli: &Cli, config: &TefloConfig, log_file: Option<&Path>) -> Result<()> {
    let level = if cli.verbose { "debug" } else { config.log_level.as_str() };
    let filter = || EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level));

    let file_layer = match log_file {
        Some(path) => {
            let file = std::fs::File::create(path)
                .with_context(|| format!("Failed to create log file {}", path.display()))?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .with_filter(filter()?),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_filter(filter()?))
        .with(file_layer)
        .try_init()
        .context("Failed to set logging subscriber")?;
    Ok(())
}

fn load_config(cli: &Cli, args: &ScenarioArgs) -> Result<TefloConfig> {
    let mut config = TefloConfig::load(cli.config.as_deref()).context("Failed to load teflo settings")?;
    if let Some(workspace) = &args.workspace {
        config.workspace = workspace.clone();
    } else if let Some(parent) = args.scenario.parent().filter(|p| !p.as_os_str().is_empty()) {
        if config.workspace == Path::new(".") {
            config.workspace = parent.to_path_buf();
        }
    }
    if let Some(folder) = &args.data_folder {
        config.data_folder = folder.clone();
    }
    Ok(config)
}

/// Settings for a command that runs stages: run folders and log file included
fn prepare_run(cli: &Cli, args: &ScenarioArgs) -> Result<Arc<TefloConfig>> {
    let config = load_config(cli, args)?.finalize()?;
    init_logging(cli, &config, Some(&config.log_file()))?;
    Ok(Arc::new(config))
}

fn load_graph(config: &Arc<TefloConfig>, args: &ScenarioArgs) -> Result<ScenarioGraph> {
    let vars = VariableContext::load_sources(&args.vars_data, &config.workspace)?;
    let graph = teflo::graph::GraphBuilder::new(Arc::clone(config), vars)
        .build(&args.scenario)
        .with_context(|| format!("Failed to load scenario {}", args.scenario.display()))?;
    Ok(graph)
}

async fn attach_console(engine: &Teflo) {
    let spinner: Arc<Mutex<Option<indicatif::ProgressBar>>> = Arc::new(Mutex::new(None));
    engine
        .add_event_handler(move |event| {
            let Ok(mut current) = spinner.lock() else {
                return;
            };
            match &event {
                TefloEvent::StageStarted { stage } => {
                    *current = Some(stage_spinner(stage.as_str()));
                }
                TefloEvent::StageCompleted { .. } | TefloEvent::StageSkipped { .. } => {
                    if let Some(bar) = current.take() {
                        bar.finish_and_clear();
                    }
                }
                _ => {}
            }
            if let Some(line) = format_event(&event) {
                match current.as_ref() {
                    Some(bar) => bar.println(line),
                    None => println!("{}", line),
                }
            }
        })
        .await;
}

async fn execute(cli: &Cli, args: &ScenarioArgs, options: RunOptions) -> Result<i32> {
    let config = prepare_run(cli, args)?;
    let mut graph = load_graph(&config, args)?.with_order(options.order);

    let engine = Teflo::new(Arc::clone(&config), PluginRegistry::with_builtins(Arc::clone(&config)));
    attach_console(&engine).await;

    let (report, outcome) = engine.run_with_report(&mut graph, &options).await;
    println!("\n{}", format_report(&report));
    println!(
        "{} Results: {}",
        INFO,
        style(config.results_folder().display()).dim()
    );
    outcome?;
    Ok(report.exit_code())
}

async fn run_scenario(cmd: &RunCommand, cli: &Cli) -> Result<i32> {
    execute(cli, &cmd.scenario, cmd.options()).await
}

async fn validate_scenario(cmd: &ValidateCommand, cli: &Cli) -> Result<i32> {
    let code = execute(cli, &cmd.scenario, cmd.options()).await?;
    if code == 0 {
        println!("{} Scenario is valid!", CHECK);
    }
    Ok(code)
}

async fn notify(cmd: &NotifyCommand, cli: &Cli) -> Result<i32> {
    let config = prepare_run(cli, &cmd.scenario)?;
    let mut graph = load_graph(&config, &cmd.scenario)?;
    let engine = Teflo::new(Arc::clone(&config), PluginRegistry::with_builtins(Arc::clone(&config)));

    let results = engine.notify(&mut graph, &cmd.options()).await?;
    if results.is_empty() {
        println!("{} No on-demand notifications selected", WARN);
        return Ok(0);
    }
    let mut failed = 0;
    for result in &results {
        match result.outcome.error() {
            None => println!("{} {}", CHECK, style(&result.task).green()),
            Some(error) => {
                failed += 1;
                println!("{} {}: {}", CROSS, style(&result.task).red(), style(error).dim());
            }
        }
    }
    Ok(if failed == 0 { 0 } else { 1 })
}

fn inspect(cli: &Cli, args: &ScenarioArgs) -> Result<(Arc<TefloConfig>, ScenarioGraph)> {
    let config = load_config(cli, args)?;
    init_logging(cli, &config, None)?;
    let config = Arc::new(config);
    let graph = load_graph(&config, args)?;
    Ok((config, graph))
}

fn show_scenario(cmd: &ShowCommand, cli: &Cli) -> Result<i32> {
    let (_config, graph) = inspect(cli, &cmd.scenario)?;
    let options = RunOptions {
        labels: cmd.labels.labels.clone(),
        skip_labels: cmd.labels.skip_labels.clone(),
        ..Default::default()
    };
    labels::validate_labels(&graph, &options)?;

    if cmd.list_labels {
        for label in graph.labels() {
            println!("{}", label);
        }
        return Ok(0);
    }

    if cmd.pipelines {
        for stage in Stage::ALL {
            let builder = PipelineBuilder::for_stage(stage);
            let mut paths = graph.paths(graph.order());
            if stage == Stage::Cleanup {
                paths.reverse();
            }
            for path in paths {
                let pipeline = builder.build(&graph, &path, &options)?;
                if pipeline.is_empty() {
                    continue;
                }
                let node = graph.node(&path).map(|n| n.name.as_str()).unwrap_or_default();
                println!("{}", format_pipeline(node, &pipeline));
            }
        }
        return Ok(0);
    }

    for node in graph.iter() {
        if cmd.json {
            let doc = serde_json::to_string_pretty(&node.profile())?;
            println!("{}", doc);
            continue;
        }
        println!("{} {}", INFO, style(&node.name).bold());
        let sections: [(&str, Vec<&str>); 5] = [
            ("provision", names(labels::filter(&node.assets, &options))),
            ("orchestrate", names(labels::filter(&node.actions, &options))),
            ("execute", names(labels::filter(&node.executes, &options))),
            ("report", names(labels::filter(&node.reports, &options))),
            ("notifications", names(labels::filter(&node.notifications, &options))),
        ];
        for (section, items) in sections {
            if !items.is_empty() {
                println!("  {:<14} {}", section, style(items.join(", ")).cyan());
            }
        }
    }
    Ok(0)
}

fn names<R: Resource>(list: Vec<&R>) -> Vec<&str> {
    list.into_iter().map(|r| r.name()).collect()
}

fn show_graph(cmd: &GraphCommand, cli: &Cli) -> Result<i32> {
    let (_config, graph) = inspect(cli, &cmd.scenario)?;
    println!("{}", format_graph(&graph, cmd.order.into()));
    Ok(0)
}
