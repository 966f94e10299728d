//! Command-line interface

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use commands::{GraphCommand, NotifyCommand, RunCommand, ShowCommand, ValidateCommand};
use std::ffi::OsString;
use std::path::PathBuf;

/// Test scenario orchestration
#[derive(Debug, Parser, Clone)]
#[command(name = "teflo")]
#[command(version)]
#[command(about = "Provision, configure, test and report on a scenario", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to the teflo settings file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run scenario stages
    Run(RunCommand),

    /// Fire on-demand notifications
    Notify(NotifyCommand),

    /// Show the resources of a scenario
    Show(ShowCommand),

    /// Validate a scenario
    Validate(ValidateCommand),

    /// Print the scenario graph
    Graph(GraphCommand),
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }
}
