// Purpose: Provides the command-line interface for running and validating simulations.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use smokers_core::SnapshotFormat;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::{AccessKey, SimulationConfig};
use crate::runner::Simulation;

/// Cigarette smokers simulation
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct Cli {
    /// Write diagnostics to this file instead of stderr
    #[clap(long, global = true, env = "SMOKERS_ERROR_LOG")]
    pub error_log: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the agent and all three smokers until the factory closes
    Run(RunArgs),

    /// Check a configuration and print it with defaults filled in
    Validate(ValidateArgs),
}

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// TOML configuration file
    #[clap(long, short)]
    pub config: Option<PathBuf>,

    /// Access key (decimal, 0x-prefixed hex or 0-prefixed octal)
    #[clap(long, short, env = "SMOKERS_KEY")]
    pub key: Option<String>,

    /// State log path
    #[clap(long)]
    pub log: Option<PathBuf>,

    /// Number of supply rounds
    #[clap(long)]
    pub cigarettes: Option<u64>,

    /// Base seed for every actor's random generator
    #[clap(long)]
    pub seed: Option<u64>,

    /// State log format
    #[clap(long, value_enum)]
    pub format: Option<FormatArg>,

    /// Exit with an error when any invariant was violated
    #[clap(long)]
    pub fail_on_invariant_violation: bool,
}

#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// TOML configuration file
    #[clap(long, short)]
    pub config: Option<PathBuf>,

    /// Access key override
    #[clap(long, short)]
    pub key: Option<String>,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum FormatArg {
    Table,
    Json,
}

impl From<FormatArg> for SnapshotFormat {
    fn from(format: FormatArg) -> Self {
        match format {
            FormatArg::Table => SnapshotFormat::Table,
            FormatArg::Json => SnapshotFormat::Json,
        }
    }
}

/// Execute the parsed command line.
pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Run(args) => run_simulation(args).await,
        Command::Validate(args) => validate(args),
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<SimulationConfig> {
    match path {
        Some(path) => SimulationConfig::load(path)
            .with_context(|| format!("Failed to load configuration {}", path.display())),
        None => Ok(SimulationConfig::default()),
    }
}

/// Build the effective configuration: file (or defaults), then flags.
pub fn resolve_config(args: &RunArgs) -> Result<SimulationConfig> {
    let mut config = load_config(args.config.as_ref())?;
    if let Some(key) = &args.key {
        config.key = key.parse::<AccessKey>()?;
    }
    if let Some(path) = &args.log {
        config.log.path = path.clone();
    }
    if let Some(cigarettes) = args.cigarettes {
        config.cigarettes = cigarettes;
    }
    if args.seed.is_some() {
        config.seed = args.seed;
    }
    if let Some(format) = args.format {
        config.log.format = format.into();
    }
    config.validate()?;
    Ok(config)
}

async fn run_simulation(args: RunArgs) -> Result<()> {
    let simulation = Simulation::from_config(resolve_config(&args)?)?;
    let config = simulation.config();
    info!(key = %config.key, log = %config.log.path.display(), "configuration resolved");

    let (stop_tx, stop_rx) = watch::channel(false);

    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, closing the factory");
            let _ = stop_tx.send(true);
        }
    });

    let outcome = simulation.run(stop_rx).await;
    interrupt.abort();
    let report = outcome?;

    println!("{report}");

    if args.fail_on_invariant_violation && !report.is_clean() {
        bail!(
            "{} invariant violation(s) during the run",
            report.violations.len()
        );
    }
    Ok(())
}

fn validate(args: ValidateArgs) -> Result<()> {
    let mut config = load_config(args.config.as_ref())?;
    if let Some(key) = &args.key {
        config.key = key.parse::<AccessKey>()?;
    }
    config.validate()?;
    print!("{}", config.to_toml()?);
    Ok(())
}
