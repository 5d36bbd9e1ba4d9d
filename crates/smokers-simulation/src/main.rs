// Purpose: Provides the entry point for the smokers CLI.

use std::fs::OpenOptions;
use std::process::ExitCode;
use std::sync::Mutex;

use clap::Parser;
use smokers_simulation::cli::{self, Cli};
use tracing::error;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// The diagnostic stream stays silent on a clean run; `RUST_LOG` raises it.
const DEFAULT_DIAGNOSTICS: &str = "smokers=warn,smokers_simulation=warn,smokers_core=warn";

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let error_log = match &cli.error_log {
        Some(path) => match OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
        {
            Ok(file) => Some(file),
            Err(err) => {
                eprintln!("Failed to open error log {}: {err}", path.display());
                return ExitCode::FAILURE;
            }
        },
        None => None,
    };
    let file_layer = error_log.map(|file| {
        fmt::layer()
            .with_ansi(false)
            .with_writer(Mutex::new(file))
    });
    let stderr_layer = file_layer
        .is_none()
        .then(|| fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_DIAGNOSTICS.into()))
        .with(file_layer)
        .with(stderr_layer)
        .init();

    match cli::run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}
