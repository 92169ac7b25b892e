use std::{path::PathBuf, process::ExitCode};

use ::tracing::{error, info_span};
use clap::Parser;
use commands::Command;
use config::StorectlConfig;
use store_backend::{build_instrumented_store_backend, build_store_backend};

mod commands;
mod config;
mod tracing;
use tracing::setup_tracing;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    #[arg(short, long, value_name = "config file", help = "Path to config file")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = match StorectlConfig::from_path(&cli.config) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Error loading config {}: {:?}", cli.config.display(), err);
            return ExitCode::FAILURE;
        }
    };
    setup_tracing(&config);

    let root_span = info_span!("storectl", class_name = config.store_backend.class_name());
    let _guard = root_span.enter();

    let backend = if config.enable_metrics {
        let meter = opentelemetry::global::meter("storectl");
        build_instrumented_store_backend(config.store_backend, &meter).await
    } else {
        build_store_backend(config.store_backend).await
    };
    let backend = match backend {
        Ok(backend) => backend,
        Err(err) => {
            error!("Error creating store backend: {:?}", err);
            return ExitCode::FAILURE;
        }
    };

    let mut stdout = std::io::stdout().lock();
    if let Err(err) = commands::execute(&cli.command, backend.as_ref(), &mut stdout).await {
        error!("Error running command: {:?}", err);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
