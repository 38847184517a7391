// ABOUTME: Entry point for the hotswap CLI application.
// ABOUTME: Parses arguments, initializes logging and dispatches to command handlers.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use hotswap::config::{self, Overrides};
use hotswap::error::{EXIT_SUCCESS, Result};
use hotswap::output::{Output, OutputMode};
use std::env;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // RUST_LOG wins over the verbose flag.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("hotswap=info,warn")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(cli.verbose)
        .with_writer(std::io::stderr)
        .init();

    let mode = if cli.json {
        OutputMode::Json
    } else if cli.quiet {
        OutputMode::Quiet
    } else {
        OutputMode::Normal
    };

    match run(cli, mode).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            Output::new(mode).error(&e.to_string());
            std::process::exit(e.exit_code());
        }
    }
}

async fn run(cli: Cli, mode: OutputMode) -> Result<i32> {
    let output = Output::new(mode);
    let cwd = env::current_dir()?;
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Init {
            service,
            image,
            force,
        } => {
            config::init_config(&cwd, service.as_deref(), image.as_deref(), force)?;
            output.success(&format!("Created {}", config::CONFIG_FILENAME));
            Ok(EXIT_SUCCESS)
        }
        Commands::Deploy { overrides, force } => {
            let loaded = commands::load_config(config_path, &cwd, &overrides.to_overrides()?)?;
            commands::deploy(loaded, force, output).await
        }
        Commands::Status => {
            let loaded = commands::load_config(config_path, &cwd, &Overrides::default())?;
            commands::status(loaded, output).await?;
            Ok(EXIT_SUCCESS)
        }
        Commands::Reclaim { retain, max_age } => {
            let loaded = commands::load_config(config_path, &cwd, &Overrides::default())?;
            commands::reclaim(loaded, retain, max_age, output).await?;
            Ok(EXIT_SUCCESS)
        }
        Commands::History { limit } => {
            let loaded = commands::load_config(config_path, &cwd, &Overrides::default())?;
            commands::history(loaded, limit, output)?;
            Ok(EXIT_SUCCESS)
        }
    }
}
