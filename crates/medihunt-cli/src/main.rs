//! medihunt CLI entry point.

use std::process::ExitCode;

use clap::Parser;
use medihunt_core::{TracingConfig, TracingOutputFormat, init_tracing};

use medihunt_cli::cli::{Cli, Command, ConfigAction};
use medihunt_cli::commands;
use medihunt_cli::config::MedihuntConfig;
use medihunt_cli::error::CliResult;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut tracing_config = if cli.debug {
        TracingConfig::cli_debug()
    } else {
        TracingConfig::cli()
    };
    if cli.log_json {
        tracing_config = tracing_config.with_format(TracingOutputFormat::Json);
    }
    if let Err(e) = init_tracing(tracing_config) {
        eprintln!("error: {}", e);
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> CliResult<()> {
    let config = match cli.config {
        Some(ref path) => MedihuntConfig::load_from(path)?,
        None => MedihuntConfig::load()?,
    };

    match cli.command {
        Command::Hunt(ref args) => commands::hunt::hunt(args.clone(), &config, &cli).await,
        Command::Login => commands::auth::login(&config, &cli).await,
        Command::Logout => commands::auth::logout(&config, &cli),
        Command::Filters(ref args) => commands::filters::filters(args.clone(), &config, &cli).await,
        Command::Config { ref action } => match action {
            ConfigAction::Dump => commands::config::dump(&config),
            ConfigAction::Path => commands::config::path(),
        },
    }
}
