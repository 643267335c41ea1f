use std::process::ExitCode;

use clap::Parser;
use rewatch_cli::{Cli, RewatchConfig, logging};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match RewatchConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("rewatch: {e:#}");
            return ExitCode::FAILURE;
        }
    };
    logging::init(&config.logging, cli.debug);

    match rewatch_cli::run(cli, config).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("rewatch: {e:#}");
            ExitCode::FAILURE
        }
    }
}
