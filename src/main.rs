mod autosave;
mod cli;
mod completion;
mod config;
mod files;
mod logging;
mod models;
mod runner;
mod session;
mod store;
mod validation;
mod watch;
mod workspace;

use std::process::ExitCode;

use clap::Parser;
use dotenvy::dotenv;
use tracing::{error, info};

use crate::cli::Cli;
use crate::config::AppConfig;
use crate::logging::init_logging;

#[tokio::main]
async fn main() -> ExitCode {
    if let Some(code) = cli::clipboard::serve_if_requested() {
        return code;
    }
    dotenv().ok();
    let cli = Cli::parse();

    let cfg = match AppConfig::load(cli.overrides()) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("error: {e:#}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = init_logging(&cfg.log_level, cfg.log_file.as_deref()) {
        eprintln!("error: {e:#}");
        return ExitCode::FAILURE;
    }
    info!(
        backend = %cfg.backend.url,
        execution = %cfg.execution.api_url,
        model = %cfg.completion.model,
        "app config"
    );

    match cli::execute(cfg, cli.command).await {
        Ok(code) => code,
        Err(e) => {
            error!(err = %format!("{e:#}"), "command failed");
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
