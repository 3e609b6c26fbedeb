//! # volleyctl
//!
//! Command-line front end for the Volley orchestrator: resolves configuration
//! and targets, asks for the confirmations a module requires, then runs one job
//! per target and prints the outcomes.

mod cli;
mod commands;
mod console;
mod logging;
mod prompts;

use std::process::ExitCode;

use clap::Parser;

use crate::cli::Cli;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = if cli.is_listing() {
        commands::list(&cli)
    } else {
        commands::scan(cli).await
    };

    match result {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
