//! Tidewater CLI - build and run compiled SQL action graphs

use clap::Parser;

mod cli;
mod commands;

use cli::Cli;
use commands::common::ExitCode;
use commands::{build, run};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match &cli.command {
        cli::Commands::Build(args) => build::execute(args, &cli.global).await,
        cli::Commands::Run(args) => run::execute(args, &cli.global).await,
    };

    if let Err(err) = result {
        match err.downcast_ref::<ExitCode>() {
            Some(code) => std::process::exit(code.0),
            None => {
                eprintln!("Error: {:#}", err);
                std::process::exit(1);
            }
        }
    }
}
