use std::error::Error;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::RunArgs;

mod commands;

#[derive(Parser, Debug)]
#[command(name = "lmcal", about = "Levenberg-Marquardt calibration of crystal plasticity parameters")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load the experimental curve, create the fitter and write the first simulation batch.
    SetUp(RunArgs),
    /// Ingest the finished batch, take one optimizer step and write the next batch.
    Iterate(RunArgs),
    /// Print the state recorded in the checkpoint.
    Status(RunArgs),
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::SetUp(args) => commands::set_up::run(&args),
        Command::Iterate(args) => commands::iterate::run(&args),
        Command::Status(args) => commands::status::run(&args),
    }
}
