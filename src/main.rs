use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub mod backend;
pub mod cmd;
pub mod config;
pub mod stress;
pub mod utils;

#[cfg(target_family = "unix")]
#[global_allocator]
static ALLOC: jemallocator::Jemalloc = jemallocator::Jemalloc;

#[cfg(target_os = "windows")]
#[global_allocator]
static ALLOC: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// CLI arguments for configuring txbench behavior.
#[derive(Debug, Clone, Parser)]
#[command(name = "txbench")]
#[command(bin_name = "txbench")]
#[command(version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    cmds: CliCommands,

    /// debug logging as default instead of Info; use RUST_LOG env for more options
    #[arg(long, short = 'v', default_value_t = false, global = true)]
    pub verbose: bool,

    /// enable pretty logging (format for humans)
    #[arg(long, default_value_t = false, global = true)]
    pub pretty: bool,

    /// write the tracing output to the provided (log) file instead of stderr
    #[arg(long, short = 'o', global = true)]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Clone, Subcommand)]
enum CliCommands {
    Run(cmd::run::RunCommand),
}

#[tokio::main]
async fn main() -> Result<(), utils::BoxError> {
    let args = Args::parse();

    let telemetry = utils::telemetry::init_tracing(utils::telemetry::TelemetryConfig {
        verbose: args.verbose,
        pretty: args.pretty,
        output: args.output.as_deref(),
    })?;

    let run = async {
        match args.cmds {
            CliCommands::Run(run_args) => cmd::run::exec(telemetry.clone(), run_args).await,
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::error!("interrupted: abort stress run");
            std::process::exit(130);
        }
        result = run => {
            if let Err(err) = result {
                eprintln!("🚩 exit with error: {err}");
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
