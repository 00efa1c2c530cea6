mod commands;
mod input;
mod output;

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;
use tracing_subscriber::EnvFilter;

use commands::optimize::OptimizeArgs;
use commands::simulate::SimulateArgs;
use commands::statistics::StatisticsArgs;
use markowitz_core::{ErrorKind, MarkowitzError};

/// Long-only mean-variance portfolio optimization from daily returns
#[derive(Parser)]
#[command(
    name = "markowitz",
    version,
    about = "Long-only mean-variance portfolio optimization from daily returns",
    long_about = "Reads a CSV of daily asset returns, cleans it, estimates annualized \
                  statistics and returns the maximum-Sharpe portfolio under a per-asset \
                  weight cap, pulled back to a volatility ceiling when it is exceeded."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace); RUST_LOG overrides
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Optimize a portfolio from a daily-return CSV
    Optimize(OptimizeArgs),
    /// Print annualized returns, covariance and its diagnostics
    Statistics(StatisticsArgs),
    /// Write a synthetic daily-return CSV to stdout
    Simulate(SimulateArgs),
    /// Print version information
    Version,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Csv,
    Minimal,
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Exit code 2 for problems with the supplied data or parameters, 1 otherwise.
fn exit_code(e: &(dyn std::error::Error + 'static)) -> i32 {
    match e.downcast_ref::<MarkowitzError>().map(MarkowitzError::kind) {
        Some(ErrorKind::SolverNumerical) | Some(ErrorKind::Serialization) => 1,
        Some(_) => 2,
        None => 1,
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::Optimize(args) => commands::optimize::run_optimize(args),
        Commands::Statistics(args) => commands::statistics::run_statistics(args),
        Commands::Simulate(args) => {
            commands::simulate::run_simulate(args).map(|()| serde_json::Value::Null)
        }
        Commands::Version => {
            println!("markowitz {}", env!("CARGO_PKG_VERSION"));
            return;
        }
    };

    match result {
        Ok(value) => {
            if !value.is_null() {
                output::format_output(&cli.output, &value);
            }
            process::exit(0);
        }
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(exit_code(e.as_ref()));
        }
    }
}
