mod commands;
mod input;
mod output;

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use serde_json::Value;
use std::process;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use commands::allocate::AllocateArgs;
use commands::solve::SolveArgs;
use commands::stats::StatsArgs;

/// Risk-constrained portfolio allocation from historical prices
#[derive(Parser)]
#[command(
    name = "palloc",
    version,
    about = "Risk-constrained portfolio allocation from historical prices",
    long_about = "Estimates annualized returns and covariance from a CSV price history \
                  and allocates capital to maximize expected return subject to full \
                  investment, long-only weights and a volatility ceiling, solved by SQP."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "report", global = true)]
    output: OutputFormat,

    /// Log verbosity: -v for info, -vv for debug (RUST_LOG overrides)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Optimize an allocation from a CSV price history
    Allocate(AllocateArgs),
    /// Annualized return statistics from a CSV price history
    Stats(StatsArgs),
    /// Optimize an allocation from precomputed statistics (JSON)
    Solve(SolveArgs),
    /// Print version information
    Version,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Report,
    Json,
    Table,
    Csv,
    Minimal,
}

/// Exit status when `--strict` is set and the optimizer did not converge.
const EXIT_NOT_CONVERGED: i32 = 2;

fn init_tracing(verbosity: u8) {
    let default_level = match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let (strict, show_chart) = match &cli.command {
        Commands::Allocate(a) => (a.strict, !a.no_chart),
        Commands::Solve(s) => (s.strict, !s.no_chart),
        _ => (false, false),
    };

    let result: Result<Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::Allocate(args) => commands::allocate::run_allocate(args),
        Commands::Stats(args) => commands::stats::run_stats(args),
        Commands::Solve(args) => commands::solve::run_solve(args),
        Commands::Version => {
            println!("palloc {}", env!("CARGO_PKG_VERSION"));
            return;
        }
    };

    match result {
        Ok(value) => {
            output::format_output(&cli.output, &value, show_chart);
            let converged = value
                .pointer("/result/converged")
                .and_then(Value::as_bool)
                .unwrap_or(true);
            if strict && !converged {
                eprintln!(
                    "{}: optimization did not converge (--strict)",
                    "error".red().bold()
                );
                process::exit(EXIT_NOT_CONVERGED);
            }
            process::exit(0);
        }
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    }
}
