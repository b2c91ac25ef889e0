use clap::Args;
use serde_json::Value;

use portfolio_alloc_core::allocation::optimize_allocation;

use super::{load_config, parse_tickers, DEFAULT_TICKERS};
use crate::input;
use crate::input::params::{resolve_parameters, Parameters};

#[derive(Args)]
pub struct AllocateArgs {
    /// CSV file of historical prices with a header row
    #[arg(long, default_value = "portfolio_data.csv")]
    pub data: String,

    /// Comma-separated asset columns to allocate across
    #[arg(long, default_value = DEFAULT_TICKERS)]
    pub tickers: String,

    /// Name of the date column, if the file has one
    #[arg(long, default_value = "Date")]
    pub date_column: String,

    /// Capital to allocate (prompted for on a terminal when omitted)
    #[arg(long)]
    pub amount: Option<String>,

    /// Maximum annualized volatility as a decimal (prompted for when omitted)
    #[arg(long)]
    pub risk_tolerance: Option<String>,

    /// Annual risk-free rate for the Sharpe ratio
    #[arg(long)]
    pub risk_free_rate: Option<f64>,

    /// JSON file with allocation and solver settings
    #[arg(long)]
    pub config: Option<String>,

    /// Skip the allocation bar chart
    #[arg(long)]
    pub no_chart: bool,

    /// Exit with status 2 when the optimizer does not converge
    #[arg(long)]
    pub strict: bool,
}

pub fn run_allocate(args: AllocateArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(rf) = args.risk_free_rate {
        config.risk_free_rate = rf;
    }

    let tickers = parse_tickers(&args.tickers);
    let history = input::csv_prices::read_price_csv(
        &args.data,
        &args.date_column,
        Some(tickers.as_slice()),
    )?;

    let defaults = Parameters {
        investment_amount: config.investment_amount,
        risk_tolerance: config.risk_tolerance,
    };
    let parsed = resolve_parameters(
        args.amount.as_deref(),
        args.risk_tolerance.as_deref(),
        &defaults,
        input::stdin::is_interactive(),
    )?;
    config.investment_amount = parsed.parameters.investment_amount;
    config.risk_tolerance = parsed.parameters.risk_tolerance;

    let mut output = optimize_allocation(&history, &config)?;
    if let Some(reason) = parsed.fallback {
        output.warnings.insert(0, reason);
    }
    Ok(serde_json::to_value(output)?)
}
