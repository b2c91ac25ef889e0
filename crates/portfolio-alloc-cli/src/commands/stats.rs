use clap::Args;
use serde_json::Value;
use std::time::Instant;

use portfolio_alloc_core::statistics::estimate_statistics;
use portfolio_alloc_core::types::with_metadata;

use super::{parse_tickers, DEFAULT_TICKERS};
use crate::input;

#[derive(Args)]
pub struct StatsArgs {
    /// CSV file of historical prices with a header row
    #[arg(long, default_value = "portfolio_data.csv")]
    pub data: String,

    /// Comma-separated asset columns
    #[arg(long, default_value = DEFAULT_TICKERS)]
    pub tickers: String,

    #[arg(long, default_value = "Date")]
    pub date_column: String,

    /// Return periods per year used for annualization
    #[arg(long, default_value_t = 252.0)]
    pub periods_per_year: f64,
}

pub fn run_stats(args: StatsArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let start = Instant::now();
    let tickers = parse_tickers(&args.tickers);
    let history = input::csv_prices::read_price_csv(
        &args.data,
        &args.date_column,
        Some(tickers.as_slice()),
    )?;
    let stats = estimate_statistics(&history, args.periods_per_year)?;

    let assumptions = serde_json::json!({
        "returns": "simple period-over-period",
        "covariance_denominator": "T - 1",
        "periods_per_year": args.periods_per_year,
    });
    let output = with_metadata(
        "Annualized Sample Mean and Covariance",
        &assumptions,
        Vec::new(),
        start.elapsed().as_micros() as u64,
        stats,
    );
    Ok(serde_json::to_value(output)?)
}
