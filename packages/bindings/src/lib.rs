use napi::Result as NapiResult;
use napi_derive::napi;
use serde::Deserialize;

use portfolio_alloc_core::allocation;
use portfolio_alloc_core::config::AllocationConfig;
use portfolio_alloc_core::market_data::{PriceHistory, PriceRow};
use portfolio_alloc_core::statistics::{self, AnnualizedStatistics, TRADING_DAYS_PER_YEAR};

/// Convert any Display error into a napi::Error.
fn to_napi_error(e: impl std::fmt::Display) -> napi::Error {
    napi::Error::from_reason(e.to_string())
}

#[derive(Deserialize)]
struct PriceTableInput {
    tickers: Vec<String>,
    rows: Vec<PriceRow>,
}

impl PriceTableInput {
    fn into_history(self) -> NapiResult<PriceHistory> {
        PriceHistory::new(self.tickers, self.rows).map_err(to_napi_error)
    }
}

#[derive(Deserialize)]
struct AllocationInput {
    #[serde(flatten)]
    prices: PriceTableInput,
    #[serde(default)]
    config: AllocationConfig,
}

#[derive(Deserialize)]
struct StatisticsInput {
    #[serde(flatten)]
    prices: PriceTableInput,
    #[serde(default = "default_periods_per_year")]
    periods_per_year: f64,
}

fn default_periods_per_year() -> f64 {
    TRADING_DAYS_PER_YEAR
}

#[derive(Deserialize)]
struct StatisticsAllocationInput {
    statistics: AnnualizedStatistics,
    #[serde(default)]
    config: AllocationConfig,
}

// ---------------------------------------------------------------------------
// Allocation
// ---------------------------------------------------------------------------

/// `{"tickers": [...], "rows": [{"date": "2024-01-02", "prices": [...]}], "config": {...}}`
#[napi]
pub fn optimize_allocation(input_json: String) -> NapiResult<String> {
    let input: AllocationInput = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let history = input.prices.into_history()?;
    let output =
        allocation::optimize_allocation(&history, &input.config).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[napi]
pub fn optimize_from_statistics(input_json: String) -> NapiResult<String> {
    let input: StatisticsAllocationInput =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = allocation::optimize_from_statistics(input.statistics, &input.config)
        .map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

#[napi]
pub fn estimate_statistics(input_json: String) -> NapiResult<String> {
    let input: StatisticsInput = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let periods = input.periods_per_year;
    let history = input.prices.into_history()?;
    let stats = statistics::estimate_statistics(&history, periods).map_err(to_napi_error)?;
    serde_json::to_string(&stats).map_err(to_napi_error)
}
