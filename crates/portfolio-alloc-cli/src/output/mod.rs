pub mod chart;
pub mod csv_out;
pub mod json;
pub mod minimal;
pub mod report;
pub mod table;

use crate::OutputFormat;
use serde_json::Value;

/// Dispatch output to the appropriate formatter.
pub fn format_output(format: &OutputFormat, value: &Value, show_chart: bool) {
    match format {
        OutputFormat::Report => report::print_report(value, show_chart),
        OutputFormat::Json => json::print_json(value),
        OutputFormat::Table => table::print_table(value),
        OutputFormat::Csv => csv_out::print_csv(value),
        OutputFormat::Minimal => minimal::print_minimal(value),
    }
}

/// The allocation rows of an allocation envelope, if `value` is one.
pub(crate) fn allocations(value: &Value) -> Option<&Vec<Value>> {
    value
        .get("result")?
        .get("report")?
        .get("allocations")?
        .as_array()
}

/// Per-asset `(ticker, annual return, annual volatility)` of a statistics
/// envelope, if `value` is one.
pub(crate) fn statistics_rows(value: &Value) -> Option<Vec<(String, f64, f64)>> {
    let result = value.get("result")?;
    let tickers = result.get("tickers")?.as_array()?;
    let means = result.get("mean_returns")?.as_array()?;
    let cov = result.get("covariance")?.as_array()?;

    tickers
        .iter()
        .enumerate()
        .map(|(i, t)| {
            let variance = cov.get(i)?.get(i)?.as_f64()?;
            Some((
                t.as_str()?.to_string(),
                means.get(i)?.as_f64()?,
                variance.max(0.0).sqrt(),
            ))
        })
        .collect()
}
