use clap::Args;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

use portfolio_alloc_core::allocation::optimize_from_statistics;
use portfolio_alloc_core::config::AllocationConfig;
use portfolio_alloc_core::statistics::AnnualizedStatistics;

use super::load_config;
use crate::input;

#[derive(Args)]
pub struct SolveArgs {
    /// JSON with precomputed statistics (reads stdin when omitted)
    #[arg(long)]
    pub input: Option<String>,

    /// JSON file with allocation and solver settings
    #[arg(long)]
    pub config: Option<String>,

    #[arg(long)]
    pub amount: Option<Decimal>,

    /// Maximum annualized volatility as a decimal
    #[arg(long)]
    pub risk_tolerance: Option<f64>,

    #[arg(long)]
    pub risk_free_rate: Option<f64>,

    /// Skip the allocation bar chart
    #[arg(long)]
    pub no_chart: bool,

    /// Exit with status 2 when the optimizer does not converge
    #[arg(long)]
    pub strict: bool,
}

/// `{"statistics": {...}, "config": {...}}` with an optional config.
#[derive(Debug, Deserialize)]
struct SolveInput {
    statistics: AnnualizedStatistics,
    config: Option<AllocationConfig>,
}

pub fn run_solve(args: SolveArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let data: Value = if let Some(ref path) = args.input {
        input::file::read_json(path)?
    } else if let Some(data) = input::stdin::read_stdin()? {
        data
    } else {
        return Err("--input <file.json> or stdin required for solve".into());
    };

    let (statistics, embedded) = parse_solve_input(data)?;
    let mut config = match (args.config.as_deref(), embedded) {
        (Some(path), _) => load_config(Some(path))?,
        (None, Some(c)) => c,
        (None, None) => AllocationConfig::default(),
    };
    if let Some(amount) = args.amount {
        config.investment_amount = amount;
    }
    if let Some(risk) = args.risk_tolerance {
        config.risk_tolerance = risk;
    }
    if let Some(rf) = args.risk_free_rate {
        config.risk_free_rate = rf;
    }

    let output = optimize_from_statistics(statistics, &config)?;
    Ok(serde_json::to_value(output)?)
}

/// Accepts a [`SolveInput`] object, the envelope printed by `palloc stats
/// --output json`, or bare statistics.
fn parse_solve_input(
    data: Value,
) -> Result<(AnnualizedStatistics, Option<AllocationConfig>), Box<dyn std::error::Error>> {
    if data.get("statistics").is_some() {
        let input: SolveInput = serde_json::from_value(data)?;
        return Ok((input.statistics, input.config));
    }
    let stats_value = match data.get("result") {
        Some(result) => result.clone(),
        None => data,
    };
    Ok((serde_json::from_value(stats_value)?, None))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn stats_json() -> Value {
        json!({
            "tickers": ["A", "B"],
            "mean_returns": [0.1, 0.05],
            "covariance": [[0.04, 0.0], [0.0, 0.01]],
            "observations": 100,
            "periods_per_year": 252.0
        })
    }

    #[test]
    fn test_bare_statistics() {
        let (stats, config) = parse_solve_input(stats_json()).unwrap();
        assert_eq!(stats.tickers, vec!["A", "B"]);
        assert!(config.is_none());
    }

    #[test]
    fn test_stats_envelope() {
        let (stats, _) = parse_solve_input(json!({"result": stats_json(), "warnings": []})).unwrap();
        assert_eq!(stats.observations, 100);
    }

    #[test]
    fn test_statistics_with_config() {
        let data = json!({"statistics": stats_json(), "config": {"risk_tolerance": 0.3}});
        let (_, config) = parse_solve_input(data).unwrap();
        assert_eq!(config.unwrap().risk_tolerance, 0.3);
    }
}
