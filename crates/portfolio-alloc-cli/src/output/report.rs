use colored::Colorize;
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;

use portfolio_alloc_core::solver::TerminationReason;

use super::chart::{print_chart, ChartBar};
use super::{allocations, statistics_rows, table};

/// Human-readable report: dollar allocation, return, risk, Sharpe ratio and
/// solver status, followed by the allocation chart.
pub fn print_report(value: &Value, show_chart: bool) {
    if let Some(text) = render_allocation(value) {
        print!("{}", text);
        print_warnings(value);
        if show_chart {
            if let Some(rows) = allocations(value) {
                print_chart(&chart_bars(rows), &investment_amount(value));
            }
        }
    } else if let Some(rows) = statistics_rows(value) {
        println!("{}", "Annualized statistics".bold());
        for (ticker, mean, vol) in rows {
            println!(
                "{}: expected return {:.2}%, volatility {:.2}%",
                ticker,
                mean * 100.0,
                vol * 100.0
            );
        }
        if let Some(n) = value.pointer("/result/observations") {
            println!("Observations: {}", n);
        }
        print_warnings(value);
    } else {
        table::print_table(value);
    }
}

pub fn render_allocation(value: &Value) -> Option<String> {
    let rows = allocations(value)?;
    let report = value.pointer("/result/report")?;

    let mut out = String::new();
    out.push_str(&format!("{}\n", "Optimized Portfolio Allocation:".bold()));
    for row in rows {
        let ticker = row.get("ticker").and_then(Value::as_str).unwrap_or("?");
        let amount = row.get("amount").and_then(Value::as_str).unwrap_or("?");
        out.push_str(&format!("{}: ${}\n", ticker, amount));
    }

    let pct = |key: &str| {
        report
            .get(key)
            .and_then(Value::as_f64)
            .map(|v| format!("{:.2}%", v * 100.0))
            .unwrap_or_else(|| "n/a".to_string())
    };
    out.push_str(&format!("\nExpected Annual Return: {}\n", pct("expected_return")));
    out.push_str(&format!("Annual Volatility (Risk): {}\n", pct("volatility")));
    let sharpe = report
        .get("sharpe_ratio")
        .and_then(Value::as_f64)
        .map(|s| format!("{:.2}", s))
        .unwrap_or_else(|| "undefined".to_string());
    out.push_str(&format!("Sharpe Ratio: {}\n", sharpe));
    out.push_str(&format!("Solver: {}\n", solver_status(value)));
    Some(out)
}

fn solver_status(value: &Value) -> String {
    let iterations = value
        .pointer("/result/solver/iterations")
        .and_then(Value::as_u64)
        .unwrap_or(0);
    let termination = value
        .pointer("/result/solver/termination")
        .cloned()
        .and_then(|t| serde_json::from_value::<TerminationReason>(t).ok());

    match termination {
        Some(TerminationReason::Converged) => {
            format!("{} after {} iterations", "converged".green(), iterations)
        }
        Some(reason) => format!(
            "{} ({}) after {} iterations",
            "did not converge".yellow().bold(),
            reason.description(),
            iterations
        ),
        None => "unknown".to_string(),
    }
}

fn print_warnings(value: &Value) {
    let warnings: Vec<&str> = value
        .get("warnings")
        .and_then(Value::as_array)
        .map(|w| w.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();
    if warnings.is_empty() {
        return;
    }
    println!();
    for w in warnings {
        println!("{}: {}", "warning".yellow().bold(), w);
    }
}

fn chart_bars(rows: &[Value]) -> Vec<ChartBar> {
    rows.iter()
        .map(|row| ChartBar {
            ticker: row
                .get("ticker")
                .and_then(Value::as_str)
                .unwrap_or("?")
                .to_string(),
            weight: row.get("weight").and_then(Value::as_f64).unwrap_or(0.0),
            amount: row
                .get("amount")
                .and_then(Value::as_str)
                .unwrap_or("?")
                .to_string(),
        })
        .collect()
}

fn investment_amount(value: &Value) -> String {
    let raw = value
        .pointer("/result/report/investment_amount")
        .and_then(Value::as_str)
        .unwrap_or("?");
    match Decimal::from_str(raw) {
        Ok(d) => format!("{:.2}", d),
        Err(_) => raw.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(sharpe: Value, termination: &str) -> Value {
        json!({
            "result": {
                "report": {
                    "allocations": [
                        {"ticker": "AAPL", "weight": 0.6, "amount": "6000.00", "contribution_to_return": 0.09},
                        {"ticker": "MSFT", "weight": 0.4, "amount": "4000.00", "contribution_to_return": 0.04}
                    ],
                    "investment_amount": "10000",
                    "expected_return": 0.13,
                    "volatility": 0.1512,
                    "sharpe_ratio": sharpe,
                    "risk_free_rate": 0.02,
                    "hhi_concentration": 0.52,
                    "warnings": []
                },
                "solver": {"termination": termination, "iterations": 7},
                "converged": termination == "converged"
            },
            "warnings": []
        })
    }

    #[test]
    fn test_allocation_lines() {
        let text = render_allocation(&envelope(json!(0.7281), "converged")).unwrap();
        assert!(text.contains("AAPL: $6000.00\n"));
        assert!(text.contains("MSFT: $4000.00\n"));
        assert!(text.contains("Expected Annual Return: 13.00%"));
        assert!(text.contains("Annual Volatility (Risk): 15.12%"));
        assert!(text.contains("Sharpe Ratio: 0.73"));
        assert!(text.contains("after 7 iterations"));
    }

    #[test]
    fn test_undefined_sharpe_and_failed_solve() {
        let text = render_allocation(&envelope(Value::Null, "infeasible")).unwrap();
        assert!(text.contains("Sharpe Ratio: undefined"));
        assert!(text.contains("constraints could not be satisfied"));
    }

    #[test]
    fn test_chart_title_amount_has_cents() {
        assert_eq!(investment_amount(&envelope(Value::Null, "converged")), "10000.00");
    }

    #[test]
    fn test_non_allocation_value() {
        assert!(render_allocation(&json!({"result": {"tickers": []}})).is_none());
    }
}
