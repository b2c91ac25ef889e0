use serde_json::{Map, Value};
use tabled::{builder::Builder, Table};

use super::{allocations, statistics_rows};

/// Format output as tables using the tabled crate.
pub fn print_table(value: &Value) {
    if let Some(rows) = allocations(value) {
        print_allocation_table(rows);
        if let Some(report) = value.get("result").and_then(|r| r.get("report")) {
            print_summary_table(report, value.get("result"));
        }
    } else if let Some(rows) = statistics_rows(value) {
        let mut builder = Builder::default();
        builder.push_record(["Ticker", "Annual Return", "Annual Volatility"]);
        for (ticker, mean, vol) in rows {
            builder.push_record([ticker, format!("{:.4}", mean), format!("{:.4}", vol)]);
        }
        println!("{}", Table::from(builder));
    } else if let Some(Value::Object(result)) = value.get("result") {
        print_flat_object(result);
    } else if let Value::Object(map) = value {
        print_flat_object(map);
    } else {
        println!("{}", value);
    }

    if let Some(envelope) = value.as_object() {
        print_envelope_notes(envelope);
    }
}

fn print_allocation_table(rows: &[Value]) {
    let mut builder = Builder::default();
    builder.push_record(["Ticker", "Weight", "Amount", "Return Contribution"]);
    for row in rows {
        builder.push_record([
            field(row, "ticker"),
            row.get("weight")
                .and_then(Value::as_f64)
                .map(|w| format!("{:.4}", w))
                .unwrap_or_default(),
            field(row, "amount"),
            row.get("contribution_to_return")
                .and_then(Value::as_f64)
                .map(|c| format!("{:.4}", c))
                .unwrap_or_default(),
        ]);
    }
    println!("{}", Table::from(builder));
}

fn print_summary_table(report: &Value, result: Option<&Value>) {
    let mut builder = Builder::default();
    builder.push_record(["Metric", "Value"]);
    for key in [
        "investment_amount",
        "expected_return",
        "volatility",
        "sharpe_ratio",
        "hhi_concentration",
    ] {
        builder.push_record([key.to_string(), field(report, key)]);
    }
    if let Some(result) = result {
        builder.push_record(["converged".to_string(), field(result, "converged")]);
        if let Some(solver) = result.get("solver") {
            builder.push_record(["termination".to_string(), field(solver, "termination")]);
            builder.push_record(["iterations".to_string(), field(solver, "iterations")]);
        }
    }
    println!("{}", Table::from(builder));
}

fn print_flat_object(map: &Map<String, Value>) {
    let mut builder = Builder::default();
    builder.push_record(["Field", "Value"]);
    for (key, val) in map {
        builder.push_record([key.as_str(), &format_value(val)]);
    }
    println!("{}", Table::from(builder));
}

fn print_envelope_notes(envelope: &Map<String, Value>) {
    if let Some(Value::Array(warnings)) = envelope.get("warnings") {
        if !warnings.is_empty() {
            println!("\nWarnings:");
            for w in warnings.iter().filter_map(Value::as_str) {
                println!("  - {}", w);
            }
        }
    }

    if let Some(Value::String(meth)) = envelope.get("methodology") {
        println!("\nMethodology: {}", meth);
    }
}

fn field(value: &Value, key: &str) -> String {
    value.get(key).map(format_value).unwrap_or_default()
}

fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "-".to_string(),
        Value::Array(arr) => arr.iter().map(format_value).collect::<Vec<_>>().join(", "),
        Value::Object(_) => serde_json::to_string(value).unwrap_or_default(),
    }
}
