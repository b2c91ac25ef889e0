use serde_json::Value;

use super::allocations;

/// Print just the key answer of the output.
///
/// Allocations print one `TICKER WEIGHT` line per asset. Otherwise the first
/// non-null well-known field is printed, then the first field of the result.
pub fn print_minimal(value: &Value) {
    if let Some(rows) = allocations(value) {
        for row in rows {
            let ticker = row.get("ticker").and_then(Value::as_str).unwrap_or("?");
            let weight = row.get("weight").and_then(Value::as_f64).unwrap_or(f64::NAN);
            println!("{} {:.6}", ticker, weight);
        }
        return;
    }

    let result_obj = value
        .as_object()
        .and_then(|m| m.get("result"))
        .unwrap_or(value);

    let priority_keys = ["expected_return", "volatility", "sharpe_ratio", "mean_returns"];

    if let Value::Object(map) = result_obj {
        for key in &priority_keys {
            if let Some(val) = map.get(*key) {
                if !val.is_null() {
                    println!("{}", format_minimal(val));
                    return;
                }
            }
        }

        if let Some((key, val)) = map.iter().next() {
            println!("{}: {}", key, format_minimal(val));
            return;
        }
    }

    println!("{}", format_minimal(result_obj));
}

fn format_minimal(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        Value::Array(arr) => arr.iter().map(format_minimal).collect::<Vec<_>>().join(" "),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}
