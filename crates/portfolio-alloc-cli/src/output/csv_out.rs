use serde_json::Value;
use std::io;

use super::{allocations, statistics_rows};

/// Write output as CSV to stdout.
pub fn print_csv(value: &Value) {
    let stdout = io::stdout();
    let mut wtr = csv::Writer::from_writer(stdout.lock());
    if let Err(e) = write_csv(&mut wtr, value) {
        eprintln!("CSV output error: {}", e);
    }
}

pub fn write_csv<W: io::Write>(wtr: &mut csv::Writer<W>, value: &Value) -> csv::Result<()> {
    if let Some(rows) = allocations(value) {
        wtr.write_record(["ticker", "weight", "amount", "contribution_to_return"])?;
        for row in rows {
            wtr.write_record([
                csv_field(row, "ticker"),
                csv_field(row, "weight"),
                csv_field(row, "amount"),
                csv_field(row, "contribution_to_return"),
            ])?;
        }
    } else if let Some(rows) = statistics_rows(value) {
        wtr.write_record(["ticker", "annual_return", "annual_volatility"])?;
        for (ticker, mean, vol) in rows {
            wtr.write_record([ticker, mean.to_string(), vol.to_string()])?;
        }
    } else {
        let map = value
            .get("result")
            .and_then(Value::as_object)
            .or_else(|| value.as_object());
        wtr.write_record(["field", "value"])?;
        if let Some(map) = map {
            for (key, val) in map {
                wtr.write_record([key.as_str(), &format_csv_value(val)])?;
            }
        }
    }
    wtr.flush()?;
    Ok(())
}

fn csv_field(value: &Value, key: &str) -> String {
    value.get(key).map(format_csv_value).unwrap_or_default()
}

fn format_csv_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}
