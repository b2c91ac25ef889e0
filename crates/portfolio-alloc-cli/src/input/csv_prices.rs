use chrono::{DateTime, NaiveDate};
use std::fs::File;
use std::io::Read;

use portfolio_alloc_core::market_data::{PriceHistory, PriceRow};

use super::file::resolve_path;

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%m/%d/%Y", "%d/%m/%Y"];

/// Load a price table from a CSV file with a header row.
///
/// `date_column` is used when the header contains it; otherwise rows are
/// taken in file order. `tickers` selects and orders the asset columns; when
/// `None` every non-date column is an asset.
pub fn read_price_csv(
    path: &str,
    date_column: &str,
    tickers: Option<&[String]>,
) -> Result<PriceHistory, Box<dyn std::error::Error>> {
    let canonical = resolve_path(path)?;
    let file = File::open(&canonical)
        .map_err(|e| format!("Failed to open '{}': {}", canonical.display(), e))?;
    let history = parse_prices(file, date_column, tickers)
        .map_err(|e| format!("Failed to load '{}': {}", canonical.display(), e))?;

    tracing::info!(
        path = %canonical.display(),
        rows = history.len(),
        assets = history.num_assets(),
        "loaded price history"
    );
    Ok(history)
}

pub fn parse_prices<R: Read>(
    reader: R,
    date_column: &str,
    tickers: Option<&[String]>,
) -> Result<PriceHistory, Box<dyn std::error::Error>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers: Vec<String> = rdr.headers()?.iter().map(|h| h.to_string()).collect();
    let date_index = headers
        .iter()
        .position(|h| h == date_column)
        .or_else(|| headers.iter().position(|h| h.eq_ignore_ascii_case(date_column)));

    let universe: Vec<String> = match tickers {
        Some(list) => list.to_vec(),
        None => headers
            .iter()
            .enumerate()
            .filter(|(i, _)| Some(*i) != date_index)
            .map(|(_, h)| h.clone())
            .collect(),
    };

    let columns = universe
        .iter()
        .map(|t| {
            headers
                .iter()
                .enumerate()
                .position(|(i, h)| h == t && Some(i) != date_index)
                .ok_or_else(|| {
                    format!(
                        "Column '{}' not found (available: {})",
                        t,
                        headers.join(", ")
                    )
                })
        })
        .collect::<Result<Vec<usize>, String>>()?;

    let mut rows = Vec::new();
    for (line, record) in rdr.records().enumerate() {
        let record = record?;
        let date = match date_index {
            Some(i) => {
                let raw = record.get(i).unwrap_or("");
                Some(parse_date(raw).ok_or_else(|| {
                    format!("Row {}: unrecognised date '{}'", line + 1, raw)
                })?)
            }
            None => None,
        };
        let prices = columns
            .iter()
            .map(|&c| parse_price(record.get(c).unwrap_or("")))
            .collect();
        rows.push(PriceRow::new(date, prices));
    }

    let history = PriceHistory::new(universe, rows)?;
    if history.is_empty() {
        return Err("No price rows below the header".into());
    }
    Ok(history)
}

/// Empty or non-numeric cells become NaN; the estimator rejects them with
/// the ticker and row attached.
fn parse_price(cell: &str) -> f64 {
    cell.parse::<f64>().unwrap_or(f64::NAN)
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.date_naive());
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(raw, fmt) {
            return Some(d);
        }
    }
    // Timestamps such as "2024-01-02 00:00:00".
    raw.get(..10)
        .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
