use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::AllocError;
use crate::types::Ticker;
use crate::AllocResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One observation of the price table: a price per asset, in universe order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRow {
    /// Observation date. Either every row is dated or none is.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    pub prices: Vec<f64>,
}

impl PriceRow {
    pub fn new(date: Option<NaiveDate>, prices: Vec<f64>) -> Self {
        Self { date, prices }
    }
}

/// Price history for a fixed asset universe.
///
/// Rows are kept in chronological order: dated rows are sorted by date on
/// construction, undated rows keep their source order. Prices themselves are
/// not checked here; the statistics estimator rejects non-positive or
/// non-finite values when it needs them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceHistory {
    tickers: Vec<Ticker>,
    rows: Vec<PriceRow>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

impl PriceHistory {
    pub fn new(tickers: Vec<Ticker>, mut rows: Vec<PriceRow>) -> AllocResult<Self> {
        validate_tickers(&tickers)?;

        let n = tickers.len();
        for (i, row) in rows.iter().enumerate() {
            if row.prices.len() != n {
                return Err(AllocError::InvalidInput {
                    field: format!("rows[{}]", i),
                    reason: format!("Expected {} prices but got {}", n, row.prices.len()),
                });
            }
        }

        let dated = rows.iter().filter(|r| r.date.is_some()).count();
        if dated > 0 && dated != rows.len() {
            return Err(AllocError::InvalidInput {
                field: "rows".into(),
                reason: format!(
                    "{} of {} rows carry a date; either all rows or none must be dated",
                    dated,
                    rows.len()
                ),
            });
        }

        if dated > 0 {
            rows.sort_by_key(|r| r.date);
            for pair in rows.windows(2) {
                if pair[0].date == pair[1].date {
                    return Err(AllocError::InvalidInput {
                        field: "rows".into(),
                        reason: format!(
                            "Duplicate observation date {}",
                            pair[0].date.map(|d| d.to_string()).unwrap_or_default()
                        ),
                    });
                }
            }
        }

        Ok(Self { tickers, rows })
    }

    /// Build an undated history from price columns (one `Vec` per asset).
    pub fn from_columns(tickers: Vec<Ticker>, columns: &[Vec<f64>]) -> AllocResult<Self> {
        if columns.len() != tickers.len() {
            return Err(AllocError::InvalidInput {
                field: "columns".into(),
                reason: format!(
                    "Expected {} columns but got {}",
                    tickers.len(),
                    columns.len()
                ),
            });
        }
        let len = columns.first().map(|c| c.len()).unwrap_or(0);
        if let Some((i, c)) = columns.iter().enumerate().find(|(_, c)| c.len() != len) {
            return Err(AllocError::InvalidInput {
                field: format!("columns[{}]", i),
                reason: format!("Expected {} prices but got {}", len, c.len()),
            });
        }
        let rows = (0..len)
            .map(|t| PriceRow::new(None, columns.iter().map(|c| c[t]).collect()))
            .collect();
        Self::new(tickers, rows)
    }

    pub fn tickers(&self) -> &[Ticker] {
        &self.tickers
    }

    pub fn rows(&self) -> &[PriceRow] {
        &self.rows
    }

    pub fn num_assets(&self) -> usize {
        self.tickers.len()
    }

    /// Number of observations (rows).
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Price column for the asset at `index`.
    pub fn column(&self, index: usize) -> Vec<f64> {
        self.rows.iter().map(|r| r.prices[index]).collect()
    }

    /// Restrict the history to `universe`, in the order given.
    pub fn select(&self, universe: &[Ticker]) -> AllocResult<Self> {
        let indices = universe
            .iter()
            .map(|t| {
                self.tickers
                    .iter()
                    .position(|have| have == t)
                    .ok_or_else(|| AllocError::InvalidInput {
                        field: "tickers".into(),
                        reason: format!(
                            "Unknown ticker '{}' (available: {})",
                            t,
                            self.tickers.join(", ")
                        ),
                    })
            })
            .collect::<AllocResult<Vec<usize>>>()?;

        let rows = self
            .rows
            .iter()
            .map(|r| PriceRow::new(r.date, indices.iter().map(|&i| r.prices[i]).collect()))
            .collect();
        Self::new(universe.to_vec(), rows)
    }
}

fn validate_tickers(tickers: &[Ticker]) -> AllocResult<()> {
    if tickers.is_empty() {
        return Err(AllocError::InsufficientData(
            "At least one asset required".into(),
        ));
    }
    let mut seen = HashSet::new();
    for (i, t) in tickers.iter().enumerate() {
        if t.trim().is_empty() {
            return Err(AllocError::InvalidInput {
                field: format!("tickers[{}]", i),
                reason: "Ticker must not be empty".into(),
            });
        }
        if !seen.insert(t.as_str()) {
            return Err(AllocError::InvalidInput {
                field: format!("tickers[{}]", i),
                reason: format!("Duplicate ticker '{}'", t),
            });
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
