use serde::{Deserialize, Serialize};

use crate::error::AllocError;
use crate::market_data::PriceHistory;
use crate::types::Ticker;
use crate::AllocResult;

/// Trading days used to annualize daily statistics.
pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Annualized expected returns and covariance for an asset universe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnualizedStatistics {
    /// Asset identifiers; index order of every vector and matrix below.
    pub tickers: Vec<Ticker>,
    /// Mean period return times `periods_per_year`.
    pub mean_returns: Vec<f64>,
    /// Sample covariance of period returns times `periods_per_year`.
    pub covariance: Vec<Vec<f64>>,
    /// Number of period returns the estimates are based on.
    pub observations: usize,
    /// Annualization multiplier applied to both estimates.
    pub periods_per_year: f64,
}

impl AnnualizedStatistics {
    pub fn num_assets(&self) -> usize {
        self.tickers.len()
    }

    /// Standalone annualized volatility of each asset.
    pub fn asset_volatilities(&self) -> Vec<f64> {
        (0..self.covariance.len())
            .map(|i| self.covariance[i][i].max(0.0).sqrt())
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Estimate annualized mean returns and covariance from a price history.
///
/// Returns are simple relative changes between adjacent rows. The covariance
/// uses the `T - 1` sample denominator, falling back to `1` when only a single
/// return exists.
pub fn estimate_statistics(
    history: &PriceHistory,
    periods_per_year: f64,
) -> AllocResult<AnnualizedStatistics> {
    if !periods_per_year.is_finite() || periods_per_year <= 0.0 {
        return Err(AllocError::InvalidInput {
            field: "periods_per_year".into(),
            reason: format!("Must be a positive number, got {}", periods_per_year),
        });
    }

    let returns = period_returns(history)?;
    let n = history.num_assets();
    let t = returns.len();
    let t_f = t as f64;

    let mean: Vec<f64> = (0..n)
        .map(|j| returns.iter().map(|r| r[j]).sum::<f64>() / t_f)
        .collect();

    let denom = if t > 1 { (t - 1) as f64 } else { 1.0 };
    let mut covariance = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in i..n {
            let s: f64 = returns
                .iter()
                .map(|r| (r[i] - mean[i]) * (r[j] - mean[j]))
                .sum();
            let c = s / denom * periods_per_year;
            covariance[i][j] = c;
            covariance[j][i] = c;
        }
    }

    let mean_returns = mean.iter().map(|m| m * periods_per_year).collect();

    tracing::debug!(
        assets = n,
        observations = t,
        "estimated annualized return statistics"
    );

    Ok(AnnualizedStatistics {
        tickers: history.tickers().to_vec(),
        mean_returns,
        covariance,
        observations: t,
        periods_per_year,
    })
}

/// Period-over-period relative returns, one row per adjacent pair of prices.
pub fn period_returns(history: &PriceHistory) -> AllocResult<Vec<Vec<f64>>> {
    if history.len() < 2 {
        return Err(AllocError::InsufficientData(format!(
            "At least 2 price observations required to compute returns, got {}",
            history.len()
        )));
    }

    for (row, obs) in history.rows().iter().enumerate() {
        for (j, &p) in obs.prices.iter().enumerate() {
            if !p.is_finite() || p <= 0.0 {
                return Err(AllocError::InvalidPriceData {
                    ticker: history.tickers()[j].clone(),
                    row,
                    value: p,
                });
            }
        }
    }

    Ok(history
        .rows()
        .windows(2)
        .map(|pair| {
            pair[1]
                .prices
                .iter()
                .zip(pair[0].prices.iter())
                .map(|(cur, prev)| cur / prev - 1.0)
                .collect()
        })
        .collect())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn prices_from_returns(returns: &[f64]) -> Vec<f64> {
        let mut p = vec![100.0];
        for r in returns {
            let last = *p.last().unwrap();
            p.push(last * (1.0 + r));
        }
        p
    }

    fn history(columns: &[Vec<f64>]) -> PriceHistory {
        let tickers = (0..columns.len()).map(|i| format!("A{}", i)).collect();
        PriceHistory::from_columns(tickers, columns).unwrap()
    }

    // ------------------------------------------------------------------
    // 1. Returns are relative changes between adjacent rows
    // ------------------------------------------------------------------
    #[test]
    fn test_period_returns() {
        let h = history(&[vec![100.0, 110.0, 99.0]]);
        let r = period_returns(&h).unwrap();
        assert_eq!(r.len(), 2);
        assert!((r[0][0] - 0.10).abs() < 1e-12);
        assert!((r[1][0] + 0.10).abs() < 1e-12);
    }

    // ------------------------------------------------------------------
    // 2. Closed-form mean and covariance, annualized by 252
    // ------------------------------------------------------------------
    #[test]
    fn test_known_mean_and_covariance() {
        // A: +1%, -1%, +2%, 0%   mean 0.5%
        // B: +2%, -2%, +4%, 0%   mean 1.0%  (B = 2A, so cov(A,B) = 2 var(A))
        let ra = [0.01, -0.01, 0.02, 0.0];
        let rb = [0.02, -0.02, 0.04, 0.0];
        let h = history(&[prices_from_returns(&ra), prices_from_returns(&rb)]);
        let s = estimate_statistics(&h, TRADING_DAYS_PER_YEAR).unwrap();

        let var_a = {
            let m = 0.005;
            ra.iter().map(|r| (r - m) * (r - m)).sum::<f64>() / 3.0
        };

        assert_eq!(s.observations, 4);
        assert!((s.mean_returns[0] - 0.005 * 252.0).abs() < 1e-9);
        assert!((s.mean_returns[1] - 0.010 * 252.0).abs() < 1e-9);
        assert!((s.covariance[0][0] - var_a * 252.0).abs() < 1e-9);
        assert!((s.covariance[1][1] - 4.0 * var_a * 252.0).abs() < 1e-9);
        assert!((s.covariance[0][1] - 2.0 * var_a * 252.0).abs() < 1e-9);
        assert_eq!(s.covariance[0][1], s.covariance[1][0]);
    }

    // ------------------------------------------------------------------
    // 3. Asset volatilities are the root of the diagonal
    // ------------------------------------------------------------------
    #[test]
    fn test_asset_volatilities() {
        let h = history(&[prices_from_returns(&[0.01, -0.01, 0.01, -0.01])]);
        let s = estimate_statistics(&h, TRADING_DAYS_PER_YEAR).unwrap();
        let vols = s.asset_volatilities();
        assert!((vols[0] - s.covariance[0][0].sqrt()).abs() < 1e-15);
        assert!(vols[0] > 0.0);
    }

    // ------------------------------------------------------------------
    // 4. Single return: zero covariance instead of a division by zero
    // ------------------------------------------------------------------
    #[test]
    fn test_two_rows_single_return() {
        let h = history(&[vec![100.0, 105.0]]);
        let s = estimate_statistics(&h, TRADING_DAYS_PER_YEAR).unwrap();
        assert_eq!(s.observations, 1);
        assert!((s.mean_returns[0] - 0.05 * 252.0).abs() < 1e-9);
        assert_eq!(s.covariance[0][0], 0.0);
    }

    // ------------------------------------------------------------------
    // 5. Fewer than two rows
    // ------------------------------------------------------------------
    #[test]
    fn test_single_row_insufficient() {
        let h = history(&[vec![100.0]]);
        assert!(matches!(
            estimate_statistics(&h, TRADING_DAYS_PER_YEAR),
            Err(AllocError::InsufficientData(_))
        ));
    }

    // ------------------------------------------------------------------
    // 6. Non-positive and non-finite prices
    // ------------------------------------------------------------------
    #[test]
    fn test_zero_price_rejected() {
        let h = history(&[vec![100.0, 101.0], vec![50.0, 0.0]]);
        match estimate_statistics(&h, TRADING_DAYS_PER_YEAR) {
            Err(AllocError::InvalidPriceData { ticker, row, .. }) => {
                assert_eq!(ticker, "A1");
                assert_eq!(row, 1);
            }
            other => panic!("expected InvalidPriceData, got {:?}", other),
        }
    }

    #[test]
    fn test_negative_and_nan_prices_rejected() {
        let neg = history(&[vec![100.0, -1.0]]);
        let nan = history(&[vec![f64::NAN, 100.0]]);
        assert!(matches!(
            period_returns(&neg),
            Err(AllocError::InvalidPriceData { .. })
        ));
        assert!(matches!(
            period_returns(&nan),
            Err(AllocError::InvalidPriceData { .. })
        ));
    }

    #[test]
    fn test_invalid_annualization_factor() {
        let h = history(&[vec![100.0, 101.0]]);
        assert!(estimate_statistics(&h, 0.0).is_err());
    }
}
