use nalgebra::DVector;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::AllocError;
use crate::model::AllocationProblem;
use crate::types::{Money, Rate, Ticker};
use crate::AllocResult;

/// Capital assigned to one asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetAllocation {
    pub ticker: Ticker,
    pub weight: f64,
    /// `weight × investment amount`, rounded to cents.
    pub amount: Money,
    /// `weight × expected return`.
    pub contribution_to_return: f64,
}

/// Derived view of a solved weight vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationReport {
    pub allocations: Vec<AssetAllocation>,
    pub investment_amount: Money,
    pub expected_return: f64,
    pub volatility: f64,
    /// `None` when the portfolio has zero volatility.
    pub sharpe_ratio: Option<f64>,
    pub risk_free_rate: Rate,
    /// Herfindahl-Hirschman index of the weights.
    pub hhi_concentration: f64,
    pub warnings: Vec<String>,
}

impl AllocationReport {
    pub fn total_allocated(&self) -> Money {
        self.allocations.iter().map(|a| a.amount).sum()
    }
}

/// Recompute return, risk and Sharpe ratio from `weights` and turn them into
/// dollar amounts. The Sharpe ratio uses the problem's risk-free rate.
///
/// No constraint is enforced here: weights from a failed solve are reported
/// as they are so the caller can inspect them.
pub fn interpret(
    problem: &AllocationProblem,
    tickers: &[Ticker],
    weights: &[f64],
    investment_amount: Money,
) -> AllocResult<AllocationReport> {
    let model = problem.model();
    let risk_free_rate = problem.risk_free_rate();
    if tickers.len() != weights.len() || weights.len() != model.num_assets() {
        return Err(AllocError::InvalidInput {
            field: "weights".into(),
            reason: format!(
                "Expected {} weights for {} tickers, got {}",
                model.num_assets(),
                tickers.len(),
                weights.len()
            ),
        });
    }

    let w = DVector::from_column_slice(weights);
    let expected_return = model.portfolio_return(&w);
    let volatility = model.portfolio_volatility(&w);
    let mut warnings = Vec::new();

    let sharpe_ratio = match model.sharpe_ratio(&w, risk_free_rate) {
        Ok(s) => Some(s),
        Err(AllocError::DivisionByZeroRisk { .. }) => {
            tracing::warn!("portfolio volatility is zero; Sharpe ratio undefined");
            warnings.push("Sharpe ratio undefined: portfolio volatility is zero".to_string());
            None
        }
        Err(e) => return Err(e),
    };

    let mu = model.return_gradient();
    let allocations = tickers
        .iter()
        .zip(weights.iter())
        .enumerate()
        .map(|(i, (ticker, &weight))| {
            Ok(AssetAllocation {
                ticker: ticker.clone(),
                weight,
                amount: dollar_amount(ticker, weight, investment_amount)?,
                contribution_to_return: weight * mu[i],
            })
        })
        .collect::<AllocResult<Vec<_>>>()?;

    let hhi_concentration: f64 = weights.iter().map(|w| w * w).sum();

    Ok(AllocationReport {
        allocations,
        investment_amount,
        expected_return,
        volatility,
        sharpe_ratio,
        risk_free_rate,
        hhi_concentration,
        warnings,
    })
}

fn dollar_amount(ticker: &str, weight: f64, investment_amount: Money) -> AllocResult<Money> {
    let w = Decimal::from_f64(weight).ok_or_else(|| AllocError::InvalidInput {
        field: format!("weights[{}]", ticker),
        reason: format!("Weight {} cannot be expressed as a decimal", weight),
    })?;
    Ok((w * investment_amount).round_dp(2))
}
