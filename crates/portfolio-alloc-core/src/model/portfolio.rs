use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::error::AllocError;
use crate::solver::ConstrainedProblem;
use crate::statistics::AnnualizedStatistics;
use crate::types::Rate;
use crate::AllocResult;

/// Relative tolerance for covariance symmetry.
const SYMMETRY_TOLERANCE: f64 = 1e-10;

// ---------------------------------------------------------------------------
// Portfolio model
// ---------------------------------------------------------------------------

/// Portfolio return and risk as functions of the weight vector, closed over
/// annualized statistics.
#[derive(Debug, Clone)]
pub struct PortfolioModel {
    mean_returns: DVector<f64>,
    covariance: DMatrix<f64>,
}

impl PortfolioModel {
    pub fn new(stats: &AnnualizedStatistics) -> AllocResult<Self> {
        let n = stats.tickers.len();
        if n == 0 {
            return Err(AllocError::InsufficientData(
                "At least one asset required".into(),
            ));
        }
        if stats.mean_returns.len() != n {
            return Err(AllocError::InvalidInput {
                field: "mean_returns".into(),
                reason: format!(
                    "Expected {} returns but got {}",
                    n,
                    stats.mean_returns.len()
                ),
            });
        }
        validate_covariance(&stats.covariance, n)?;
        if let Some(i) = stats.mean_returns.iter().position(|m| !m.is_finite()) {
            return Err(AllocError::InvalidInput {
                field: format!("mean_returns[{}]", i),
                reason: "Expected return must be finite".into(),
            });
        }

        Ok(Self {
            mean_returns: DVector::from_column_slice(&stats.mean_returns),
            covariance: DMatrix::from_fn(n, n, |i, j| stats.covariance[i][j]),
        })
    }

    pub fn num_assets(&self) -> usize {
        self.mean_returns.len()
    }

    /// `w · μ`
    pub fn portfolio_return(&self, weights: &DVector<f64>) -> f64 {
        weights.dot(&self.mean_returns)
    }

    /// `sqrt(wᵀΣw)`, with the quadratic form clamped at zero first.
    pub fn portfolio_volatility(&self, weights: &DVector<f64>) -> f64 {
        self.portfolio_variance(weights).max(0.0).sqrt()
    }

    pub fn portfolio_variance(&self, weights: &DVector<f64>) -> f64 {
        weights.dot(&(&self.covariance * weights))
    }

    /// `(return - rf) / volatility`; undefined for a riskless portfolio.
    pub fn sharpe_ratio(&self, weights: &DVector<f64>, risk_free_rate: Rate) -> AllocResult<f64> {
        let vol = self.portfolio_volatility(weights);
        if vol == 0.0 {
            return Err(AllocError::DivisionByZeroRisk {
                context: "sharpe_ratio".into(),
            });
        }
        Ok((self.portfolio_return(weights) - risk_free_rate) / vol)
    }

    pub fn return_gradient(&self) -> DVector<f64> {
        self.mean_returns.clone()
    }

    /// `Σw / σ(w)`.
    ///
    /// σ is not differentiable at a riskless portfolio. There the gradient is
    /// replaced by the standalone volatilities `sqrt(Σᵢᵢ)`, which bound how fast
    /// σ grows when weight moves into each asset.
    pub fn volatility_gradient(&self, weights: &DVector<f64>) -> DVector<f64> {
        let vol = self.portfolio_volatility(weights);
        if vol == 0.0 {
            return self.covariance.diagonal().map(|v| v.max(0.0).sqrt());
        }
        &self.covariance * weights / vol
    }

    /// Equal weighting, `1/N` per asset.
    pub fn equal_weights(&self) -> DVector<f64> {
        let n = self.num_assets();
        DVector::from_element(n, 1.0 / n as f64)
    }
}

// ---------------------------------------------------------------------------
// Allocation problem
// ---------------------------------------------------------------------------

/// Ceiling on annualized portfolio volatility.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskConstraint {
    pub risk_tolerance: f64,
}

/// Maximize expected return subject to full investment, long-only bounds
/// and a volatility ceiling.
#[derive(Debug, Clone)]
pub struct AllocationProblem {
    model: PortfolioModel,
    risk: RiskConstraint,
    risk_free_rate: Rate,
}

impl AllocationProblem {
    pub fn new(
        model: PortfolioModel,
        risk: RiskConstraint,
        risk_free_rate: Rate,
    ) -> AllocResult<Self> {
        if !risk.risk_tolerance.is_finite() || risk.risk_tolerance < 0.0 {
            return Err(AllocError::InvalidInput {
                field: "risk_tolerance".into(),
                reason: format!(
                    "Must be a finite, non-negative volatility, got {}",
                    risk.risk_tolerance
                ),
            });
        }
        if !risk_free_rate.is_finite() {
            return Err(AllocError::InvalidInput {
                field: "risk_free_rate".into(),
                reason: "Must be finite".into(),
            });
        }
        Ok(Self {
            model,
            risk,
            risk_free_rate,
        })
    }

    pub fn model(&self) -> &PortfolioModel {
        &self.model
    }

    pub fn risk_tolerance(&self) -> f64 {
        self.risk.risk_tolerance
    }

    pub fn risk_free_rate(&self) -> Rate {
        self.risk_free_rate
    }

    pub fn initial_guess(&self) -> Vec<f64> {
        self.model.equal_weights().iter().copied().collect()
    }
}

impl ConstrainedProblem for AllocationProblem {
    fn dimension(&self) -> usize {
        self.model.num_assets()
    }

    fn objective(&self, x: &DVector<f64>) -> f64 {
        -self.model.portfolio_return(x)
    }

    fn objective_gradient(&self, _x: &DVector<f64>) -> DVector<f64> {
        -self.model.return_gradient()
    }

    fn equality_constraints(&self, x: &DVector<f64>) -> DVector<f64> {
        DVector::from_element(1, x.sum() - 1.0)
    }

    fn equality_jacobian(&self, _x: &DVector<f64>) -> DMatrix<f64> {
        DMatrix::from_element(1, self.dimension(), 1.0)
    }

    fn inequality_constraints(&self, x: &DVector<f64>) -> DVector<f64> {
        DVector::from_element(
            1,
            self.risk.risk_tolerance - self.model.portfolio_volatility(x),
        )
    }

    fn inequality_jacobian(&self, x: &DVector<f64>) -> DMatrix<f64> {
        let grad = self.model.volatility_gradient(x);
        DMatrix::from_fn(1, self.dimension(), |_, j| -grad[j])
    }

    fn lower_bounds(&self) -> DVector<f64> {
        DVector::zeros(self.dimension())
    }

    fn upper_bounds(&self) -> DVector<f64> {
        DVector::from_element(self.dimension(), 1.0)
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

#[allow(clippy::needless_range_loop)]
fn validate_covariance(cov: &[Vec<f64>], n: usize) -> AllocResult<()> {
    if cov.len() != n {
        return Err(AllocError::InvalidInput {
            field: "covariance".into(),
            reason: format!("Expected {}x{} matrix but got {} rows", n, n, cov.len()),
        });
    }
    for (i, row) in cov.iter().enumerate() {
        if row.len() != n {
            return Err(AllocError::InvalidInput {
                field: "covariance".into(),
                reason: format!("Row {} has {} columns, expected {}", i, row.len(), n),
            });
        }
        if row.iter().any(|v| !v.is_finite()) {
            return Err(AllocError::InvalidInput {
                field: "covariance".into(),
                reason: format!("Row {} contains a non-finite entry", i),
            });
        }
    }
    for i in 0..n {
        if cov[i][i] < 0.0 {
            return Err(AllocError::InvalidInput {
                field: "covariance".into(),
                reason: format!("Negative variance {} on diagonal {}", cov[i][i], i),
            });
        }
        for j in (i + 1)..n {
            let scale = cov[i][j].abs().max(cov[j][i].abs()).max(1.0);
            if (cov[i][j] - cov[j][i]).abs() > SYMMETRY_TOLERANCE * scale {
                return Err(AllocError::InvalidInput {
                    field: "covariance".into(),
                    reason: format!(
                        "Not symmetric: [{},{}]={} != [{},{}]={}",
                        i, j, cov[i][j], j, i, cov[j][i]
                    ),
                });
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
