use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::AllocError;
use crate::solver::SolverSettings;
use crate::statistics::TRADING_DAYS_PER_YEAR;
use crate::types::{Money, Rate};
use crate::AllocResult;

pub const DEFAULT_INVESTMENT_AMOUNT: Money = dec!(10000);
pub const DEFAULT_RISK_TOLERANCE: f64 = 0.05;
pub const DEFAULT_RISK_FREE_RATE: Rate = 0.02;

/// Parameters of one allocation run. Every field has a default so partial
/// JSON configs deserialize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocationConfig {
    /// Total capital to allocate.
    pub investment_amount: Money,
    /// Maximum annualized portfolio volatility.
    pub risk_tolerance: f64,
    /// Annual risk-free rate used for the Sharpe ratio.
    pub risk_free_rate: Rate,
    /// Return periods per year (252 for daily prices).
    pub periods_per_year: f64,
    pub solver: SolverSettings,
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            investment_amount: DEFAULT_INVESTMENT_AMOUNT,
            risk_tolerance: DEFAULT_RISK_TOLERANCE,
            risk_free_rate: DEFAULT_RISK_FREE_RATE,
            periods_per_year: TRADING_DAYS_PER_YEAR,
            solver: SolverSettings::default(),
        }
    }
}

impl AllocationConfig {
    pub fn validate(&self) -> AllocResult<()> {
        if self.investment_amount <= Decimal::ZERO {
            return Err(AllocError::InvalidInput {
                field: "investment_amount".into(),
                reason: format!("Must be positive, got {}", self.investment_amount),
            });
        }
        if !self.risk_tolerance.is_finite() || self.risk_tolerance < 0.0 {
            return Err(AllocError::InvalidInput {
                field: "risk_tolerance".into(),
                reason: format!(
                    "Must be a finite, non-negative volatility, got {}",
                    self.risk_tolerance
                ),
            });
        }
        if !self.risk_free_rate.is_finite() {
            return Err(AllocError::InvalidInput {
                field: "risk_free_rate".into(),
                reason: "Must be finite".into(),
            });
        }
        if !self.periods_per_year.is_finite() || self.periods_per_year <= 0.0 {
            return Err(AllocError::InvalidInput {
                field: "periods_per_year".into(),
                reason: format!("Must be positive, got {}", self.periods_per_year),
            });
        }
        let s = &self.solver;
        if s.max_iterations == 0 || s.max_line_search_steps == 0 {
            return Err(AllocError::InvalidInput {
                field: "solver".into(),
                reason: "Iteration budgets must be positive".into(),
            });
        }
        if !(s.tolerance > 0.0 && s.feasibility_tolerance > 0.0) {
            return Err(AllocError::InvalidInput {
                field: "solver".into(),
                reason: "Tolerances must be positive".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let c = AllocationConfig::default();
        assert_eq!(c.investment_amount, dec!(10000));
        assert_eq!(c.risk_tolerance, 0.05);
        assert_eq!(c.risk_free_rate, 0.02);
        assert_eq!(c.periods_per_year, 252.0);
        assert_eq!(c.solver.max_iterations, 100);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let c: AllocationConfig =
            serde_json::from_str(r#"{"risk_tolerance": 0.2, "solver": {"max_iterations": 40}}"#)
                .unwrap();
        assert_eq!(c.risk_tolerance, 0.2);
        assert_eq!(c.investment_amount, dec!(10000));
        assert_eq!(c.solver.max_iterations, 40);
        assert_eq!(c.solver.tolerance, SolverSettings::default().tolerance);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut c = AllocationConfig::default();
        c.investment_amount = dec!(0);
        assert!(c.validate().is_err());

        let mut c = AllocationConfig::default();
        c.risk_tolerance = f64::NAN;
        assert!(c.validate().is_err());

        let mut c = AllocationConfig::default();
        c.solver.max_iterations = 0;
        assert!(c.validate().is_err());
    }
}
