use std::time::Instant;

use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use crate::config::AllocationConfig;
use crate::market_data::PriceHistory;
use crate::model::{AllocationProblem, PortfolioModel, RiskConstraint};
use crate::report::{interpret, AllocationReport};
use crate::solver::{SolverReport, SqpSolver};
use crate::statistics::{estimate_statistics, AnnualizedStatistics};
use crate::types::{with_metadata, ComputationOutput};
use crate::AllocResult;

/// Slack allowed when checking a solved allocation against its constraints.
pub const FEASIBILITY_EPSILON: f64 = 1e-6;

const METHODOLOGY: &str = "SQP Return Maximization under Volatility Ceiling";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// How far a weight vector is from the feasible set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeasibilityCheck {
    /// `|Σw - 1|`
    pub budget_deviation: f64,
    pub min_weight: f64,
    pub max_weight: f64,
    pub volatility: f64,
    /// `max(σ(w) - τ, 0)`
    pub risk_excess: f64,
    pub epsilon: f64,
    pub feasible: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationOutput {
    pub statistics: AnnualizedStatistics,
    pub report: AllocationReport,
    pub solver: SolverReport,
    pub feasibility: FeasibilityCheck,
    pub converged: bool,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Estimate statistics from `history`, solve for the return-maximizing
/// weights under the configured volatility ceiling and interpret them.
pub fn optimize_allocation(
    history: &PriceHistory,
    config: &AllocationConfig,
) -> AllocResult<ComputationOutput<AllocationOutput>> {
    config.validate()?;
    let stats = estimate_statistics(history, config.periods_per_year)?;
    optimize_from_statistics(stats, config)
}

/// Same as [`optimize_allocation`] for statistics estimated elsewhere.
pub fn optimize_from_statistics(
    stats: AnnualizedStatistics,
    config: &AllocationConfig,
) -> AllocResult<ComputationOutput<AllocationOutput>> {
    let start = Instant::now();
    config.validate()?;

    let model = PortfolioModel::new(&stats)?;
    let problem = AllocationProblem::new(
        model,
        RiskConstraint {
            risk_tolerance: config.risk_tolerance,
        },
        config.risk_free_rate,
    )?;

    let solver = SqpSolver::new(config.solver.clone());
    let solution = solver.minimize(&problem, &problem.initial_guess())?;

    let report = interpret(
        &problem,
        &stats.tickers,
        &solution.x,
        config.investment_amount,
    )?;
    let feasibility = check_feasibility(
        problem.model(),
        &solution.x,
        config.risk_tolerance,
        FEASIBILITY_EPSILON,
    );

    let converged = solution.converged();
    let mut warnings = report.warnings.clone();
    if !converged {
        warnings.push(format!(
            "Optimization did not converge ({}); weights are the last iterate",
            solution.termination.description()
        ));
    }
    if converged && !feasibility.feasible {
        warnings.push(format!(
            "Converged weights exceed feasibility tolerance {}",
            feasibility.epsilon
        ));
    }

    let assumptions = serde_json::json!({
        "investment_amount": config.investment_amount.to_string(),
        "risk_tolerance": config.risk_tolerance,
        "risk_free_rate": config.risk_free_rate,
        "periods_per_year": stats.periods_per_year,
        "observations": stats.observations,
        "long_only": true,
        "fully_invested": true,
    });

    let output = AllocationOutput {
        statistics: stats,
        report,
        solver: solution,
        feasibility,
        converged,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        METHODOLOGY,
        &assumptions,
        warnings,
        elapsed,
        output,
    ))
}

/// Check full investment, the weight bounds and the volatility ceiling, each
/// within `epsilon`.
pub fn check_feasibility(
    model: &PortfolioModel,
    weights: &[f64],
    risk_tolerance: f64,
    epsilon: f64,
) -> FeasibilityCheck {
    let w = DVector::from_column_slice(weights);
    let budget_deviation = (w.sum() - 1.0).abs();
    let min_weight = weights.iter().copied().fold(f64::INFINITY, f64::min);
    let max_weight = weights.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let volatility = model.portfolio_volatility(&w);
    let risk_excess = (volatility - risk_tolerance).max(0.0);

    let feasible = weights.len() == model.num_assets()
        && budget_deviation <= epsilon
        && min_weight >= -epsilon
        && max_weight <= 1.0 + epsilon
        && risk_excess <= epsilon;

    FeasibilityCheck {
        budget_deviation,
        min_weight,
        max_weight,
        volatility,
        risk_excess,
        epsilon,
        feasible,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::TerminationReason;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    fn two_asset_stats() -> AnnualizedStatistics {
        // A: 12% return, 20% vol. B: 5% return, 10% vol. Uncorrelated.
        AnnualizedStatistics {
            tickers: vec!["A".into(), "B".into()],
            mean_returns: vec![0.12, 0.05],
            covariance: vec![vec![0.04, 0.0], vec![0.0, 0.01]],
            observations: 250,
            periods_per_year: 252.0,
        }
    }

    fn config(risk_tolerance: f64) -> AllocationConfig {
        AllocationConfig {
            risk_tolerance,
            ..AllocationConfig::default()
        }
    }

    // ------------------------------------------------------------------
    // 1. Loose ceiling: everything in the highest-return asset
    // ------------------------------------------------------------------
    #[test]
    fn test_loose_ceiling_picks_best_asset() {
        let out = optimize_from_statistics(two_asset_stats(), &config(0.5)).unwrap();
        let r = &out.result;
        assert!(r.converged, "termination: {:?}", r.solver.termination);
        assert!((r.report.allocations[0].weight - 1.0).abs() < 1e-6);
        assert!(r.report.allocations[1].weight.abs() < 1e-6);
        assert!((r.report.expected_return - 0.12).abs() < 1e-6);
        assert!(r.feasibility.feasible);
        assert_eq!(out.methodology, METHODOLOGY);
    }

    // ------------------------------------------------------------------
    // 2. Binding ceiling: volatility sits on the tolerance
    // ------------------------------------------------------------------
    #[test]
    fn test_binding_ceiling() {
        // 0.04 a² + 0.01 (1-a)² = 0.0225 at the largest feasible a.
        let a = (0.02 + 0.0029_f64.sqrt()) / 0.1;
        let out = optimize_from_statistics(two_asset_stats(), &config(0.15)).unwrap();
        let r = &out.result;
        assert!(r.converged, "termination: {:?}", r.solver.termination);
        assert!((r.report.volatility - 0.15).abs() < 1e-6);
        assert!((r.report.allocations[0].weight - a).abs() < 1e-5);
        assert!(r.feasibility.feasible);
        assert!(out.warnings.is_empty());
    }

    // ------------------------------------------------------------------
    // 3. Unreachable ceiling: degraded result, not an error
    // ------------------------------------------------------------------
    #[test]
    fn test_unreachable_ceiling_is_reported() {
        // Minimum-variance portfolio has σ ≈ 0.0894, above 0.05.
        let out = optimize_from_statistics(two_asset_stats(), &config(0.05)).unwrap();
        let r = &out.result;
        assert!(!r.converged);
        assert_ne!(r.solver.termination, TerminationReason::Converged);
        assert!(!r.feasibility.feasible);
        assert!(out
            .warnings
            .iter()
            .any(|w| w.contains("did not converge")));
        assert_eq!(r.report.allocations.len(), 2);
    }

    // ------------------------------------------------------------------
    // 4. Dollar amounts follow the weights
    // ------------------------------------------------------------------
    #[test]
    fn test_amounts_scale_with_investment() {
        let mut cfg = config(0.5);
        cfg.investment_amount = dec!(2500);
        let out = optimize_from_statistics(two_asset_stats(), &cfg).unwrap();
        assert_eq!(out.result.report.allocations[0].amount, dec!(2500.00));
        assert_eq!(out.result.report.allocations[1].amount, dec!(0.00));
    }

    // ------------------------------------------------------------------
    // 5. Feasibility check components
    // ------------------------------------------------------------------
    #[test]
    fn test_check_feasibility() {
        let model = PortfolioModel::new(&two_asset_stats()).unwrap();

        let ok = check_feasibility(&model, &[0.5, 0.5], 0.2, FEASIBILITY_EPSILON);
        assert!(ok.feasible);
        assert_eq!(ok.risk_excess, 0.0);

        let over_budget = check_feasibility(&model, &[0.6, 0.6], 0.5, FEASIBILITY_EPSILON);
        assert!(!over_budget.feasible);
        assert!((over_budget.budget_deviation - 0.2).abs() < 1e-12);

        let short = check_feasibility(&model, &[1.1, -0.1], 0.5, FEASIBILITY_EPSILON);
        assert!(!short.feasible);
        assert!((short.min_weight + 0.1).abs() < 1e-12);

        let risky = check_feasibility(&model, &[1.0, 0.0], 0.1, FEASIBILITY_EPSILON);
        assert!(!risky.feasible);
        assert!((risky.risk_excess - 0.1).abs() < 1e-12);
    }

    // ------------------------------------------------------------------
    // 6. Invalid configuration is rejected before solving
    // ------------------------------------------------------------------
    #[test]
    fn test_invalid_config_rejected() {
        let mut cfg = config(0.1);
        cfg.investment_amount = dec!(-5);
        assert!(optimize_from_statistics(two_asset_stats(), &cfg).is_err());
    }

    // ------------------------------------------------------------------
    // 7. End to end from prices
    // ------------------------------------------------------------------
    #[test]
    fn test_from_price_history() {
        let history = PriceHistory::from_columns(
            vec!["UP".into(), "FLAT".into()],
            &[
                vec![100.0, 102.0, 101.0, 104.0, 106.0, 105.0],
                vec![50.0, 50.5, 50.2, 50.6, 50.9, 51.0],
            ],
        )
        .unwrap();
        let out = optimize_allocation(&history, &config(10.0)).unwrap();
        let r = &out.result;
        assert_eq!(r.statistics.observations, 5);
        assert!(r.converged);
        let total: f64 = r.report.allocations.iter().map(|a| a.weight).sum();
        assert!((total - 1.0).abs() < 1e-6);
    }
}
