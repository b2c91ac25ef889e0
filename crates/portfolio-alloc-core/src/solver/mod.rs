//! Sequential quadratic programming for smooth, bound-constrained problems
//! with equality and inequality constraints.

pub mod qp;
pub mod sqp;

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

pub use sqp::SqpSolver;

/// A smooth nonlinear program in minimization form:
///
/// ```text
/// min f(x)  s.t.  h(x) = 0,  g(x) >= 0,  lower <= x <= upper
/// ```
///
/// Jacobians are row-per-constraint.
pub trait ConstrainedProblem {
    fn dimension(&self) -> usize;

    fn objective(&self, x: &DVector<f64>) -> f64;

    fn objective_gradient(&self, x: &DVector<f64>) -> DVector<f64>;

    fn equality_constraints(&self, x: &DVector<f64>) -> DVector<f64>;

    fn equality_jacobian(&self, x: &DVector<f64>) -> DMatrix<f64>;

    fn inequality_constraints(&self, x: &DVector<f64>) -> DVector<f64>;

    fn inequality_jacobian(&self, x: &DVector<f64>) -> DMatrix<f64>;

    fn lower_bounds(&self) -> DVector<f64>;

    fn upper_bounds(&self) -> DVector<f64>;
}

/// Iteration budget and tolerances for [`SqpSolver`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverSettings {
    pub max_iterations: u32,
    /// Infinity norm of the search direction below which the iterate is stationary.
    pub tolerance: f64,
    /// Largest total constraint violation accepted as feasible.
    pub feasibility_tolerance: f64,
    pub max_line_search_steps: u32,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            tolerance: 1e-7,
            feasibility_tolerance: 1e-8,
            max_line_search_steps: 20,
        }
    }
}

/// Why the SQP loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    /// Stationary and feasible within tolerance.
    Converged,
    /// Iteration budget exhausted.
    IterationLimit,
    /// Stationary for the relaxed subproblem but the constraints remain violated.
    Infeasible,
    /// No acceptable step along the search direction, even after a Hessian reset.
    LineSearchFailed,
    /// The quadratic subproblem could not be solved.
    SubproblemFailed,
}

impl TerminationReason {
    pub fn description(&self) -> &'static str {
        match self {
            TerminationReason::Converged => "converged",
            TerminationReason::IterationLimit => "iteration limit reached",
            TerminationReason::Infeasible => "constraints could not be satisfied",
            TerminationReason::LineSearchFailed => "line search failed",
            TerminationReason::SubproblemFailed => "quadratic subproblem failed",
        }
    }
}

/// Final iterate and diagnostics of a solve.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverReport {
    /// Best available point; may violate constraints unless converged.
    pub x: Vec<f64>,
    pub objective: f64,
    /// Sum of equality residuals and inequality shortfalls at `x`.
    pub constraint_violation: f64,
    pub termination: TerminationReason,
    pub iterations: u32,
    pub function_evaluations: u32,
    pub gradient_evaluations: u32,
}

impl SolverReport {
    pub fn converged(&self) -> bool {
        self.termination == TerminationReason::Converged
    }
}
