use nalgebra::{DMatrix, DVector};

use super::qp::QuadraticProgram;
use super::{ConstrainedProblem, SolverReport, SolverSettings, TerminationReason};
use crate::error::AllocError;
use crate::AllocResult;

/// Linear cost on the elastic variable. Must dominate the constraint
/// multipliers for the relaxation to stay at zero when the linearization is
/// feasible.
const ELASTIC_PENALTY: f64 = 1e4;
/// Curvature on the elastic variable so the subproblem Hessian stays definite.
const ELASTIC_CURVATURE: f64 = 1.0;
/// Armijo sufficient-decrease parameter for the merit line search.
const ARMIJO: f64 = 1e-4;
const BACKTRACK: f64 = 0.5;
/// Powell damping threshold for the BFGS update.
const DAMPING: f64 = 0.2;

/// Objective, constraints and their derivatives at one iterate.
#[derive(Debug, Clone)]
struct Linearization {
    objective: f64,
    gradient: DVector<f64>,
    equalities: DVector<f64>,
    equality_jacobian: DMatrix<f64>,
    inequalities: DVector<f64>,
    inequality_jacobian: DMatrix<f64>,
}

#[derive(Debug, Default)]
struct Counters {
    function_evaluations: u32,
    gradient_evaluations: u32,
}

/// SQP minimizer with a quasi-Newton (damped BFGS) Lagrangian Hessian,
/// elastic-mode subproblems and an L1 merit line search.
#[derive(Debug, Clone, Default)]
pub struct SqpSolver {
    settings: SolverSettings,
}

impl SqpSolver {
    pub fn new(settings: SolverSettings) -> Self {
        Self { settings }
    }

    /// Minimize `problem` starting from `initial_guess`.
    ///
    /// Running out of iterations or failing to satisfy the constraints is not
    /// an error: the report carries the last iterate and the termination
    /// reason. Errors are reserved for malformed input.
    pub fn minimize<P>(&self, problem: &P, initial_guess: &[f64]) -> AllocResult<SolverReport>
    where
        P: ConstrainedProblem + ?Sized,
    {
        let n = problem.dimension();
        let lower = problem.lower_bounds();
        let upper = problem.upper_bounds();
        self.validate(n, &lower, &upper, initial_guess)?;

        let mut counters = Counters::default();
        let mut x = clip(&DVector::from_column_slice(initial_guess), &lower, &upper);
        let mut lin = linearize(problem, &x, &mut counters);

        let mut hessian = DMatrix::<f64>::identity(n, n);
        let mut hessian_fresh = true;
        let mut eq_penalties = DVector::<f64>::zeros(lin.equalities.len());
        let mut ineq_penalties = DVector::<f64>::zeros(lin.inequalities.len());

        let mut termination = TerminationReason::IterationLimit;
        let mut iterations = 0;

        while iterations < self.settings.max_iterations {
            iterations += 1;
            let violation = constraint_violation(&lin.equalities, &lin.inequalities);

            let subproblem = build_subproblem(&lin, &x, &hessian, &lower, &upper);
            let solution = match subproblem.solve() {
                Ok(s) => s,
                Err(e) => {
                    tracing::debug!(iteration = iterations, error = %e, "QP subproblem failed");
                    if hessian_fresh {
                        termination = TerminationReason::SubproblemFailed;
                        break;
                    }
                    hessian = DMatrix::identity(n, n);
                    hessian_fresh = true;
                    continue;
                }
            };

            let step = solution.z.rows(0, n).into_owned();
            let elastic = solution.z[n].clamp(0.0, 1.0);
            let eq_multipliers = solution.equality_multipliers.clone();
            let ineq_multipliers = solution
                .inequality_multipliers
                .rows(0, lin.inequalities.len())
                .into_owned();
            let step_norm = step.amax();

            tracing::debug!(
                iteration = iterations,
                objective = lin.objective,
                violation,
                step = step_norm,
                elastic,
                "sqp iteration"
            );

            if step_norm <= self.settings.tolerance {
                termination = if violation <= self.settings.feasibility_tolerance {
                    TerminationReason::Converged
                } else {
                    TerminationReason::Infeasible
                };
                break;
            }

            update_penalties(&mut eq_penalties, &eq_multipliers);
            update_penalties(&mut ineq_penalties, &ineq_multipliers);
            let reduced = (1.0 - elastic) * violation;
            if reduced > self.settings.feasibility_tolerance {
                let curvature = step.dot(&(&hessian * &step));
                let floor = (lin.gradient.dot(&step) + 0.5 * curvature) / (0.5 * reduced);
                raise_penalties(&mut eq_penalties, floor);
                raise_penalties(&mut ineq_penalties, floor);
            }

            let merit0 = merit(
                lin.objective,
                &lin.equalities,
                &lin.inequalities,
                &eq_penalties,
                &ineq_penalties,
            );
            let weighted_violation = merit0 - lin.objective;
            let directional = lin.gradient.dot(&step) - (1.0 - elastic) * weighted_violation;

            let mut alpha = 1.0;
            let mut accepted = None;
            for _ in 0..self.settings.max_line_search_steps {
                let trial = clip(&(&x + alpha * &step), &lower, &upper);
                counters.function_evaluations += 1;
                let value = merit(
                    problem.objective(&trial),
                    &problem.equality_constraints(&trial),
                    &problem.inequality_constraints(&trial),
                    &eq_penalties,
                    &ineq_penalties,
                );
                let sufficient = if directional < 0.0 {
                    value <= merit0 + ARMIJO * alpha * directional
                } else {
                    value < merit0
                };
                if sufficient {
                    accepted = Some(trial);
                    break;
                }
                alpha *= BACKTRACK;
            }

            let Some(x_new) = accepted else {
                tracing::debug!(iteration = iterations, "line search failed");
                if hessian_fresh {
                    termination = if violation > self.settings.feasibility_tolerance {
                        TerminationReason::Infeasible
                    } else {
                        TerminationReason::LineSearchFailed
                    };
                    break;
                }
                hessian = DMatrix::identity(n, n);
                hessian_fresh = true;
                continue;
            };

            let lin_new = linearize(problem, &x_new, &mut counters);
            let s = &x_new - &x;
            let y = lagrangian_gradient(&lin_new, &eq_multipliers, &ineq_multipliers)
                - lagrangian_gradient(&lin, &eq_multipliers, &ineq_multipliers);
            damped_bfgs_update(&mut hessian, &s, &y);
            hessian_fresh = false;

            x = x_new;
            lin = lin_new;
        }

        let report = SolverReport {
            x: x.iter().copied().collect(),
            objective: lin.objective,
            constraint_violation: constraint_violation(&lin.equalities, &lin.inequalities),
            termination,
            iterations,
            function_evaluations: counters.function_evaluations,
            gradient_evaluations: counters.gradient_evaluations,
        };

        if report.converged() {
            tracing::info!(
                iterations = report.iterations,
                objective = report.objective,
                "sqp converged"
            );
        } else {
            tracing::warn!(
                iterations = report.iterations,
                violation = report.constraint_violation,
                "sqp terminated without convergence: {}",
                termination.description()
            );
        }

        Ok(report)
    }

    fn validate(
        &self,
        n: usize,
        lower: &DVector<f64>,
        upper: &DVector<f64>,
        initial_guess: &[f64],
    ) -> AllocResult<()> {
        if n == 0 {
            return Err(AllocError::InvalidInput {
                field: "dimension".into(),
                reason: "Problem has no decision variables".into(),
            });
        }
        if initial_guess.len() != n {
            return Err(AllocError::InvalidInput {
                field: "initial_guess".into(),
                reason: format!("Expected {} components but got {}", n, initial_guess.len()),
            });
        }
        if let Some(i) = initial_guess.iter().position(|v| !v.is_finite()) {
            return Err(AllocError::InvalidInput {
                field: format!("initial_guess[{}]", i),
                reason: "Initial guess must be finite".into(),
            });
        }
        if lower.len() != n || upper.len() != n {
            return Err(AllocError::InvalidInput {
                field: "bounds".into(),
                reason: format!("Expected {} lower and upper bounds", n),
            });
        }
        if let Some(i) = (0..n).find(|&i| lower[i] > upper[i]) {
            return Err(AllocError::InvalidInput {
                field: format!("bounds[{}]", i),
                reason: format!("Lower bound {} exceeds upper bound {}", lower[i], upper[i]),
            });
        }
        if self.settings.max_iterations == 0
            || self.settings.max_line_search_steps == 0
            || self.settings.tolerance <= 0.0
            || self.settings.feasibility_tolerance <= 0.0
        {
            return Err(AllocError::InvalidInput {
                field: "solver".into(),
                reason: "Iteration budgets and tolerances must be positive".into(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Subproblem
// ---------------------------------------------------------------------------

/// Elastic-mode QP in `z = (d, ξ)`:
///
/// ```text
/// min  ½ dᵀBd + ∇fᵀd + ρξ + ½ξ²
/// s.t. h + ∇h d − h ξ = 0
///      g + ∇g d − min(g, 0) ξ >= 0
///      lower − x <= d <= upper − x,   0 <= ξ <= 1
/// ```
///
/// `d = 0, ξ = 1` satisfies every row, so the subproblem stays feasible even
/// when the linearized constraints are inconsistent.
fn build_subproblem(
    lin: &Linearization,
    x: &DVector<f64>,
    hessian: &DMatrix<f64>,
    lower: &DVector<f64>,
    upper: &DVector<f64>,
) -> QuadraticProgram {
    let n = x.len();
    let nz = n + 1;
    let me = lin.equalities.len();
    let mi = lin.inequalities.len();

    let mut g = DMatrix::<f64>::zeros(nz, nz);
    g.view_mut((0, 0), (n, n)).copy_from(hessian);
    g[(n, n)] = ELASTIC_CURVATURE;

    let mut q = DVector::<f64>::zeros(nz);
    q.rows_mut(0, n).copy_from(&lin.gradient);
    q[n] = ELASTIC_PENALTY;

    let mut a_eq = DMatrix::<f64>::zeros(me, nz);
    let mut b_eq = DVector::<f64>::zeros(me);
    for j in 0..me {
        for k in 0..n {
            a_eq[(j, k)] = lin.equality_jacobian[(j, k)];
        }
        a_eq[(j, n)] = -lin.equalities[j];
        b_eq[j] = -lin.equalities[j];
    }

    let finite_lower: Vec<usize> = (0..n).filter(|&i| lower[i].is_finite()).collect();
    let finite_upper: Vec<usize> = (0..n).filter(|&i| upper[i].is_finite()).collect();
    let rows = mi + finite_lower.len() + finite_upper.len() + 2;

    let mut a_in = DMatrix::<f64>::zeros(rows, nz);
    let mut b_in = DVector::<f64>::zeros(rows);
    for j in 0..mi {
        for k in 0..n {
            a_in[(j, k)] = lin.inequality_jacobian[(j, k)];
        }
        a_in[(j, n)] = -lin.inequalities[j].min(0.0);
        b_in[j] = -lin.inequalities[j];
    }
    let mut r = mi;
    for &i in &finite_lower {
        a_in[(r, i)] = 1.0;
        b_in[r] = lower[i] - x[i];
        r += 1;
    }
    for &i in &finite_upper {
        a_in[(r, i)] = -1.0;
        b_in[r] = x[i] - upper[i];
        r += 1;
    }
    a_in[(r, n)] = 1.0;
    b_in[r] = 0.0;
    a_in[(r + 1, n)] = -1.0;
    b_in[r + 1] = -1.0;

    QuadraticProgram {
        hessian: g,
        linear: q,
        equality_matrix: a_eq,
        equality_rhs: b_eq,
        inequality_matrix: a_in,
        inequality_rhs: b_in,
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn linearize<P>(problem: &P, x: &DVector<f64>, counters: &mut Counters) -> Linearization
where
    P: ConstrainedProblem + ?Sized,
{
    counters.function_evaluations += 1;
    counters.gradient_evaluations += 1;
    Linearization {
        objective: problem.objective(x),
        gradient: problem.objective_gradient(x),
        equalities: problem.equality_constraints(x),
        equality_jacobian: problem.equality_jacobian(x),
        inequalities: problem.inequality_constraints(x),
        inequality_jacobian: problem.inequality_jacobian(x),
    }
}

/// Sum of equality residuals and inequality shortfalls.
pub(crate) fn constraint_violation(equalities: &DVector<f64>, inequalities: &DVector<f64>) -> f64 {
    equalities.iter().map(|h| h.abs()).sum::<f64>()
        + inequalities.iter().map(|g| (-g).max(0.0)).sum::<f64>()
}

/// L1 exact penalty merit function.
fn merit(
    objective: f64,
    equalities: &DVector<f64>,
    inequalities: &DVector<f64>,
    eq_penalties: &DVector<f64>,
    ineq_penalties: &DVector<f64>,
) -> f64 {
    let eq: f64 = equalities
        .iter()
        .zip(eq_penalties.iter())
        .map(|(h, mu)| mu * h.abs())
        .sum();
    let ineq: f64 = inequalities
        .iter()
        .zip(ineq_penalties.iter())
        .map(|(g, mu)| mu * (-g).max(0.0))
        .sum();
    objective + eq + ineq
}

fn update_penalties(penalties: &mut DVector<f64>, multipliers: &DVector<f64>) {
    for (mu, lambda) in penalties.iter_mut().zip(multipliers.iter()) {
        let l = lambda.abs();
        *mu = l.max(0.5 * (*mu + l));
    }
}

/// Lift every penalty to at least `floor`, which makes the step a descent
/// direction of the merit function whenever it reduces the violation.
fn raise_penalties(penalties: &mut DVector<f64>, floor: f64) {
    for mu in penalties.iter_mut() {
        *mu = mu.max(floor);
    }
}

fn lagrangian_gradient(
    lin: &Linearization,
    eq_multipliers: &DVector<f64>,
    ineq_multipliers: &DVector<f64>,
) -> DVector<f64> {
    &lin.gradient
        - lin.equality_jacobian.transpose() * eq_multipliers
        - lin.inequality_jacobian.transpose() * ineq_multipliers
}

/// Powell-damped BFGS update, which keeps `hessian` positive definite.
fn damped_bfgs_update(hessian: &mut DMatrix<f64>, s: &DVector<f64>, y: &DVector<f64>) {
    let bs = &*hessian * s;
    let sbs = s.dot(&bs);
    if s.amax() < 1e-14 || sbs <= f64::MIN_POSITIVE {
        return;
    }
    let sy = s.dot(y);
    let theta = if sy >= DAMPING * sbs {
        1.0
    } else {
        (1.0 - DAMPING) * sbs / (sbs - sy)
    };
    let r = theta * y + (1.0 - theta) * &bs;
    let sr = s.dot(&r);
    if sr <= f64::MIN_POSITIVE {
        return;
    }
    *hessian += &r * r.transpose() / sr - &bs * bs.transpose() / sbs;
    let symmetric = (&*hessian + hessian.transpose()) * 0.5;
    *hessian = symmetric;
}

fn clip(x: &DVector<f64>, lower: &DVector<f64>, upper: &DVector<f64>) -> DVector<f64> {
    DVector::from_iterator(
        x.len(),
        x.iter()
            .zip(lower.iter().zip(upper.iter()))
            .map(|(v, (lo, hi))| v.max(*lo).min(*hi)),
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    /// min (x0 - 1)² + (x1 - 2)²  s.t.  x0 + x1 = 1
    struct ProjectedPoint;

    impl ConstrainedProblem for ProjectedPoint {
        fn dimension(&self) -> usize {
            2
        }
        fn objective(&self, x: &DVector<f64>) -> f64 {
            (x[0] - 1.0).powi(2) + (x[1] - 2.0).powi(2)
        }
        fn objective_gradient(&self, x: &DVector<f64>) -> DVector<f64> {
            DVector::from_vec(vec![2.0 * (x[0] - 1.0), 2.0 * (x[1] - 2.0)])
        }
        fn equality_constraints(&self, x: &DVector<f64>) -> DVector<f64> {
            DVector::from_vec(vec![x[0] + x[1] - 1.0])
        }
        fn equality_jacobian(&self, _x: &DVector<f64>) -> DMatrix<f64> {
            DMatrix::from_row_slice(1, 2, &[1.0, 1.0])
        }
        fn inequality_constraints(&self, _x: &DVector<f64>) -> DVector<f64> {
            DVector::zeros(0)
        }
        fn inequality_jacobian(&self, _x: &DVector<f64>) -> DMatrix<f64> {
            DMatrix::zeros(0, 2)
        }
        fn lower_bounds(&self) -> DVector<f64> {
            DVector::from_element(2, -10.0)
        }
        fn upper_bounds(&self) -> DVector<f64> {
            DVector::from_element(2, 10.0)
        }
    }

    /// max x0 + x1 on the unit disc, written as a minimization.
    struct DiscCorner;

    impl ConstrainedProblem for DiscCorner {
        fn dimension(&self) -> usize {
            2
        }
        fn objective(&self, x: &DVector<f64>) -> f64 {
            -x[0] - x[1]
        }
        fn objective_gradient(&self, _x: &DVector<f64>) -> DVector<f64> {
            DVector::from_vec(vec![-1.0, -1.0])
        }
        fn equality_constraints(&self, _x: &DVector<f64>) -> DVector<f64> {
            DVector::zeros(0)
        }
        fn equality_jacobian(&self, _x: &DVector<f64>) -> DMatrix<f64> {
            DMatrix::zeros(0, 2)
        }
        fn inequality_constraints(&self, x: &DVector<f64>) -> DVector<f64> {
            DVector::from_vec(vec![1.0 - x[0] * x[0] - x[1] * x[1]])
        }
        fn inequality_jacobian(&self, x: &DVector<f64>) -> DMatrix<f64> {
            DMatrix::from_row_slice(1, 2, &[-2.0 * x[0], -2.0 * x[1]])
        }
        fn lower_bounds(&self) -> DVector<f64> {
            DVector::from_element(2, -2.0)
        }
        fn upper_bounds(&self) -> DVector<f64> {
            DVector::from_element(2, 2.0)
        }
    }

    /// min x0 s.t. x0 >= 2 with x0 in [0, 1]: no feasible point.
    struct OutOfReach;

    impl ConstrainedProblem for OutOfReach {
        fn dimension(&self) -> usize {
            1
        }
        fn objective(&self, x: &DVector<f64>) -> f64 {
            x[0]
        }
        fn objective_gradient(&self, _x: &DVector<f64>) -> DVector<f64> {
            DVector::from_vec(vec![1.0])
        }
        fn equality_constraints(&self, _x: &DVector<f64>) -> DVector<f64> {
            DVector::zeros(0)
        }
        fn equality_jacobian(&self, _x: &DVector<f64>) -> DMatrix<f64> {
            DMatrix::zeros(0, 1)
        }
        fn inequality_constraints(&self, x: &DVector<f64>) -> DVector<f64> {
            DVector::from_vec(vec![x[0] - 2.0])
        }
        fn inequality_jacobian(&self, _x: &DVector<f64>) -> DMatrix<f64> {
            DMatrix::from_row_slice(1, 1, &[1.0])
        }
        fn lower_bounds(&self) -> DVector<f64> {
            DVector::from_element(1, 0.0)
        }
        fn upper_bounds(&self) -> DVector<f64> {
            DVector::from_element(1, 1.0)
        }
    }

    // ------------------------------------------------------------------
    // 1. Equality-constrained quadratic
    // ------------------------------------------------------------------
    #[test]
    fn test_equality_constrained_quadratic() {
        let report = SqpSolver::default()
            .minimize(&ProjectedPoint, &[0.0, 0.0])
            .unwrap();
        assert!(report.converged(), "{:?}", report.termination);
        assert!((report.x[0] - 0.0).abs() < 1e-6, "x0 = {}", report.x[0]);
        assert!((report.x[1] - 1.0).abs() < 1e-6, "x1 = {}", report.x[1]);
        assert!(report.constraint_violation < 1e-8);
    }

    // ------------------------------------------------------------------
    // 2. Linear objective against a curved inequality
    // ------------------------------------------------------------------
    #[test]
    fn test_curved_inequality() {
        let report = SqpSolver::default()
            .minimize(&DiscCorner, &[0.1, 0.0])
            .unwrap();
        let expected = 1.0 / 2.0_f64.sqrt();
        assert!(report.converged(), "{:?}", report.termination);
        assert!((report.x[0] - expected).abs() < 1e-5, "x0 = {}", report.x[0]);
        assert!((report.x[1] - expected).abs() < 1e-5, "x1 = {}", report.x[1]);
        assert!(report.function_evaluations >= report.iterations);
    }

    // ------------------------------------------------------------------
    // 3. Infeasible constraint is reported, not hidden
    // ------------------------------------------------------------------
    #[test]
    fn test_infeasible_reported() {
        let report = SqpSolver::default().minimize(&OutOfReach, &[0.5]).unwrap();
        assert!(!report.converged());
        assert_eq!(report.termination, TerminationReason::Infeasible);
        assert!(report.constraint_violation > 0.5);
        // Best effort: the closest point to feasibility within the bounds.
        assert!((report.x[0] - 1.0).abs() < 1e-6);
    }

    // ------------------------------------------------------------------
    // 4. Iteration budget
    // ------------------------------------------------------------------
    #[test]
    fn test_iteration_limit() {
        let settings = SolverSettings {
            max_iterations: 1,
            ..SolverSettings::default()
        };
        let report = SqpSolver::new(settings)
            .minimize(&DiscCorner, &[0.1, 0.0])
            .unwrap();
        assert_eq!(report.iterations, 1);
        assert_eq!(report.termination, TerminationReason::IterationLimit);
    }

    // ------------------------------------------------------------------
    // 5. Malformed input
    // ------------------------------------------------------------------
    #[test]
    fn test_wrong_guess_length() {
        assert!(SqpSolver::default().minimize(&DiscCorner, &[0.0]).is_err());
    }

    #[test]
    fn test_damped_update_keeps_definiteness() {
        let mut b = DMatrix::<f64>::identity(2, 2);
        let s = DVector::from_vec(vec![1.0, 0.0]);
        let y = DVector::from_vec(vec![-1.0, 0.0]);
        damped_bfgs_update(&mut b, &s, &y);
        let eig = b.clone().symmetric_eigen();
        assert!(eig.eigenvalues.iter().all(|v| *v > 0.0));
    }
}
