//! Convex quadratic subproblems, solved with the Clarabel interior-point solver.
//!
//! ```text
//! min ½ zᵀGz + qᵀz   s.t.   A_eq z = b_eq,   A_in z >= b_in
//! ```
//!
//! Clarabel takes the conic form `Az + s = b, s ∈ K`. Equality rows map to the
//! zero cone and inequality rows are negated into the non-negative cone.
//! Degenerate vertices and linearly dependent rows need no special handling:
//! the interior-point iterates never sit on the constraint boundary.

use clarabel::algebra::CscMatrix;
use clarabel::solver::{
    DefaultSettingsBuilder, DefaultSolver, IPSolver, SolverStatus, SupportedConeT,
};
use nalgebra::{DMatrix, DVector};

use crate::error::AllocError;
use crate::AllocResult;

const MAX_ITERATIONS: u32 = 200;
/// Gap and feasibility tolerance handed to Clarabel.
const TOLERANCE: f64 = 1e-10;
/// Residual above which a returned solution is rejected.
const ACCEPTABLE_VIOLATION: f64 = 1e-6;

#[derive(Debug, Clone)]
pub struct QuadraticProgram {
    /// Symmetric positive definite Hessian `G`.
    pub hessian: DMatrix<f64>,
    pub linear: DVector<f64>,
    pub equality_matrix: DMatrix<f64>,
    pub equality_rhs: DVector<f64>,
    pub inequality_matrix: DMatrix<f64>,
    pub inequality_rhs: DVector<f64>,
}

#[derive(Debug, Clone)]
pub struct QpSolution {
    pub z: DVector<f64>,
    /// One multiplier per equality row (any sign).
    pub equality_multipliers: DVector<f64>,
    /// One non-negative multiplier per inequality row.
    pub inequality_multipliers: DVector<f64>,
    pub iterations: u32,
}

impl QuadraticProgram {
    pub fn dimension(&self) -> usize {
        self.hessian.nrows()
    }

    /// Largest violation of any constraint at `z`.
    pub fn max_violation(&self, z: &DVector<f64>) -> f64 {
        let eq = (&self.equality_matrix * z - &self.equality_rhs)
            .iter()
            .fold(0.0_f64, |acc, v| acc.max(v.abs()));
        let ineq = (&self.inequality_rhs - &self.inequality_matrix * z)
            .iter()
            .fold(0.0_f64, |acc, v| acc.max(*v));
        eq.max(ineq)
    }

    /// Solve the program. Multipliers follow the sign convention
    /// `Gz + q = A_eqᵀλ + A_inᵀν` with `ν >= 0`.
    pub fn solve(&self) -> AllocResult<QpSolution> {
        self.validate()?;
        let n = self.dimension();
        let me = self.equality_matrix.nrows();
        let mi = self.inequality_matrix.nrows();

        if me + mi == 0 {
            return self.solve_unconstrained();
        }

        let mut a = DMatrix::<f64>::zeros(me + mi, n);
        a.view_mut((0, 0), (me, n)).copy_from(&self.equality_matrix);
        a.view_mut((me, 0), (mi, n))
            .copy_from(&(-&self.inequality_matrix));
        let b: Vec<f64> = self
            .equality_rhs
            .iter()
            .copied()
            .chain(self.inequality_rhs.iter().map(|v| -v))
            .collect();
        let q: Vec<f64> = self.linear.iter().copied().collect();

        let mut cones = Vec::new();
        if me > 0 {
            cones.push(SupportedConeT::ZeroConeT(me));
        }
        if mi > 0 {
            cones.push(SupportedConeT::NonnegativeConeT(mi));
        }

        let settings = DefaultSettingsBuilder::default()
            .verbose(false)
            .max_iter(MAX_ITERATIONS)
            .tol_gap_abs(TOLERANCE)
            .tol_gap_rel(TOLERANCE)
            .tol_feas(TOLERANCE)
            .build()
            .map_err(|e| AllocError::NumericalFailure(format!("Invalid QP settings: {}", e)))?;

        let p = to_csc(&self.hessian, |row, col| row <= col);
        let a = to_csc(&a, |_, _| true);
        let mut solver = DefaultSolver::new(&p, &q, &a, &b, &cones, settings);
        solver.solve();

        let status = &solver.solution.status;
        if !matches!(status, SolverStatus::Solved | SolverStatus::AlmostSolved) {
            return Err(AllocError::NumericalFailure(format!(
                "QP subproblem not solved: {:?}",
                status
            )));
        }

        let z = DVector::from_column_slice(&solver.solution.x);
        let duals = &solver.solution.z;
        let equality_multipliers = DVector::from_iterator(me, duals[..me].iter().map(|y| -y));
        let inequality_multipliers =
            DVector::from_iterator(mi, duals[me..me + mi].iter().map(|y| y.max(0.0)));

        if !z.iter().chain(duals.iter()).all(|v| v.is_finite()) {
            return Err(AllocError::NumericalFailure(
                "QP solution is not finite".into(),
            ));
        }
        let violation = self.max_violation(&z);
        if violation > ACCEPTABLE_VIOLATION {
            return Err(AllocError::NumericalFailure(format!(
                "QP solution violates its constraints by {:e}",
                violation
            )));
        }

        Ok(QpSolution {
            z,
            equality_multipliers,
            inequality_multipliers,
            iterations: solver.info.iterations,
        })
    }

    fn solve_unconstrained(&self) -> AllocResult<QpSolution> {
        let cholesky = self.hessian.clone().cholesky().ok_or_else(|| {
            AllocError::NumericalFailure("QP Hessian is not positive definite".into())
        })?;
        Ok(QpSolution {
            z: cholesky.solve(&(-&self.linear)),
            equality_multipliers: DVector::zeros(0),
            inequality_multipliers: DVector::zeros(0),
            iterations: 0,
        })
    }

    fn validate(&self) -> AllocResult<()> {
        let n = self.dimension();
        let shapes_ok = self.hessian.ncols() == n
            && self.linear.len() == n
            && self.equality_matrix.ncols() == n
            && self.equality_rhs.len() == self.equality_matrix.nrows()
            && self.inequality_matrix.ncols() == n
            && self.inequality_rhs.len() == self.inequality_matrix.nrows();
        if !shapes_ok {
            return Err(AllocError::InvalidInput {
                field: "quadratic_program".into(),
                reason: format!("Inconsistent shapes for {} variables", n),
            });
        }
        let finite = self
            .hessian
            .iter()
            .chain(self.linear.iter())
            .chain(self.equality_matrix.iter())
            .chain(self.equality_rhs.iter())
            .chain(self.inequality_matrix.iter())
            .chain(self.inequality_rhs.iter())
            .all(|v| v.is_finite());
        if !finite {
            return Err(AllocError::NumericalFailure(
                "QP data contains non-finite entries".into(),
            ));
        }
        Ok(())
    }
}

/// Compressed-column copy of the non-zero entries of `m` for which
/// `keep(row, col)` holds.
fn to_csc(m: &DMatrix<f64>, keep: impl Fn(usize, usize) -> bool) -> CscMatrix<f64> {
    let mut colptr = Vec::with_capacity(m.ncols() + 1);
    let mut rowval = Vec::new();
    let mut nzval = Vec::new();
    colptr.push(0);
    for col in 0..m.ncols() {
        for row in 0..m.nrows() {
            let v = m[(row, col)];
            if v != 0.0 && keep(row, col) {
                rowval.push(row);
                nzval.push(v);
            }
        }
        colptr.push(rowval.len());
    }
    CscMatrix::new(m.nrows(), m.ncols(), colptr, rowval, nzval)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
