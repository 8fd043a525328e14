//! Objective oracles and their quadratic expansions.

use nalgebra::{DMatrix, DVector};

use crate::error::{Result, SolverError};

/// Quadratic model of a stage cost at one knot point.
///
/// Buffers are sized by the owning workspace; cost oracles write into the
/// top-left blocks they own and must zero what they do not set.
#[derive(Debug, Clone)]
pub struct StageExpansion {
    pub lx: DVector<f64>,
    pub lu: DVector<f64>,
    pub lxx: DMatrix<f64>,
    pub luu: DMatrix<f64>,
    pub lux: DMatrix<f64>,
}

impl StageExpansion {
    pub fn new(n: usize, m: usize) -> Self {
        Self {
            lx: DVector::zeros(n),
            lu: DVector::zeros(m),
            lxx: DMatrix::zeros(n, n),
            luu: DMatrix::zeros(m, m),
            lux: DMatrix::zeros(m, n),
        }
    }

    pub fn set_zero(&mut self) {
        self.lx.fill(0.0);
        self.lu.fill(0.0);
        self.lxx.fill(0.0);
        self.luu.fill(0.0);
        self.lux.fill(0.0);
    }
}

/// Per-knot cost oracle.
///
/// Stage terms are evaluated at knots `0..N-2`, the terminal term at knot
/// `N-1`. Expansions write gradients and Hessians of the *unaugmented*
/// cost; constraint terms are folded in by the solver.
pub trait CostFunction {
    /// Stage cost `l_k(x, u)`.
    fn stage(&self, k: usize, x: &DVector<f64>, u: &DVector<f64>) -> f64;

    /// Quadratic expansion of the stage cost at `(x, u)`.
    fn stage_expansion(
        &self,
        k: usize,
        x: &DVector<f64>,
        u: &DVector<f64>,
        exp: &mut StageExpansion,
    );

    /// Terminal cost `l_f(x)`.
    fn terminal(&self, x: &DVector<f64>) -> f64;

    /// Expansion of the terminal cost: gradient and Hessian.
    fn terminal_expansion(&self, x: &DVector<f64>, lx: &mut DVector<f64>, lxx: &mut DMatrix<f64>);
}

/// LQR tracking cost
/// `l = ½(x−x_f)ᵀQ(x−x_f) + ½uᵀRu`, terminal `½(x−x_f)ᵀQ_f(x−x_f)`.
///
/// The standard fixture: constant weights, a single goal state.
#[derive(Debug, Clone)]
pub struct QuadraticCost {
    q: DMatrix<f64>,
    r: DMatrix<f64>,
    qf: DMatrix<f64>,
    xf: DVector<f64>,
}

impl QuadraticCost {
    /// Build an LQR cost, validating shapes. `q` and `qf` are n×n, `r` is
    /// m×m, `xf` has n entries.
    pub fn new(
        q: DMatrix<f64>,
        r: DMatrix<f64>,
        qf: DMatrix<f64>,
        xf: DVector<f64>,
    ) -> Result<Self> {
        let n = xf.len();
        if q.nrows() != n || q.ncols() != n {
            return Err(SolverError::InvalidInput(format!(
                "Q has shape {}×{}, expected {}×{}",
                q.nrows(),
                q.ncols(),
                n,
                n
            )));
        }
        if qf.nrows() != n || qf.ncols() != n {
            return Err(SolverError::InvalidInput(format!(
                "Qf has shape {}×{}, expected {}×{}",
                qf.nrows(),
                qf.ncols(),
                n,
                n
            )));
        }
        if r.nrows() != r.ncols() {
            return Err(SolverError::InvalidInput(format!(
                "R must be square, got {}×{}",
                r.nrows(),
                r.ncols()
            )));
        }
        Ok(Self { q, r, qf, xf })
    }

    /// Diagonal weights convenience: `Q = q·I`, `R = r·I`, `Qf = qf·I`.
    pub fn diagonal(q: f64, r: f64, qf: f64, xf: DVector<f64>, control_dim: usize) -> Self {
        let n = xf.len();
        Self {
            q: DMatrix::identity(n, n) * q,
            r: DMatrix::identity(control_dim, control_dim) * r,
            qf: DMatrix::identity(n, n) * qf,
            xf,
        }
    }

    pub fn control_dim(&self) -> usize {
        self.r.nrows()
    }

    pub fn goal(&self) -> &DVector<f64> {
        &self.xf
    }
}

impl CostFunction for QuadraticCost {
    fn stage(&self, _k: usize, x: &DVector<f64>, u: &DVector<f64>) -> f64 {
        let dx = x - &self.xf;
        0.5 * dx.dot(&(&self.q * &dx)) + 0.5 * u.dot(&(&self.r * u))
    }

    fn stage_expansion(
        &self,
        _k: usize,
        x: &DVector<f64>,
        u: &DVector<f64>,
        exp: &mut StageExpansion,
    ) {
        let n = self.xf.len();
        let m = self.r.nrows();

        exp.set_zero();
        let dx = x - &self.xf;
        exp.lx.rows_mut(0, n).gemv(1.0, &self.q, &dx, 0.0);
        exp.lu.rows_mut(0, m).gemv(1.0, &self.r, u, 0.0);
        exp.lxx.view_mut((0, 0), (n, n)).copy_from(&self.q);
        exp.luu.view_mut((0, 0), (m, m)).copy_from(&self.r);
    }

    fn terminal(&self, x: &DVector<f64>) -> f64 {
        let dx = x - &self.xf;
        0.5 * dx.dot(&(&self.qf * &dx))
    }

    fn terminal_expansion(&self, x: &DVector<f64>, lx: &mut DVector<f64>, lxx: &mut DMatrix<f64>) {
        let dx = x - &self.xf;
        lx.gemv(1.0, &self.qf, &dx, 0.0);
        lxx.copy_from(&self.qf);
    }
}
