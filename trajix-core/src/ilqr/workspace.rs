//! Pre-allocated per-knot working memory.
//!
//! Everything the inner loop touches is sized here, once, at solver
//! construction. The iteration path reuses these buffers; the only
//! allocations left are the small factorization temporaries inside the
//! backward pass.

use nalgebra::{DMatrix, DVector};

use crate::constraints::{ConstraintKind, SlackConstraint, StageConstraint};
use crate::costs::StageExpansion;
use crate::problem::Problem;

/// Per-knot constraint working state.
///
/// Attached to the workspace only when the solve actually has constraints,
/// so the unconstrained hot loop never tests per-knot options.
#[derive(Debug)]
pub struct ConstraintData {
    /// Constraint values c_k; index N−1 holds the terminal block
    pub c: Vec<DVector<f64>>,
    /// Constraint values at the previous outer iteration
    pub c_prev: Vec<DVector<f64>>,
    /// State Jacobians Cx_k (p_k × n)
    pub cx: Vec<DMatrix<f64>>,
    /// Control Jacobians Cu_k (p_k × m); zero rows at the terminal knot
    pub cu: Vec<DMatrix<f64>>,
    /// Lagrange multiplier estimates λ_k
    pub lambda: Vec<DVector<f64>>,
    /// Penalty weights μ_k (positive, non-decreasing across outer
    /// iterations)
    pub penalty: Vec<DVector<f64>>,
    /// Diagonal of Iμ_k: μ_i on active rows, 0 elsewhere
    pub imu: Vec<DVector<f64>>,
    /// Row tags, fixed at construction
    pub kinds: Vec<Vec<ConstraintKind>>,
    /// Stage-constraint block layout per knot: (constraint index, row
    /// offset). The slack block, when present, occupies the trailing
    /// rows and is handled separately.
    pub stage_blocks: Vec<Vec<(usize, usize)>>,
    /// Terminal block layout: (constraint index, row offset)
    pub terminal_blocks: Vec<(usize, usize)>,
    /// Internal slack-equality constraint for infeasible starts
    pub slack: Option<SlackConstraint>,
    /// Largest p_k, for scratch sizing
    pub max_rows: usize,
}

impl ConstraintData {
    /// Lay out the per-knot constraint blocks and size every buffer.
    ///
    /// `m` is the full control dimension of this solve (including slacks);
    /// `slack` attaches the internal slack-equality rows of the
    /// infeasible-start mode.
    pub fn new(problem: &Problem, m: usize, slack: Option<SlackConstraint>) -> Self {
        let n = problem.state_dim();
        let horizon = problem.horizon;

        let mut c = Vec::with_capacity(horizon);
        let mut cx = Vec::with_capacity(horizon);
        let mut cu = Vec::with_capacity(horizon);
        let mut kinds: Vec<Vec<ConstraintKind>> = Vec::with_capacity(horizon);
        let mut stage_blocks = Vec::with_capacity(horizon - 1);
        let mut max_rows = 0;

        for k in 0..horizon - 1 {
            let mut blocks = Vec::new();
            let mut rows = Vec::new();
            let mut offset = 0;
            for (idx, con) in problem.constraints.stage.iter().enumerate() {
                if !con.applies_at(k, horizon) {
                    continue;
                }
                blocks.push((idx, offset));
                rows.extend(std::iter::repeat(con.kind()).take(con.dim()));
                offset += con.dim();
            }
            if let Some(sl) = &slack {
                rows.extend(std::iter::repeat(ConstraintKind::Equality).take(sl.dim()));
                offset += sl.dim();
            }
            max_rows = max_rows.max(offset);
            stage_blocks.push(blocks);
            c.push(DVector::zeros(offset));
            cx.push(DMatrix::zeros(offset, n));
            cu.push(DMatrix::zeros(offset, m));
            kinds.push(rows);
        }

        // Terminal knot: p_N rows from the terminal constraints.
        let mut terminal_blocks = Vec::new();
        let mut rows = Vec::new();
        let mut offset = 0;
        for (idx, con) in problem.constraints.terminal.iter().enumerate() {
            terminal_blocks.push((idx, offset));
            rows.extend(std::iter::repeat(con.kind()).take(con.dim()));
            offset += con.dim();
        }
        max_rows = max_rows.max(offset);
        c.push(DVector::zeros(offset));
        cx.push(DMatrix::zeros(offset, n));
        cu.push(DMatrix::zeros(offset, m));
        kinds.push(rows);

        let c_prev = c.clone();
        let lambda: Vec<DVector<f64>> = c.iter().map(|ck| DVector::zeros(ck.len())).collect();
        let penalty = lambda.clone();
        let imu = lambda.clone();

        Self {
            c,
            c_prev,
            cx,
            cu,
            lambda,
            penalty,
            imu,
            kinds,
            stage_blocks,
            terminal_blocks,
            slack,
            max_rows,
        }
    }

    /// Reset multipliers to zero and penalties to their initial weights.
    /// Slack rows get the (larger) infeasible penalty.
    pub fn reset(&mut self, penalty_initial: f64, penalty_slack: f64) {
        let horizon = self.c.len();
        for k in 0..horizon {
            self.lambda[k].fill(0.0);
            self.c_prev[k].fill(0.0);
            self.penalty[k].fill(penalty_initial);
            self.imu[k].fill(0.0);
        }
        if let Some(sl) = &self.slack {
            let p_slack = sl.dim();
            for k in 0..horizon - 1 {
                let total = self.penalty[k].len();
                for i in total - p_slack..total {
                    self.penalty[k][i] = penalty_slack;
                }
            }
        }
    }

    /// Refresh the active-set diagonal Iμ from current values and
    /// multipliers: inequality rows are active iff c > 0 ∨ λ > 0,
    /// equality rows always.
    pub fn update_active_set(&mut self) {
        for k in 0..self.c.len() {
            for i in 0..self.c[k].len() {
                let active = match self.kinds[k][i] {
                    ConstraintKind::Equality => true,
                    ConstraintKind::Inequality => self.c[k][i] > 0.0 || self.lambda[k][i] > 0.0,
                };
                self.imu[k][i] = if active { self.penalty[k][i] } else { 0.0 };
            }
        }
    }

    /// Maximum violation over all knots and rows: max(c, 0) for
    /// inequalities, |c| for equalities.
    pub fn max_violation(&self) -> f64 {
        let mut c_max = 0.0_f64;
        for k in 0..self.c.len() {
            for i in 0..self.c[k].len() {
                let v = match self.kinds[k][i] {
                    ConstraintKind::Inequality => self.c[k][i].max(0.0),
                    ConstraintKind::Equality => self.c[k][i].abs(),
                };
                c_max = c_max.max(v);
            }
        }
        c_max
    }

    /// Largest penalty weight currently in use.
    pub fn penalty_max(&self) -> f64 {
        let mut mu_max = 0.0_f64;
        for pk in &self.penalty {
            for &mu in pk.iter() {
                mu_max = mu_max.max(mu);
            }
        }
        mu_max
    }

    /// Whether any knot carries constraint rows.
    pub fn has_rows(&self) -> bool {
        self.max_rows > 0
    }
}

/// All per-knot arrays of the inner solver.
#[derive(Debug)]
pub struct IlqrWorkspace {
    pub n: usize,
    /// Full control dimension of this solve (model m plus slacks)
    pub m: usize,
    /// Model control dimension
    pub m_model: usize,
    pub horizon: usize,

    // Dynamics linearization
    /// A_k = ∂f_d/∂x (n×n)
    pub a: Vec<DMatrix<f64>>,
    /// B_k = ∂f_d/∂u (n×m)
    pub b: Vec<DMatrix<f64>>,

    // Augmented stage cost expansion
    pub exp: Vec<StageExpansion>,
    pub lx_term: DVector<f64>,
    pub lxx_term: DMatrix<f64>,

    // Gains
    /// Feedback K_k (m×n)
    pub gain_k: Vec<DMatrix<f64>>,
    /// Feedforward d_k (m)
    pub gain_d: Vec<DVector<f64>>,

    // Value function
    pub s_mat: Vec<DMatrix<f64>>,
    pub s_vec: Vec<DVector<f64>>,

    // Constraint block, present iff the solve is constrained
    pub constraints: Option<ConstraintData>,

    // Backward-pass scratch
    pub qx: DVector<f64>,
    pub qu: DVector<f64>,
    pub qxx: DMatrix<f64>,
    pub quu: DMatrix<f64>,
    pub qux: DMatrix<f64>,
    pub quu_reg: DMatrix<f64>,
    pub tmp_nn: DMatrix<f64>,
    pub tmp_nm: DMatrix<f64>,
    pub tmp_mn: DMatrix<f64>,
    pub tmp_m: DVector<f64>,
    pub tmp_p: DVector<f64>,
    pub tmp_pn: DMatrix<f64>,
    pub tmp_pm: DMatrix<f64>,

    // Forward-pass / cost scratch
    pub dx: DVector<f64>,
    pub u_model: DVector<f64>,
    pub c_tmp: DVector<f64>,
    pub x_next: DVector<f64>,
    /// Model-width control Jacobian, copied into the left block of `b`
    pub b_model: DMatrix<f64>,
}

impl IlqrWorkspace {
    pub fn new(problem: &Problem, m: usize, constraints: Option<ConstraintData>) -> Self {
        let n = problem.state_dim();
        let m_model = problem.control_dim();
        let horizon = problem.horizon;
        let steps = horizon - 1;
        let max_p = constraints.as_ref().map_or(0, |c| c.max_rows);

        Self {
            n,
            m,
            m_model,
            horizon,
            a: (0..steps).map(|_| DMatrix::zeros(n, n)).collect(),
            b: (0..steps).map(|_| DMatrix::zeros(n, m)).collect(),
            exp: (0..steps).map(|_| StageExpansion::new(n, m)).collect(),
            lx_term: DVector::zeros(n),
            lxx_term: DMatrix::zeros(n, n),
            gain_k: (0..steps).map(|_| DMatrix::zeros(m, n)).collect(),
            gain_d: (0..steps).map(|_| DVector::zeros(m)).collect(),
            s_mat: (0..horizon).map(|_| DMatrix::zeros(n, n)).collect(),
            s_vec: (0..horizon).map(|_| DVector::zeros(n)).collect(),
            constraints,
            qx: DVector::zeros(n),
            qu: DVector::zeros(m),
            qxx: DMatrix::zeros(n, n),
            quu: DMatrix::zeros(m, m),
            qux: DMatrix::zeros(m, n),
            quu_reg: DMatrix::zeros(m, m),
            tmp_nn: DMatrix::zeros(n, n),
            tmp_nm: DMatrix::zeros(n, m),
            tmp_mn: DMatrix::zeros(m, n),
            tmp_m: DVector::zeros(m),
            tmp_p: DVector::zeros(max_p),
            tmp_pn: DMatrix::zeros(max_p, n),
            tmp_pm: DMatrix::zeros(max_p, m),
            dx: DVector::zeros(n),
            u_model: DVector::zeros(m_model),
            c_tmp: DVector::zeros(max_p),
            x_next: DVector::zeros(n),
            b_model: DMatrix::zeros(n, m_model),
        }
    }

    /// Slack block width (zero outside infeasible mode).
    #[inline]
    pub fn slack_dim(&self) -> usize {
        self.m - self.m_model
    }
}
