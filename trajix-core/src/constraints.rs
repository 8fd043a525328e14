//! Constraint oracles: traits, tags, and the built-in constraints.
//!
//! Constraints come in two flavors: stage constraints see `(x_k, u_k)` at
//! knots `0..N-2`, terminal constraints see `x_{N-1}` only. Each row is
//! tagged inequality (`c ≤ 0`) or equality (`c = 0`); all rows of one
//! constraint share the tag. Values and Jacobians are written into views
//! of the solver's packed per-knot buffers.

use nalgebra::{DMatrixViewMut, DVector, DVectorViewMut};

use crate::error::{Result, SolverError};

/// Row tag: inequality rows mean `c ≤ 0`, equality rows `c = 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    Inequality,
    Equality,
}

/// Constraint on a (state, control) knot.
pub trait StageConstraint {
    /// Number of rows this constraint contributes.
    fn dim(&self) -> usize;

    fn kind(&self) -> ConstraintKind;

    /// Per-knot incidence. Defaults to every stage knot.
    fn applies_at(&self, _k: usize, _horizon: usize) -> bool {
        true
    }

    /// Evaluate `c(x, u)` into `c` (`dim()` entries).
    fn evaluate(&self, x: &DVector<f64>, u: &DVector<f64>, c: DVectorViewMut<f64>);

    /// Jacobians `∂c/∂x` (p×n) and `∂c/∂u` (p×m).
    fn jacobian(
        &self,
        x: &DVector<f64>,
        u: &DVector<f64>,
        cx: DMatrixViewMut<f64>,
        cu: DMatrixViewMut<f64>,
    );
}

/// Constraint on the terminal state.
pub trait TerminalConstraint {
    fn dim(&self) -> usize;

    fn kind(&self) -> ConstraintKind;

    fn evaluate(&self, x: &DVector<f64>, c: DVectorViewMut<f64>);

    fn jacobian(&self, x: &DVector<f64>, cx: DMatrixViewMut<f64>);
}

/// The problem's constraint collection.
#[derive(Default)]
pub struct ConstraintSet {
    pub stage: Vec<Box<dyn StageConstraint>>,
    pub terminal: Vec<Box<dyn TerminalConstraint>>,
}

impl ConstraintSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.stage.is_empty() && self.terminal.is_empty()
    }

    pub fn add_stage(&mut self, con: Box<dyn StageConstraint>) {
        self.stage.push(con);
    }

    pub fn add_terminal(&mut self, con: Box<dyn TerminalConstraint>) {
        self.terminal.push(con);
    }
}

/// Box bounds on states and controls.
///
/// Rows are packed `[x − x_max; u − u_max; x_min − x; u_min − u]` with
/// infinite entries elided, so only finite bounds contribute rows. As a
/// terminal constraint only the state rows apply.
#[derive(Debug, Clone)]
pub struct BoundConstraint {
    x_max: Vec<(usize, f64)>,
    u_max: Vec<(usize, f64)>,
    x_min: Vec<(usize, f64)>,
    u_min: Vec<(usize, f64)>,
}

impl BoundConstraint {
    /// Bounds with ±∞ entries for unbounded rows. Lengths must match the
    /// state and control dimensions; `min ≤ max` elementwise.
    pub fn new(
        x_min: &DVector<f64>,
        x_max: &DVector<f64>,
        u_min: &DVector<f64>,
        u_max: &DVector<f64>,
    ) -> Result<Self> {
        if x_min.len() != x_max.len() {
            return Err(SolverError::InvalidInput(format!(
                "state bounds disagree on dimension: {} vs {}",
                x_min.len(),
                x_max.len()
            )));
        }
        if u_min.len() != u_max.len() {
            return Err(SolverError::InvalidInput(format!(
                "control bounds disagree on dimension: {} vs {}",
                u_min.len(),
                u_max.len()
            )));
        }
        for i in 0..x_min.len() {
            if x_min[i] > x_max[i] {
                return Err(SolverError::InvalidInput(format!(
                    "state bound {} has min {} > max {}",
                    i, x_min[i], x_max[i]
                )));
            }
        }
        for i in 0..u_min.len() {
            if u_min[i] > u_max[i] {
                return Err(SolverError::InvalidInput(format!(
                    "control bound {} has min {} > max {}",
                    i, u_min[i], u_max[i]
                )));
            }
        }

        let finite = |v: &DVector<f64>| -> Vec<(usize, f64)> {
            v.iter()
                .enumerate()
                .filter(|(_, b)| b.is_finite())
                .map(|(i, b)| (i, *b))
                .collect()
        };

        Ok(Self {
            x_max: finite(x_max),
            u_max: finite(u_max),
            x_min: finite(x_min),
            u_min: finite(u_min),
        })
    }

    /// Control-only bounds `u_min ≤ u ≤ u_max`.
    pub fn controls(state_dim: usize, u_min: &DVector<f64>, u_max: &DVector<f64>) -> Result<Self> {
        let unbounded_lo = DVector::from_element(state_dim, f64::NEG_INFINITY);
        let unbounded_hi = DVector::from_element(state_dim, f64::INFINITY);
        Self::new(&unbounded_lo, &unbounded_hi, u_min, u_max)
    }

    fn state_rows(&self) -> usize {
        self.x_max.len() + self.x_min.len()
    }
}

impl StageConstraint for BoundConstraint {
    fn dim(&self) -> usize {
        self.x_max.len() + self.u_max.len() + self.x_min.len() + self.u_min.len()
    }

    fn kind(&self) -> ConstraintKind {
        ConstraintKind::Inequality
    }

    fn evaluate(&self, x: &DVector<f64>, u: &DVector<f64>, mut c: DVectorViewMut<f64>) {
        let mut row = 0;
        for &(i, b) in &self.x_max {
            c[row] = x[i] - b;
            row += 1;
        }
        for &(i, b) in &self.u_max {
            c[row] = u[i] - b;
            row += 1;
        }
        for &(i, b) in &self.x_min {
            c[row] = b - x[i];
            row += 1;
        }
        for &(i, b) in &self.u_min {
            c[row] = b - u[i];
            row += 1;
        }
    }

    fn jacobian(
        &self,
        _x: &DVector<f64>,
        _u: &DVector<f64>,
        mut cx: DMatrixViewMut<f64>,
        mut cu: DMatrixViewMut<f64>,
    ) {
        cx.fill(0.0);
        cu.fill(0.0);
        let mut row = 0;
        for &(i, _) in &self.x_max {
            cx[(row, i)] = 1.0;
            row += 1;
        }
        for &(i, _) in &self.u_max {
            cu[(row, i)] = 1.0;
            row += 1;
        }
        for &(i, _) in &self.x_min {
            cx[(row, i)] = -1.0;
            row += 1;
        }
        for &(i, _) in &self.u_min {
            cu[(row, i)] = -1.0;
            row += 1;
        }
    }
}

impl TerminalConstraint for BoundConstraint {
    fn dim(&self) -> usize {
        self.state_rows()
    }

    fn kind(&self) -> ConstraintKind {
        ConstraintKind::Inequality
    }

    fn evaluate(&self, x: &DVector<f64>, mut c: DVectorViewMut<f64>) {
        let mut row = 0;
        for &(i, b) in &self.x_max {
            c[row] = x[i] - b;
            row += 1;
        }
        for &(i, b) in &self.x_min {
            c[row] = b - x[i];
            row += 1;
        }
    }

    fn jacobian(&self, _x: &DVector<f64>, mut cx: DMatrixViewMut<f64>) {
        cx.fill(0.0);
        let mut row = 0;
        for &(i, _) in &self.x_max {
            cx[(row, i)] = 1.0;
            row += 1;
        }
        for &(i, _) in &self.x_min {
            cx[(row, i)] = -1.0;
            row += 1;
        }
    }
}

/// Terminal equality `x_N − x_f = 0`.
#[derive(Debug, Clone)]
pub struct GoalConstraint {
    xf: DVector<f64>,
}

impl GoalConstraint {
    pub fn new(xf: DVector<f64>) -> Self {
        Self { xf }
    }
}

impl TerminalConstraint for GoalConstraint {
    fn dim(&self) -> usize {
        self.xf.len()
    }

    fn kind(&self) -> ConstraintKind {
        ConstraintKind::Equality
    }

    fn evaluate(&self, x: &DVector<f64>, mut c: DVectorViewMut<f64>) {
        for i in 0..self.xf.len() {
            c[i] = x[i] - self.xf[i];
        }
    }

    fn jacobian(&self, _x: &DVector<f64>, mut cx: DMatrixViewMut<f64>) {
        cx.fill(0.0);
        cx.fill_diagonal(1.0);
    }
}

/// Stage equality pinning the slack block of an augmented control to zero.
///
/// Used by the infeasible-start mode: controls are `[u; s]` with `s` the
/// per-step slack, and these rows read `s = 0`.
#[derive(Debug, Clone)]
pub struct SlackConstraint {
    control_dim: usize,
    slack_dim: usize,
}

impl SlackConstraint {
    pub(crate) fn new(control_dim: usize, slack_dim: usize) -> Self {
        Self {
            control_dim,
            slack_dim,
        }
    }
}

impl StageConstraint for SlackConstraint {
    fn dim(&self) -> usize {
        self.slack_dim
    }

    fn kind(&self) -> ConstraintKind {
        ConstraintKind::Equality
    }

    fn evaluate(&self, _x: &DVector<f64>, u: &DVector<f64>, mut c: DVectorViewMut<f64>) {
        for i in 0..self.slack_dim {
            c[i] = u[self.control_dim + i];
        }
    }

    fn jacobian(
        &self,
        _x: &DVector<f64>,
        _u: &DVector<f64>,
        mut cx: DMatrixViewMut<f64>,
        mut cu: DMatrixViewMut<f64>,
    ) {
        cx.fill(0.0);
        cu.fill(0.0);
        for i in 0..self.slack_dim {
            cu[(i, self.control_dim + i)] = 1.0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::DMatrix;

    #[test]
    fn bound_constraint_elides_infinite_rows() {
        let x_min = DVector::from_vec(vec![f64::NEG_INFINITY, -1.0]);
        let x_max = DVector::from_vec(vec![f64::INFINITY, 1.0]);
        let u_min = DVector::from_vec(vec![-2.0]);
        let u_max = DVector::from_vec(vec![2.0]);
        let bound = BoundConstraint::new(&x_min, &x_max, &u_min, &u_max).unwrap();

        // x₂ max, u max, x₂ min, u min
        assert_eq!(StageConstraint::dim(&bound), 4);
        assert_eq!(TerminalConstraint::dim(&bound), 2);

        let x = DVector::from_vec(vec![5.0, 0.5]);
        let u = DVector::from_vec(vec![-3.0]);
        let mut c = DVector::zeros(4);
        StageConstraint::evaluate(&bound, &x, &u, c.rows_mut(0, 4));
        assert_relative_eq!(c[0], -0.5); // x₂ − 1
        assert_relative_eq!(c[1], -5.0); // u − 2
        assert_relative_eq!(c[2], -1.5); // −1 − x₂
        assert_relative_eq!(c[3], 1.0); // −2 − u, violated

        let mut cx = DMatrix::zeros(4, 2);
        let mut cu = DMatrix::zeros(4, 1);
        StageConstraint::jacobian(
            &bound,
            &x,
            &u,
            cx.view_mut((0, 0), (4, 2)),
            cu.view_mut((0, 0), (4, 1)),
        );
        assert_relative_eq!(cx[(0, 1)], 1.0);
        assert_relative_eq!(cu[(1, 0)], 1.0);
        assert_relative_eq!(cx[(2, 1)], -1.0);
        assert_relative_eq!(cu[(3, 0)], -1.0);
    }

    #[test]
    fn inverted_bounds_are_rejected() {
        let lo = DVector::from_vec(vec![1.0]);
        let hi = DVector::from_vec(vec![-1.0]);
        let u = DVector::zeros(1);
        assert!(BoundConstraint::new(&lo, &hi, &u, &u).is_err());
    }

    #[test]
    fn goal_constraint_measures_terminal_error() {
        let goal = GoalConstraint::new(DVector::from_vec(vec![3.0, 0.0]));
        assert_eq!(TerminalConstraint::kind(&goal), ConstraintKind::Equality);

        let x = DVector::from_vec(vec![2.5, 0.1]);
        let mut c = DVector::zeros(2);
        goal.evaluate(&x, c.rows_mut(0, 2));
        assert_relative_eq!(c[0], -0.5);
        assert_relative_eq!(c[1], 0.1);

        let mut cx = DMatrix::zeros(2, 2);
        goal.jacobian(&x, cx.view_mut((0, 0), (2, 2)));
        assert_relative_eq!(cx[(0, 0)], 1.0);
        assert_relative_eq!(cx[(1, 1)], 1.0);
    }

    #[test]
    fn slack_rows_read_the_slack_block() {
        let slack = SlackConstraint::new(1, 2);
        let x = DVector::zeros(2);
        let u = DVector::from_vec(vec![0.7, 0.1, -0.2]);
        let mut c = DVector::zeros(2);
        slack.evaluate(&x, &u, c.rows_mut(0, 2));
        assert_relative_eq!(c[0], 0.1);
        assert_relative_eq!(c[1], -0.2);
    }
}
