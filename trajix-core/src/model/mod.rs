//! Dynamics models and their linearization.
//!
//! A [`Model`] is the dynamics oracle: it evaluates the continuous-time
//! equations of motion `ẋ = f(x, u)` and, optionally, their analytic
//! Jacobians. Models that do not provide analytic Jacobians are
//! differentiated with the forward-mode dual-number kernel in
//! [`autodiff`]; both paths are allocation-free once the [`Linearizer`]
//! scratch buffers are warm.

pub mod autodiff;
pub mod integrator;

use nalgebra::DMatrix;

pub use autodiff::{Dual, Scalar};
pub use integrator::Integrator;

/// Continuous-time dynamics oracle.
///
/// Implementors typically write the equations of motion once, generically
/// over [`Scalar`], and forward both `dynamics` and `dynamics_dual` to that
/// body:
///
/// ```ignore
/// impl Pendulum {
///     fn eval<S: Scalar>(&self, x: &[S], u: &[S], xdot: &mut [S]) { ... }
/// }
///
/// impl Model for Pendulum {
///     fn dynamics(&self, x: &[f64], u: &[f64], xdot: &mut [f64]) {
///         self.eval(x, u, xdot)
///     }
///     fn dynamics_dual(&self, x: &[Dual], u: &[Dual], xdot: &mut [Dual]) {
///         self.eval(x, u, xdot)
///     }
/// }
/// ```
pub trait Model {
    /// State dimension n.
    fn state_dim(&self) -> usize;

    /// Control dimension m.
    fn control_dim(&self) -> usize;

    /// Evaluate `ẋ = f(x, u)` into `xdot`.
    ///
    /// Slice lengths are guaranteed by the caller: `x` and `xdot` have
    /// `state_dim()` entries, `u` has `control_dim()`.
    fn dynamics(&self, x: &[f64], u: &[f64], xdot: &mut [f64]);

    /// Evaluate the same dynamics over dual numbers.
    ///
    /// Drives the forward-mode Jacobian fallback; one input entry is
    /// seeded per call.
    fn dynamics_dual(&self, x: &[Dual], u: &[Dual], xdot: &mut [Dual]);

    /// Analytic continuous Jacobians `∂f/∂x`, `∂f/∂u`, if available.
    ///
    /// Returns `true` after filling `fx` (n×n) and `fu` (n×m). The default
    /// returns `false`, routing linearization through `dynamics_dual`.
    fn analytic_jacobian(
        &self,
        _x: &[f64],
        _u: &[f64],
        _fx: &mut DMatrix<f64>,
        _fu: &mut DMatrix<f64>,
    ) -> bool {
        false
    }
}

/// Reusable scratch for continuous-dynamics linearization.
///
/// Owns the dual seed buffers so the AD path allocates nothing per
/// evaluation.
#[derive(Debug)]
pub struct Linearizer {
    n: usize,
    m: usize,
    x_dual: Vec<Dual>,
    u_dual: Vec<Dual>,
    xdot_dual: Vec<Dual>,
}

impl Linearizer {
    pub fn new(n: usize, m: usize) -> Self {
        Self {
            n,
            m,
            x_dual: vec![Dual::default(); n],
            u_dual: vec![Dual::default(); m],
            xdot_dual: vec![Dual::default(); n],
        }
    }

    /// Continuous Jacobians at `(x, u)`: `fx = ∂f/∂x` (n×n), `fu = ∂f/∂u`
    /// (n×m).
    ///
    /// Uses the model's analytic Jacobian when provided, otherwise seeds
    /// one dual direction per input column.
    pub fn continuous(
        &mut self,
        model: &dyn Model,
        x: &[f64],
        u: &[f64],
        fx: &mut DMatrix<f64>,
        fu: &mut DMatrix<f64>,
    ) {
        if model.analytic_jacobian(x, u, fx, fu) {
            return;
        }

        for i in 0..self.n {
            self.x_dual[i] = Dual::new(x[i]);
        }
        for j in 0..self.m {
            self.u_dual[j] = Dual::new(u[j]);
        }

        for j in 0..self.n {
            self.x_dual[j].eps = 1.0;
            model.dynamics_dual(&self.x_dual, &self.u_dual, &mut self.xdot_dual);
            self.x_dual[j].eps = 0.0;
            for i in 0..self.n {
                fx[(i, j)] = self.xdot_dual[i].eps;
            }
        }

        for j in 0..self.m {
            self.u_dual[j].eps = 1.0;
            model.dynamics_dual(&self.x_dual, &self.u_dual, &mut self.xdot_dual);
            self.u_dual[j].eps = 0.0;
            for i in 0..self.n {
                fu[(i, j)] = self.xdot_dual[i].eps;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// ẋ = [x₂, u − sin(x₁)]
    struct TestOscillator;

    impl TestOscillator {
        fn eval<S: Scalar>(&self, x: &[S], u: &[S], xdot: &mut [S]) {
            xdot[0] = x[1];
            xdot[1] = u[0] - x[0].sin();
        }
    }

    impl Model for TestOscillator {
        fn state_dim(&self) -> usize {
            2
        }

        fn control_dim(&self) -> usize {
            1
        }

        fn dynamics(&self, x: &[f64], u: &[f64], xdot: &mut [f64]) {
            self.eval(x, u, xdot)
        }

        fn dynamics_dual(&self, x: &[Dual], u: &[Dual], xdot: &mut [Dual]) {
            self.eval(x, u, xdot)
        }
    }

    #[test]
    fn dual_jacobian_matches_hand_derivation() {
        let model = TestOscillator;
        let mut lin = Linearizer::new(2, 1);
        let mut fx = DMatrix::zeros(2, 2);
        let mut fu = DMatrix::zeros(2, 1);

        let x = [0.3, -1.2];
        let u = [0.5];
        lin.continuous(&model, &x, &u, &mut fx, &mut fu);

        // fx = [0 1; -cos(x₁) 0], fu = [0; 1]
        assert_relative_eq!(fx[(0, 0)], 0.0);
        assert_relative_eq!(fx[(0, 1)], 1.0);
        assert_relative_eq!(fx[(1, 0)], -(0.3f64.cos()));
        assert_relative_eq!(fx[(1, 1)], 0.0);
        assert_relative_eq!(fu[(0, 0)], 0.0);
        assert_relative_eq!(fu[(1, 0)], 1.0);
    }
}
