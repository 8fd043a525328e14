//! Point mass with direct acceleration control.

use nalgebra::DMatrix;
use trajix_core::{Dual, Model, Scalar};

/// One-dimensional double integrator: state `[p, v]`, control `[a]`.
///
/// The simplest sanity model: linear dynamics make the inner solver an
/// exact LQR step.
#[derive(Debug, Clone, Default)]
pub struct DoubleIntegrator;

impl DoubleIntegrator {
    fn eval<S: Scalar>(&self, x: &[S], u: &[S], xdot: &mut [S]) {
        xdot[0] = x[1];
        xdot[1] = u[0];
    }
}

impl Model for DoubleIntegrator {
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

    fn analytic_jacobian(
        &self,
        _x: &[f64],
        _u: &[f64],
        fx: &mut DMatrix<f64>,
        fu: &mut DMatrix<f64>,
    ) -> bool {
        fx.fill(0.0);
        fx[(0, 1)] = 1.0;
        fu.fill(0.0);
        fu[(1, 0)] = 1.0;
        true
    }
}
