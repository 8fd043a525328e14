//! Planar quadrotor (birotor).

use trajix_core::{Dual, Model, Scalar};

/// Quadrotor constrained to a vertical plane, driven by two rotor
/// thrusts.
///
/// State `[x, y, θ, ẋ, ẏ, θ̇]`; control `[f₁, f₂]` (left/right thrust).
///
/// ```text
/// ẍ = −(f₁+f₂)·sin θ / m
/// ÿ =  (f₁+f₂)·cos θ / m − g
/// θ̈ =  r·(f₁−f₂) / J
/// ```
#[derive(Debug, Clone)]
pub struct PlanarQuadrotor {
    /// Mass [kg]
    pub mass: f64,
    /// Rotor moment arm [m]
    pub arm: f64,
    /// Rotational inertia [kg·m²]
    pub inertia: f64,
    /// Gravity [m/s²]
    pub gravity: f64,
}

impl Default for PlanarQuadrotor {
    fn default() -> Self {
        Self {
            mass: 1.0,
            arm: 0.15,
            inertia: 0.01,
            gravity: 9.81,
        }
    }
}

impl PlanarQuadrotor {
    /// Thrust per rotor that holds a level hover.
    pub fn hover_thrust(&self) -> f64 {
        0.5 * self.mass * self.gravity
    }

    fn eval<S: Scalar>(&self, x: &[S], u: &[S], xdot: &mut [S]) {
        let mass = S::constant(self.mass);
        let arm = S::constant(self.arm);
        let inertia = S::constant(self.inertia);
        let g = S::constant(self.gravity);

        let theta = x[2];
        let thrust = u[0] + u[1];

        xdot[0] = x[3];
        xdot[1] = x[4];
        xdot[2] = x[5];
        xdot[3] = -(thrust * theta.sin()) / mass;
        xdot[4] = thrust * theta.cos() / mass - g;
        xdot[5] = arm * (u[0] - u[1]) / inertia;
    }
}

impl Model for PlanarQuadrotor {
    fn state_dim(&self) -> usize {
        6
    }

    fn control_dim(&self) -> usize {
        2
    }

    fn dynamics(&self, x: &[f64], u: &[f64], xdot: &mut [f64]) {
        self.eval(x, u, xdot)
    }

    fn dynamics_dual(&self, x: &[Dual], u: &[Dual], xdot: &mut [Dual]) {
        self.eval(x, u, xdot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn hover_thrust_balances_gravity() {
        let model = PlanarQuadrotor::default();
        let f = model.hover_thrust();
        let mut xdot = [0.0; 6];
        model.dynamics(&[0.0; 6], &[f, f], &mut xdot);
        for v in xdot {
            assert_relative_eq!(v, 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn differential_thrust_produces_torque() {
        let model = PlanarQuadrotor::default();
        let f = model.hover_thrust();
        let mut xdot = [0.0; 6];
        model.dynamics(&[0.0; 6], &[f + 0.1, f - 0.1], &mut xdot);
        assert!(xdot[5] > 0.0);
    }
}
