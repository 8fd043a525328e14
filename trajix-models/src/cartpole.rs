//! Cart-pole (inverted pendulum on a cart).

use trajix_core::{Dual, Model, Scalar};

/// Cart on a rail with a pole hinged on top, actuated by a horizontal
/// force on the cart.
///
/// State `[p, θ, ṗ, θ̇]` with θ = 0 hanging down; control `[F]`.
#[derive(Debug, Clone)]
pub struct CartPole {
    /// Cart mass [kg]
    pub cart_mass: f64,
    /// Pole mass [kg]
    pub pole_mass: f64,
    /// Distance from hinge to pole center of mass [m]
    pub length: f64,
    /// Gravity [m/s²]
    pub gravity: f64,
}

impl Default for CartPole {
    fn default() -> Self {
        Self {
            cart_mass: 1.0,
            pole_mass: 0.2,
            length: 0.5,
            gravity: 9.81,
        }
    }
}

impl CartPole {
    fn eval<S: Scalar>(&self, x: &[S], u: &[S], xdot: &mut [S]) {
        let mc = S::constant(self.cart_mass);
        let mp = S::constant(self.pole_mass);
        let l = S::constant(self.length);
        let g = S::constant(self.gravity);

        let theta = x[1];
        let theta_dot = x[3];
        let sin = theta.sin();
        let cos = theta.cos();

        // Underactuated form with the pole angular acceleration
        // eliminated from the cart equation.
        let denom = mc + mp * sin * sin;
        let p_ddot = (u[0] + mp * sin * (l * theta_dot * theta_dot + g * cos)) / denom;
        let theta_ddot = (-(u[0] * cos)
            - mp * l * theta_dot * theta_dot * cos * sin
            - (mc + mp) * g * sin)
            / (l * denom);

        xdot[0] = x[2];
        xdot[1] = theta_dot;
        xdot[2] = p_ddot;
        xdot[3] = theta_ddot;
    }
}

impl Model for CartPole {
    fn state_dim(&self) -> usize {
        4
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
