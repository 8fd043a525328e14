//! Explicit single-step quadrature rules and their Jacobians.
//!
//! All rules hold the control fixed across the step (zero-order hold).
//! Discrete Jacobians are exact chain rules through the stage states,
//! built from the continuous Jacobians supplied by [`Linearizer`], so the
//! linearization is consistent with the rollout to machine precision.

use nalgebra::{DMatrix, DVector};

use crate::error::{Result, SolverError};
use crate::model::{Linearizer, Model};

/// Explicit integration rule, fixed at problem construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Integrator {
    /// x′ = x + Δt·f(x + Δt/2·f(x,u), u)
    Midpoint,
    /// Kutta's third-order rule
    Rk3,
    /// Classic fourth-order Runge–Kutta
    Rk4,
}

impl Integrator {
    /// Parse a rule name. Unknown names fail at construction time.
    pub fn from_name(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "midpoint" => Ok(Integrator::Midpoint),
            "rk3" => Ok(Integrator::Rk3),
            "rk4" => Ok(Integrator::Rk4),
            other => Err(SolverError::InvalidInput(format!(
                "unknown integrator '{}' (expected one of: midpoint, rk3, rk4)",
                other
            ))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Integrator::Midpoint => "midpoint",
            Integrator::Rk3 => "rk3",
            Integrator::Rk4 => "rk4",
        }
    }

    /// One discrete step `x′ = f_d(x, u, Δt)` into `out`.
    pub fn step(
        &self,
        model: &dyn Model,
        x: &[f64],
        u: &[f64],
        dt: f64,
        ws: &mut IntegratorScratch,
        out: &mut [f64],
    ) {
        let n = x.len();
        match self {
            Integrator::Midpoint => {
                model.dynamics(x, u, ws.k1.as_mut_slice());
                for i in 0..n {
                    ws.xs[i] = x[i] + 0.5 * dt * ws.k1[i];
                }
                model.dynamics(ws.xs.as_slice(), u, ws.k2.as_mut_slice());
                for i in 0..n {
                    out[i] = x[i] + dt * ws.k2[i];
                }
            }
            Integrator::Rk3 => {
                model.dynamics(x, u, ws.k1.as_mut_slice());
                for i in 0..n {
                    ws.k1[i] *= dt;
                    ws.xs[i] = x[i] + 0.5 * ws.k1[i];
                }
                model.dynamics(ws.xs.as_slice(), u, ws.k2.as_mut_slice());
                for i in 0..n {
                    ws.k2[i] *= dt;
                    ws.xs[i] = x[i] - ws.k1[i] + 2.0 * ws.k2[i];
                }
                model.dynamics(ws.xs.as_slice(), u, ws.k3.as_mut_slice());
                for i in 0..n {
                    ws.k3[i] *= dt;
                    out[i] = x[i] + (ws.k1[i] + 4.0 * ws.k2[i] + ws.k3[i]) / 6.0;
                }
            }
            Integrator::Rk4 => {
                model.dynamics(x, u, ws.k1.as_mut_slice());
                for i in 0..n {
                    ws.k1[i] *= dt;
                    ws.xs[i] = x[i] + 0.5 * ws.k1[i];
                }
                model.dynamics(ws.xs.as_slice(), u, ws.k2.as_mut_slice());
                for i in 0..n {
                    ws.k2[i] *= dt;
                    ws.xs[i] = x[i] + 0.5 * ws.k2[i];
                }
                model.dynamics(ws.xs.as_slice(), u, ws.k3.as_mut_slice());
                for i in 0..n {
                    ws.k3[i] *= dt;
                    ws.xs[i] = x[i] + ws.k3[i];
                }
                model.dynamics(ws.xs.as_slice(), u, ws.k4.as_mut_slice());
                for i in 0..n {
                    ws.k4[i] *= dt;
                    out[i] = x[i]
                        + (ws.k1[i] + 2.0 * ws.k2[i] + 2.0 * ws.k3[i] + ws.k4[i]) / 6.0;
                }
            }
        }
    }

    /// Discrete Jacobians `A = ∂f_d/∂x` (n×n) and `B = ∂f_d/∂u` (n×m) at
    /// `(x, u, Δt)`, chained through the stage states.
    pub fn jacobian(
        &self,
        model: &dyn Model,
        lin: &mut Linearizer,
        x: &[f64],
        u: &[f64],
        dt: f64,
        ws: &mut IntegratorScratch,
        a: &mut DMatrix<f64>,
        b: &mut DMatrix<f64>,
    ) {
        let n = x.len();
        match self {
            Integrator::Midpoint => {
                // x_mid = x + Δt/2·f₁
                model.dynamics(x, u, ws.k1.as_mut_slice());
                for i in 0..n {
                    ws.xs[i] = x[i] + 0.5 * dt * ws.k1[i];
                }
                lin.continuous(model, x, u, &mut ws.d1x, &mut ws.d1u);
                lin.continuous(model, ws.xs.as_slice(), u, &mut ws.fx, &mut ws.fu);

                // A = I + Δt·F₂ + Δt²/2·F₂F₁
                ws.tmp_nn.gemm(1.0, &ws.fx, &ws.d1x, 0.0);
                a.fill(0.0);
                a.fill_diagonal(1.0);
                add_scaled(a, dt, &ws.fx);
                add_scaled(a, 0.5 * dt * dt, &ws.tmp_nn);

                // B = Δt·(Δt/2·F₂G₁ + G₂)
                ws.tmp_nm.gemm(1.0, &ws.fx, &ws.d1u, 0.0);
                b.copy_from(&ws.fu);
                add_scaled(b, 0.5 * dt, &ws.tmp_nm);
                *b *= dt;
            }
            Integrator::Rk3 => {
                model.dynamics(x, u, ws.k1.as_mut_slice());
                for i in 0..n {
                    ws.k1[i] *= dt;
                }
                lin.continuous(model, x, u, &mut ws.fx, &mut ws.fu);
                // dk₁ = Δt·[F₁ G₁]
                ws.d1x.copy_from(&ws.fx);
                ws.d1x *= dt;
                ws.d1u.copy_from(&ws.fu);
                ws.d1u *= dt;

                for i in 0..n {
                    ws.xs[i] = x[i] + 0.5 * ws.k1[i];
                }
                model.dynamics(ws.xs.as_slice(), u, ws.k2.as_mut_slice());
                lin.continuous(model, ws.xs.as_slice(), u, &mut ws.fx, &mut ws.fu);
                // dk₂ = Δt·F₂(I + dk₁ₓ/2), Δt·(F₂dk₁ᵤ/2 + G₂)
                ws.d2x.copy_from(&ws.fx);
                ws.d2x.gemm(0.5 * dt, &ws.fx, &ws.d1x, dt);
                ws.d2u.copy_from(&ws.fu);
                ws.d2u.gemm(0.5 * dt, &ws.fx, &ws.d1u, dt);

                for i in 0..n {
                    ws.xs[i] = x[i] - ws.k1[i] + 2.0 * dt * ws.k2[i];
                }
                lin.continuous(model, ws.xs.as_slice(), u, &mut ws.fx, &mut ws.fu);
                // dk₃ = Δt·F₃(I − dk₁ₓ + 2dk₂ₓ), Δt·(F₃(−dk₁ᵤ + 2dk₂ᵤ) + G₃)
                ws.tmp_nn.copy_from(&ws.d2x);
                ws.tmp_nn *= 2.0;
                add_scaled(&mut ws.tmp_nn, -1.0, &ws.d1x);
                ws.d3x.copy_from(&ws.fx);
                ws.d3x.gemm(dt, &ws.fx, &ws.tmp_nn, dt);
                ws.tmp_nm.copy_from(&ws.d2u);
                ws.tmp_nm *= 2.0;
                add_scaled(&mut ws.tmp_nm, -1.0, &ws.d1u);
                ws.d3u.copy_from(&ws.fu);
                ws.d3u.gemm(dt, &ws.fx, &ws.tmp_nm, dt);

                a.fill(0.0);
                a.fill_diagonal(1.0);
                add_scaled(a, 1.0 / 6.0, &ws.d1x);
                add_scaled(a, 4.0 / 6.0, &ws.d2x);
                add_scaled(a, 1.0 / 6.0, &ws.d3x);
                b.copy_from(&ws.d1u);
                add_scaled(b, 4.0, &ws.d2u);
                add_scaled(b, 1.0, &ws.d3u);
                *b /= 6.0;
            }
            Integrator::Rk4 => {
                model.dynamics(x, u, ws.k1.as_mut_slice());
                for i in 0..n {
                    ws.k1[i] *= dt;
                }
                lin.continuous(model, x, u, &mut ws.fx, &mut ws.fu);
                ws.d1x.copy_from(&ws.fx);
                ws.d1x *= dt;
                ws.d1u.copy_from(&ws.fu);
                ws.d1u *= dt;

                for i in 0..n {
                    ws.xs[i] = x[i] + 0.5 * ws.k1[i];
                }
                model.dynamics(ws.xs.as_slice(), u, ws.k2.as_mut_slice());
                lin.continuous(model, ws.xs.as_slice(), u, &mut ws.fx, &mut ws.fu);
                ws.d2x.copy_from(&ws.fx);
                ws.d2x.gemm(0.5 * dt, &ws.fx, &ws.d1x, dt);
                ws.d2u.copy_from(&ws.fu);
                ws.d2u.gemm(0.5 * dt, &ws.fx, &ws.d1u, dt);

                for i in 0..n {
                    ws.xs[i] = x[i] + 0.5 * dt * ws.k2[i];
                }
                model.dynamics(ws.xs.as_slice(), u, ws.k3.as_mut_slice());
                lin.continuous(model, ws.xs.as_slice(), u, &mut ws.fx, &mut ws.fu);
                ws.d3x.copy_from(&ws.fx);
                ws.d3x.gemm(0.5 * dt, &ws.fx, &ws.d2x, dt);
                ws.d3u.copy_from(&ws.fu);
                ws.d3u.gemm(0.5 * dt, &ws.fx, &ws.d2u, dt);

                for i in 0..n {
                    ws.xs[i] = x[i] + dt * ws.k3[i];
                }
                lin.continuous(model, ws.xs.as_slice(), u, &mut ws.fx, &mut ws.fu);
                // dk₄ = Δt·F₄(I + dk₃ₓ), Δt·(F₄dk₃ᵤ + G₄)
                ws.tmp_nn.copy_from(&ws.fx);
                ws.tmp_nn.gemm(dt, &ws.fx, &ws.d3x, dt);
                ws.tmp_nm.copy_from(&ws.fu);
                ws.tmp_nm.gemm(dt, &ws.fx, &ws.d3u, dt);

                a.fill(0.0);
                a.fill_diagonal(1.0);
                add_scaled(a, 1.0 / 6.0, &ws.d1x);
                add_scaled(a, 2.0 / 6.0, &ws.d2x);
                add_scaled(a, 2.0 / 6.0, &ws.d3x);
                add_scaled(a, 1.0 / 6.0, &ws.tmp_nn);
                b.copy_from(&ws.d1u);
                add_scaled(b, 2.0, &ws.d2u);
                add_scaled(b, 2.0, &ws.d3u);
                add_scaled(b, 1.0, &ws.tmp_nm);
                *b /= 6.0;
            }
        }
    }
}

/// dst += s·src, elementwise.
#[inline]
fn add_scaled(dst: &mut DMatrix<f64>, s: f64, src: &DMatrix<f64>) {
    for j in 0..dst.ncols() {
        for i in 0..dst.nrows() {
            dst[(i, j)] += s * src[(i, j)];
        }
    }
}

/// Stage-state and stage-Jacobian scratch, allocated once per solve.
#[derive(Debug)]
pub struct IntegratorScratch {
    k1: DVector<f64>,
    k2: DVector<f64>,
    k3: DVector<f64>,
    k4: DVector<f64>,
    xs: DVector<f64>,
    fx: DMatrix<f64>,
    fu: DMatrix<f64>,
    d1x: DMatrix<f64>,
    d2x: DMatrix<f64>,
    d3x: DMatrix<f64>,
    d1u: DMatrix<f64>,
    d2u: DMatrix<f64>,
    d3u: DMatrix<f64>,
    tmp_nn: DMatrix<f64>,
    tmp_nm: DMatrix<f64>,
}

impl IntegratorScratch {
    pub fn new(n: usize, m: usize) -> Self {
        Self {
            k1: DVector::zeros(n),
            k2: DVector::zeros(n),
            k3: DVector::zeros(n),
            k4: DVector::zeros(n),
            xs: DVector::zeros(n),
            fx: DMatrix::zeros(n, n),
            fu: DMatrix::zeros(n, m),
            d1x: DMatrix::zeros(n, n),
            d2x: DMatrix::zeros(n, n),
            d3x: DMatrix::zeros(n, n),
            d1u: DMatrix::zeros(n, m),
            d2u: DMatrix::zeros(n, m),
            d3u: DMatrix::zeros(n, m),
            tmp_nn: DMatrix::zeros(n, n),
            tmp_nm: DMatrix::zeros(n, m),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Dual, Scalar};
    use approx::assert_relative_eq;

    struct Decay;

    impl Decay {
        fn eval<S: Scalar>(&self, x: &[S], _u: &[S], xdot: &mut [S]) {
            xdot[0] = -x[0];
        }
    }

    impl Model for Decay {
        fn state_dim(&self) -> usize {
            1
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

    struct ForcedOscillator;

    impl ForcedOscillator {
        fn eval<S: Scalar>(&self, x: &[S], u: &[S], xdot: &mut [S]) {
            xdot[0] = x[1];
            xdot[1] = u[0] - x[0].sin() - S::constant(0.1) * x[1];
        }
    }

    impl Model for ForcedOscillator {
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
    fn from_name_accepts_known_rules() {
        assert_eq!(Integrator::from_name("rk4").unwrap(), Integrator::Rk4);
        assert_eq!(Integrator::from_name("RK3").unwrap(), Integrator::Rk3);
        assert_eq!(
            Integrator::from_name("midpoint").unwrap(),
            Integrator::Midpoint
        );
        assert!(Integrator::from_name("euler").is_err());
    }

    #[test]
    fn decay_step_orders() {
        // ẋ = -x over one step: exact factor is e^{-Δt}.
        let model = Decay;
        let dt = 0.1_f64;
        let exact = (-dt).exp();

        for (rule, tol) in [
            (Integrator::Midpoint, 2e-4),
            (Integrator::Rk3, 5e-6),
            (Integrator::Rk4, 1e-7),
        ] {
            let mut ws = IntegratorScratch::new(1, 1);
            let mut out = [0.0];
            rule.step(&model, &[1.0], &[0.0], dt, &mut ws, &mut out);
            assert!(
                (out[0] - exact).abs() < tol,
                "{}: {} vs {}",
                rule.name(),
                out[0],
                exact
            );
        }
    }

    #[test]
    fn chain_rule_jacobian_matches_finite_differences() {
        let model = ForcedOscillator;
        let dt = 0.05;
        let x0 = [0.4, -0.3];
        let u0 = [0.8];
        let h = 1e-6;

        for rule in [Integrator::Midpoint, Integrator::Rk3, Integrator::Rk4] {
            let mut ws = IntegratorScratch::new(2, 1);
            let mut lin = Linearizer::new(2, 1);
            let mut a = DMatrix::zeros(2, 2);
            let mut b = DMatrix::zeros(2, 1);
            rule.jacobian(&model, &mut lin, &x0, &u0, dt, &mut ws, &mut a, &mut b);

            let mut base = [0.0; 2];
            rule.step(&model, &x0, &u0, dt, &mut ws, &mut base);

            for j in 0..2 {
                let mut xp = x0;
                xp[j] += h;
                let mut out = [0.0; 2];
                rule.step(&model, &xp, &u0, dt, &mut ws, &mut out);
                for i in 0..2 {
                    let fd = (out[i] - base[i]) / h;
                    assert_relative_eq!(a[(i, j)], fd, epsilon = 1e-5);
                }
            }

            let mut up = u0;
            up[0] += h;
            let mut out = [0.0; 2];
            rule.step(&model, &x0, &up, dt, &mut ws, &mut out);
            for i in 0..2 {
                let fd = (out[i] - base[i]) / h;
                assert_relative_eq!(b[(i, 0)], fd, epsilon = 1e-5);
            }
        }
    }
}
