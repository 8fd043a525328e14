//! Backward Riccati sweep.
//!
//! Walks k = N−2 .. 0 building the action-value expansion, factorizing the
//! regularized control Hessian, and emitting feedback/feedforward gains
//! plus the quadratic value function. The sweep aborts on the first knot
//! whose regularized Q_uu is not positive definite; the driver raises ρ
//! and restarts.

use nalgebra::Cholesky;

use crate::ilqr::workspace::IlqrWorkspace;

/// Outputs of a completed sweep.
#[derive(Debug, Clone, Copy)]
pub struct BackwardReport {
    /// ΔV₁ = Σ d_kᵀ Q_u
    pub delta_v1: f64,
    /// ΔV₂ = ½ Σ d_kᵀ Q_uu d_k
    pub delta_v2: f64,
    /// max_k ‖d_k‖∞, the convergence surrogate
    pub gradient: f64,
}

/// Factorization failure at one knot.
#[derive(Debug, Clone, Copy)]
pub struct NotPositiveDefinite {
    pub knot: usize,
}

/// Run the sweep with regularization ρ on the control Hessian.
///
/// Expects `expand_cost` and `linearize_dynamics` to have filled the
/// workspace at the current trajectory. On success the gains and value
/// function arrays are valid for the forward pass.
pub fn backward_pass(
    work: &mut IlqrWorkspace,
    rho: f64,
) -> Result<BackwardReport, NotPositiveDefinite> {
    let n = work.n;
    let m = work.m;
    let horizon = work.horizon;

    let IlqrWorkspace {
        a,
        b,
        exp,
        lx_term,
        lxx_term,
        gain_k,
        gain_d,
        s_mat,
        s_vec,
        qx,
        qu,
        qxx,
        quu,
        qux,
        quu_reg,
        tmp_nn,
        tmp_nm,
        tmp_mn,
        tmp_m,
        ..
    } = work;

    s_mat[horizon - 1].copy_from(lxx_term);
    s_vec[horizon - 1].copy_from(lx_term);

    let mut delta_v1 = 0.0;
    let mut delta_v2 = 0.0;
    let mut gradient = 0.0_f64;

    for k in (0..horizon - 1).rev() {
        let (s_mat_head, s_mat_tail) = s_mat.split_at_mut(k + 1);
        let (s_vec_head, s_vec_tail) = s_vec.split_at_mut(k + 1);
        let s_next = &s_mat_tail[0];
        let sv_next = &s_vec_tail[0];
        let e = &exp[k];

        // S·A and S·B, reused by all second-order terms
        tmp_nn.gemm(1.0, s_next, &a[k], 0.0);
        tmp_nm.gemm(1.0, s_next, &b[k], 0.0);

        qx.copy_from(&e.lx);
        qx.gemv_tr(1.0, &a[k], sv_next, 1.0);
        qu.copy_from(&e.lu);
        qu.gemv_tr(1.0, &b[k], sv_next, 1.0);
        qxx.copy_from(&e.lxx);
        qxx.gemm_tr(1.0, &a[k], tmp_nn, 1.0);
        quu.copy_from(&e.luu);
        quu.gemm_tr(1.0, &b[k], tmp_nm, 1.0);
        qux.copy_from(&e.lux);
        qux.gemm_tr(1.0, &b[k], tmp_nn, 1.0);

        quu_reg.copy_from(quu);
        for i in 0..m {
            quu_reg[(i, i)] += rho;
        }

        let chol = match Cholesky::new(quu_reg.clone()) {
            Some(c) => c,
            None => return Err(NotPositiveDefinite { knot: k }),
        };

        gain_k[k].copy_from(qux);
        chol.solve_mut(&mut gain_k[k]);
        gain_k[k].neg_mut();
        gain_d[k].copy_from(qu);
        chol.solve_mut(&mut gain_d[k]);
        gain_d[k].neg_mut();

        delta_v1 += gain_d[k].dot(qu);
        tmp_m.gemv(1.0, quu, &gain_d[k], 0.0);
        delta_v2 += 0.5 * gain_d[k].dot(tmp_m);
        gradient = gradient.max(gain_d[k].amax());

        // S_k = Q_xx + Kᵀ Q_uu K + Kᵀ Q_ux + Q_uxᵀ K, symmetrized
        let s_k = &mut s_mat_head[k];
        s_k.copy_from(qxx);
        tmp_mn.gemm(1.0, quu, &gain_k[k], 0.0);
        s_k.gemm_tr(1.0, &gain_k[k], tmp_mn, 1.0);
        s_k.gemm_tr(1.0, &gain_k[k], qux, 1.0);
        s_k.gemm_tr(1.0, qux, &gain_k[k], 1.0);
        for i in 0..n {
            for j in (i + 1)..n {
                let avg = 0.5 * (s_k[(i, j)] + s_k[(j, i)]);
                s_k[(i, j)] = avg;
                s_k[(j, i)] = avg;
            }
        }

        // s_k = Q_x + Kᵀ Q_uu d + Kᵀ Q_u + Q_uxᵀ d
        let sv_k = &mut s_vec_head[k];
        sv_k.copy_from(qx);
        sv_k.gemv_tr(1.0, &gain_k[k], tmp_m, 1.0);
        sv_k.gemv_tr(1.0, &gain_k[k], qu, 1.0);
        sv_k.gemv_tr(1.0, qux, &gain_d[k], 1.0);
    }

    Ok(BackwardReport {
        delta_v1,
        delta_v2,
        gradient,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::costs::QuadraticCost;
    use crate::model::{Dual, Integrator, Model, Scalar};
    use crate::problem::Problem;
    use approx::assert_relative_eq;
    use nalgebra::{DMatrix, DVector};

    struct DoubleIntegrator;

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
    }

    fn one_step_problem() -> Problem {
        let cost = QuadraticCost::diagonal(1.0, 0.1, 10.0, DVector::zeros(2), 1);
        Problem::new(
            Box::new(DoubleIntegrator),
            Box::new(cost),
            DVector::from_vec(vec![1.0, 0.0]),
            2,
            0.1,
            Integrator::Rk4,
        )
        .unwrap()
    }

    #[test]
    fn single_step_gains_match_closed_form() {
        // With one step the recursion reduces to
        //   Q_uu = R + Bᵀ Q_f B,  Q_ux = Bᵀ Q_f A,  Q_u = R u + Bᵀ Q_f (A x + B u)
        // for a hand-set linear expansion.
        let problem = one_step_problem();
        let mut work = crate::ilqr::workspace::IlqrWorkspace::new(&problem, 1, None);

        let a = DMatrix::from_row_slice(2, 2, &[1.0, 0.1, 0.0, 1.0]);
        let b = DMatrix::from_row_slice(2, 1, &[0.005, 0.1]);
        work.a[0].copy_from(&a);
        work.b[0].copy_from(&b);

        let x = DVector::from_vec(vec![1.0, 0.0]);
        let u = DVector::from_vec(vec![0.5]);
        let r = 0.1;
        let qf = 10.0;

        // Stage expansion of ½xᵀx·0 + ½uᵀRu at (x, u): only control terms.
        work.exp[0].set_zero();
        work.exp[0].lu[0] = r * u[0];
        work.exp[0].luu[(0, 0)] = r;

        // Terminal expansion of ½ qf xᵀx at x_N = A x + B u.
        let x_n = &a * &x + &b * &u;
        work.lx_term.copy_from(&(&x_n * qf));
        work.lxx_term.copy_from(&(DMatrix::identity(2, 2) * qf));

        let report = backward_pass(&mut work, 0.0).unwrap();

        let quu = r + (b.transpose() * &b * qf)[(0, 0)];
        let qux_row = b.transpose() * &a * qf;
        let qu = r * u[0] + (b.transpose() * &x_n * qf)[(0, 0)];

        assert_relative_eq!(work.gain_d[0][0], -qu / quu, epsilon = 1e-12);
        assert_relative_eq!(work.gain_k[0][(0, 0)], -qux_row[(0, 0)] / quu, epsilon = 1e-12);
        assert_relative_eq!(work.gain_k[0][(0, 1)], -qux_row[(0, 1)] / quu, epsilon = 1e-12);
        assert_relative_eq!(report.delta_v1, work.gain_d[0][0] * qu, epsilon = 1e-12);
        assert!(report.gradient > 0.0);
    }

    #[test]
    fn indefinite_quu_is_reported() {
        let problem = one_step_problem();
        let mut work = crate::ilqr::workspace::IlqrWorkspace::new(&problem, 1, None);

        work.a[0].fill_diagonal(1.0);
        work.b[0][(1, 0)] = 0.1;
        work.exp[0].set_zero();
        work.exp[0].luu[(0, 0)] = -1.0;
        work.lx_term.fill(0.0);
        work.lxx_term.fill(0.0);

        let err = backward_pass(&mut work, 0.0).unwrap_err();
        assert_eq!(err.knot, 0);

        // Enough regularization restores positive definiteness.
        assert!(backward_pass(&mut work, 2.0).is_ok());
    }
}
