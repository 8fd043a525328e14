//! Expansion of dynamics, costs, and constraints at the current
//! trajectory.
//!
//! Builds the quadratic model the backward pass consumes. The augmented
//! stage cost is
//!
//! ```text
//! l̃ = l + λᵀc + ½ cᵀ Iμ c
//! ```
//!
//! and its derivatives fold the constraint terms in Gauss–Newton form (the
//! ∂²c term is dropped):
//!
//! ```text
//! L_x  = l_x  + Cxᵀ(λ + Iμ c)        L_xx = l_xx + Cxᵀ Iμ Cx
//! L_u  = l_u  + Cuᵀ(λ + Iμ c)        L_uu = l_uu + Cuᵀ Iμ Cu
//!                                    L_ux = l_ux + Cuᵀ Iμ Cx
//! ```

use nalgebra::DVector;

use crate::constraints::{ConstraintKind, StageConstraint};
use crate::ilqr::workspace::IlqrWorkspace;
use crate::model::integrator::IntegratorScratch;
use crate::model::Linearizer;
use crate::problem::Problem;
use crate::trajectory::Trajectory;

/// Discrete dynamics Jacobians A_k, B_k at every stage knot.
///
/// In infeasible mode the slack block of B is the identity: slacks enter
/// the next state additively after the integration step.
pub fn linearize_dynamics(
    problem: &Problem,
    lin: &mut Linearizer,
    iws: &mut IntegratorScratch,
    work: &mut IlqrWorkspace,
    traj: &Trajectory,
) {
    let m_model = work.m_model;
    let slack = work.slack_dim();
    for k in 0..work.horizon - 1 {
        let u = &traj.u[k].as_slice()[..m_model];
        problem.integrator.jacobian(
            problem.model.as_ref(),
            lin,
            traj.x[k].as_slice(),
            u,
            problem.dt,
            iws,
            &mut work.a[k],
            &mut work.b_model,
        );
        work.b[k].columns_mut(0, m_model).copy_from(&work.b_model);
        if slack > 0 {
            let mut right = work.b[k].columns_mut(m_model, slack);
            right.fill(0.0);
            right.fill_diagonal(1.0);
        }
    }
}

/// Constraint values c_k at every knot, including the terminal block.
pub fn evaluate_constraints(problem: &Problem, work: &mut IlqrWorkspace, traj: &Trajectory) {
    let Some(cd) = work.constraints.as_mut() else {
        return;
    };
    let horizon = traj.horizon();
    for k in 0..horizon - 1 {
        for &(idx, offset) in &cd.stage_blocks[k] {
            let con = &problem.constraints.stage[idx];
            let dim = con.dim();
            con.evaluate(&traj.x[k], &traj.u[k], cd.c[k].rows_mut(offset, dim));
        }
        if let Some(sl) = &cd.slack {
            let dim = StageConstraint::dim(sl);
            let p = cd.c[k].len();
            sl.evaluate(&traj.x[k], &traj.u[k], cd.c[k].rows_mut(p - dim, dim));
        }
    }
    let kt = horizon - 1;
    for &(idx, offset) in &cd.terminal_blocks {
        let con = &problem.constraints.terminal[idx];
        let dim = con.dim();
        con.evaluate(&traj.x[kt], cd.c[kt].rows_mut(offset, dim));
    }
}

/// Constraint Jacobians Cx_k, Cu_k at every knot.
pub fn constraint_jacobians(problem: &Problem, work: &mut IlqrWorkspace, traj: &Trajectory) {
    let n = work.n;
    let m = work.m;
    let Some(cd) = work.constraints.as_mut() else {
        return;
    };
    let horizon = traj.horizon();
    for k in 0..horizon - 1 {
        for &(idx, offset) in &cd.stage_blocks[k] {
            let con = &problem.constraints.stage[idx];
            let dim = con.dim();
            con.jacobian(
                &traj.x[k],
                &traj.u[k],
                cd.cx[k].view_mut((offset, 0), (dim, n)),
                cd.cu[k].view_mut((offset, 0), (dim, m)),
            );
        }
        if let Some(sl) = &cd.slack {
            let dim = StageConstraint::dim(sl);
            let p = cd.c[k].len();
            sl.jacobian(
                &traj.x[k],
                &traj.u[k],
                cd.cx[k].view_mut((p - dim, 0), (dim, n)),
                cd.cu[k].view_mut((p - dim, 0), (dim, m)),
            );
        }
    }
    let kt = horizon - 1;
    for &(idx, offset) in &cd.terminal_blocks {
        let con = &problem.constraints.terminal[idx];
        let dim = con.dim();
        con.jacobian(&traj.x[kt], cd.cx[kt].view_mut((offset, 0), (dim, n)));
    }
}

/// Quadratic expansion of the augmented cost at every knot.
///
/// Requires current constraint values and an up-to-date active set
/// (`ConstraintData::update_active_set`).
pub fn expand_cost(problem: &Problem, slack_weight: f64, work: &mut IlqrWorkspace, traj: &Trajectory) {
    let n = work.n;
    let m_model = work.m_model;
    let slack = work.slack_dim();
    let horizon = work.horizon;

    for k in 0..horizon - 1 {
        for i in 0..m_model {
            work.u_model[i] = traj.u[k][i];
        }
        problem
            .objective
            .stage_expansion(k, &traj.x[k], &work.u_model, &mut work.exp[k]);
        if slack > 0 {
            let e = &mut work.exp[k];
            for i in 0..slack {
                let j = m_model + i;
                e.lu[j] += slack_weight * traj.u[k][j];
                e.luu[(j, j)] += slack_weight;
            }
        }
    }
    problem
        .objective
        .terminal_expansion(&traj.x[horizon - 1], &mut work.lx_term, &mut work.lxx_term);

    let IlqrWorkspace {
        exp,
        lx_term,
        lxx_term,
        constraints,
        tmp_p,
        tmp_pn,
        tmp_pm,
        ..
    } = work;
    let Some(cd) = constraints.as_ref() else {
        return;
    };

    for k in 0..horizon - 1 {
        let p = cd.c[k].len();
        if p == 0 {
            continue;
        }
        for i in 0..p {
            tmp_p[i] = cd.lambda[k][i] + cd.imu[k][i] * cd.c[k][i];
        }
        let e = &mut exp[k];
        e.lx.gemv_tr(1.0, &cd.cx[k], &tmp_p.rows(0, p), 1.0);
        e.lu.gemv_tr(1.0, &cd.cu[k], &tmp_p.rows(0, p), 1.0);

        for i in 0..p {
            let s = cd.imu[k][i];
            for j in 0..n {
                tmp_pn[(i, j)] = s * cd.cx[k][(i, j)];
            }
            for j in 0..cd.cu[k].ncols() {
                tmp_pm[(i, j)] = s * cd.cu[k][(i, j)];
            }
        }
        e.lxx.gemm_tr(1.0, &tmp_pn.rows(0, p), &cd.cx[k], 1.0);
        e.luu.gemm_tr(1.0, &tmp_pm.rows(0, p), &cd.cu[k], 1.0);
        e.lux.gemm_tr(1.0, &tmp_pm.rows(0, p), &cd.cx[k], 1.0);
    }

    let kt = horizon - 1;
    let p = cd.c[kt].len();
    if p > 0 {
        for i in 0..p {
            tmp_p[i] = cd.lambda[kt][i] + cd.imu[kt][i] * cd.c[kt][i];
        }
        lx_term.gemv_tr(1.0, &cd.cx[kt], &tmp_p.rows(0, p), 1.0);
        for i in 0..p {
            let s = cd.imu[kt][i];
            for j in 0..n {
                tmp_pn[(i, j)] = s * cd.cx[kt][(i, j)];
            }
        }
        lxx_term.gemm_tr(1.0, &tmp_pn.rows(0, p), &cd.cx[kt], 1.0);
    }
}

/// Augmented-Lagrangian cost of a trajectory under the current
/// multipliers and penalties.
///
/// Constraint values are re-evaluated into scratch, so this is safe to
/// call on line-search candidates without disturbing the stored state.
pub fn total_augmented_cost(
    problem: &Problem,
    slack_weight: f64,
    work: &mut IlqrWorkspace,
    traj: &Trajectory,
) -> f64 {
    let m_model = work.m_model;
    let slack = work.slack_dim();
    let horizon = traj.horizon();

    let mut j = 0.0;
    for k in 0..horizon - 1 {
        for i in 0..m_model {
            work.u_model[i] = traj.u[k][i];
        }
        j += problem.objective.stage(k, &traj.x[k], &work.u_model);
        for i in 0..slack {
            let v = traj.u[k][m_model + i];
            j += 0.5 * slack_weight * v * v;
        }
    }
    j += problem.objective.terminal(&traj.x[horizon - 1]);

    let IlqrWorkspace {
        constraints, c_tmp, ..
    } = work;
    if let Some(cd) = constraints.as_ref() {
        for k in 0..horizon - 1 {
            let p = cd.c[k].len();
            if p == 0 {
                continue;
            }
            for &(idx, offset) in &cd.stage_blocks[k] {
                let con = &problem.constraints.stage[idx];
                con.evaluate(&traj.x[k], &traj.u[k], c_tmp.rows_mut(offset, con.dim()));
            }
            if let Some(sl) = &cd.slack {
                let dim = StageConstraint::dim(sl);
                sl.evaluate(&traj.x[k], &traj.u[k], c_tmp.rows_mut(p - dim, dim));
            }
            j += al_terms(&cd.kinds[k], &cd.lambda[k], &cd.penalty[k], c_tmp, p);
        }
        let kt = horizon - 1;
        let p = cd.c[kt].len();
        if p > 0 {
            for &(idx, offset) in &cd.terminal_blocks {
                let con = &problem.constraints.terminal[idx];
                con.evaluate(&traj.x[kt], c_tmp.rows_mut(offset, con.dim()));
            }
            j += al_terms(&cd.kinds[kt], &cd.lambda[kt], &cd.penalty[kt], c_tmp, p);
        }
    }
    j
}

/// Unaugmented objective of a trajectory (reporting value).
pub fn objective_cost(problem: &Problem, work: &mut IlqrWorkspace, traj: &Trajectory) -> f64 {
    let m_model = work.m_model;
    let horizon = traj.horizon();
    let mut j = 0.0;
    for k in 0..horizon - 1 {
        for i in 0..m_model {
            work.u_model[i] = traj.u[k][i];
        }
        j += problem.objective.stage(k, &traj.x[k], &work.u_model);
    }
    j + problem.objective.terminal(&traj.x[horizon - 1])
}

/// λᵀc plus the active-set quadratic penalty for one knot.
fn al_terms(
    kinds: &[ConstraintKind],
    lambda: &DVector<f64>,
    mu: &DVector<f64>,
    c: &DVector<f64>,
    p: usize,
) -> f64 {
    let mut j = 0.0;
    for i in 0..p {
        let ci = c[i];
        let li = lambda[i];
        j += li * ci;
        let active = match kinds[i] {
            ConstraintKind::Equality => true,
            ConstraintKind::Inequality => ci > 0.0 || li > 0.0,
        };
        if active {
            j += 0.5 * mu[i] * ci * ci;
        }
    }
    j
}
