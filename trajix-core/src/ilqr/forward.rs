//! Line-searched closed-loop rollout.
//!
//! Rolls the gains out against the real dynamics at decreasing step sizes
//! until the achieved cost reduction is an acceptable fraction of the
//! model's prediction. A rollout that leaves the finite range is rejected
//! exactly like a failed sufficient-decrease test.

use crate::ilqr::expansion::total_augmented_cost;
use crate::ilqr::workspace::IlqrWorkspace;
use crate::model::integrator::IntegratorScratch;
use crate::problem::{Problem, SolverOptions};
use crate::trajectory::Trajectory;

/// An accepted step.
#[derive(Debug, Clone, Copy)]
pub struct ForwardReport {
    /// Augmented cost of the accepted candidate
    pub cost: f64,
    /// Accepted step size
    pub alpha: f64,
}

/// Backtracking line search. Writes accepted knots into `candidate`;
/// returns `None` when no step size passes within the bisection limit.
pub fn forward_pass(
    problem: &Problem,
    opts: &SolverOptions,
    work: &mut IlqrWorkspace,
    iws: &mut IntegratorScratch,
    current: &Trajectory,
    candidate: &mut Trajectory,
    j_prev: f64,
    delta_v1: f64,
    delta_v2: f64,
) -> Option<ForwardReport> {
    let mut alpha = 1.0;

    for _ in 0..opts.iterations_linesearch {
        if rollout(problem, work, iws, current, candidate, alpha) {
            let cost = total_augmented_cost(
                problem,
                opts.infeasible_control_cost,
                work,
                candidate,
            );
            if cost.is_finite() && accepts(j_prev, cost, alpha, delta_v1, delta_v2, opts) {
                return Some(ForwardReport { cost, alpha });
            }
        }
        alpha *= 0.5;
    }
    None
}

/// Closed-loop rollout at step size α. Returns false when the trajectory
/// leaves the finite range.
fn rollout(
    problem: &Problem,
    work: &mut IlqrWorkspace,
    iws: &mut IntegratorScratch,
    current: &Trajectory,
    candidate: &mut Trajectory,
    alpha: f64,
) -> bool {
    let m_model = work.m_model;
    let slack = work.slack_dim();
    let horizon = work.horizon;

    candidate.x[0].copy_from(&current.x[0]);

    for k in 0..horizon - 1 {
        work.dx.copy_from(&candidate.x[k]);
        work.dx -= &current.x[k];

        candidate.u[k].copy_from(&current.u[k]);
        candidate.u[k].axpy(alpha, &work.gain_d[k], 1.0);
        candidate.u[k].gemv(1.0, &work.gain_k[k], &work.dx, 1.0);

        problem.integrator.step(
            problem.model.as_ref(),
            candidate.x[k].as_slice(),
            &candidate.u[k].as_slice()[..m_model],
            problem.dt,
            iws,
            work.x_next.as_mut_slice(),
        );
        candidate.x[k + 1].copy_from(&work.x_next);
        for i in 0..slack {
            candidate.x[k + 1][i] += candidate.u[k][m_model + i];
        }

        if !candidate.x[k + 1].iter().all(|v| v.is_finite()) {
            return false;
        }
    }
    true
}

/// Sufficient-decrease test: the achieved/predicted reduction ratio must
/// land in [c₁, c₂]. With no predicted reduction, fall back to plain
/// descent.
fn accepts(
    j_prev: f64,
    cost: f64,
    alpha: f64,
    delta_v1: f64,
    delta_v2: f64,
    opts: &SolverOptions,
) -> bool {
    let expected = -alpha * delta_v1 - alpha * alpha * delta_v2;
    if expected > 0.0 {
        let z = (j_prev - cost) / expected;
        opts.line_search_lower <= z && z <= opts.line_search_upper
    } else {
        cost < j_prev
    }
}
