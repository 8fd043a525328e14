//! Inner unconstrained solver.
//!
//! One solve alternates expansion → backward sweep → line-searched forward
//! rollout on a fixed augmented cost surface (multipliers and penalties
//! held constant by the outer loop). Regularization recovers from
//! indefinite control Hessians and failed line searches; both escalate to
//! fatal statuses at their configured ceilings.

pub mod backward;
pub mod expansion;
pub mod forward;
pub mod regularization;
pub mod workspace;

use std::time::Instant;

use crate::model::integrator::IntegratorScratch;
use crate::model::Linearizer;
use crate::observer::{CancelToken, DiagnosticsConfig, InnerIteration, SolveObserver};
use crate::problem::{PhaseTiming, Problem, SolveStatus, SolverOptions};
use crate::trajectory::Trajectory;

use backward::backward_pass;
use expansion::{
    constraint_jacobians, evaluate_constraints, expand_cost, linearize_dynamics,
    total_augmented_cost,
};
use forward::forward_pass;
use regularization::Regularization;
use workspace::IlqrWorkspace;

/// Consecutive line-search failures tolerated before the solve is
/// declared stuck.
const MAX_CONSECUTIVE_LS_FAILURES: usize = 3;

/// Outcome of one inner solve.
#[derive(Debug, Clone, Copy)]
pub struct InnerReport {
    /// Cost-change or gradient test passed
    pub converged: bool,
    /// Fatal failure, if any (regularization ceiling, stuck line search)
    pub fatal: Option<SolveStatus>,
    /// Cooperative cancellation observed
    pub cancelled: bool,
    /// Iterations spent in this solve
    pub iterations: usize,
    /// Final augmented cost
    pub cost: f64,
}

/// Run-wide bookkeeping shared by the inner and outer loops.
pub struct SolveTrace<'a> {
    pub observers: &'a mut [Box<dyn SolveObserver>],
    pub cost_history: &'a mut Vec<f64>,
    pub diag: DiagnosticsConfig,
    pub timing: PhaseTiming,
    pub benchmark: bool,
    /// Total inner iterations across the whole solve
    pub inner_iters: usize,
}

impl SolveTrace<'_> {
    fn notify_inner(&mut self, info: &InnerIteration) {
        for obs in self.observers.iter_mut() {
            obs.on_inner_iteration(info);
        }
    }
}

/// One iLQR solve on the current augmented cost surface.
#[allow(clippy::too_many_arguments)]
pub fn solve_inner(
    problem: &Problem,
    opts: &SolverOptions,
    cost_tolerance: f64,
    outer_iter: usize,
    work: &mut IlqrWorkspace,
    lin: &mut Linearizer,
    iws: &mut IntegratorScratch,
    current: &mut Trajectory,
    candidate: &mut Trajectory,
    reg: &mut Regularization,
    cancel: &CancelToken,
    trace: &mut SolveTrace<'_>,
) -> InnerReport {
    let slack_weight = opts.infeasible_control_cost;
    let mut j = total_augmented_cost(problem, slack_weight, work, current);
    let mut consecutive_ls_failures = 0;
    let mut needs_expansion = true;
    let mut iterations = 0;

    let mut converged = false;
    let mut fatal = None;
    let mut cancelled = false;

    while iterations < opts.iterations {
        if cancel.is_cancelled() {
            cancelled = true;
            break;
        }
        iterations += 1;

        if needs_expansion {
            let t0 = Instant::now();
            linearize_dynamics(problem, lin, iws, work, current);
            evaluate_constraints(problem, work, current);
            if let Some(cd) = work.constraints.as_mut() {
                cd.update_active_set();
            }
            constraint_jacobians(problem, work, current);
            expand_cost(problem, slack_weight, work, current);
            if trace.benchmark {
                trace.timing.expansion_ms += t0.elapsed().as_millis() as u64;
            }
            needs_expansion = false;
        }

        let t0 = Instant::now();
        let report = loop {
            match backward_pass(work, reg.rho()) {
                Ok(report) => break Some(report),
                Err(npd) => {
                    reg.increase();
                    if trace.diag.should_log(trace.inner_iters) {
                        eprintln!(
                            "backward: Quu not PD at knot {}, rho -> {:.3e}",
                            npd.knot,
                            reg.rho()
                        );
                    }
                    if reg.exhausted() {
                        break None;
                    }
                }
            }
        };
        if trace.benchmark {
            trace.timing.backward_ms += t0.elapsed().as_millis() as u64;
        }
        let Some(report) = report else {
            fatal = Some(SolveStatus::RegularizationMax);
            break;
        };

        // Converged trajectories re-solve with zero accepted steps: the
        // gradient test runs before any rollout.
        if report.gradient < opts.gradient_tolerance {
            converged = true;
            break;
        }

        let t0 = Instant::now();
        let step = forward_pass(
            problem,
            opts,
            work,
            iws,
            current,
            candidate,
            j,
            report.delta_v1,
            report.delta_v2,
        );
        if trace.benchmark {
            trace.timing.forward_ms += t0.elapsed().as_millis() as u64;
        }

        let Some(step) = step else {
            consecutive_ls_failures += 1;
            reg.increase();
            if reg.exhausted() {
                fatal = Some(SolveStatus::RegularizationMax);
                break;
            }
            if consecutive_ls_failures >= MAX_CONSECUTIVE_LS_FAILURES {
                fatal = Some(SolveStatus::LineSearchFailure);
                break;
            }
            // Same trajectory, larger rho: redo the backward pass only.
            continue;
        };

        consecutive_ls_failures = 0;
        reg.decrease();
        std::mem::swap(current, candidate);
        needs_expansion = true;

        let dj = j - step.cost;
        j = step.cost;
        trace.inner_iters += 1;
        trace.cost_history.push(j);
        trace.notify_inner(&InnerIteration {
            iter: trace.inner_iters,
            outer_iter,
            cost: j,
            cost_decrease: dj,
            gradient: report.gradient,
            alpha: step.alpha,
            rho: reg.rho(),
        });

        if dj.abs() < cost_tolerance || dj.abs() < cost_tolerance * j.abs() {
            converged = true;
            break;
        }
    }

    InnerReport {
        converged,
        fatal,
        cancelled,
        iterations,
        cost: j,
    }
}
