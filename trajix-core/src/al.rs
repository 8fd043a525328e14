//! Augmented-Lagrangian outer loop and the public solver type.
//!
//! The outer loop owns the master trajectory. Each iteration runs the
//! inner solver on the augmented cost surface with multipliers and
//! penalties frozen, measures the worst constraint violation, and either
//! terminates or updates the multiplier estimates (Hestenes–Powell, with
//! projection for inequality rows) and scales the penalties.

use std::time::Instant;

use nalgebra::DVector;

use crate::constraints::{ConstraintKind, SlackConstraint};
use crate::error::{Result, SolverError};
use crate::ilqr::expansion::{evaluate_constraints, objective_cost};
use crate::ilqr::regularization::{Regularization, RegularizationPolicy};
use crate::ilqr::workspace::{ConstraintData, IlqrWorkspace};
use crate::ilqr::{solve_inner, SolveTrace};
use crate::model::integrator::IntegratorScratch;
use crate::model::Linearizer;
use crate::observer::{
    CancelToken, DiagnosticsConfig, OuterIteration, SolveObserver, VerbosePrinter,
};
use crate::problem::{Problem, SolveInfo, SolveResult, SolveStatus, SolverOptions};
use crate::trajectory::Trajectory;

/// Outcome of one augmented-Lagrangian run.
struct AlOutcome {
    status: SolveStatus,
    outer_iters: usize,
    c_max: f64,
    constraint_history: Vec<f64>,
    cached: Vec<(Vec<DVector<f64>>, Vec<DVector<f64>>)>,
}

/// Second solve stage used by the infeasible-start mode: same problem,
/// model-width controls, no slack rows.
struct PolishStage {
    work: IlqrWorkspace,
    current: Trajectory,
    candidate: Trajectory,
}

/// Constrained trajectory optimization solver.
///
/// Borrows an immutable [`Problem`] and owns every piece of mutable
/// working memory; all arrays are sized at construction and reused across
/// iterations.
pub struct Solver<'a> {
    problem: &'a Problem,
    opts: SolverOptions,
    work: IlqrWorkspace,
    current: Trajectory,
    candidate: Trajectory,
    polish: Option<PolishStage>,
    lin: Linearizer,
    iws: IntegratorScratch,
    cancel: CancelToken,
    observers: Vec<Box<dyn SolveObserver>>,
    u_init: Option<Vec<DVector<f64>>>,
    x_guess: Option<Vec<DVector<f64>>>,
}

impl<'a> Solver<'a> {
    /// Validate the problem and options and allocate working memory.
    ///
    /// This is the only place construction errors surface; a returned
    /// solver will run to a status, never to an `Err`.
    pub fn new(problem: &'a Problem, opts: SolverOptions) -> Result<Self> {
        problem.validate()?;
        opts.validate()?;

        let n = problem.state_dim();
        let m_model = problem.control_dim();
        let infeasible = opts.infeasible_start;
        let m = if infeasible { m_model + n } else { m_model };

        let constrained = !problem.constraints.is_empty() || infeasible;
        let cdata = if constrained {
            let slack = infeasible.then(|| SlackConstraint::new(m_model, n));
            Some(ConstraintData::new(problem, m, slack))
        } else {
            None
        };
        let work = IlqrWorkspace::new(problem, m, cdata);

        let polish = if infeasible {
            let polish_cdata = (!problem.constraints.is_empty())
                .then(|| ConstraintData::new(problem, m_model, None));
            Some(PolishStage {
                work: IlqrWorkspace::new(problem, m_model, polish_cdata),
                current: Trajectory::zeros(n, m_model, problem.horizon),
                candidate: Trajectory::zeros(n, m_model, problem.horizon),
            })
        } else {
            None
        };

        let mut observers: Vec<Box<dyn SolveObserver>> = Vec::new();
        if opts.verbose {
            observers.push(Box::new(VerbosePrinter::new(opts.log_every)));
        }

        Ok(Self {
            problem,
            current: Trajectory::zeros(n, m, problem.horizon),
            candidate: Trajectory::zeros(n, m, problem.horizon),
            polish,
            lin: Linearizer::new(n, m_model),
            iws: IntegratorScratch::new(n, m_model),
            cancel: CancelToken::new(),
            observers,
            u_init: None,
            x_guess: None,
            work,
            opts,
        })
    }

    /// Warm-start controls. Must supply exactly N−1 vectors of the model's
    /// control dimension; anything else is rejected, nothing is truncated.
    pub fn set_initial_controls(&mut self, controls: &[DVector<f64>]) -> Result<()> {
        let expected = self.problem.horizon - 1;
        if controls.len() != expected {
            return Err(SolverError::InvalidInput(format!(
                "initial control sequence has {} knots, expected {}",
                controls.len(),
                expected
            )));
        }
        let m = self.problem.control_dim();
        for (k, u) in controls.iter().enumerate() {
            if u.len() != m {
                return Err(SolverError::InvalidInput(format!(
                    "initial control {} has {} entries, expected {}",
                    k,
                    u.len(),
                    m
                )));
            }
            if !u.iter().all(|v| v.is_finite()) {
                return Err(SolverError::InvalidInput(format!(
                    "initial control {} contains non-finite entries",
                    k
                )));
            }
        }
        self.u_init = Some(controls.to_vec());
        Ok(())
    }

    /// State guess for the infeasible-start mode: N vectors of state
    /// dimension. The guess need not be dynamically consistent; the
    /// solver adds slacks that reproduce it exactly.
    pub fn set_state_guess(&mut self, states: &[DVector<f64>]) -> Result<()> {
        if states.len() != self.problem.horizon {
            return Err(SolverError::InvalidInput(format!(
                "state guess has {} knots, expected {}",
                states.len(),
                self.problem.horizon
            )));
        }
        let n = self.problem.state_dim();
        for (k, x) in states.iter().enumerate() {
            if x.len() != n {
                return Err(SolverError::InvalidInput(format!(
                    "state guess {} has {} entries, expected {}",
                    k,
                    x.len(),
                    n
                )));
            }
            if !x.iter().all(|v| v.is_finite()) {
                return Err(SolverError::InvalidInput(format!(
                    "state guess {} contains non-finite entries",
                    k
                )));
            }
        }
        self.x_guess = Some(states.to_vec());
        Ok(())
    }

    /// Register an observer for iteration callbacks.
    pub fn add_observer(&mut self, observer: Box<dyn SolveObserver>) {
        self.observers.push(observer);
    }

    /// Handle for cooperative cancellation, checked between iterations.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Run the solve to a terminal status.
    pub fn solve(&mut self) -> SolveResult {
        let start = Instant::now();
        let mut cost_history = Vec::new();

        self.initialize_trajectory();

        let policy = RegularizationPolicy {
            increase_factor: self.opts.bp_reg_increase_factor,
            rho_min: self.opts.bp_reg_min,
            rho_max: self.opts.bp_reg_max,
        };
        let mut reg = Regularization::new(self.opts.bp_reg_initial, policy);

        if let Some(cd) = self.work.constraints.as_mut() {
            cd.reset(
                self.opts.penalty_initial,
                self.opts.penalty_initial_infeasible,
            );
        }

        let mut trace = SolveTrace {
            observers: &mut self.observers,
            cost_history: &mut cost_history,
            diag: DiagnosticsConfig::from_env(),
            timing: Default::default(),
            benchmark: self.opts.benchmark,
            inner_iters: 0,
        };

        let mut outcome = run_al(
            self.problem,
            &self.opts,
            &mut self.work,
            &mut self.lin,
            &mut self.iws,
            &mut self.current,
            &mut self.candidate,
            &mut reg,
            &self.cancel,
            &mut trace,
        );
        let mut penalty_peak = self
            .work
            .constraints
            .as_ref()
            .map_or(0.0, ConstraintData::penalty_max);

        // Infeasible start: strip the slack columns and polish on the
        // original control space, warm-started from the stripped
        // trajectory and the converged multipliers.
        let mut polished = false;
        if outcome.status == SolveStatus::Converged {
            if let Some(stage) = self.polish.as_mut() {
                strip_slack_trajectory(&self.current, &mut stage.current);
                // The stripped states still carry the (tiny) converged
                // slacks; restart from a true rollout of the stripped
                // controls so the polish output is exactly consistent.
                rollout_controls(self.problem, &mut self.iws, &mut stage.current);
                if let (Some(main_cd), Some(polish_cd)) =
                    (self.work.constraints.as_ref(), stage.work.constraints.as_mut())
                {
                    warm_start_multipliers(main_cd, polish_cd);
                }

                let polish_outcome = run_al(
                    self.problem,
                    &self.opts,
                    &mut stage.work,
                    &mut self.lin,
                    &mut self.iws,
                    &mut stage.current,
                    &mut stage.candidate,
                    &mut reg,
                    &self.cancel,
                    &mut trace,
                );
                penalty_peak = penalty_peak.max(
                    stage
                        .work
                        .constraints
                        .as_ref()
                        .map_or(0.0, ConstraintData::penalty_max),
                );
                outcome.outer_iters += polish_outcome.outer_iters;
                outcome
                    .constraint_history
                    .extend(polish_outcome.constraint_history);
                outcome.cached.extend(polish_outcome.cached);
                outcome.c_max = polish_outcome.c_max;
                outcome.status = polish_outcome.status;
                polished = true;
            }
        }

        let timing = trace.benchmark.then_some(trace.timing);
        let inner_iters = trace.inner_iters;

        let (states, controls, cost) = if polished {
            let stage = self.polish.as_mut().expect("polish stage exists");
            let cost = objective_cost(self.problem, &mut stage.work, &stage.current);
            (
                stage.current.x.clone(),
                stage.current.u.clone(),
                cost,
            )
        } else {
            let cost = objective_cost(self.problem, &mut self.work, &self.current);
            let m_model = self.problem.control_dim();
            let controls = self
                .current
                .u
                .iter()
                .map(|u| DVector::from_fn(m_model, |i, _| u[i]))
                .collect();
            (self.current.x.clone(), controls, cost)
        };

        SolveResult {
            status: outcome.status,
            states,
            controls,
            cost,
            constraint_violation: outcome.c_max,
            info: SolveInfo {
                inner_iters,
                outer_iters: outcome.outer_iters,
                cost_history,
                constraint_history: outcome.constraint_history,
                rho_final: reg.rho(),
                penalty_max: penalty_peak,
                solve_time_ms: start.elapsed().as_millis() as u64,
                timing,
                cached_trajectories: outcome.cached,
            },
        }
    }

    /// Build the initial iterate: warm-start controls (zeros otherwise)
    /// and either an exact rollout or, in infeasible mode with a state
    /// guess, the guess made dynamically consistent by slacks.
    fn initialize_trajectory(&mut self) {
        let m_model = self.problem.control_dim();
        let n = self.problem.state_dim();
        let horizon = self.problem.horizon;

        for k in 0..horizon - 1 {
            self.current.u[k].fill(0.0);
            if let Some(u0) = &self.u_init {
                for i in 0..m_model {
                    self.current.u[k][i] = u0[k][i];
                }
            }
        }

        self.current.x[0].copy_from(&self.problem.x_init);

        let slack = self.work.slack_dim();
        if slack > 0 {
            if let Some(guess) = &self.x_guess {
                for k in 1..horizon {
                    self.current.x[k].copy_from(&guess[k]);
                }
                // s_k = x_{k+1} − f_d(x_k, u_k): the guess becomes an
                // exact rollout of the augmented dynamics.
                for k in 0..horizon - 1 {
                    self.problem.integrator.step(
                        self.problem.model.as_ref(),
                        self.current.x[k].as_slice(),
                        &self.current.u[k].as_slice()[..m_model],
                        self.problem.dt,
                        &mut self.iws,
                        self.work.x_next.as_mut_slice(),
                    );
                    for i in 0..n {
                        self.current.u[k][m_model + i] =
                            self.current.x[k + 1][i] - self.work.x_next[i];
                    }
                }
                return;
            }
        }

        for k in 0..horizon - 1 {
            self.problem.integrator.step(
                self.problem.model.as_ref(),
                self.current.x[k].as_slice(),
                &self.current.u[k].as_slice()[..m_model],
                self.problem.dt,
                &mut self.iws,
                self.work.x_next.as_mut_slice(),
            );
            self.current.x[k + 1].copy_from(&self.work.x_next);
        }
    }
}

/// The augmented-Lagrangian outer loop over one workspace.
#[allow(clippy::too_many_arguments)]
fn run_al(
    problem: &Problem,
    opts: &SolverOptions,
    work: &mut IlqrWorkspace,
    lin: &mut Linearizer,
    iws: &mut IntegratorScratch,
    current: &mut Trajectory,
    candidate: &mut Trajectory,
    reg: &mut Regularization,
    cancel: &CancelToken,
    trace: &mut SolveTrace<'_>,
) -> AlOutcome {
    let unconstrained = work.constraints.as_ref().map_or(true, |cd| !cd.has_rows());

    let mut constraint_history = Vec::new();
    let mut cached = Vec::new();
    let mut status = SolveStatus::MaxIterations;
    let mut c_max = if unconstrained { 0.0 } else { f64::INFINITY };
    let mut outer_iters = 0;

    for outer in 0..opts.iterations_outerloop {
        if cancel.is_cancelled() {
            status = SolveStatus::Cancelled;
            break;
        }

        // Loose cost tolerance while the constraints are still coarse;
        // tight once they are within tolerance.
        let cost_tolerance = if c_max < opts.constraint_tolerance {
            opts.cost_tolerance
        } else {
            opts.cost_tolerance_intermediate
        };

        let inner = solve_inner(
            problem,
            opts,
            cost_tolerance,
            outer,
            work,
            lin,
            iws,
            current,
            candidate,
            reg,
            cancel,
            trace,
        );

        evaluate_constraints(problem, work, current);
        c_max = work
            .constraints
            .as_ref()
            .map_or(0.0, ConstraintData::max_violation);
        constraint_history.push(c_max);
        if opts.cache_trajectories {
            cached.push((current.x.clone(), current.u.clone()));
        }
        outer_iters = outer + 1;

        let cost = objective_cost(problem, work, current);
        let penalty_max = work
            .constraints
            .as_ref()
            .map_or(0.0, ConstraintData::penalty_max);
        for obs in trace.observers.iter_mut() {
            obs.on_outer_iteration(&OuterIteration {
                iter: outer,
                cost,
                c_max,
                penalty_max,
                inner_converged: inner.converged,
            });
        }

        if inner.cancelled {
            status = SolveStatus::Cancelled;
            break;
        }
        if let Some(fatal) = inner.fatal {
            status = fatal;
            break;
        }
        if c_max < opts.constraint_tolerance && inner.converged {
            status = SolveStatus::Converged;
            break;
        }
        if unconstrained {
            status = if inner.converged {
                SolveStatus::Converged
            } else {
                SolveStatus::MaxIterations
            };
            break;
        }
        if outer + 1 == opts.iterations_outerloop {
            status = if c_max >= opts.constraint_tolerance {
                SolveStatus::ConstraintViolation
            } else {
                SolveStatus::MaxIterations
            };
            break;
        }

        dual_and_penalty_update(work.constraints.as_mut().expect("constrained"), opts);
    }

    AlOutcome {
        status,
        outer_iters,
        c_max,
        constraint_history,
        cached,
    }
}

/// Hestenes–Powell multiplier update with inequality projection, then a
/// uniform penalty scale-up capped at `penalty_max`.
fn dual_and_penalty_update(cd: &mut ConstraintData, opts: &SolverOptions) {
    for k in 0..cd.c.len() {
        for i in 0..cd.c[k].len() {
            let stepped = cd.lambda[k][i] + cd.penalty[k][i] * cd.c[k][i];
            cd.lambda[k][i] = match cd.kinds[k][i] {
                ConstraintKind::Equality => stepped,
                ConstraintKind::Inequality => stepped.max(0.0),
            };
        }
        let (c_prev_k, c_k) = (&mut cd.c_prev[k], &cd.c[k]);
        c_prev_k.copy_from(c_k);
        for i in 0..cd.penalty[k].len() {
            cd.penalty[k][i] = (cd.penalty[k][i] * opts.penalty_scaling).min(opts.penalty_max);
        }
    }
}

/// Open-loop rollout of a trajectory's controls from the problem's
/// initial state.
fn rollout_controls(problem: &Problem, iws: &mut IntegratorScratch, traj: &mut Trajectory) {
    let m_model = problem.control_dim();
    traj.x[0].copy_from(&problem.x_init);
    for k in 0..traj.u.len() {
        let (head, tail) = traj.x.split_at_mut(k + 1);
        problem.integrator.step(
            problem.model.as_ref(),
            head[k].as_slice(),
            &traj.u[k].as_slice()[..m_model],
            problem.dt,
            iws,
            tail[0].as_mut_slice(),
        );
    }
}

/// Copy states and the model-width control block, dropping the slacks.
fn strip_slack_trajectory(full: &Trajectory, stripped: &mut Trajectory) {
    for (dst, src) in stripped.x.iter_mut().zip(full.x.iter()) {
        dst.copy_from(src);
    }
    for (dst, src) in stripped.u.iter_mut().zip(full.u.iter()) {
        for i in 0..dst.len() {
            dst[i] = src[i];
        }
    }
}

/// Carry multipliers and penalties from the slack-augmented layout into
/// the plain layout. Stage rows match up to the trailing slack block;
/// terminal rows are identical.
fn warm_start_multipliers(main: &ConstraintData, polish: &mut ConstraintData) {
    let horizon = polish.c.len();
    for k in 0..horizon {
        let p = polish.lambda[k].len();
        for i in 0..p {
            polish.lambda[k][i] = main.lambda[k][i];
            polish.penalty[k][i] = main.penalty[k][i];
        }
    }
}
