//! End-to-end tests of the solver on a double integrator.
//!
//! Model-library scenarios (pendulum swing-up and friends) live in the
//! `trajix-models` crate; here the fixture is kept inline so the core
//! pipeline is exercised without cross-crate dependencies.

use nalgebra::DVector;
use trajix_core::{
    solve, BoundConstraint, Dual, GoalConstraint, Integrator, Model, Problem, QuadraticCost,
    Scalar, SolveStatus, Solver, SolverOptions,
};

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

const HORIZON: usize = 31;
const DT: f64 = 0.1;

fn brake_to_origin() -> Problem {
    // Start at position 1 with velocity 1, drive to rest at the origin.
    let cost = QuadraticCost::diagonal(
        1.0,
        0.1,
        100.0,
        DVector::zeros(2),
        1,
    );
    Problem::new(
        Box::new(DoubleIntegrator),
        Box::new(cost),
        DVector::from_vec(vec![1.0, 1.0]),
        HORIZON,
        DT,
        Integrator::Rk4,
    )
    .unwrap()
}

fn max_dynamics_defect(problem: &Problem, result: &trajix_core::SolveResult) -> f64 {
    // Integrate the returned controls step by step and compare against
    // the returned states.
    let model = DoubleIntegrator;
    let mut scratch = trajix_core::model::integrator::IntegratorScratch::new(2, 1);
    let mut defect = 0.0_f64;
    for k in 0..result.controls.len() {
        let mut out = [0.0; 2];
        problem.integrator.step(
            &model,
            result.states[k].as_slice(),
            result.controls[k].as_slice(),
            DT,
            &mut scratch,
            &mut out,
        );
        for i in 0..2 {
            defect = defect.max((out[i] - result.states[k + 1][i]).abs());
        }
    }
    defect
}

#[test]
fn unconstrained_solve_converges() {
    let problem = brake_to_origin();
    let result = solve(&problem, SolverOptions::default()).unwrap();

    assert_eq!(result.status, SolveStatus::Converged);
    assert_eq!(result.states.len(), HORIZON);
    assert_eq!(result.controls.len(), HORIZON - 1);
    assert_eq!(result.controls[0].len(), 1);

    // Terminal weight 100 should park the system near the origin.
    let x_n = result.states.last().unwrap();
    assert!(x_n.norm() < 1e-2, "final state too far out: {}", x_n);

    // Exact dynamic consistency of the returned trajectory.
    assert!(max_dynamics_defect(&problem, &result) < 1e-10);

    // Accepted steps never increase the cost.
    for w in result.info.cost_history.windows(2) {
        assert!(w[1] <= w[0] + 1e-9, "cost increased: {} -> {}", w[0], w[1]);
    }
}

#[test]
fn al_and_bare_ilqr_agree_when_unconstrained() {
    // With no constraints the outer loop must be inert: the penalty
    // parameterization cannot change the answer.
    let problem = brake_to_origin();

    let a = solve(&problem, SolverOptions::default()).unwrap();

    let mut opts = SolverOptions::default();
    opts.penalty_initial = 1e6;
    opts.penalty_scaling = 2.0;
    let b = solve(&problem, opts).unwrap();

    assert_eq!(a.status, SolveStatus::Converged);
    assert_eq!(b.status, SolveStatus::Converged);
    assert!((a.cost - b.cost).abs() < 1e-12);
    for (ua, ub) in a.controls.iter().zip(b.controls.iter()) {
        assert!((ua - ub).amax() < 1e-12);
    }
    assert_eq!(a.info.outer_iters, 1);
    assert_eq!(b.info.outer_iters, 1);
}

#[test]
fn resolve_from_converged_trajectory_takes_no_steps() {
    let problem = brake_to_origin();
    let first = solve(&problem, SolverOptions::default()).unwrap();
    assert_eq!(first.status, SolveStatus::Converged);

    let mut solver = Solver::new(&problem, SolverOptions::default()).unwrap();
    solver.set_initial_controls(&first.controls).unwrap();
    let second = solver.solve();

    assert_eq!(second.status, SolveStatus::Converged);
    // The gradient test fires before any rollout: no accepted steps.
    assert!(second.info.cost_history.is_empty());
    assert!((second.cost - first.cost).abs() < 1e-9);
}

#[test]
fn control_bounds_are_enforced() {
    let mut problem = brake_to_origin();
    let u_lim = DVector::from_element(1, 0.8);
    problem
        .constraints
        .add_stage(Box::new(BoundConstraint::controls(2, &(-&u_lim), &u_lim).unwrap()));

    let mut opts = SolverOptions::default();
    opts.constraint_tolerance = 1e-5;
    let result = solve(&problem, opts).unwrap();

    assert_eq!(result.status, SolveStatus::Converged);
    let worst = result
        .controls
        .iter()
        .map(|u| (u[0].abs() - 0.8).max(0.0))
        .fold(0.0_f64, f64::max);
    assert!(worst < 1e-4, "bound violated by {}", worst);
    assert!(result.constraint_violation < 1e-5);
    assert!(result.info.penalty_max >= 1.0);
}

#[test]
fn goal_constraint_drives_terminal_error_below_tolerance() {
    let mut problem = brake_to_origin();
    problem
        .constraints
        .add_terminal(Box::new(GoalConstraint::new(DVector::zeros(2))));

    let mut opts = SolverOptions::default();
    opts.constraint_tolerance = 1e-6;
    let result = solve(&problem, opts).unwrap();

    assert_eq!(result.status, SolveStatus::Converged);
    let x_n = result.states.last().unwrap();
    assert!(x_n.norm() < 1e-5, "goal missed: {}", x_n);
}

#[test]
fn wrong_initial_control_count_is_rejected() {
    let problem = brake_to_origin();
    let mut solver = Solver::new(&problem, SolverOptions::default()).unwrap();

    // N controls instead of N−1: rejected, never truncated.
    let too_many = vec![DVector::zeros(1); HORIZON];
    assert!(solver.set_initial_controls(&too_many).is_err());

    let wrong_width = vec![DVector::zeros(2); HORIZON - 1];
    assert!(solver.set_initial_controls(&wrong_width).is_err());

    let just_right = vec![DVector::zeros(1); HORIZON - 1];
    assert!(solver.set_initial_controls(&just_right).is_ok());
}

#[test]
fn unknown_integrator_name_fails_construction() {
    assert!(Integrator::from_name("rk5").is_err());
    assert!(Integrator::from_name("").is_err());
}

#[test]
fn cancellation_returns_best_so_far() {
    let problem = brake_to_origin();
    let mut solver = Solver::new(&problem, SolverOptions::default()).unwrap();
    solver.cancel_token().cancel();

    let result = solver.solve();
    assert_eq!(result.status, SolveStatus::Cancelled);
    assert_eq!(result.states.len(), HORIZON);
    assert_eq!(result.controls.len(), HORIZON - 1);
}

#[test]
fn infeasible_start_recovers_dynamic_feasibility() {
    let problem = brake_to_origin();

    let mut opts = SolverOptions::default();
    opts.infeasible_start = true;
    opts.constraint_tolerance = 1e-5;

    let mut solver = Solver::new(&problem, opts).unwrap();

    // Straight-line state guess, not dynamically consistent.
    let x0 = DVector::from_vec(vec![1.0, 1.0]);
    let guess: Vec<DVector<f64>> = (0..HORIZON)
        .map(|k| {
            let t = k as f64 / (HORIZON - 1) as f64;
            &x0 * (1.0 - t)
        })
        .collect();
    solver.set_state_guess(&guess).unwrap();

    let result = solver.solve();
    assert_eq!(result.status, SolveStatus::Converged);

    // Slack columns are stripped from the returned controls.
    assert_eq!(result.controls[0].len(), 1);

    // The polished trajectory is a true rollout of the real dynamics.
    assert!(max_dynamics_defect(&problem, &result) < 1e-10);
}

#[test]
fn benchmark_and_cache_options_populate_info() {
    let problem = brake_to_origin();
    let mut opts = SolverOptions::default();
    opts.benchmark = true;
    opts.cache_trajectories = true;
    let result = solve(&problem, opts).unwrap();

    assert!(result.info.timing.is_some());
    assert_eq!(result.info.cached_trajectories.len(), result.info.outer_iters);
}
