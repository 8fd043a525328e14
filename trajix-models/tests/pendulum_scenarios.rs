//! Pendulum swing-up scenarios exercising the full solver stack.

use std::f64::consts::PI;

use nalgebra::DVector;
use trajix_core::{
    solve, BoundConstraint, GoalConstraint, Integrator, Problem, QuadraticCost, SolveResult,
    SolveStatus, Solver, SolverOptions,
};
use trajix_models::Pendulum;

const HORIZON: usize = 51;
const DT: f64 = 0.1;

fn goal() -> DVector<f64> {
    DVector::from_vec(vec![PI, 0.0])
}

fn swingup_problem(integrator: Integrator) -> Problem {
    let cost = QuadraticCost::diagonal(0.1, 0.1, 1000.0, goal(), 1);
    Problem::new(
        Box::new(Pendulum::default()),
        Box::new(cost),
        DVector::zeros(2),
        HORIZON,
        DT,
        integrator,
    )
    .unwrap()
}

fn terminal_error(result: &SolveResult) -> f64 {
    (result.states.last().unwrap() - goal()).norm()
}

#[test]
fn swingup_unconstrained_rk4() {
    let problem = swingup_problem(Integrator::Rk4);
    let result = solve(&problem, SolverOptions::default()).unwrap();

    assert_eq!(result.status, SolveStatus::Converged);
    assert!(
        terminal_error(&result) < 1e-3,
        "terminal error {}",
        terminal_error(&result)
    );
    assert!(result.info.inner_iters <= 100);

    // Accepted steps descend monotonically.
    for w in result.info.cost_history.windows(2) {
        assert!(w[1] <= w[0] + 1e-9);
    }
}

#[test]
fn swingup_with_control_bounds() {
    let mut problem = swingup_problem(Integrator::Rk4);
    let u_lim = DVector::from_element(1, 2.0);
    problem
        .constraints
        .add_stage(Box::new(BoundConstraint::controls(2, &(-&u_lim), &u_lim).unwrap()));

    let mut opts = SolverOptions::default();
    opts.constraint_tolerance = 1e-4;
    let result = solve(&problem, opts).unwrap();

    assert_eq!(result.status, SolveStatus::Converged);
    assert!(
        terminal_error(&result) < 1e-3,
        "terminal error {}",
        terminal_error(&result)
    );

    let worst = result
        .controls
        .iter()
        .map(|u| (u[0].abs() - 2.0).max(0.0))
        .fold(0.0_f64, f64::max);
    assert!(worst < 1e-3, "torque bound violated by {}", worst);
}

#[test]
fn swingup_with_state_bounds_and_infeasible_start() {
    let mut problem = swingup_problem(Integrator::Rk4);
    let x_lim = DVector::from_element(2, 10.0);
    let u_lim = DVector::from_element(1, 3.0);
    problem.constraints.add_stage(Box::new(
        BoundConstraint::new(&(-&x_lim), &x_lim, &(-&u_lim), &u_lim).unwrap(),
    ));

    let mut opts = SolverOptions::default();
    opts.infeasible_start = true;
    opts.constraint_tolerance = 1e-4;

    let mut solver = Solver::new(&problem, opts).unwrap();

    // Straight-line interpolation from start to goal: not dynamically
    // consistent, which is the point.
    let xf = goal();
    let guess: Vec<DVector<f64>> = (0..HORIZON)
        .map(|k| {
            let t = k as f64 / (HORIZON - 1) as f64;
            &xf * t
        })
        .collect();
    solver.set_state_guess(&guess).unwrap();

    let result = solver.solve();
    assert_eq!(result.status, SolveStatus::Converged);
    assert!(
        terminal_error(&result) < 1e-3,
        "terminal error {}",
        terminal_error(&result)
    );
    assert!(result.constraint_violation < 1e-4);

    // Slack columns must be stripped from the returned controls.
    assert_eq!(result.controls[0].len(), 1);
}

#[test]
fn swingup_with_goal_constraint() {
    let mut problem = swingup_problem(Integrator::Rk4);
    problem
        .constraints
        .add_terminal(Box::new(GoalConstraint::new(goal())));

    let mut opts = SolverOptions::default();
    opts.constraint_tolerance = 1e-5;
    let result = solve(&problem, opts).unwrap();

    assert_eq!(result.status, SolveStatus::Converged);
    // Multiplier-driven: well past what the quadratic weight alone gives.
    assert!(
        terminal_error(&result) < 1e-4,
        "terminal error {}",
        terminal_error(&result)
    );
    assert!(result.constraint_violation < 1e-5);
}

#[test]
fn unknown_integrator_is_a_construction_error() {
    let err = Integrator::from_name("rk45").unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("rk45"), "unexpected message: {}", msg);
}

#[test]
fn swingup_succeeds_across_integrators() {
    let mut costs = Vec::new();
    for integrator in [Integrator::Midpoint, Integrator::Rk3, Integrator::Rk4] {
        let problem = swingup_problem(integrator);
        let result = solve(&problem, SolverOptions::default()).unwrap();
        assert_eq!(
            result.status,
            SolveStatus::Converged,
            "{} failed",
            integrator.name()
        );
        assert!(
            terminal_error(&result) < 1e-3,
            "{}: terminal error {}",
            integrator.name(),
            terminal_error(&result)
        );
        costs.push(result.cost);
    }

    // Quadrature schemes agree on the optimum to within 10%.
    let lo = costs.iter().cloned().fold(f64::INFINITY, f64::min);
    let hi = costs.iter().cloned().fold(0.0_f64, f64::max);
    assert!(hi <= 1.1 * lo, "costs spread too wide: {:?}", costs);
}

#[test]
fn bounded_swingup_succeeds_across_integrators() {
    let mut costs = Vec::new();
    for integrator in [Integrator::Midpoint, Integrator::Rk3, Integrator::Rk4] {
        let mut problem = swingup_problem(integrator);
        let u_lim = DVector::from_element(1, 2.0);
        problem
            .constraints
            .add_stage(Box::new(BoundConstraint::controls(2, &(-&u_lim), &u_lim).unwrap()));

        let mut opts = SolverOptions::default();
        opts.constraint_tolerance = 1e-4;
        let result = solve(&problem, opts).unwrap();
        assert_eq!(
            result.status,
            SolveStatus::Converged,
            "{} failed",
            integrator.name()
        );
        costs.push(result.cost);
    }

    let lo = costs.iter().cloned().fold(f64::INFINITY, f64::min);
    let hi = costs.iter().cloned().fold(0.0_f64, f64::max);
    assert!(hi <= 1.1 * lo, "costs spread too wide: {:?}", costs);
}
