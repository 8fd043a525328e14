//! Torque-limited swing-up with an exact terminal condition.
//!
//! Adds |τ| ≤ 2 bounds and a terminal equality x_N = x_f on top of the
//! quadratic swing-up cost, then reports how hard the limits were pushed.

use std::f64::consts::PI;

use anyhow::Context;
use nalgebra::DVector;
use trajix_core::{
    solve, BoundConstraint, GoalConstraint, Integrator, Problem, QuadraticCost, SolverOptions,
};
use trajix_models::Pendulum;

fn main() -> anyhow::Result<()> {
    println!("Trajix - Constrained Pendulum Swing-Up");
    println!("======================================");
    println!();

    let goal = DVector::from_vec(vec![PI, 0.0]);
    let cost = QuadraticCost::diagonal(0.1, 0.1, 1000.0, goal.clone(), 1);

    let mut problem = Problem::new(
        Box::new(Pendulum::default()),
        Box::new(cost),
        DVector::zeros(2),
        51,
        0.1,
        Integrator::Rk4,
    )
    .context("building problem")?;

    let torque_limit = DVector::from_element(1, 2.0);
    problem.constraints.add_stage(Box::new(
        BoundConstraint::controls(2, &(-&torque_limit), &torque_limit)
            .context("building torque bounds")?,
    ));
    problem
        .constraints
        .add_terminal(Box::new(GoalConstraint::new(goal.clone())));

    let mut options = SolverOptions::default();
    options.verbose = true;
    options.constraint_tolerance = 1e-5;

    let result = solve(&problem, options).context("running solver")?;

    println!();
    println!("Status:           {}", result.status);
    println!("Objective:        {:.6}", result.cost);
    println!("Max violation:    {:.3e}", result.constraint_violation);
    println!("Outer iterations: {}", result.info.outer_iters);

    let saturated = result
        .controls
        .iter()
        .filter(|u| u[0].abs() > 2.0 - 1e-3)
        .count();
    println!(
        "Saturated knots:  {} of {}",
        saturated,
        result.controls.len()
    );

    let x_n = result.states.last().unwrap();
    println!("Terminal error:   {:.3e}", (x_n - goal).norm());

    Ok(())
}
