//! Pendulum swing-up demonstrating the solver.
//!
//! Swings a damped pendulum from hanging (θ = 0) to upright (θ = π) over
//! a 5 second horizon, with quadratic tracking costs only.

use std::f64::consts::PI;

use anyhow::Context;
use nalgebra::DVector;
use trajix_core::{solve, Integrator, Problem, QuadraticCost, SolverOptions};
use trajix_models::Pendulum;

fn main() -> anyhow::Result<()> {
    println!("Trajix - Pendulum Swing-Up");
    println!("==========================");
    println!();

    let goal = DVector::from_vec(vec![PI, 0.0]);
    let cost = QuadraticCost::diagonal(0.1, 0.1, 1000.0, goal.clone(), 1);

    let problem = Problem::new(
        Box::new(Pendulum::default()),
        Box::new(cost),
        DVector::zeros(2),
        51,
        0.1,
        Integrator::Rk4,
    )
    .context("building problem")?;

    let mut options = SolverOptions::default();
    options.verbose = true;

    let result = solve(&problem, options).context("running solver")?;

    println!();
    println!("Status:          {}", result.status);
    println!("Objective:       {:.6}", result.cost);
    println!("Inner iters:     {}", result.info.inner_iters);
    println!("Solve time:      {} ms", result.info.solve_time_ms);

    let x_n = result.states.last().unwrap();
    println!(
        "Terminal state:  [{:.6}, {:.6}] (goal [{:.6}, 0])",
        x_n[0], x_n[1], PI
    );
    println!("Terminal error:  {:.3e}", (x_n - goal).norm());

    Ok(())
}
