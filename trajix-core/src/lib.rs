//! Trajix: constrained trajectory optimization for robotics-scale
//! problems.
//!
//! Solves finite-horizon, discrete-time optimal control problems
//!
//! ```text
//! minimize    Σₖ l_k(x_k, u_k) + l_f(x_N)
//! subject to  x_{k+1} = f_d(x_k, u_k, Δt),  x_0 = x_init
//!             g_k(x_k, u_k) ≤ 0,  h_k(x_k, u_k) = 0
//! ```
//!
//! with a two-level method:
//!
//! - **Inner iLQR**: a Gauss–Newton DDP variant — backward Riccati sweep
//!   with control-Hessian regularization, then a line-searched closed-loop
//!   rollout.
//! - **Outer augmented Lagrangian**: folds every constraint into the stage
//!   cost through multipliers and penalties, updating both between inner
//!   solves until the worst violation is within tolerance.
//!
//! An **infeasible start** mode accepts an arbitrary state guess, makes it
//! dynamically consistent with per-step slack controls, and squeezes the
//! slacks to zero through equality constraints.
//!
//! # Example
//!
//! ```ignore
//! use nalgebra::DVector;
//! use trajix_core::{solve, Integrator, Problem, QuadraticCost, SolverOptions};
//!
//! let cost = QuadraticCost::diagonal(0.1, 0.1, 1000.0, goal_state, 1);
//! let problem = Problem::new(
//!     Box::new(Pendulum::default()),
//!     Box::new(cost),
//!     DVector::zeros(2),
//!     51,
//!     0.1,
//!     Integrator::Rk4,
//! )?;
//!
//! let result = solve(&problem, SolverOptions::default())?;
//! println!("status: {}", result.status);
//! println!("final state: {}", result.states.last().unwrap());
//! ```

#![warn(clippy::all)]
#![allow(clippy::too_many_arguments)] // solver loops carry many buffers

pub mod al;
pub mod constraints;
pub mod costs;
pub mod error;
pub mod ilqr;
pub mod model;
pub mod observer;
pub mod problem;
pub mod trajectory;

pub use al::Solver;
pub use constraints::{
    BoundConstraint, ConstraintKind, ConstraintSet, GoalConstraint, StageConstraint,
    TerminalConstraint,
};
pub use costs::{CostFunction, QuadraticCost, StageExpansion};
pub use error::{Result, SolverError};
pub use model::{Dual, Integrator, Linearizer, Model, Scalar};
pub use observer::{CancelToken, InnerIteration, OuterIteration, SolveObserver};
pub use problem::{Problem, SolveInfo, SolveResult, SolveStatus, SolverOptions};
pub use trajectory::Trajectory;

/// One-shot solve entry point.
///
/// Builds a [`Solver`], runs it, and returns the result. Construction
/// errors (invalid dimensions, unknown options) surface here; numerical
/// failures surface as the result's status.
pub fn solve(problem: &Problem, options: SolverOptions) -> Result<SolveResult> {
    let mut solver = Solver::new(problem, options)?;
    Ok(solver.solve())
}
