//! Model fixtures for the Trajix solver.
//!
//! Small robotics models with the dynamics written once, generically over
//! the solver's scalar type, so the same body serves the plain evaluation
//! path and the forward-mode Jacobian path. The pendulum and double
//! integrator also carry analytic Jacobians, exercising both
//! linearization routes.

pub mod cartpole;
pub mod double_integrator;
pub mod pendulum;
pub mod quadrotor;

pub use cartpole::CartPole;
pub use double_integrator::DoubleIntegrator;
pub use pendulum::Pendulum;
pub use quadrotor::PlanarQuadrotor;
