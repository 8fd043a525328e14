//! Problem data, solver options, and result types.

use std::fmt;

use nalgebra::DVector;

use crate::constraints::ConstraintSet;
use crate::costs::CostFunction;
use crate::error::{Result, SolverError};
use crate::model::{Integrator, Model};

/// A trajectory optimization problem.
///
/// ```text
/// minimize    Σₖ l_k(x_k, u_k) + l_f(x_N)
/// subject to  x_{k+1} = f_d(x_k, u_k, Δt),  x_0 = x_init
///             g_k(x_k, u_k) ≤ 0,  h_k(x_k, u_k) = 0
/// ```
///
/// Immutable once a solver starts: the solver borrows the problem and
/// keeps all mutable working state in its own instance.
pub struct Problem {
    /// Dynamics oracle
    pub model: Box<dyn Model>,

    /// Cost oracle (stage + terminal)
    pub objective: Box<dyn CostFunction>,

    /// Stage and terminal constraints
    pub constraints: ConstraintSet,

    /// Initial state x_0 (dimension n)
    pub x_init: DVector<f64>,

    /// Number of knot points N (states; N−1 controls)
    pub horizon: usize,

    /// Step size Δt
    pub dt: f64,

    /// Quadrature rule, fixed at construction
    pub integrator: Integrator,
}

impl Problem {
    /// Build an unconstrained problem, validating dimensions.
    pub fn new(
        model: Box<dyn Model>,
        objective: Box<dyn CostFunction>,
        x_init: DVector<f64>,
        horizon: usize,
        dt: f64,
        integrator: Integrator,
    ) -> Result<Self> {
        let prob = Self {
            model,
            objective,
            constraints: ConstraintSet::new(),
            x_init,
            horizon,
            dt,
            integrator,
        };
        prob.validate()?;
        Ok(prob)
    }

    /// State dimension n.
    pub fn state_dim(&self) -> usize {
        self.model.state_dim()
    }

    /// Control dimension m (without infeasible-mode slacks).
    pub fn control_dim(&self) -> usize {
        self.model.control_dim()
    }

    /// Validate dimensions and scalar parameters.
    pub fn validate(&self) -> Result<()> {
        let n = self.model.state_dim();
        let m = self.model.control_dim();

        if n == 0 {
            return Err(SolverError::InvalidInput(
                "model has zero state dimension".into(),
            ));
        }
        if m == 0 {
            return Err(SolverError::InvalidInput(
                "model has zero control dimension".into(),
            ));
        }
        if self.x_init.len() != n {
            return Err(SolverError::InvalidInput(format!(
                "initial state has {} entries, expected {}",
                self.x_init.len(),
                n
            )));
        }
        if self.horizon < 2 {
            return Err(SolverError::InvalidInput(format!(
                "horizon must be at least 2 knots, got {}",
                self.horizon
            )));
        }
        if !(self.dt.is_finite() && self.dt > 0.0) {
            return Err(SolverError::InvalidInput(format!(
                "step size must be positive and finite, got {}",
                self.dt
            )));
        }
        if !self.x_init.iter().all(|v| v.is_finite()) {
            return Err(SolverError::InvalidInput(
                "initial state contains non-finite entries".into(),
            ));
        }
        Ok(())
    }
}

/// Solver options and tolerances.
///
/// Defaults follow the reference parameterization; every field is also
/// reachable through [`SolverOptions::set`] by its documented key, and
/// unknown keys fail at construction time.
#[derive(Debug, Clone)]
pub struct SolverOptions {
    // === Inner (iLQR) termination ===
    /// Cost-change tolerance for the final inner solve (`cost_tolerance`)
    pub cost_tolerance: f64,

    /// Cost-change tolerance while constraints are still coarse
    /// (`cost_tolerance_intermediate`)
    pub cost_tolerance_intermediate: f64,

    /// Feedforward-gradient tolerance max_k ‖d_k‖∞ (`gradient_tolerance`)
    pub gradient_tolerance: f64,

    /// Maximum inner iterations per iLQR solve (`iterations`)
    pub iterations: usize,

    // === Outer (augmented Lagrangian) loop ===
    /// Maximum constraint violation at exit (`constraint_tolerance`)
    pub constraint_tolerance: f64,

    /// Maximum outer iterations (`iterations_outerloop`)
    pub iterations_outerloop: usize,

    /// Initial penalty weight μ₀ (`penalty_initial`)
    pub penalty_initial: f64,

    /// Penalty scaling factor φ per outer update (`penalty_scaling`)
    pub penalty_scaling: f64,

    /// Penalty ceiling (`penalty_max`)
    pub penalty_max: f64,

    // === Backward-pass regularization ===
    /// Initial ρ (`bp_reg_initial`)
    pub bp_reg_initial: f64,

    /// Multiplicative ρ step factor (`bp_reg_increase_factor`)
    pub bp_reg_increase_factor: f64,

    /// Fatal ρ ceiling (`bp_reg_max`)
    pub bp_reg_max: f64,

    /// ρ floor when nonzero (`bp_reg_min`)
    pub bp_reg_min: f64,

    // === Line search ===
    /// Sufficient-decrease lower ratio c₁ (`line_search_lower`)
    pub line_search_lower: f64,

    /// Sufficient-decrease upper ratio c₂ (`line_search_upper`)
    pub line_search_upper: f64,

    /// Maximum step bisections (`iterations_linesearch`)
    pub iterations_linesearch: usize,

    // === Modes ===
    /// Square-root backward pass. Not implemented: `true` is rejected at
    /// construction rather than silently ignored (`square_root`)
    pub square_root: bool,

    /// Infeasible start: augment controls with state slacks
    /// (`infeasible_start`)
    pub infeasible_start: bool,

    /// Penalty on the slack-equality rows (`penalty_initial_infeasible`)
    pub penalty_initial_infeasible: f64,

    /// Quadratic effort weight on slack controls
    /// (`infeasible_control_cost`)
    pub infeasible_control_cost: f64,

    // === Diagnostics ===
    /// Print an iteration table (`verbose`)
    pub verbose: bool,

    /// Print every k-th inner iteration when verbose (`log_every`)
    pub log_every: usize,

    /// Snapshot the trajectory after each outer iteration
    /// (`cache_trajectories`)
    pub cache_trajectories: bool,

    /// Collect per-phase timing (`benchmark`)
    pub benchmark: bool,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            cost_tolerance: 1e-5,
            cost_tolerance_intermediate: 1e-2,
            gradient_tolerance: 1e-5,
            iterations: 100,
            constraint_tolerance: 1e-2,
            iterations_outerloop: 25,
            penalty_initial: 1.0,
            penalty_scaling: 100.0,
            penalty_max: 1e8,
            bp_reg_initial: 0.0,
            bp_reg_increase_factor: 1.6,
            bp_reg_max: 1e8,
            bp_reg_min: 1e-8,
            line_search_lower: 1e-4,
            line_search_upper: 10.0,
            iterations_linesearch: 25,
            square_root: false,
            infeasible_start: false,
            penalty_initial_infeasible: 1e3,
            infeasible_control_cost: 1.0,
            verbose: false,
            log_every: 1,
            cache_trajectories: false,
            benchmark: false,
        }
    }
}

impl SolverOptions {
    /// Set an option by key. Boolean options take 0.0/1.0. Unknown keys
    /// are an error, surfaced before any solver state exists.
    pub fn set(&mut self, key: &str, value: f64) -> Result<()> {
        match key {
            "cost_tolerance" => self.cost_tolerance = value,
            "cost_tolerance_intermediate" => self.cost_tolerance_intermediate = value,
            "gradient_tolerance" => self.gradient_tolerance = value,
            "iterations" => self.iterations = value as usize,
            "constraint_tolerance" => self.constraint_tolerance = value,
            "iterations_outerloop" => self.iterations_outerloop = value as usize,
            "penalty_initial" => self.penalty_initial = value,
            "penalty_scaling" => self.penalty_scaling = value,
            "penalty_max" => self.penalty_max = value,
            "bp_reg_initial" => self.bp_reg_initial = value,
            "bp_reg_increase_factor" => self.bp_reg_increase_factor = value,
            "bp_reg_max" => self.bp_reg_max = value,
            "bp_reg_min" => self.bp_reg_min = value,
            "line_search_lower" => self.line_search_lower = value,
            "line_search_upper" => self.line_search_upper = value,
            "iterations_linesearch" => self.iterations_linesearch = value as usize,
            "square_root" => self.square_root = value != 0.0,
            "infeasible_start" => self.infeasible_start = value != 0.0,
            "penalty_initial_infeasible" => self.penalty_initial_infeasible = value,
            "infeasible_control_cost" => self.infeasible_control_cost = value,
            "verbose" => self.verbose = value != 0.0,
            "log_every" => self.log_every = (value as usize).max(1),
            "cache_trajectories" => self.cache_trajectories = value != 0.0,
            "benchmark" => self.benchmark = value != 0.0,
            other => {
                return Err(SolverError::InvalidInput(format!(
                    "unknown solver option '{}'",
                    other
                )))
            }
        }
        Ok(())
    }

    /// Validate option values. Called once when the solver is built.
    pub fn validate(&self) -> Result<()> {
        if self.square_root {
            return Err(SolverError::InvalidInput(
                "square_root backward pass is not implemented; \
                 set square_root = false"
                    .into(),
            ));
        }
        for (name, v) in [
            ("cost_tolerance", self.cost_tolerance),
            (
                "cost_tolerance_intermediate",
                self.cost_tolerance_intermediate,
            ),
            ("gradient_tolerance", self.gradient_tolerance),
            ("constraint_tolerance", self.constraint_tolerance),
            ("penalty_initial", self.penalty_initial),
            ("penalty_initial_infeasible", self.penalty_initial_infeasible),
        ] {
            if !(v.is_finite() && v > 0.0) {
                return Err(SolverError::InvalidInput(format!(
                    "{} must be positive and finite, got {}",
                    name, v
                )));
            }
        }
        if self.penalty_scaling <= 1.0 {
            return Err(SolverError::InvalidInput(format!(
                "penalty_scaling must exceed 1, got {}",
                self.penalty_scaling
            )));
        }
        if self.bp_reg_increase_factor <= 1.0 {
            return Err(SolverError::InvalidInput(format!(
                "bp_reg_increase_factor must exceed 1, got {}",
                self.bp_reg_increase_factor
            )));
        }
        if self.bp_reg_initial < 0.0 || self.bp_reg_min < 0.0 {
            return Err(SolverError::InvalidInput(
                "backward-pass regularization must be nonnegative".into(),
            ));
        }
        if self.line_search_lower >= self.line_search_upper {
            return Err(SolverError::InvalidInput(format!(
                "line_search_lower {} must be below line_search_upper {}",
                self.line_search_lower, self.line_search_upper
            )));
        }
        if self.iterations == 0 || self.iterations_outerloop == 0 || self.iterations_linesearch == 0
        {
            return Err(SolverError::InvalidInput(
                "iteration limits must be positive".into(),
            ));
        }
        if self.infeasible_control_cost < 0.0 {
            return Err(SolverError::InvalidInput(
                "infeasible_control_cost must be nonnegative".into(),
            ));
        }
        Ok(())
    }
}

/// Termination status of a solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveStatus {
    /// Inner solver converged and all constraints are within tolerance
    Converged,

    /// Inner iteration limit reached before convergence
    MaxIterations,

    /// No acceptable step found after repeated backtracking and
    /// regularization retries
    LineSearchFailure,

    /// Backward pass could not restore positive definiteness below the
    /// regularization ceiling
    RegularizationMax,

    /// Outer loop exhausted with constraints still above tolerance
    ConstraintViolation,

    /// Cooperative cancellation observed; best trajectory so far returned
    Cancelled,
}

impl SolveStatus {
    /// Statuses that abort the outer loop immediately.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SolveStatus::LineSearchFailure | SolveStatus::RegularizationMax
        )
    }
}

impl fmt::Display for SolveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolveStatus::Converged => write!(f, "Converged"),
            SolveStatus::MaxIterations => write!(f, "MaxIterations"),
            SolveStatus::LineSearchFailure => write!(f, "LineSearchFailure"),
            SolveStatus::RegularizationMax => write!(f, "RegularizationMax"),
            SolveStatus::ConstraintViolation => write!(f, "ConstraintViolation"),
            SolveStatus::Cancelled => write!(f, "Cancelled"),
        }
    }
}

/// Solve result: the trajectory plus diagnostics.
#[derive(Debug, Clone)]
pub struct SolveResult {
    pub status: SolveStatus,

    /// States x_0 .. x_{N-1}
    pub states: Vec<DVector<f64>>,

    /// Controls u_0 .. u_{N-2}, slack columns stripped
    pub controls: Vec<DVector<f64>>,

    /// Final objective value (unaugmented)
    pub cost: f64,

    /// Final maximum constraint violation c_max
    pub constraint_violation: f64,

    pub info: SolveInfo,
}

/// Detailed solve information.
#[derive(Debug, Clone, Default)]
pub struct SolveInfo {
    /// Total inner (iLQR) iterations across all outer iterations
    pub inner_iters: usize,

    /// Outer (augmented Lagrangian) iterations completed
    pub outer_iters: usize,

    /// Cost after each accepted inner iteration
    pub cost_history: Vec<f64>,

    /// c_max after each outer iteration
    pub constraint_history: Vec<f64>,

    /// Final backward-pass regularization ρ
    pub rho_final: f64,

    /// Largest penalty weight reached
    pub penalty_max: f64,

    /// Wall-clock solve time
    pub solve_time_ms: u64,

    /// Per-phase timing, populated when `benchmark` is set
    pub timing: Option<PhaseTiming>,

    /// Trajectory snapshots per outer iteration, populated when
    /// `cache_trajectories` is set
    pub cached_trajectories: Vec<(Vec<DVector<f64>>, Vec<DVector<f64>>)>,
}

/// Time spent in each solver phase (milliseconds).
#[derive(Debug, Clone, Copy, Default)]
pub struct PhaseTiming {
    pub expansion_ms: u64,
    pub backward_ms: u64,
    pub forward_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_option_key_is_rejected() {
        let mut opts = SolverOptions::default();
        assert!(opts.set("cost_tolerance", 1e-6).is_ok());
        assert!((opts.cost_tolerance - 1e-6).abs() < 1e-15);
        assert!(opts.set("cost_tolerence", 1e-6).is_err());
        assert!(opts.set("max_iter", 10.0).is_err());
    }

    #[test]
    fn square_root_option_is_rejected_not_ignored() {
        let mut opts = SolverOptions::default();
        opts.set("square_root", 1.0).unwrap();
        assert!(opts.validate().is_err());
    }

    #[test]
    fn default_options_validate() {
        assert!(SolverOptions::default().validate().is_ok());
    }

    #[test]
    fn degenerate_scalars_are_rejected() {
        let mut opts = SolverOptions::default();
        opts.penalty_scaling = 1.0;
        assert!(opts.validate().is_err());

        let mut opts = SolverOptions::default();
        opts.cost_tolerance = 0.0;
        assert!(opts.validate().is_err());

        let mut opts = SolverOptions::default();
        opts.line_search_lower = 2.0;
        opts.line_search_upper = 1.0;
        assert!(opts.validate().is_err());
    }

    #[test]
    fn status_display_is_stable() {
        assert_eq!(SolveStatus::Converged.to_string(), "Converged");
        assert_eq!(
            SolveStatus::ConstraintViolation.to_string(),
            "ConstraintViolation"
        );
        assert!(SolveStatus::RegularizationMax.is_fatal());
        assert!(!SolveStatus::MaxIterations.is_fatal());
    }
}
