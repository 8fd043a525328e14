//! Solve-time hooks: observers, verbose printing, env diagnostics, and
//! cooperative cancellation.
//!
//! Observers fire at inner- and outer-iteration boundaries only; no I/O
//! happens inside the numerical phases.

use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Snapshot of one accepted inner (iLQR) iteration.
#[derive(Debug, Clone, Copy)]
pub struct InnerIteration {
    /// Total inner iteration index across the whole solve
    pub iter: usize,
    /// Outer iteration this inner solve belongs to
    pub outer_iter: usize,
    /// Augmented cost after the accepted step
    pub cost: f64,
    /// Cost reduction achieved by the step
    pub cost_decrease: f64,
    /// Feedforward gradient surrogate max_k ‖d_k‖∞
    pub gradient: f64,
    /// Accepted step size α
    pub alpha: f64,
    /// Current regularization ρ
    pub rho: f64,
}

/// Snapshot of one completed outer (augmented Lagrangian) iteration.
#[derive(Debug, Clone, Copy)]
pub struct OuterIteration {
    pub iter: usize,
    /// Unaugmented objective at the inner solution
    pub cost: f64,
    /// Maximum constraint violation
    pub c_max: f64,
    /// Largest penalty weight in use
    pub penalty_max: f64,
    /// Whether the inner solve converged
    pub inner_converged: bool,
}

/// Observer callbacks fired between iterations.
pub trait SolveObserver {
    fn on_inner_iteration(&mut self, _info: &InnerIteration) {}
    fn on_outer_iteration(&mut self, _info: &OuterIteration) {}
}

/// The `verbose` iteration table.
pub struct VerbosePrinter {
    log_every: usize,
    header_printed: bool,
}

impl VerbosePrinter {
    pub fn new(log_every: usize) -> Self {
        Self {
            log_every: log_every.max(1),
            header_printed: false,
        }
    }

    fn header(&mut self) {
        if !self.header_printed {
            println!(
                "{:>5} {:>5} {:>14} {:>12} {:>10} {:>8} {:>10}",
                "iter", "outer", "cost", "ΔJ", "|d|∞", "α", "ρ"
            );
            println!("{}", "-".repeat(70));
            self.header_printed = true;
        }
    }
}

impl SolveObserver for VerbosePrinter {
    fn on_inner_iteration(&mut self, info: &InnerIteration) {
        if info.iter % self.log_every != 0 {
            return;
        }
        self.header();
        println!(
            "{:>5} {:>5} {:>14.6e} {:>12.4e} {:>10.3e} {:>8.4} {:>10.3e}",
            info.iter,
            info.outer_iter,
            info.cost,
            info.cost_decrease,
            info.gradient,
            info.alpha,
            info.rho,
        );
    }

    fn on_outer_iteration(&mut self, info: &OuterIteration) {
        self.header();
        println!(
            "outer {:>3}: cost={:.6e} c_max={:.3e} mu_max={:.1e} inner_converged={}",
            info.iter, info.cost, info.c_max, info.penalty_max, info.inner_converged
        );
    }
}

/// Env-gated debug channel, independent of `verbose`.
#[derive(Debug, Clone)]
pub struct DiagnosticsConfig {
    pub enabled: bool,
    pub every: usize,
}

impl DiagnosticsConfig {
    pub fn from_env() -> Self {
        let enabled = match env::var("TRAJIX_DIAGNOSTICS") {
            Ok(v) => v != "0" && v.to_lowercase() != "false",
            Err(_) => false,
        };

        let every = env::var("TRAJIX_DIAGNOSTICS_EVERY")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|&v| v > 0)
            .unwrap_or(1);

        Self { enabled, every }
    }

    #[inline]
    pub fn should_log(&self, iter: usize) -> bool {
        self.enabled && (iter % self.every == 0)
    }
}

/// Cooperative cancellation handle.
///
/// Cloneable and sharable across threads; the solver checks it between
/// inner and between outer iterations and returns the best trajectory
/// seen so far with a `Cancelled` status.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}
