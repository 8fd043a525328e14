//! Backward-pass regularization schedule.
//!
//! ρ is added to the diagonal of Q_uu before factorization. The schedule
//! is multiplicative with momentum: the step factor dρ grows while
//! factorizations keep failing and shrinks again on success, so recovery
//! from an indefinite stretch is fast without leaving ρ inflated.

/// Regularization policy: the fixed parameters.
#[derive(Debug, Clone, Copy)]
pub struct RegularizationPolicy {
    /// Multiplicative step factor φ
    pub increase_factor: f64,
    /// ρ floor when nonzero; below it ρ snaps to zero on decrease
    pub rho_min: f64,
    /// Fatal ceiling: exceeding it fails the solve
    pub rho_max: f64,
}

/// Regularization state: current ρ and its momentum factor dρ.
#[derive(Debug, Clone, Copy)]
pub struct Regularization {
    policy: RegularizationPolicy,
    rho: f64,
    d_rho: f64,
}

impl Regularization {
    pub fn new(initial: f64, policy: RegularizationPolicy) -> Self {
        Self {
            policy,
            rho: initial,
            d_rho: 1.0,
        }
    }

    #[inline]
    pub fn rho(&self) -> f64 {
        self.rho
    }

    /// Increase ρ after a failed factorization or line search.
    pub fn increase(&mut self) {
        let phi = self.policy.increase_factor;
        self.d_rho = (self.d_rho * phi).max(phi);
        self.rho = (self.rho * self.d_rho).max(self.policy.rho_min);
    }

    /// Decrease ρ after an accepted step.
    pub fn decrease(&mut self) {
        let phi = self.policy.increase_factor;
        self.d_rho = (self.d_rho / phi).min(1.0 / phi);
        self.rho *= self.d_rho;
        if self.rho < self.policy.rho_min {
            self.rho = 0.0;
        }
    }

    /// True once ρ has escalated past the fatal ceiling.
    #[inline]
    pub fn exhausted(&self) -> bool {
        self.rho > self.policy.rho_max
    }
}
