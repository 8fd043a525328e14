//! Forward-mode automatic differentiation over dual numbers.
//!
//! A [`Dual`] carries one derivative direction alongside the value, so a
//! Jacobian column is obtained by seeding one input direction and running
//! the dynamics once. Models write their equations of motion generically
//! over [`Scalar`] and get both the plain `f64` path and the AD path from
//! the same body.

use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub, SubAssign};

/// Scalar interface shared by `f64` and [`Dual`].
///
/// Covers the arithmetic and transcendental operations the built-in models
/// and integrators need. Constants enter through [`Scalar::constant`] so
/// they carry a zero derivative.
pub trait Scalar:
    Copy
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
    + AddAssign
    + SubAssign
{
    /// Lift a constant into the scalar type (zero derivative part).
    fn constant(v: f64) -> Self;

    /// The value part.
    fn value(self) -> f64;

    fn sin(self) -> Self;
    fn cos(self) -> Self;
    fn exp(self) -> Self;
    fn sqrt(self) -> Self;
    fn abs(self) -> Self;
}

impl Scalar for f64 {
    #[inline]
    fn constant(v: f64) -> Self {
        v
    }

    #[inline]
    fn value(self) -> f64 {
        self
    }

    #[inline]
    fn sin(self) -> Self {
        f64::sin(self)
    }

    #[inline]
    fn cos(self) -> Self {
        f64::cos(self)
    }

    #[inline]
    fn exp(self) -> Self {
        f64::exp(self)
    }

    #[inline]
    fn sqrt(self) -> Self {
        f64::sqrt(self)
    }

    #[inline]
    fn abs(self) -> Self {
        f64::abs(self)
    }
}

/// Dual number `re + eps·ε` with `ε² = 0`.
///
/// `eps` is the directional derivative of `re` along the seeded input
/// direction.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Dual {
    /// Value part
    pub re: f64,
    /// Derivative part
    pub eps: f64,
}

impl Dual {
    /// A constant (zero derivative).
    #[inline]
    pub fn new(re: f64) -> Self {
        Self { re, eps: 0.0 }
    }

    /// A seeded variable: value `re`, unit derivative along the active
    /// direction.
    #[inline]
    pub fn variable(re: f64) -> Self {
        Self { re, eps: 1.0 }
    }
}

impl Add for Dual {
    type Output = Dual;

    #[inline]
    fn add(self, rhs: Dual) -> Dual {
        Dual {
            re: self.re + rhs.re,
            eps: self.eps + rhs.eps,
        }
    }
}

impl Sub for Dual {
    type Output = Dual;

    #[inline]
    fn sub(self, rhs: Dual) -> Dual {
        Dual {
            re: self.re - rhs.re,
            eps: self.eps - rhs.eps,
        }
    }
}

impl Mul for Dual {
    type Output = Dual;

    #[inline]
    fn mul(self, rhs: Dual) -> Dual {
        Dual {
            re: self.re * rhs.re,
            eps: self.re * rhs.eps + self.eps * rhs.re,
        }
    }
}

impl Div for Dual {
    type Output = Dual;

    #[inline]
    fn div(self, rhs: Dual) -> Dual {
        Dual {
            re: self.re / rhs.re,
            eps: (self.eps * rhs.re - self.re * rhs.eps) / (rhs.re * rhs.re),
        }
    }
}

impl Neg for Dual {
    type Output = Dual;

    #[inline]
    fn neg(self) -> Dual {
        Dual {
            re: -self.re,
            eps: -self.eps,
        }
    }
}

impl AddAssign for Dual {
    #[inline]
    fn add_assign(&mut self, rhs: Dual) {
        *self = *self + rhs;
    }
}

impl SubAssign for Dual {
    #[inline]
    fn sub_assign(&mut self, rhs: Dual) {
        *self = *self - rhs;
    }
}

impl Scalar for Dual {
    #[inline]
    fn constant(v: f64) -> Self {
        Dual::new(v)
    }

    #[inline]
    fn value(self) -> f64 {
        self.re
    }

    #[inline]
    fn sin(self) -> Self {
        Dual {
            re: self.re.sin(),
            eps: self.eps * self.re.cos(),
        }
    }

    #[inline]
    fn cos(self) -> Self {
        Dual {
            re: self.re.cos(),
            eps: -self.eps * self.re.sin(),
        }
    }

    #[inline]
    fn exp(self) -> Self {
        let e = self.re.exp();
        Dual {
            re: e,
            eps: self.eps * e,
        }
    }

    #[inline]
    fn sqrt(self) -> Self {
        let r = self.re.sqrt();
        Dual {
            re: r,
            eps: self.eps / (2.0 * r),
        }
    }

    #[inline]
    fn abs(self) -> Self {
        if self.re < 0.0 {
            -self
        } else {
            self
        }
    }
}
