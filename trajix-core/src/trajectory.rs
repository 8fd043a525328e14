//! State/control trajectory working set.

use nalgebra::DVector;

/// A discrete trajectory: N states and N−1 controls.
///
/// The solver keeps two of these and swaps handles between them during the
/// line search, so backtracking never copies knot data.
#[derive(Debug, Clone)]
pub struct Trajectory {
    /// States x_0 .. x_{N-1}
    pub x: Vec<DVector<f64>>,
    /// Controls u_0 .. u_{N-2}
    pub u: Vec<DVector<f64>>,
}

impl Trajectory {
    /// Allocate a zeroed trajectory with N knots.
    pub fn zeros(n: usize, m: usize, horizon: usize) -> Self {
        Self {
            x: (0..horizon).map(|_| DVector::zeros(n)).collect(),
            u: (0..horizon - 1).map(|_| DVector::zeros(m)).collect(),
        }
    }

    /// Number of knot points N.
    pub fn horizon(&self) -> usize {
        self.x.len()
    }

    /// Copy states and controls from another trajectory of the same shape.
    pub fn copy_from(&mut self, other: &Trajectory) {
        for (dst, src) in self.x.iter_mut().zip(other.x.iter()) {
            dst.copy_from(src);
        }
        for (dst, src) in self.u.iter_mut().zip(other.u.iter()) {
            dst.copy_from(src);
        }
    }

    /// True when every entry of every knot is finite.
    pub fn is_finite(&self) -> bool {
        self.x.iter().all(|x| x.iter().all(|v| v.is_finite()))
            && self.u.iter().all(|u| u.iter().all(|v| v.is_finite()))
    }
}
