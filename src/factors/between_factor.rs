//! Relative-measurement factor between two variables of the same group.
//!
//! Used for odometry edges and loop closures: the measurement `z` is the expected value of
//! `x₁⁻¹ ∘ x₂`, and the residual is its tangent-space discrepancy
//!
//! ```text
//! r = local_coordinate(z, x₁⁻¹ ∘ x₂) = Log(z⁻¹ ∘ x₁⁻¹ ∘ x₂)
//! ```
//!
//! For a perfect measurement `r = 0`. Small rotations of the chain show up in the angular
//! components of `r`, translations in the linear ones (translation-first tangent layout).
//!
//! # Example
//!
//! ```
//! use apex_fusion::core::values::Values;
//! use apex_fusion::factors::{BetweenFactor, NonlinearFactor};
//! use apex_fusion::manifold::Pose2;
//!
//! let mut values = Values::new();
//! values.insert(0, Pose2::new(0.0, 0.0, 0.0));
//! values.insert(1, Pose2::new(1.0, 0.0, 0.0));
//!
//! let odometry = BetweenFactor::new(0, 1, Pose2::new(1.0, 0.0, 0.0));
//! assert!(odometry.error(&values) < 1e-20);
//! ```

use super::{Factor, NonlinearFactor};
use crate::core::differentiable::Tracked;
use crate::core::values::Values;
use crate::manifold::LieGroup;
use nalgebra::DVector;

/// Binary factor constraining `x₁⁻¹ ∘ x₂` to a measured relative value.
#[derive(Debug, Clone, PartialEq)]
pub struct BetweenFactor<T: LieGroup> {
    keys: [usize; 2],
    measured: T,
}

impl<T: LieGroup> BetweenFactor<T> {
    /// Factor measuring `x[first]⁻¹ ∘ x[second] ≈ measured`.
    pub fn new(first: usize, second: usize, measured: T) -> Self {
        Self {
            keys: [first, second],
            measured,
        }
    }

    pub fn measured(&self) -> &T {
        &self.measured
    }
}

impl<T: LieGroup> Factor for BetweenFactor<T> {
    fn keys(&self) -> &[usize] {
        &self.keys
    }
}

impl<T: LieGroup> NonlinearFactor for BetweenFactor<T> {
    fn error_vector(&self, values: &Values) -> Tracked<DVector<f64>> {
        let first = values.tracked::<T>(self.keys[0]);
        let second = values.tracked::<T>(self.keys[1]);
        let relative = first.between(&second);
        Tracked::constant(self.measured.clone()).local_coordinate(&relative)
    }
}
