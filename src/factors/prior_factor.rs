use super::{Factor, NonlinearFactor};
use crate::core::differentiable::Tracked;
use crate::core::values::Values;
use crate::manifold::LieGroup;
use nalgebra::DVector;

/// Unary factor anchoring one variable to a fixed value.
///
/// ```text
/// r = local_coordinate(prior, x) = Log(prior⁻¹ ∘ x)
/// ```
///
/// The residual has the tangent dimension of `T` and vanishes when `x == prior`.
#[derive(Debug, Clone, PartialEq)]
pub struct PriorFactor<T: LieGroup> {
    keys: [usize; 1],
    prior: T,
}

impl<T: LieGroup> PriorFactor<T> {
    pub fn new(key: usize, prior: T) -> Self {
        Self {
            keys: [key],
            prior,
        }
    }

    pub fn prior(&self) -> &T {
        &self.prior
    }
}

impl<T: LieGroup> Factor for PriorFactor<T> {
    fn keys(&self) -> &[usize] {
        &self.keys
    }
}

impl<T: LieGroup> NonlinearFactor for PriorFactor<T> {
    fn error_vector(&self, values: &Values) -> Tracked<DVector<f64>> {
        let x = values.tracked::<T>(self.keys[0]);
        Tracked::constant(self.prior.clone()).local_coordinate(&x)
    }
}
