//! Variables stored in a [`Values`](crate::core::values::Values) container.
//!
//! A [`Variable<M>`] wraps one manifold element with its static type. To keep variables of
//! different manifold types in one container they are stored as `Box<dyn ErasedVariable>`;
//! the erased interface exposes exactly what the container needs without knowing `M`:
//!
//! - the tangent dimension, used to lay out the global tangent space
//! - retraction along a raw scalar slice, which rebuilds the typed tangent vector internally
//! - downcasting back to `Variable<M>` for typed reads and writes
//!
//! # Example
//!
//! ```
//! use apex_fusion::core::variable::{ErasedVariable, Variable};
//! use apex_fusion::manifold::Pose2;
//!
//! let mut variable: Box<dyn ErasedVariable> = Box::new(Variable::new(Pose2::new(1.0, 2.0, 0.0)));
//! assert_eq!(variable.tangent_dim(), 3);
//!
//! variable.retract_in_place(&[0.5, 0.0, 0.0]);
//! let pose = variable.as_any().downcast_ref::<Variable<Pose2>>().map(|v| *v.value());
//! assert_eq!(pose.map(|p| p.x()), Some(1.5));
//! ```

use crate::manifold::{LieGroup, Tangent};
use nalgebra::DVector;
use std::{
    any::Any,
    fmt,
    fmt::{Display, Formatter},
};

/// A manifold value with its static type.
#[derive(Clone, Debug, PartialEq)]
pub struct Variable<M: LieGroup> {
    value: M,
}

impl<M: LieGroup> Variable<M> {
    pub fn new(value: M) -> Self {
        Variable { value }
    }

    pub fn value(&self) -> &M {
        &self.value
    }

    pub fn set_value(&mut self, value: M) {
        self.value = value;
    }

    /// Tangent space dimension of the wrapped manifold.
    pub fn tangent_dim(&self) -> usize {
        self.value.tangent_dim()
    }

    /// Retract the value along `tangent`: `x ← x ∘ Exp(τ)`.
    pub fn plus(&mut self, tangent: &M::TangentVector) {
        self.value = self.value.retract(tangent, None, None);
    }
}

impl<M: LieGroup> Display for Variable<M> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

/// Object-safe view of a [`Variable<M>`] with the manifold type erased.
pub trait ErasedVariable: Display + Send + Sync {
    /// Dimension of the variable's tangent space.
    fn tangent_dim(&self) -> usize;

    /// Retract along the tangent vector whose coordinates are `direction`.
    ///
    /// # Panics
    /// If `direction` does not have exactly `tangent_dim()` entries.
    fn retract_in_place(&mut self, direction: &[f64]);

    /// Name of the stored manifold type, for diagnostics.
    fn type_name(&self) -> &'static str;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    fn clone_box(&self) -> Box<dyn ErasedVariable>;
}

impl<M: LieGroup> ErasedVariable for Variable<M> {
    fn tangent_dim(&self) -> usize {
        <M::TangentVector as Tangent<M>>::DIM
    }

    fn retract_in_place(&mut self, direction: &[f64]) {
        assert_eq!(
            direction.len(),
            self.tangent_dim(),
            "direction of length {} cannot move a {}-dimensional {}",
            direction.len(),
            self.tangent_dim(),
            std::any::type_name::<M>()
        );
        let tangent = M::TangentVector::from(DVector::from_column_slice(direction));
        self.plus(&tangent);
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<M>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn clone_box(&self) -> Box<dyn ErasedVariable> {
        Box::new(self.clone())
    }
}

impl Clone for Box<dyn ErasedVariable> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}
