//! Heterogeneous store of manifold variables.
//!
//! [`Values`] maps integer keys to variables of any [`LieGroup`] type and lays their tangent
//! spaces out one after another in insertion order:
//!
//! ```text
//! key:      x1 (Pose2)   l1 (Vector2)   x2 (Pose3)
//! tangent:  [0, 3)       [3, 5)         [5, 11)        tangent_dimension = 11
//! ```
//!
//! The partition is append-only: variables are never removed, so offsets stay valid for the
//! lifetime of the store. Reading a variable through [`Values::tracked`] yields a
//! [`Tracked`] value whose pullback lands exactly in that variable's slice, and
//! [`Values::move_along`] retracts every variable along its own slice of a global step.
//!
//! # Example
//!
//! ```
//! use apex_fusion::core::values::Values;
//! use apex_fusion::linalg::BlockVector;
//! use apex_fusion::manifold::{Pose2, Vector2};
//!
//! let mut values = Values::new();
//! values.insert(1, Pose2::new(0.0, 0.0, 0.0));
//! values.insert(7, Vector2::new([1.0, 2.0]));
//! assert_eq!(values.tangent_dimension(), 5);
//!
//! values.move_along(&BlockVector::new(vec![1.0, 0.0, 0.0, 0.5, 0.5]));
//! assert_eq!(values.get::<Vector2>(7), &Vector2::new([1.5, 2.5]));
//! ```

use crate::core::differentiable::Tracked;
use crate::core::variable::{ErasedVariable, Variable};
use crate::core::{CoreError, CoreResult};
use crate::linalg::BlockVector;
use crate::manifold::LieGroup;
use nalgebra::DVector;
use std::{
    collections::HashMap,
    fmt,
    fmt::{Display, Formatter},
    ops::Range,
};
use tracing::trace;

/// Ordered, append-only map from key to type-erased manifold variable.
#[derive(Clone, Default)]
pub struct Values {
    variables: Vec<Box<dyn ErasedVariable>>,
    /// key → index into `variables`
    value_indices: HashMap<usize, usize>,
    keys: Vec<usize>,
    tangent_offsets: Vec<Range<usize>>,
    tangent_dimension: usize,
}

impl Values {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a variable under a fresh key.
    ///
    /// # Panics
    /// If `key` is already present.
    pub fn insert<M: LieGroup>(&mut self, key: usize, value: M) {
        if let Err(e) = self.try_insert(key, value) {
            panic!("{e}");
        }
    }

    /// Fallible twin of [`Values::insert`].
    pub fn try_insert<M: LieGroup>(&mut self, key: usize, value: M) -> CoreResult<()> {
        if self.value_indices.contains_key(&key) {
            return Err(CoreError::DuplicateKey(key));
        }
        let variable = Variable::new(value);
        let dim = ErasedVariable::tangent_dim(&variable);
        let range = self.tangent_dimension..self.tangent_dimension + dim;
        trace!("Values: key {} -> tangent {:?}", key, range);

        self.value_indices.insert(key, self.variables.len());
        self.variables.push(Box::new(variable));
        self.keys.push(key);
        self.tangent_offsets.push(range);
        self.tangent_dimension += dim;
        Ok(())
    }

    /// Typed read.
    ///
    /// # Panics
    /// If `key` is absent or was inserted with a type other than `M`.
    pub fn get<M: LieGroup>(&self, key: usize) -> &M {
        match self.try_get(key) {
            Ok(value) => value,
            Err(e) => panic!("{e}"),
        }
    }

    /// Fallible twin of [`Values::get`].
    pub fn try_get<M: LieGroup>(&self, key: usize) -> CoreResult<&M> {
        let index = self.index_of(key)?;
        self.variables[index]
            .as_any()
            .downcast_ref::<Variable<M>>()
            .map(Variable::value)
            .ok_or_else(|| self.type_mismatch::<M>(key, index))
    }

    /// Typed write.
    ///
    /// # Panics
    /// If `key` is absent or was inserted with a type other than `M`.
    pub fn set<M: LieGroup>(&mut self, key: usize, value: M) {
        if let Err(e) = self.try_set(key, value) {
            panic!("{e}");
        }
    }

    /// Fallible twin of [`Values::set`].
    pub fn try_set<M: LieGroup>(&mut self, key: usize, value: M) -> CoreResult<()> {
        let index = self.index_of(key)?;
        let mismatch = self.type_mismatch::<M>(key, index);
        let variable = self.variables[index]
            .as_any_mut()
            .downcast_mut::<Variable<M>>()
            .ok_or(mismatch)?;
        variable.set_value(value);
        Ok(())
    }

    /// Differentiable read: the pullback of a cotangent `c` is `c` placed at this variable's
    /// tangent slice.
    ///
    /// # Panics
    /// If `key` is absent or was inserted with a type other than `M`.
    pub fn tracked<M: LieGroup>(&self, key: usize) -> Tracked<M> {
        match self.try_tracked(key) {
            Ok(value) => value,
            Err(e) => panic!("{e}"),
        }
    }

    /// Fallible twin of [`Values::tracked`].
    pub fn try_tracked<M: LieGroup>(&self, key: usize) -> CoreResult<Tracked<M>> {
        let value = self.try_get::<M>(key)?.clone();
        let range = self.tangent_offsets[self.index_of(key)?].clone();
        Ok(Tracked::new(value, move |c: &DVector<f64>| {
            BlockVector::with_indices(c.as_slice().to_vec(), range.clone())
        }))
    }

    /// Retract every variable along its slice of `direction`.
    ///
    /// # Panics
    /// If `direction` is not a single block spanning `[0, tangent_dimension())`.
    pub fn move_along(&mut self, direction: &BlockVector) {
        if let Err(e) = self.try_move_along(direction) {
            panic!("{e}");
        }
    }

    /// Fallible twin of [`Values::move_along`].
    pub fn try_move_along(&mut self, direction: &BlockVector) -> CoreResult<()> {
        if !direction.spans_exactly(self.tangent_dimension) {
            return Err(CoreError::MalformedDirection(format!(
                "expected one block covering [0, {}), got blocks {:?}",
                self.tangent_dimension,
                direction.block_indices()
            )));
        }
        let scalars = direction.scalars();
        for (variable, range) in self.variables.iter_mut().zip(&self.tangent_offsets) {
            variable.retract_in_place(&scalars[range.clone()]);
        }
        Ok(())
    }

    pub fn contains_key(&self, key: usize) -> bool {
        self.value_indices.contains_key(&key)
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> &[usize] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// Slice of the global tangent space owned by `key`.
    pub fn tangent_range(&self, key: usize) -> Option<Range<usize>> {
        self.value_indices
            .get(&key)
            .map(|&index| self.tangent_offsets[index].clone())
    }

    /// Sum of all variables' tangent dimensions.
    pub fn tangent_dimension(&self) -> usize {
        self.tangent_dimension
    }

    fn index_of(&self, key: usize) -> CoreResult<usize> {
        self.value_indices
            .get(&key)
            .copied()
            .ok_or(CoreError::MissingKey(key))
    }

    fn type_mismatch<M: LieGroup>(&self, key: usize, index: usize) -> CoreError {
        CoreError::TypeMismatch {
            key,
            stored: self.variables[index].type_name(),
            requested: std::any::type_name::<M>(),
        }
    }
}

impl Display for Values {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "Values(")?;
        for (key, variable) in self.keys.iter().zip(&self.variables) {
            writeln!(f, "  {key} -> {variable}")?;
        }
        write!(f, ")")
    }
}

impl fmt::Debug for Values {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Values")
            .field("keys", &self.keys)
            .field("tangent_offsets", &self.tangent_offsets)
            .field("tangent_dimension", &self.tangent_dimension)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::jacobian::value_with_jacobian;
    use crate::manifold::{Pose2, Pose3, Rot3, Vector2};

    #[test]
    fn test_tangent_partition() {
        let mut values = Values::new();
        values.insert(0, Vector2::new([1.0, 2.0]));
        values.insert(5, Pose2::new(0.0, 0.0, 0.0));
        values.insert(3, Pose3::identity());

        assert_eq!(values.tangent_dimension(), 11);
        assert_eq!(values.tangent_range(0), Some(0..2));
        assert_eq!(values.tangent_range(5), Some(2..5));
        assert_eq!(values.tangent_range(3), Some(5..11));
        assert_eq!(values.tangent_range(4), None);
        assert_eq!(values.keys(), &[0, 5, 3]);
        assert_eq!(values.len(), 3);
        assert!(!values.is_empty());
        assert!(values.contains_key(5));
    }

    #[test]
    fn test_tracked_pullback_lands_in_own_slice() {
        let mut values = Values::new();
        values.insert(0, Vector2::new([1.0, 2.0]));
        values.insert(1, Pose2::new(1.0, 0.0, 0.5));

        let pose = values.tracked::<Pose2>(1);
        let gradient = pose.pullback(&DVector::from_vec(vec![1.0, 2.0, 3.0]));
        assert_eq!(gradient.block_indices(), &[2..5]);
        assert_eq!(gradient.to_dense().as_slice(), &[0.0, 0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_jacobian_of_difference() {
        let mut values = Values::new();
        values.insert(0, Vector2::new([1.0, 2.0]));
        values.insert(1, Vector2::new([3.0, 4.0]));
        values.insert(2, Vector2::new([5.0, 6.0]));

        let (value, jacobian) = value_with_jacobian(
            |v| &v.tracked::<Vector2>(1).to_vector() - &v.tracked::<Vector2>(2).to_vector(),
            &values,
        );
        assert_eq!(value.as_slice(), &[-2.0, -2.0]);

        let expected = nalgebra::DMatrix::from_row_slice(
            2,
            6,
            &[0.0, 0.0, 1.0, 0.0, -1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, -1.0],
        );
        assert_eq!(jacobian.to_dense(), expected);
    }

    #[test]
    fn test_move_along() {
        let mut values = Values::new();
        values.insert(0, Vector2::new([1.0, 2.0]));
        values.insert(1, Pose2::new(1.0, 2.0, 0.0));

        values.move_along(&BlockVector::new(vec![1.0, 1.0, 0.5, -0.5, 0.0]));
        assert_eq!(values.get::<Vector2>(0), &Vector2::new([2.0, 3.0]));
        let pose = values.get::<Pose2>(1);
        assert!((pose.x() - 1.5).abs() < 1e-12);
        assert!((pose.y() - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_move_along_rejects_malformed_direction() {
        let mut values = Values::new();
        values.insert(0, Vector2::new([1.0, 2.0]));
        values.insert(1, Vector2::new([3.0, 4.0]));

        let short = BlockVector::new(vec![1.0, 1.0]);
        assert!(matches!(
            values.try_move_along(&short),
            Err(CoreError::MalformedDirection(_))
        ));

        let split = BlockVector::new(vec![1.0, 1.0])
            + BlockVector::with_indices(vec![1.0, 1.0], 2..4);
        assert!(values.try_move_along(&split).is_err());
        assert_eq!(values.get::<Vector2>(1), &Vector2::new([3.0, 4.0]));
    }

    #[test]
    #[should_panic(expected = "Malformed direction")]
    fn test_move_along_panics_on_malformed_direction() {
        let mut values = Values::new();
        values.insert(0, Vector2::new([1.0, 2.0]));
        values.move_along(&BlockVector::with_indices(vec![1.0, 1.0], 1..3));
    }

    #[test]
    fn test_duplicate_key() {
        let mut values = Values::new();
        values.insert(4, Vector2::new([1.0, 2.0]));
        assert!(matches!(
            values.try_insert(4, Pose2::identity()),
            Err(CoreError::DuplicateKey(4))
        ));
        assert_eq!(values.tangent_dimension(), 2);
    }

    #[test]
    #[should_panic(expected = "Duplicate key: 4")]
    fn test_duplicate_key_panics() {
        let mut values = Values::new();
        values.insert(4, Vector2::new([1.0, 2.0]));
        values.insert(4, Vector2::new([1.0, 2.0]));
    }

    #[test]
    fn test_missing_key_and_type_mismatch() {
        let mut values = Values::new();
        values.insert(0, Rot3::identity());
        assert!(matches!(
            values.try_get::<Rot3>(1),
            Err(CoreError::MissingKey(1))
        ));
        assert!(matches!(
            values.try_get::<Pose3>(0),
            Err(CoreError::TypeMismatch { key: 0, .. })
        ));
        assert!(values.try_set(0, Pose2::identity()).is_err());
        assert!(values.try_tracked::<Pose2>(0).is_err());
    }

    #[test]
    #[should_panic(expected = "Type mismatch for key 0")]
    fn test_type_mismatch_panics() {
        let mut values = Values::new();
        values.insert(0, Rot3::identity());
        let _ = values.get::<Pose3>(0);
    }

    #[test]
    fn test_set_and_clone_are_independent() {
        let mut values = Values::new();
        values.insert(0, Vector2::new([1.0, 2.0]));
        let snapshot = values.clone();
        values.set(0, Vector2::new([9.0, 9.0]));
        assert_eq!(values.get::<Vector2>(0), &Vector2::new([9.0, 9.0]));
        assert_eq!(snapshot.get::<Vector2>(0), &Vector2::new([1.0, 2.0]));
    }

    #[test]
    fn test_display() {
        let mut values = Values::new();
        values.insert(2, Vector2::new([1.0, 2.0]));
        assert_eq!(
            values.to_string(),
            "Values(\n  2 -> Vector2(1.0000, 2.0000)\n)"
        );
    }
}
