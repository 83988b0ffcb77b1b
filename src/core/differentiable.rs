//! Reverse-mode differentiation through manifold operations.
//!
//! A [`Tracked<T>`] is a value together with its *pullback*: a closure mapping a cotangent
//! `c` of the value's tangent space to `Jᵀ·c` in the global tangent space of the
//! [`Values`](crate::core::values::Values) it was read from. Pullbacks return
//! [`BlockVector`]s, so a function touching two variables out of thousands produces a gradient
//! with two blocks and never allocates the full dimension.
//!
//! Every operation applies its analytic Jacobian and forwards to the pullbacks of its inputs:
//!
//! ```text
//! z = f(x, y)        pullback_z(c) = pullback_x(J_xᵀ·c) + pullback_y(J_yᵀ·c)
//! ```
//!
//! Gradient contributions from inputs that share a variable simply end up as overlapping
//! blocks, which the block types sum when read.

use crate::linalg::BlockVector;
use crate::manifold::{LieGroup, VectorN, jacobian_to_dmatrix};
use nalgebra::{DMatrix, DVector};
use std::{
    fmt,
    ops::{Add, Neg, Sub},
    rc::Rc,
};

type Pullback = Rc<dyn Fn(&DVector<f64>) -> BlockVector>;

/// Types whose tangent dimension is known from a value, so Jacobians of them can be sized.
pub trait Differentiable: Clone + 'static {
    fn tangent_dimension(&self) -> usize;
}

impl<M: LieGroup> Differentiable for M {
    fn tangent_dimension(&self) -> usize {
        LieGroup::tangent_dim(self)
    }
}

impl Differentiable for DVector<f64> {
    fn tangent_dimension(&self) -> usize {
        self.len()
    }
}

impl Differentiable for f64 {
    fn tangent_dimension(&self) -> usize {
        1
    }
}

/// A value with its reverse-mode pullback into a global tangent space.
pub struct Tracked<T> {
    value: T,
    pullback: Pullback,
}

impl<T: Clone> Clone for Tracked<T> {
    fn clone(&self) -> Self {
        Tracked {
            value: self.value.clone(),
            pullback: Rc::clone(&self.pullback),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Tracked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracked").field("value", &self.value).finish()
    }
}

impl<T> Tracked<T> {
    pub fn new(value: T, pullback: impl Fn(&DVector<f64>) -> BlockVector + 'static) -> Self {
        Tracked {
            value,
            pullback: Rc::new(pullback),
        }
    }

    /// A value that depends on no variable; its pullback is the empty block vector.
    pub fn constant(value: T) -> Self {
        Tracked::new(value, |_| BlockVector::zero())
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn into_value(self) -> T {
        self.value
    }

    /// `Jᵀ·cotangent` in the global tangent space.
    pub fn pullback(&self, cotangent: &DVector<f64>) -> BlockVector {
        (self.pullback)(cotangent)
    }

    /// Pullback that first multiplies the cotangent by `jacobianᵀ`.
    fn chained(&self, jacobian: DMatrix<f64>) -> Pullback {
        let parent = Rc::clone(&self.pullback);
        Rc::new(move |c: &DVector<f64>| parent(&(jacobian.tr_mul(c))))
    }
}

fn sum_pullbacks(first: Pullback, second: Pullback) -> impl Fn(&DVector<f64>) -> BlockVector {
    move |c: &DVector<f64>| first(c) + second(c)
}

impl<M: LieGroup> Tracked<M> {
    /// `self ∘ other`.
    pub fn compose(&self, other: &Tracked<M>) -> Tracked<M> {
        let mut j_self = M::jacobian_identity();
        let mut j_other = M::jacobian_identity();
        let value = self
            .value
            .compose(&other.value, Some(&mut j_self), Some(&mut j_other));
        self.binary(other, value, &j_self, &j_other)
    }

    /// `self⁻¹`.
    pub fn inverse(&self) -> Tracked<M> {
        let mut j_self = M::jacobian_identity();
        let value = self.value.inverse(Some(&mut j_self));
        let pullback = self.chained(jacobian_to_dmatrix::<M>(&j_self));
        Tracked { value, pullback }
    }

    /// `self⁻¹ ∘ other`.
    pub fn between(&self, other: &Tracked<M>) -> Tracked<M> {
        let mut j_self = M::jacobian_identity();
        let mut j_other = M::jacobian_identity();
        let value = self
            .value
            .between(&other.value, Some(&mut j_self), Some(&mut j_other));
        self.binary(other, value, &j_self, &j_other)
    }

    /// `self ∘ Exp(tangent)` for a constant tangent.
    pub fn retract(&self, tangent: &M::TangentVector) -> Tracked<M> {
        let mut j_self = M::jacobian_identity();
        let value = self.value.retract(tangent, Some(&mut j_self), None);
        let pullback = self.chained(jacobian_to_dmatrix::<M>(&j_self));
        Tracked { value, pullback }
    }

    /// `Log(self⁻¹ ∘ other)` as tangent coordinates.
    pub fn local_coordinate(&self, other: &Tracked<M>) -> Tracked<DVector<f64>> {
        let mut j_self = M::jacobian_identity();
        let mut j_other = M::jacobian_identity();
        let value: DVector<f64> = self
            .value
            .local_coordinate(&other.value, Some(&mut j_self), Some(&mut j_other))
            .into();
        let first = self.chained(jacobian_to_dmatrix::<M>(&j_self));
        let second = other.chained(jacobian_to_dmatrix::<M>(&j_other));
        Tracked::new(value, sum_pullbacks(first, second))
    }

    fn binary(
        &self,
        other: &Tracked<M>,
        value: M,
        j_self: &M::JacobianMatrix,
        j_other: &M::JacobianMatrix,
    ) -> Tracked<M> {
        let first = self.chained(jacobian_to_dmatrix::<M>(j_self));
        let second = other.chained(jacobian_to_dmatrix::<M>(j_other));
        Tracked::new(value, sum_pullbacks(first, second))
    }
}

impl<const N: usize> Tracked<VectorN<N>> {
    /// View the vector as plain coordinates.
    pub fn to_vector(&self) -> Tracked<DVector<f64>> {
        Tracked {
            value: self.value.into(),
            pullback: Rc::clone(&self.pullback),
        }
    }
}

impl Tracked<DVector<f64>> {
    /// `s·v`
    pub fn scale(&self, factor: f64) -> Tracked<DVector<f64>> {
        let parent = Rc::clone(&self.pullback);
        Tracked::new(&self.value * factor, move |c: &DVector<f64>| {
            parent(&(c * factor))
        })
    }

    /// `‖v‖²`
    pub fn squared_norm(&self) -> Tracked<f64> {
        let parent = Rc::clone(&self.pullback);
        let v = self.value.clone();
        Tracked::new(self.value.norm_squared(), move |c: &DVector<f64>| {
            parent(&(&v * (2.0 * c[0])))
        })
    }

    /// Single coordinate `v[index]`.
    pub fn component(&self, index: usize) -> Tracked<f64> {
        let parent = Rc::clone(&self.pullback);
        let dim = self.value.len();
        Tracked::new(self.value[index], move |c: &DVector<f64>| {
            let mut expanded = DVector::zeros(dim);
            expanded[index] = c[0];
            parent(&expanded)
        })
    }
}

impl Add for &Tracked<DVector<f64>> {
    type Output = Tracked<DVector<f64>>;

    fn add(self, rhs: Self) -> Tracked<DVector<f64>> {
        Tracked::new(
            &self.value + &rhs.value,
            sum_pullbacks(Rc::clone(&self.pullback), Rc::clone(&rhs.pullback)),
        )
    }
}

impl Sub for &Tracked<DVector<f64>> {
    type Output = Tracked<DVector<f64>>;

    fn sub(self, rhs: Self) -> Tracked<DVector<f64>> {
        let negated = rhs.scale(-1.0);
        Tracked::new(
            &self.value - &rhs.value,
            sum_pullbacks(Rc::clone(&self.pullback), negated.pullback),
        )
    }
}

impl Neg for &Tracked<DVector<f64>> {
    type Output = Tracked<DVector<f64>>;

    fn neg(self) -> Tracked<DVector<f64>> {
        self.scale(-1.0)
    }
}

impl Add for &Tracked<f64> {
    type Output = Tracked<f64>;

    fn add(self, rhs: Self) -> Tracked<f64> {
        Tracked::new(
            self.value + rhs.value,
            sum_pullbacks(Rc::clone(&self.pullback), Rc::clone(&rhs.pullback)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifold::{Pose2, Vector2};

    fn seeded(value: DVector<f64>, offset: usize) -> Tracked<DVector<f64>> {
        let dim = value.len();
        Tracked::new(value, move |c: &DVector<f64>| {
            BlockVector::with_indices(c.as_slice().to_vec(), offset..offset + dim)
        })
    }

    #[test]
    fn test_constant_has_empty_pullback() {
        let constant = Tracked::constant(Pose2::new(1.0, 2.0, 0.3));
        let gradient = constant.pullback(&DVector::from_vec(vec![1.0, 1.0, 1.0]));
        assert_eq!(gradient.block_count(), 0);
    }

    #[test]
    fn test_sub_pullback_is_sparse() {
        let a = seeded(DVector::from_vec(vec![1.0, 2.0]), 2);
        let b = seeded(DVector::from_vec(vec![0.5, 0.5]), 7);
        let difference = &a - &b;
        assert_eq!(difference.value().as_slice(), &[0.5, 1.5]);

        let gradient = difference.pullback(&DVector::from_vec(vec![1.0, 0.0]));
        assert_eq!(gradient.block_count(), 2);
        let dense = gradient.to_dense();
        assert_eq!(dense.len(), 9);
        assert_eq!(dense[2], 1.0);
        assert_eq!(dense[7], -1.0);
        assert_eq!(dense.iter().filter(|v| **v != 0.0).count(), 2);
    }

    #[test]
    fn test_squared_norm_gradient() {
        let v = seeded(DVector::from_vec(vec![3.0, -4.0]), 0);
        let norm = v.squared_norm();
        assert_eq!(*norm.value(), 25.0);
        let gradient = norm.pullback(&DVector::from_vec(vec![1.0])).to_dense();
        assert_eq!(gradient.as_slice(), &[6.0, -8.0]);
    }

    #[test]
    fn test_shared_input_accumulates() {
        let v = seeded(DVector::from_vec(vec![1.0, 2.0]), 0);
        let doubled = &v + &v;
        let gradient = doubled.pullback(&DVector::from_vec(vec![1.0, 1.0]));
        assert_eq!(gradient.block_count(), 2);
        assert_eq!(gradient.to_dense().as_slice(), &[2.0, 2.0]);
    }

    #[test]
    fn test_component_and_scalar_sum() {
        let v = seeded(DVector::from_vec(vec![1.0, 2.0, 3.0]), 0);
        let sum = &v.component(0) + &v.component(2);
        assert_eq!(*sum.value(), 4.0);
        let gradient = sum.pullback(&DVector::from_vec(vec![1.0])).to_dense();
        assert_eq!(gradient.as_slice(), &[1.0, 0.0, 1.0]);
    }

    #[test]
    fn test_local_coordinate_of_vectors() {
        let identity_pullback = |offset: usize| {
            move |c: &DVector<f64>| BlockVector::with_indices(c.as_slice().to_vec(), offset..offset + 2)
        };
        let a = Tracked::new(Vector2::new([1.0, 1.0]), identity_pullback(0));
        let b = Tracked::new(Vector2::new([4.0, -1.0]), identity_pullback(2));
        let delta = a.local_coordinate(&b);
        assert_eq!(delta.value().as_slice(), &[3.0, -2.0]);

        let gradient = delta.pullback(&DVector::from_vec(vec![1.0, 0.0])).to_dense();
        assert_eq!(gradient.as_slice(), &[-1.0, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_to_vector_and_differentiable_dims() {
        let v = Tracked::constant(Vector2::new([1.0, 2.0]));
        assert_eq!(v.to_vector().value().as_slice(), &[1.0, 2.0]);
        assert_eq!(Pose2::identity().tangent_dimension(), 3);
        assert_eq!(DVector::<f64>::zeros(4).tangent_dimension(), 4);
        assert_eq!(1.5_f64.tangent_dimension(), 1);
    }
}
