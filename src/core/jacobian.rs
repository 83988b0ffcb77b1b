//! Jacobian extraction from differentiable functions of a [`Values`] store.
//!
//! Row `i` of the Jacobian of `f` is the pullback of the `i`-th standard basis cotangent of
//! `f`'s output, so extraction costs one backward pass per output dimension. The rows share
//! a block structure (the pullback graph does not depend on the cotangent), which lets them
//! be stacked into a [`BlockMatrix`] whose blocks sit at the global tangent offsets of the
//! variables `f` actually read.

use crate::core::differentiable::{Differentiable, Tracked};
use crate::core::values::Values;
use crate::linalg::{BlockMatrix, BlockVector};
use crate::manifold::LieGroup;
use nalgebra::DVector;

/// Evaluate `f` at `values` and return its value with its Jacobian over the global tangent
/// space of `values`.
pub fn value_with_jacobian<B, F>(f: F, values: &Values) -> (B, BlockMatrix)
where
    B: Differentiable,
    F: Fn(&Values) -> Tracked<B>,
{
    let output = f(values);
    let dim = output.value().tangent_dimension();
    let rows: Vec<BlockVector> = (0..dim)
        .map(|i| {
            let mut basis = DVector::zeros(dim);
            basis[i] = 1.0;
            output.pullback(&basis)
        })
        .collect();
    let jacobian = BlockMatrix::from_block_rows(&rows);
    (output.into_value(), jacobian)
}

/// Jacobian of a single-argument function at `at`.
///
/// The argument is stored under key 0 of a fresh [`Values`], so the returned matrix has
/// exactly `at.tangent_dim()` columns.
pub fn jacobian<A, B, F>(f: F, at: A) -> BlockMatrix
where
    A: LieGroup,
    B: Differentiable,
    F: Fn(Tracked<A>) -> Tracked<B>,
{
    let mut values = Values::new();
    values.insert(0, at);
    value_with_jacobian(|v| f(v.tracked::<A>(0)), &values).1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifold::{Pose2, Pose3, Rot2, Rot3, Vector3, jacobian_to_dmatrix};
    use nalgebra::DMatrix;

    fn assert_dense_close(actual: &DMatrix<f64>, expected: &DMatrix<f64>) {
        assert_eq!(actual.shape(), expected.shape());
        assert!(
            (actual - expected).abs().max() < 1e-10,
            "actual: {actual}\nexpected: {expected}"
        );
    }

    fn check_identity<M: LieGroup>(at: M) {
        let dim = at.tangent_dim();
        let jac = jacobian(|x: Tracked<M>| x, at);
        assert_dense_close(&jac.to_dense(), &DMatrix::identity(dim, dim));
    }

    fn check_inverse<M: LieGroup>(at: M) {
        let jac = jacobian(|x: Tracked<M>| x.inverse(), at.clone());
        let expected = -jacobian_to_dmatrix::<M>(&at.adjoint());
        assert_dense_close(&jac.to_dense(), &expected);
    }

    #[test]
    fn test_identity_function_has_identity_jacobian() {
        check_identity(Vector3::new([1.0, 2.0, 3.0]));
        check_identity(Rot2::from_angle(0.4));
        check_identity(Pose2::new(1.0, -2.0, 0.7));
        check_identity(Rot3::from_euler_angles(0.1, 0.2, 0.3));
        check_identity(Pose3::from_translation_euler(1.0, 2.0, 3.0, 0.3, -0.2, 0.1));
    }

    #[test]
    fn test_inverse_jacobian_is_negative_adjoint() {
        check_inverse(Vector3::new([1.0, 2.0, 3.0]));
        check_inverse(Rot2::from_angle(-1.3));
        check_inverse(Pose2::new(0.5, 1.5, 2.0));
        check_inverse(Rot3::from_euler_angles(0.7, -0.2, 1.1));
        check_inverse(Pose3::from_translation_euler(-1.0, 0.5, 2.0, 0.2, 0.4, -0.9));
    }

    #[test]
    fn test_constant_function_has_empty_jacobian() {
        let jac = jacobian(
            |_: Tracked<Pose2>| Tracked::constant(Pose2::new(1.0, 0.0, 0.0)),
            Pose2::identity(),
        );
        assert_eq!(jac.block_count(), 0);
    }

    #[test]
    fn test_between_jacobian_through_values() {
        use std::f64::consts::{FRAC_PI_2, PI};

        let mut values = Values::new();
        values.insert(0, Pose2::new(1.0, 2.0, FRAC_PI_2));
        values.insert(1, Pose2::new(-1.0, 4.0, PI));

        let (relative, jac) = value_with_jacobian(
            |v| v.tracked::<Pose2>(0).between(&v.tracked::<Pose2>(1)),
            &values,
        );
        assert!(relative.is_approx(&Pose2::new(2.0, 2.0, FRAC_PI_2), 1e-10));

        let dense = jac.to_dense();
        let expected_first = DMatrix::from_row_slice(
            3,
            3,
            &[0.0, -1.0, -2.0, 1.0, 0.0, -2.0, 0.0, 0.0, -1.0],
        );
        assert_dense_close(&dense.columns(0, 3).into_owned(), &expected_first);
        assert_dense_close(&dense.columns(3, 3).into_owned(), &DMatrix::identity(3, 3));
    }

    #[test]
    fn test_scalar_output() {
        let jac = jacobian(
            |x: Tracked<Vector3>| x.to_vector().squared_norm(),
            Vector3::new([1.0, -2.0, 0.5]),
        );
        assert_dense_close(
            &jac.to_dense(),
            &DMatrix::from_row_slice(1, 3, &[2.0, -4.0, 1.0]),
        );
    }
}
