//! Linear least-squares system `J·dx ≈ b` produced by linearizing a factor graph.
//!
//! Graphs accumulate by vertical stacking: `a += b` places `b`'s rows under `a`'s, so the
//! linearization of a whole factor graph is the fold of its factors' single-row-block systems.
//!
//! ```text
//! [J₁]·dx ≈ [b₁]    +=    [J₂]·dx ≈ [b₂]    →    [J₁]·dx ≈ [b₁]
//!                                                  [J₂]       [b₂]
//! ```

use crate::core::{CoreError, CoreResult};
use crate::linalg::{BlockMatrix, BlockVector};
use nalgebra::DVector;
use std::ops::{Add, AddAssign};

/// Block-sparse Jacobian with its right-hand side.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GaussianFactorGraph {
    jacobian: BlockMatrix,
    bias: BlockVector,
}

impl GaussianFactorGraph {
    /// # Panics
    /// If the Jacobian has rows the bias does not reach.
    pub fn new(jacobian: BlockMatrix, bias: BlockVector) -> Self {
        match Self::try_new(jacobian, bias) {
            Ok(graph) => graph,
            Err(e) => panic!("{e}"),
        }
    }

    /// Fallible twin of [`GaussianFactorGraph::new`].
    pub fn try_new(jacobian: BlockMatrix, bias: BlockVector) -> CoreResult<Self> {
        if jacobian.row_count() > bias.dimension() {
            return Err(CoreError::DimensionMismatch(format!(
                "Jacobian has {} rows but the bias only covers {}",
                jacobian.row_count(),
                bias.dimension()
            )));
        }
        Ok(Self { jacobian, bias })
    }

    pub fn jacobian(&self) -> &BlockMatrix {
        &self.jacobian
    }

    pub fn bias(&self) -> &BlockVector {
        &self.bias
    }

    /// Number of residual rows.
    pub fn row_count(&self) -> usize {
        self.bias.dimension()
    }

    /// Number of tangent-space columns the Jacobian touches.
    pub fn column_count(&self) -> usize {
        self.jacobian.column_count()
    }

    /// `‖J·dx − b‖²`
    ///
    /// # Panics
    /// If `dx` is shorter than the Jacobian's column count.
    pub fn error(&self, dx: &DVector<f64>) -> f64 {
        let mut residual = vec![0.0; self.row_count()];
        self.jacobian.accumulate_mul(dx.as_slice(), &mut residual);
        let bias = self.bias.to_dense();
        residual
            .iter()
            .zip(bias.iter())
            .map(|(jx, b)| (jx - b) * (jx - b))
            .sum()
    }
}

impl AddAssign<&GaussianFactorGraph> for GaussianFactorGraph {
    fn add_assign(&mut self, rhs: &GaussianFactorGraph) {
        let offset = self.row_count();
        self.jacobian += rhs.jacobian.offsetting(offset, 0);
        self.bias += rhs.bias.offsetting(offset);
    }
}

impl AddAssign for GaussianFactorGraph {
    fn add_assign(&mut self, rhs: GaussianFactorGraph) {
        *self += &rhs;
    }
}

impl Add for GaussianFactorGraph {
    type Output = GaussianFactorGraph;

    fn add(mut self, rhs: GaussianFactorGraph) -> GaussianFactorGraph {
        self += &rhs;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::DMatrix;

    fn graph(rows: &[Vec<f64>], bias: Vec<f64>) -> GaussianFactorGraph {
        GaussianFactorGraph::new(BlockMatrix::from_dense_rows(rows), BlockVector::new(bias))
    }

    #[test]
    fn test_stacking() {
        let first = graph(&[vec![1.0, 2.0], vec![3.0, 4.0]], vec![9.0, 10.0]);
        let second = graph(&[vec![5.0, 6.0], vec![7.0, 8.0]], vec![11.0, 12.0]);

        let mut stacked = first.clone();
        stacked += &second;

        let expected_jacobian =
            first.jacobian().clone() + second.jacobian().offsetting(first.row_count(), 0);
        assert!(stacked.jacobian().blocks_equal(&expected_jacobian, 0.0));
        assert_eq!(stacked.row_count(), 4);
        assert_eq!(stacked.bias().to_dense().as_slice(), &[9.0, 10.0, 11.0, 12.0]);
        assert_eq!(
            stacked.jacobian().to_dense(),
            DMatrix::from_row_slice(4, 2, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0])
        );
    }

    #[test]
    fn test_stacking_onto_empty() {
        let single = graph(&[vec![1.0, 0.0]], vec![2.0]);
        let stacked = GaussianFactorGraph::default() + single.clone();
        assert_eq!(stacked, single);
    }

    #[test]
    fn test_error() {
        let system = graph(&[vec![1.0, 0.0], vec![0.0, 2.0]], vec![1.0, 1.0]);
        let dx = DVector::from_vec(vec![1.0, 1.0]);
        assert!((system.error(&dx) - 1.0).abs() < 1e-12);
        assert!((system.error(&DVector::zeros(2)) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_constant_rows_keep_their_bias() {
        let mut system = GaussianFactorGraph::new(BlockMatrix::zero(), BlockVector::new(vec![3.0]));
        system += graph(&[vec![1.0]], vec![1.0]);
        assert_eq!(system.row_count(), 2);
        assert_eq!(
            system.jacobian().block_indices()[0].row_indices,
            1..2
        );
    }

    #[test]
    fn test_bias_must_cover_rows() {
        let result = GaussianFactorGraph::try_new(
            BlockMatrix::from_dense_rows(&[vec![1.0], vec![1.0]]),
            BlockVector::new(vec![1.0]),
        );
        assert!(matches!(result, Err(CoreError::DimensionMismatch(_))));
    }
}
