//! Block-indexed sparse matrices.
//!
//! A [`BlockMatrix`] is a list of dense rectangular blocks, each placed at a row range and a
//! column range of a larger implicit matrix. Scalars of each block are stored row-major in one
//! flat buffer. As with [`BlockVector`], blocks may overlap and overlapping entries are summed
//! at read time: in the matrix-vector products, in [`BlockMatrix::to_dense`] and in
//! [`BlockMatrix::to_sparse`].
//!
//! Stacking per-factor Jacobians is then a matter of offsetting each local block to its global
//! position and appending it, which is what [`GaussianFactorGraph`] does.
//!
//! [`GaussianFactorGraph`]: crate::core::gaussian_factor_graph::GaussianFactorGraph

use crate::linalg::{BlockVector, LinAlgError, LinAlgResult};
use faer::sparse::{SparseColMat, Triplet};
use nalgebra::{DMatrix, DVector};
use std::{
    collections::BTreeMap,
    fmt,
    fmt::{Display, Formatter},
    ops::{Add, AddAssign, Mul, Range},
};

/// Placement of one dense block inside a [`BlockMatrix`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlockMatrixIndices {
    pub row_indices: Range<usize>,
    pub column_indices: Range<usize>,
}

impl BlockMatrixIndices {
    pub fn new(row_indices: Range<usize>, column_indices: Range<usize>) -> Self {
        Self {
            row_indices,
            column_indices,
        }
    }

    /// Number of scalars the block holds.
    pub fn area(&self) -> usize {
        self.row_indices.len() * self.column_indices.len()
    }

    fn offsetting(&self, row_by: usize, column_by: usize) -> Self {
        Self {
            row_indices: (self.row_indices.start + row_by)..(self.row_indices.end + row_by),
            column_indices: (self.column_indices.start + column_by)
                ..(self.column_indices.end + column_by),
        }
    }
}

/// Sparse matrix stored as a list of dense, possibly overlapping blocks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlockMatrix {
    block_indices: Vec<BlockMatrixIndices>,
    scalars: Vec<f64>,
}

impl BlockMatrix {
    /// The empty matrix.
    pub fn zero() -> Self {
        Self::default()
    }

    /// Build from block placements and their row-major scalars.
    ///
    /// # Panics
    /// If the scalar count differs from the total block area.
    pub fn new(block_indices: Vec<BlockMatrixIndices>, scalars: Vec<f64>) -> Self {
        match Self::try_new(block_indices, scalars) {
            Ok(matrix) => matrix,
            Err(e) => panic!("{e}"),
        }
    }

    /// Fallible twin of [`BlockMatrix::new`].
    pub fn try_new(
        block_indices: Vec<BlockMatrixIndices>,
        scalars: Vec<f64>,
    ) -> LinAlgResult<Self> {
        let area: usize = block_indices.iter().map(BlockMatrixIndices::area).sum();
        if area != scalars.len() {
            return Err(LinAlgError::DimensionMismatch(format!(
                "blocks cover {area} entries but {} scalars were given",
                scalars.len()
            )));
        }
        Ok(Self {
            block_indices,
            scalars,
        })
    }

    /// One dense block at the origin built from equally long rows.
    ///
    /// # Panics
    /// If the rows have different lengths.
    pub fn from_dense_rows(rows: &[Vec<f64>]) -> Self {
        let column_count = rows.first().map_or(0, Vec::len);
        Self::from_dense_rows_at(rows, 0..rows.len(), 0..column_count)
    }

    /// One dense block placed at the given row and column ranges.
    ///
    /// # Panics
    /// If the rows do not fill the placement exactly.
    pub fn from_dense_rows_at(
        rows: &[Vec<f64>],
        row_indices: Range<usize>,
        column_indices: Range<usize>,
    ) -> Self {
        assert_eq!(
            rows.len(),
            row_indices.len(),
            "expected {} rows, got {}",
            row_indices.len(),
            rows.len()
        );
        let mut scalars = Vec::with_capacity(row_indices.len() * column_indices.len());
        for row in rows {
            assert_eq!(
                row.len(),
                column_indices.len(),
                "row of length {} does not fit columns {column_indices:?}",
                row.len()
            );
            scalars.extend_from_slice(row);
        }
        Self {
            block_indices: vec![BlockMatrixIndices::new(row_indices, column_indices)],
            scalars,
        }
    }

    /// One dense block at the origin copied from a nalgebra matrix.
    pub fn from_dmatrix(matrix: &DMatrix<f64>) -> Self {
        let (rows, columns) = matrix.shape();
        let mut scalars = Vec::with_capacity(rows * columns);
        for row in matrix.row_iter() {
            scalars.extend(row.iter().copied());
        }
        Self {
            block_indices: vec![BlockMatrixIndices::new(0..rows, 0..columns)],
            scalars,
        }
    }

    /// The `n × n` identity as a single block.
    pub fn eye(n: usize) -> Self {
        Self::from_dmatrix(&DMatrix::identity(n, n))
    }

    /// Stack row vectors that share one block structure.
    ///
    /// Each block position `j` of the rows becomes one matrix block spanning all rows and the
    /// columns of the rows' `j`-th block.
    ///
    /// # Panics
    /// If the rows have different block structures.
    pub fn from_block_rows(rows: &[BlockVector]) -> Self {
        match Self::try_from_block_rows(rows) {
            Ok(matrix) => matrix,
            Err(e) => panic!("{e}"),
        }
    }

    /// Fallible twin of [`BlockMatrix::from_block_rows`].
    pub fn try_from_block_rows(rows: &[BlockVector]) -> LinAlgResult<Self> {
        let Some(first) = rows.first() else {
            return Ok(Self::zero());
        };
        if rows
            .iter()
            .any(|row| row.block_indices() != first.block_indices())
        {
            return Err(LinAlgError::DimensionMismatch(
                "rows have different block structures".to_string(),
            ));
        }

        let row_count = rows.len();
        let mut block_indices = Vec::with_capacity(first.block_count());
        let mut scalars = Vec::with_capacity(row_count * first.scalars().len());
        let mut scalar_offset = 0;
        for column_indices in first.block_indices() {
            let width = column_indices.len();
            for row in rows {
                scalars.extend_from_slice(&row.scalars()[scalar_offset..scalar_offset + width]);
            }
            block_indices.push(BlockMatrixIndices::new(0..row_count, column_indices.clone()));
            scalar_offset += width;
        }
        Ok(Self {
            block_indices,
            scalars,
        })
    }

    /// Largest row bound over all blocks.
    pub fn row_count(&self) -> usize {
        self.block_indices
            .iter()
            .map(|b| b.row_indices.end)
            .max()
            .unwrap_or(0)
    }

    /// Largest column bound over all blocks.
    pub fn column_count(&self) -> usize {
        self.block_indices
            .iter()
            .map(|b| b.column_indices.end)
            .max()
            .unwrap_or(0)
    }

    pub fn block_indices(&self) -> &[BlockMatrixIndices] {
        &self.block_indices
    }

    pub fn scalars(&self) -> &[f64] {
        &self.scalars
    }

    pub fn block_count(&self) -> usize {
        self.block_indices.len()
    }

    /// Iterate over `(placement, row-major scalars)` pairs in insertion order.
    pub fn blocks(&self) -> impl Iterator<Item = (&BlockMatrixIndices, &[f64])> + '_ {
        let mut offset = 0;
        self.block_indices.iter().map(move |indices| {
            let start = offset;
            offset += indices.area();
            (indices, &self.scalars[start..offset])
        })
    }

    /// Copy with every block shifted down by `row_by` and right by `column_by`.
    pub fn offsetting(&self, row_by: usize, column_by: usize) -> Self {
        Self {
            block_indices: self
                .block_indices
                .iter()
                .map(|b| b.offsetting(row_by, column_by))
                .collect(),
            scalars: self.scalars.clone(),
        }
    }

    /// `out += self * rhs`.
    ///
    /// `rhs` must cover `column_count()` entries and `out` must cover `row_count()` entries.
    pub fn accumulate_mul(&self, rhs: &[f64], out: &mut [f64]) {
        for (indices, values) in self.blocks() {
            let width = indices.column_indices.len();
            let x = &rhs[indices.column_indices.clone()];
            for (local_row, row) in indices.row_indices.clone().enumerate() {
                let coefficients = &values[local_row * width..(local_row + 1) * width];
                out[row] += coefficients
                    .iter()
                    .zip(x)
                    .map(|(a, b)| a * b)
                    .sum::<f64>();
            }
        }
    }

    /// `out += selfᵀ * rhs`, without materializing the transpose.
    ///
    /// `rhs` must cover `row_count()` entries and `out` must cover `column_count()` entries.
    pub fn accumulate_dual(&self, rhs: &[f64], out: &mut [f64]) {
        for (indices, values) in self.blocks() {
            let width = indices.column_indices.len();
            for (local_row, row) in indices.row_indices.clone().enumerate() {
                let weight = rhs[row];
                if weight == 0.0 {
                    continue;
                }
                let coefficients = &values[local_row * width..(local_row + 1) * width];
                for (slot, a) in out[indices.column_indices.clone()]
                    .iter_mut()
                    .zip(coefficients)
                {
                    *slot += a * weight;
                }
            }
        }
    }

    /// Matrix-vector product; the result has `row_count()` entries.
    ///
    /// # Panics
    /// If `rhs` is shorter than `column_count()`.
    pub fn mul_vector(&self, rhs: &DVector<f64>) -> DVector<f64> {
        assert!(
            rhs.len() >= self.column_count(),
            "vector of length {} cannot multiply a matrix with {} columns",
            rhs.len(),
            self.column_count()
        );
        let mut out = DVector::zeros(self.row_count());
        self.accumulate_mul(rhs.as_slice(), out.as_mut_slice());
        out
    }

    /// Transpose-vector product; the result has `column_count()` entries.
    ///
    /// # Panics
    /// If `rhs` is shorter than `row_count()`.
    pub fn dual(&self, rhs: &DVector<f64>) -> DVector<f64> {
        assert!(
            rhs.len() >= self.row_count(),
            "vector of length {} cannot multiply the transpose of a matrix with {} rows",
            rhs.len(),
            self.row_count()
        );
        let mut out = DVector::zeros(self.column_count());
        self.accumulate_dual(rhs.as_slice(), out.as_mut_slice());
        out
    }

    /// Dense `row_count() × column_count()` matrix with overlapping blocks summed.
    pub fn to_dense(&self) -> DMatrix<f64> {
        let mut dense = DMatrix::zeros(self.row_count(), self.column_count());
        for (indices, values) in self.blocks() {
            let width = indices.column_indices.len();
            for (local_row, row) in indices.row_indices.clone().enumerate() {
                for (local_column, column) in indices.column_indices.clone().enumerate() {
                    dense[(row, column)] += values[local_row * width + local_column];
                }
            }
        }
        dense
    }

    /// Export to a faer compressed-column matrix, summing overlapping entries first.
    ///
    /// Entries whose sum is exactly zero (the off-diagonal of a dense identity block, or
    /// contributions that cancel) are not stored.
    pub fn to_sparse(&self) -> LinAlgResult<SparseColMat<usize, f64>> {
        let mut entries: BTreeMap<(usize, usize), f64> = BTreeMap::new();
        for (indices, values) in self.blocks() {
            let width = indices.column_indices.len();
            for (local_row, row) in indices.row_indices.clone().enumerate() {
                for (local_column, column) in indices.column_indices.clone().enumerate() {
                    *entries.entry((row, column)).or_insert(0.0) +=
                        values[local_row * width + local_column];
                }
            }
        }

        let triplets: Vec<Triplet<usize, usize, f64>> = entries
            .into_iter()
            .filter(|(_, value)| *value != 0.0)
            .map(|((row, column), value)| Triplet::new(row, column, value))
            .collect();

        SparseColMat::try_new_from_triplets(self.row_count(), self.column_count(), &triplets)
            .map_err(|e| {
                LinAlgError::SparseMatrixCreation("Failed to export block matrix".to_string())
                    .log_with_source(e)
            })
    }

    /// Same block placements and scalars equal within `tolerance`.
    pub fn blocks_equal(&self, other: &BlockMatrix, tolerance: f64) -> bool {
        self.block_indices == other.block_indices
            && self
                .scalars
                .iter()
                .zip(&other.scalars)
                .all(|(a, b)| (a - b).abs() <= tolerance)
    }
}

impl AddAssign<&BlockMatrix> for BlockMatrix {
    fn add_assign(&mut self, rhs: &BlockMatrix) {
        self.block_indices.extend(rhs.block_indices.iter().cloned());
        self.scalars.extend_from_slice(&rhs.scalars);
    }
}

impl AddAssign for BlockMatrix {
    fn add_assign(&mut self, rhs: BlockMatrix) {
        self.block_indices.extend(rhs.block_indices);
        self.scalars.extend(rhs.scalars);
    }
}

impl Add for BlockMatrix {
    type Output = BlockMatrix;

    fn add(mut self, rhs: BlockMatrix) -> BlockMatrix {
        self += rhs;
        self
    }
}

impl Add for &BlockMatrix {
    type Output = BlockMatrix;

    fn add(self, rhs: &BlockMatrix) -> BlockMatrix {
        let mut result = self.clone();
        result += rhs;
        result
    }
}

impl Mul<&BlockMatrix> for f64 {
    type Output = BlockMatrix;

    fn mul(self, rhs: &BlockMatrix) -> BlockMatrix {
        BlockMatrix {
            block_indices: rhs.block_indices.clone(),
            scalars: rhs.scalars.iter().map(|s| self * s).collect(),
        }
    }
}

impl Mul<BlockMatrix> for f64 {
    type Output = BlockMatrix;

    fn mul(self, mut rhs: BlockMatrix) -> BlockMatrix {
        rhs.scalars.iter_mut().for_each(|s| *s *= self);
        rhs
    }
}

impl Mul<&DVector<f64>> for &BlockMatrix {
    type Output = DVector<f64>;

    fn mul(self, rhs: &DVector<f64>) -> DVector<f64> {
        self.mul_vector(rhs)
    }
}

impl Display for BlockMatrix {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "BlockMatrix({}x{}, {} blocks)",
            self.row_count(),
            self.column_count(),
            self.block_count()
        )?;
        for (indices, values) in self.blocks() {
            writeln!(
                f,
                "  rows {:?}, cols {:?}: {:?}",
                indices.row_indices, indices.column_indices, values
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> BlockMatrix {
        // [1 2 0]
        // [3 4 0]
        // [0 0 5]
        BlockMatrix::from_dense_rows(&[vec![1.0, 2.0], vec![3.0, 4.0]])
            + BlockMatrix::from_dense_rows_at(&[vec![5.0]], 2..3, 2..3)
    }

    #[test]
    fn test_dense_rows_layout() {
        let m = BlockMatrix::from_dense_rows(&[vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]);
        assert_eq!(m.row_count(), 2);
        assert_eq!(m.column_count(), 3);
        assert_eq!(m.scalars(), &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(
            m.to_dense(),
            DMatrix::from_row_slice(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0])
        );
    }

    #[test]
    #[should_panic]
    fn test_ragged_dense_rows_panic() {
        let _ = BlockMatrix::from_dense_rows(&[vec![1.0, 2.0], vec![3.0]]);
    }

    #[test]
    fn test_try_new_checks_area() {
        let indices = vec![BlockMatrixIndices::new(0..2, 0..2)];
        assert!(BlockMatrix::try_new(indices.clone(), vec![1.0; 3]).is_err());
        assert!(BlockMatrix::try_new(indices, vec![1.0; 4]).is_ok());
    }

    #[test]
    fn test_eye() {
        let eye = BlockMatrix::eye(3);
        assert_eq!(eye.to_dense(), DMatrix::identity(3, 3));
    }

    #[test]
    fn test_matvec_and_dual() {
        let m = sample();
        let x = DVector::from_vec(vec![1.0, 1.0, 2.0]);
        assert_eq!(m.mul_vector(&x).as_slice(), &[3.0, 7.0, 10.0]);
        assert_eq!((&m * &x).as_slice(), &[3.0, 7.0, 10.0]);

        let y = DVector::from_vec(vec![1.0, -1.0, 1.0]);
        assert_eq!(m.dual(&y).as_slice(), &[-2.0, -2.0, 5.0]);
        assert_eq!(m.dual(&y), m.to_dense().transpose() * &y);
    }

    #[test]
    fn test_offsetting_and_dimensions() {
        let m = sample().offsetting(2, 1);
        assert_eq!(m.row_count(), 5);
        assert_eq!(m.column_count(), 4);
        assert_eq!(m.block_indices()[0], BlockMatrixIndices::new(2..4, 1..3));
        assert_eq!(m.to_dense()[(4, 3)], 5.0);
        assert_eq!(m.to_dense()[(0, 0)], 0.0);
    }

    #[test]
    fn test_overlapping_blocks_accumulate() {
        let m = BlockMatrix::eye(2) + 3.0 * &BlockMatrix::eye(2) + BlockMatrix::eye(1);
        assert_eq!(m.block_count(), 3);
        let dense = m.to_dense();
        assert_eq!(dense[(0, 0)], 5.0);
        assert_eq!(dense[(1, 1)], 4.0);
        assert_eq!(dense[(0, 1)], 0.0);

        let x = DVector::from_vec(vec![1.0, 2.0]);
        assert_eq!(m.mul_vector(&x).as_slice(), &[5.0, 8.0]);
        assert_eq!(m.dual(&x).as_slice(), &[5.0, 8.0]);

        let sparse = m.to_sparse().expect("sparse export");
        assert_eq!(sparse.nrows(), 2);
        assert_eq!(sparse.ncols(), 2);
        let entries: Vec<(usize, usize, f64)> =
            sparse.triplet_iter().map(|t| (t.row, t.col, *t.val)).collect();
        assert_eq!(entries, vec![(0, 0, 5.0), (1, 1, 4.0)]);
    }

    #[test]
    fn test_sparse_export_drops_cancelled_entries() {
        let m = BlockMatrix::from_dense_rows(&[vec![1.0, 2.0], vec![0.0, 3.0]])
            + BlockMatrix::from_dense_rows(&[vec![-1.0, 0.0], vec![0.0, 0.0]]);
        let sparse = m.to_sparse().expect("sparse export");
        let entries: Vec<(usize, usize, f64)> =
            sparse.triplet_iter().map(|t| (t.row, t.col, *t.val)).collect();
        assert_eq!(entries, vec![(0, 1, 2.0), (1, 1, 3.0)]);
        assert_eq!(sparse.nrows(), 2);
    }

    #[test]
    fn test_from_block_rows() {
        let row0 = BlockVector::with_indices(vec![1.0, 2.0], 0..2)
            + BlockVector::with_indices(vec![3.0], 4..5);
        let row1 = BlockVector::with_indices(vec![4.0, 5.0], 0..2)
            + BlockVector::with_indices(vec![6.0], 4..5);
        let m = BlockMatrix::from_block_rows(&[row0, row1]);

        assert_eq!(
            m.block_indices(),
            &[
                BlockMatrixIndices::new(0..2, 0..2),
                BlockMatrixIndices::new(0..2, 4..5)
            ]
        );
        assert_eq!(m.scalars(), &[1.0, 2.0, 4.0, 5.0, 3.0, 6.0]);
        assert_eq!(
            m.to_dense(),
            DMatrix::from_row_slice(2, 5, &[1.0, 2.0, 0.0, 0.0, 3.0, 4.0, 5.0, 0.0, 0.0, 6.0])
        );
    }

    #[test]
    fn test_from_block_rows_rejects_mixed_structure() {
        let rows = [
            BlockVector::with_indices(vec![1.0], 0..1),
            BlockVector::with_indices(vec![1.0], 1..2),
        ];
        assert!(BlockMatrix::try_from_block_rows(&rows).is_err());
    }

    #[test]
    #[should_panic(expected = "rows have different block structures")]
    fn test_from_block_rows_panics_on_mixed_structure() {
        let rows = [
            BlockVector::new(vec![1.0, 2.0]),
            BlockVector::with_indices(vec![1.0], 1..2),
        ];
        let _ = BlockMatrix::from_block_rows(&rows);
    }

    #[test]
    fn test_blocks_equal() {
        let a = sample();
        let mut b = sample();
        assert!(a.blocks_equal(&b, 0.0));
        b += BlockMatrix::eye(1);
        assert!(!a.blocks_equal(&b, 1e-9));
        assert!(!(2.0 * &a).blocks_equal(&a, 1e-9));
    }
}
