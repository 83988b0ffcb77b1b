//! Block-indexed sparse vectors.
//!
//! A [`BlockVector`] is an ordered list of index ranges, each paired with a contiguous run
//! of scalars in one flat buffer. Blocks may overlap; overlapping components are summed when
//! the vector is read (dense materialization, matrix products), never merged on write.
//!
//! ```text
//! blocks:  [5..8]      [9..10]
//! scalars: [1, 2, 3,   4]
//! dense:   [0, 0, 0, 0, 0, 1, 2, 3, 0, 4]
//! ```

use nalgebra::DVector;
use std::{
    fmt,
    fmt::{Display, Formatter},
    ops::{Add, AddAssign, Neg, Range, Sub, SubAssign},
};

/// Sparse vector stored as a list of (index range, scalars) blocks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlockVector {
    block_indices: Vec<Range<usize>>,
    scalars: Vec<f64>,
}

impl BlockVector {
    /// The empty vector: no blocks, dimension 0.
    pub fn zero() -> Self {
        Self::default()
    }

    /// A single block spanning `[0, scalars.len())`.
    pub fn new(scalars: Vec<f64>) -> Self {
        let len = scalars.len();
        Self::with_indices(scalars, 0..len)
    }

    /// A single block placed at `indices`.
    ///
    /// # Panics
    /// If `indices` and `scalars` have different lengths.
    pub fn with_indices(scalars: Vec<f64>, indices: Range<usize>) -> Self {
        assert_eq!(
            indices.len(),
            scalars.len(),
            "block {indices:?} cannot hold {} scalars",
            scalars.len()
        );
        Self {
            block_indices: vec![indices],
            scalars,
        }
    }

    /// Largest block upper bound, or 0 for the empty vector.
    pub fn dimension(&self) -> usize {
        self.block_indices.iter().map(|r| r.end).max().unwrap_or(0)
    }

    pub fn block_indices(&self) -> &[Range<usize>] {
        &self.block_indices
    }

    /// The flat scalar buffer, blocks laid out back to back.
    pub fn scalars(&self) -> &[f64] {
        &self.scalars
    }

    pub fn block_count(&self) -> usize {
        self.block_indices.len()
    }

    /// Iterate over `(index range, scalars)` pairs in insertion order.
    pub fn blocks(&self) -> impl Iterator<Item = (&Range<usize>, &[f64])> + '_ {
        let mut offset = 0;
        self.block_indices.iter().map(move |range| {
            let start = offset;
            offset += range.len();
            (range, &self.scalars[start..offset])
        })
    }

    /// True when the vector is exactly one block covering `[0, dimension)`.
    pub fn spans_exactly(&self, dimension: usize) -> bool {
        self.block_indices.len() == 1 && self.block_indices[0] == (0..dimension)
    }

    /// Copy with every block shifted by `by`.
    pub fn offsetting(&self, by: usize) -> Self {
        Self {
            block_indices: self
                .block_indices
                .iter()
                .map(|r| (r.start + by)..(r.end + by))
                .collect(),
            scalars: self.scalars.clone(),
        }
    }

    /// Add every block into `out`, which must be at least `dimension()` long.
    pub fn accumulate_into(&self, out: &mut [f64]) {
        for (range, values) in self.blocks() {
            for (slot, value) in out[range.clone()].iter_mut().zip(values) {
                *slot += value;
            }
        }
    }

    /// Dense vector of length `dimension()` with overlapping blocks summed.
    pub fn to_dense(&self) -> DVector<f64> {
        let mut dense = DVector::zeros(self.dimension());
        self.accumulate_into(dense.as_mut_slice());
        dense
    }

    /// Add `value` to every stored scalar.
    pub fn add_scalar(&mut self, value: f64) {
        self.scalars.iter_mut().for_each(|s| *s += value);
    }

    pub fn adding(&self, value: f64) -> Self {
        let mut result = self.clone();
        result.add_scalar(value);
        result
    }

    /// Subtract `value` from every stored scalar.
    pub fn subtract_scalar(&mut self, value: f64) {
        self.scalars.iter_mut().for_each(|s| *s -= value);
    }

    pub fn subtracting(&self, value: f64) -> Self {
        let mut result = self.clone();
        result.subtract_scalar(value);
        result
    }

    /// Multiply every stored scalar by `factor`.
    pub fn scale(&mut self, factor: f64) {
        self.scalars.iter_mut().for_each(|s| *s *= factor);
    }

    pub fn scaled(&self, factor: f64) -> Self {
        let mut result = self.clone();
        result.scale(factor);
        result
    }
}

impl AddAssign<&BlockVector> for BlockVector {
    fn add_assign(&mut self, rhs: &BlockVector) {
        self.block_indices.extend(rhs.block_indices.iter().cloned());
        self.scalars.extend_from_slice(&rhs.scalars);
    }
}

impl AddAssign for BlockVector {
    fn add_assign(&mut self, rhs: BlockVector) {
        self.block_indices.extend(rhs.block_indices);
        self.scalars.extend(rhs.scalars);
    }
}

impl SubAssign<&BlockVector> for BlockVector {
    fn sub_assign(&mut self, rhs: &BlockVector) {
        self.block_indices.extend(rhs.block_indices.iter().cloned());
        self.scalars.extend(rhs.scalars.iter().map(|s| -s));
    }
}

impl SubAssign for BlockVector {
    fn sub_assign(&mut self, rhs: BlockVector) {
        *self -= &rhs;
    }
}

impl Add for BlockVector {
    type Output = BlockVector;

    fn add(mut self, rhs: BlockVector) -> BlockVector {
        self += rhs;
        self
    }
}

impl Add for &BlockVector {
    type Output = BlockVector;

    fn add(self, rhs: &BlockVector) -> BlockVector {
        let mut result = self.clone();
        result += rhs;
        result
    }
}

impl Sub for BlockVector {
    type Output = BlockVector;

    fn sub(mut self, rhs: BlockVector) -> BlockVector {
        self -= &rhs;
        self
    }
}

impl Sub for &BlockVector {
    type Output = BlockVector;

    fn sub(self, rhs: &BlockVector) -> BlockVector {
        let mut result = self.clone();
        result -= rhs;
        result
    }
}

impl Neg for BlockVector {
    type Output = BlockVector;

    fn neg(self) -> BlockVector {
        self.scaled(-1.0)
    }
}

impl From<DVector<f64>> for BlockVector {
    fn from(vector: DVector<f64>) -> Self {
        BlockVector::new(vector.as_slice().to_vec())
    }
}

impl From<&BlockVector> for DVector<f64> {
    fn from(vector: &BlockVector) -> Self {
        vector.to_dense()
    }
}

impl Display for BlockVector {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "BlockVector(")?;
        for (i, (range, values)) in self.blocks().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}..{}: {:?}", range.start, range.end, values)?;
        }
        write!(f, ")")
    }
}
