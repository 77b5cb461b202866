//! Row-major dense matrices.
//!
//! Every batch in adjnet is a [`Matrix`] with one sample per row: inputs
//! `(num_samples, input_dim)`, outputs `(num_samples, output_dim)`, layer
//! caches `(num_samples, neurons)`. Weight layers use the same layout with
//! one neuron per row.
//!
//! ```rust
//! use adjnet::Matrix;
//!
//! let m = Matrix::from_rows(&[vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
//! assert_eq!(m.shape(), (2, 2));
//! assert_eq!(m[(1, 0)], 3.0);
//! assert_eq!(m.row(0), &[1.0, 2.0]);
//! ```

use std::ops::{Index, IndexMut};

use wide::f64x4;

use crate::error::{AdjnetError, AdjnetResult};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Dense row-major `f64` matrix.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "MatrixRepr"))]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

#[cfg(feature = "serde")]
#[derive(Deserialize)]
struct MatrixRepr {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

#[cfg(feature = "serde")]
impl TryFrom<MatrixRepr> for Matrix {
    type Error = AdjnetError;

    fn try_from(repr: MatrixRepr) -> AdjnetResult<Self> {
        Self::from_vec(repr.rows, repr.cols, repr.data)
    }
}

impl Matrix {
    /// Zero matrix of the given shape.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    /// Wraps a row-major buffer.
    ///
    /// # Errors
    ///
    /// [`AdjnetError::ShapeMismatch`] if `data.len() != rows * cols`.
    pub fn from_vec(rows: usize, cols: usize, data: Vec<f64>) -> AdjnetResult<Self> {
        if data.len() != rows * cols {
            return Err(AdjnetError::shape_mismatch(&[rows * cols], &[data.len()]));
        }
        Ok(Self { rows, cols, data })
    }

    /// Builds a matrix from equally sized rows.
    ///
    /// An empty slice gives a `0 × 0` matrix.
    pub fn from_rows<R: AsRef<[f64]>>(rows: &[R]) -> AdjnetResult<Self> {
        let cols = rows.first().map_or(0, |r| r.as_ref().len());
        let mut data = Vec::with_capacity(rows.len() * cols);
        for row in rows {
            let row = row.as_ref();
            if row.len() != cols {
                return Err(AdjnetError::shape_mismatch(&[cols], &[row.len()]));
            }
            data.extend_from_slice(row);
        }
        Ok(Self {
            rows: rows.len(),
            cols,
            data,
        })
    }

    /// Single-column matrix.
    pub fn column_vector(values: &[f64]) -> Self {
        Self {
            rows: values.len(),
            cols: 1,
            data: values.to_vec(),
        }
    }

    /// Single-row matrix.
    pub fn row_vector(values: &[f64]) -> Self {
        Self {
            rows: 1,
            cols: values.len(),
            data: values.to_vec(),
        }
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// `(rows, cols)`.
    #[inline]
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Borrow row `r`.
    #[inline]
    pub fn row(&self, r: usize) -> &[f64] {
        let start = r * self.cols;
        &self.data[start..start + self.cols]
    }

    /// Mutably borrow row `r`.
    #[inline]
    pub fn row_mut(&mut self, r: usize) -> &mut [f64] {
        let start = r * self.cols;
        &mut self.data[start..start + self.cols]
    }

    /// Copies column `c` out.
    pub fn column(&self, c: usize) -> Vec<f64> {
        (0..self.rows).map(|r| self.data[r * self.cols + c]).collect()
    }

    /// Raw row-major data.
    #[inline]
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }

    /// Consumes the matrix, returning the row-major buffer.
    pub fn into_vec(self) -> Vec<f64> {
        self.data
    }

    /// Concatenates matrices column-wise: `[a, b, …]`.
    ///
    /// # Errors
    ///
    /// [`AdjnetError::ShapeMismatch`] if the row counts differ.
    pub fn hstack(parts: &[&Matrix]) -> AdjnetResult<Matrix> {
        let rows = parts.first().map_or(0, |m| m.rows);
        if let Some(bad) = parts.iter().find(|m| m.rows != rows) {
            return Err(AdjnetError::shape_mismatch(
                &[rows, bad.cols],
                &[bad.rows, bad.cols],
            ));
        }
        let cols: usize = parts.iter().map(|m| m.cols).sum();
        let mut out = Matrix::zeros(rows, cols);
        for r in 0..rows {
            let dst = out.row_mut(r);
            let mut offset = 0;
            for part in parts {
                dst[offset..offset + part.cols].copy_from_slice(part.row(r));
                offset += part.cols;
            }
        }
        Ok(out)
    }

    /// Element-wise difference `self - other`.
    pub fn sub(&self, other: &Matrix) -> AdjnetResult<Matrix> {
        if self.shape() != other.shape() {
            return Err(AdjnetError::shape_mismatch(
                &[self.rows, self.cols],
                &[other.rows, other.cols],
            ));
        }
        let data = self
            .data
            .iter()
            .zip(&other.data)
            .map(|(a, b)| a - b)
            .collect();
        Ok(Matrix {
            rows: self.rows,
            cols: self.cols,
            data,
        })
    }

    /// Sum of squared entries.
    pub fn sum_squares(&self) -> f64 {
        self.data.iter().map(|v| v * v).sum()
    }

    /// Largest absolute entry (0 for an empty matrix).
    pub fn max_abs(&self) -> f64 {
        self.data.iter().fold(0.0f64, |m, v| m.max(v.abs()))
    }
}

impl Index<(usize, usize)> for Matrix {
    type Output = f64;

    #[inline]
    fn index(&self, (r, c): (usize, usize)) -> &f64 {
        &self.data[r * self.cols + c]
    }
}

impl IndexMut<(usize, usize)> for Matrix {
    #[inline]
    fn index_mut(&mut self, (r, c): (usize, usize)) -> &mut f64 {
        &mut self.data[r * self.cols + c]
    }
}

/// Dot product of two equally long slices.
///
/// Four lanes at a time through `f64x4`, scalar tail. The summation order
/// depends only on the length, so results are reproducible.
#[inline]
pub(crate) fn dot(a: &[f64], b: &[f64]) -> f64 {
    debug_assert_eq!(a.len(), b.len());

    let chunks = a.len() / 4;
    let mut acc = f64x4::splat(0.0);
    for chunk in 0..chunks {
        let i = chunk * 4;
        let va = f64x4::new([a[i], a[i + 1], a[i + 2], a[i + 3]]);
        let vb = f64x4::new([b[i], b[i + 1], b[i + 2], b[i + 3]]);
        acc += va * vb;
    }

    let lanes: [f64; 4] = acc.into();
    let mut sum = (lanes[0] + lanes[1]) + (lanes[2] + lanes[3]);
    for i in chunks * 4..a.len() {
        sum += a[i] * b[i];
    }
    sum
}
