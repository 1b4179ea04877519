//! # Dense Weight Matrix
//!
//! Row-major 2-D storage used for every weight tensor and for the
//! per-sequence activation grids.

use std::io::{Read, Write};

use rayon::prelude::*;

use crate::error::{RensaError, Result};
use crate::rnn::persist::{read_dim, write_dim};

/// Dense row-major matrix of `f32` values.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl Matrix {
    /// Create a zero-filled matrix.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    /// Create a matrix with every element produced by `init`.
    pub fn from_fn(rows: usize, cols: usize, mut init: impl FnMut(usize, usize) -> f32) -> Self {
        let mut data = Vec::with_capacity(rows * cols);
        for r in 0..rows {
            for c in 0..cols {
                data.push(init(r, c));
            }
        }
        Self { rows, cols, data }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    pub fn get(&self, r: usize, c: usize) -> f32 {
        self.data[r * self.cols + c]
    }

    #[inline]
    pub fn set(&mut self, r: usize, c: usize, value: f32) {
        self.data[r * self.cols + c] = value;
    }

    #[inline]
    pub fn add(&mut self, r: usize, c: usize, delta: f32) {
        self.data[r * self.cols + c] += delta;
    }

    #[inline]
    pub fn row(&self, r: usize) -> &[f32] {
        &self.data[r * self.cols..(r + 1) * self.cols]
    }

    #[inline]
    pub fn row_mut(&mut self, r: usize) -> &mut [f32] {
        &mut self.data[r * self.cols..(r + 1) * self.cols]
    }

    /// Iterate rows in order.
    pub fn iter_rows(&self) -> impl Iterator<Item = &[f32]> {
        // chunks(0) panics, so an empty-width matrix yields no rows
        self.data.chunks(self.cols.max(1)).take(self.rows)
    }

    /// Parallel mutable access to whole rows. Each task owns one row, so
    /// callers may write freely inside the closure.
    pub fn par_rows_mut(&mut self) -> impl IndexedParallelIterator<Item = &mut [f32]> {
        let cols = self.cols.max(1);
        let rows = self.rows;
        self.data.par_chunks_mut(cols).take(rows)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Set every element to zero, keeping the shape.
    pub fn clear(&mut self) {
        self.data.iter_mut().for_each(|v| *v = 0.0);
    }

    pub fn is_zero(&self) -> bool {
        self.data.iter().all(|&v| v == 0.0)
    }

    /// Write `rows`, `cols` as little-endian `i32` followed by the values as `f32`.
    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        write_dim(w, self.rows, "matrix rows")?;
        write_dim(w, self.cols, "matrix cols")?;
        for v in &self.data {
            w.write_all(&v.to_le_bytes())?;
        }
        Ok(())
    }

    /// Inverse of [`Matrix::write_to`].
    pub fn read_from<R: Read>(r: &mut R) -> Result<Self> {
        let rows = read_dim(r, "matrix rows")?;
        let cols = read_dim(r, "matrix cols")?;
        read_values(r, rows, cols)
    }

    /// Like [`Matrix::read_from`], but fails before touching the values when
    /// the stored shape is not `rows` x `cols`.
    pub fn read_shaped<R: Read>(r: &mut R, rows: usize, cols: usize, what: &str) -> Result<Self> {
        let stored_rows = read_dim(r, "matrix rows")?;
        let stored_cols = read_dim(r, "matrix cols")?;
        if stored_rows != rows || stored_cols != cols {
            return Err(RensaError::DimensionMismatch(format!(
                "{what} weights are {stored_rows}x{stored_cols}, expected {rows}x{cols}"
            )));
        }
        read_values(r, rows, cols)
    }
}

// Element counts come from the file, so the buffer grows as values arrive
// and a short file ends in `read_exact` instead of a huge allocation.
fn read_values<R: Read>(r: &mut R, rows: usize, cols: usize) -> Result<Matrix> {
    let len = rows
        .checked_mul(cols)
        .filter(|n| n.checked_mul(4).is_some())
        .ok_or_else(|| RensaError::DimensionMismatch(format!("matrix of {rows}x{cols} is too large")))?;

    let mut data = Vec::new();
    let mut buf = [0u8; 4];
    for _ in 0..len {
        r.read_exact(&mut buf)?;
        data.push(f32::from_le_bytes(buf));
    }
    Ok(Matrix { rows, cols, data })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_and_elements() {
        let mut m = Matrix::from_fn(2, 3, |r, c| (r * 10 + c) as f32);
        assert_eq!(m.row(1), &[10.0, 11.0, 12.0]);
        m.add(0, 2, 0.5);
        assert_eq!(m.get(0, 2), 2.5);
        assert_eq!(m.iter_rows().count(), 2);
    }

    #[test]
    fn par_rows_cover_every_row() {
        let mut m = Matrix::zeros(5, 4);
        m.par_rows_mut()
            .enumerate()
            .for_each(|(r, row)| row.iter_mut().for_each(|v| *v = r as f32));
        for r in 0..5 {
            assert!(m.row(r).iter().all(|&v| v == r as f32));
        }
    }

    #[test]
    fn empty_width_matrix_is_harmless() {
        let mut m = Matrix::zeros(3, 0);
        assert_eq!(m.iter_rows().count(), 0);
        assert_eq!(m.par_rows_mut().count(), 0);
        assert!(m.is_zero());
    }

    #[test]
    fn binary_layout_is_stable() {
        let m = Matrix::from_fn(2, 2, |r, c| (r + c) as f32 * 0.25);
        let mut buf = Vec::new();
        m.write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), 8 + 4 * 4);
        assert_eq!(&buf[0..4], &2i32.to_le_bytes());

        let back = Matrix::read_from(&mut buf.as_slice()).unwrap();
        assert_eq!(back, m);
    }

    #[test]
    fn truncated_input_fails() {
        let m = Matrix::zeros(2, 2);
        let mut buf = Vec::new();
        m.write_to(&mut buf).unwrap();
        buf.truncate(10);
        assert!(Matrix::read_from(&mut buf.as_slice()).is_err());
    }

    #[test]
    fn oversized_dimensions_fail_without_allocating() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&i32::MAX.to_le_bytes());
        buf.extend_from_slice(&i32::MAX.to_le_bytes());
        buf.extend_from_slice(&[0u8; 16]);

        let result = std::panic::catch_unwind(|| Matrix::read_from(&mut buf.as_slice()));
        assert!(matches!(result, Ok(Err(_))));
    }

    #[test]
    fn shaped_read_checks_dimensions_first() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&i32::MAX.to_le_bytes());
        buf.extend_from_slice(&3i32.to_le_bytes());
        assert!(matches!(
            Matrix::read_shaped(&mut buf.as_slice(), 2, 3, "input2hidden"),
            Err(RensaError::DimensionMismatch(_))
        ));

        let m = Matrix::from_fn(2, 3, |r, c| (r * 3 + c) as f32);
        let mut buf = Vec::new();
        m.write_to(&mut buf).unwrap();
        assert_eq!(Matrix::read_shaped(&mut buf.as_slice(), 2, 3, "input2hidden").unwrap(), m);
    }

    #[test]
    fn write_rejects_dimensions_beyond_i32() {
        let m = Matrix {
            rows: i32::MAX as usize + 1,
            cols: 0,
            data: Vec::new(),
        };
        assert!(matches!(
            m.write_to(&mut Vec::new()),
            Err(RensaError::DimensionMismatch(_))
        ));
    }
}
