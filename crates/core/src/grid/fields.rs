//! Flat row-major 2D grids
//!
//! Stores a 2D field as a flat `Vec<T>` in row-major order, used for the
//! accumulated source map and the region mask.

use serde::{Deserialize, Serialize};

use crate::error::{check_len, ConvsrcError};

/// 2D field in row-major order (`row * cols + col`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldData<T> {
    /// Field values in row-major order
    pub data: Vec<T>,
    /// Number of rows (latitudes)
    pub rows: usize,
    /// Number of columns (longitudes)
    pub cols: usize,
}

impl<T: Copy + Default> FieldData<T> {
    /// Create a new field with given dimensions, initialized to the default value
    #[must_use]
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            data: vec![T::default(); rows * cols],
            rows,
            cols,
        }
    }

    /// Wrap existing row-major values
    ///
    /// # Errors
    /// Returns `ConvsrcError::RecordCount` if `data` is not `rows * cols` long
    pub fn from_vec(rows: usize, cols: usize, data: Vec<T>) -> Result<Self, ConvsrcError> {
        check_len("grid values", rows * cols, data.len())?;
        Ok(Self { data, rows, cols })
    }

    /// (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// Get value at grid position
    ///
    /// # Panics
    ///
    /// Panics if coordinates are out of bounds
    #[must_use]
    pub fn get(&self, row: usize, col: usize) -> T {
        assert!(row < self.rows && col < self.cols, "Coordinates out of bounds");
        self.data[row * self.cols + col]
    }

    /// Mutable reference to the value at grid position
    ///
    /// # Panics
    ///
    /// Panics if coordinates are out of bounds
    pub fn get_mut(&mut self, row: usize, col: usize) -> &mut T {
        assert!(row < self.rows && col < self.cols, "Coordinates out of bounds");
        &mut self.data[row * self.cols + col]
    }

    /// Clamp signed cell coordinates into the grid, as (row, col)
    #[inline]
    pub fn clamp_cell(&self, col: i64, row: i64) -> (usize, usize) {
        let r = row.clamp(0, self.rows as i64 - 1) as usize;
        let c = col.clamp(0, self.cols as i64 - 1) as usize;
        (r, c)
    }
}

impl FieldData<f64> {
    /// Sum of all values
    pub fn total(&self) -> f64 {
        self.data.iter().sum()
    }
}
