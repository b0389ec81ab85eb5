//! Compressed sparse row (CSR) matrix
//!
//! Vectorized trip features are almost entirely zeros (one active
//! zone-pair column per row), so rows only store their non-zero entries.

use serde::{Deserialize, Serialize};

/// Row-major sparse matrix of `f64` values.
///
/// Column indices inside each row are strictly increasing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CsrMatrix {
    n_cols: usize,
    indptr: Vec<usize>,
    indices: Vec<usize>,
    values: Vec<f64>,
}

impl CsrMatrix {
    /// Create an empty matrix with a fixed column count
    pub fn new(n_cols: usize) -> Self {
        Self {
            n_cols,
            indptr: vec![0],
            indices: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Append a row from `(column, value)` entries.
    ///
    /// Entries are sorted by column, duplicate columns are summed and
    /// explicit zeros and out-of-range columns are dropped.
    pub fn push_row(&mut self, entries: &[(usize, f64)]) {
        let mut sorted: Vec<(usize, f64)> = entries
            .iter()
            .copied()
            .filter(|&(col, _)| col < self.n_cols)
            .collect();
        sorted.sort_by_key(|&(col, _)| col);

        let mut merged: Vec<(usize, f64)> = Vec::with_capacity(sorted.len());
        for (col, value) in sorted {
            match merged.last_mut() {
                Some((last_col, last_value)) if *last_col == col => *last_value += value,
                _ => merged.push((col, value)),
            }
        }

        for (col, value) in merged {
            if value != 0.0 {
                self.indices.push(col);
                self.values.push(value);
            }
        }
        self.indptr.push(self.indices.len());
    }

    /// Number of rows
    pub fn n_rows(&self) -> usize {
        self.indptr.len() - 1
    }

    /// Number of columns
    pub fn n_cols(&self) -> usize {
        self.n_cols
    }

    /// (rows, columns)
    pub fn shape(&self) -> (usize, usize) {
        (self.n_rows(), self.n_cols)
    }

    /// Number of stored (non-zero) entries
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Iterate over the stored entries of one row
    pub fn row(&self, row: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        let start = self.indptr[row];
        let end = self.indptr[row + 1];
        self.indices[start..end]
            .iter()
            .copied()
            .zip(self.values[start..end].iter().copied())
    }

    /// Value at `(row, col)`; missing entries are zero
    pub fn get(&self, row: usize, col: usize) -> f64 {
        let start = self.indptr[row];
        let end = self.indptr[row + 1];
        match self.indices[start..end].binary_search(&col) {
            Ok(pos) => self.values[start + pos],
            Err(_) => 0.0,
        }
    }

    /// Dense copy of one row
    pub fn dense_row(&self, row: usize) -> Vec<f64> {
        let mut dense = vec![0.0; self.n_cols];
        for (col, value) in self.row(row) {
            dense[col] = value;
        }
        dense
    }
}
