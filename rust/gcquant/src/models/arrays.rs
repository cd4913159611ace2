use crate::errors::{
    GcmsError,
    Result,
};

/// Dense row-major matrix of `f64`.
///
/// Rows are scans or reference spectra, `major_dim` is the row width
/// and `minor_dim` the number of rows. A row is always borrowable as a
/// contiguous slice.
#[derive(Debug, Clone, PartialEq)]
pub struct Array2D {
    values: Vec<f64>,
    major_dim: usize,
    minor_dim: usize,
}

impl Array2D {
    pub fn zeros(nrows: usize, ncols: usize) -> Self {
        Array2D {
            values: vec![0.0; nrows * ncols],
            major_dim: ncols,
            minor_dim: nrows,
        }
    }

    pub fn new<S: AsRef<[f64]>, C: AsRef<[S]>>(rows: C) -> Result<Array2D> {
        let nrows = rows.as_ref().len();
        let ncols = rows.as_ref().first().map(|r| r.as_ref().len()).unwrap_or(0);

        let mut values = Vec::with_capacity(nrows * ncols);
        for (i, row) in rows.as_ref().iter().enumerate() {
            if row.as_ref().len() != ncols {
                return Err(GcmsError::format(
                    format!(
                        "row {} has {} columns, expected {}",
                        i,
                        row.as_ref().len(),
                        ncols
                    ),
                    None,
                ));
            }
            values.extend_from_slice(row.as_ref());
        }

        Ok(Array2D {
            values,
            major_dim: ncols,
            minor_dim: nrows,
        })
    }

    /// Apply a function to each row of the array
    pub fn row_apply<'a: 'b, 'b, W, F: FnMut(&[f64]) -> W + 'b>(
        &'a self,
        f: F,
    ) -> impl Iterator<Item = W> + 'b {
        self.iter_rows().map(f)
    }

    pub fn iter_rows(&self) -> impl Iterator<Item = &[f64]> + '_ {
        // `chunks` panics on a zero chunk size, zero-width matrices still have rows.
        let width = self.major_dim.max(1);
        let empty: &[f64] = &[];
        let zero_width = self.major_dim == 0;
        let nrows = self.minor_dim;
        self.values
            .chunks(width)
            .chain(std::iter::repeat(empty).take(if zero_width { nrows } else { 0 }))
    }

    pub fn iter_mut_rows(&mut self) -> impl Iterator<Item = &mut [f64]> {
        self.values.chunks_mut(self.major_dim.max(1))
    }

    pub fn get(&self, row_idx: usize, col_idx: usize) -> Option<f64> {
        if row_idx >= self.minor_dim || col_idx >= self.major_dim {
            return None;
        }
        Some(self.values[row_idx * self.major_dim + col_idx])
    }

    pub fn get_row(&self, index: usize) -> Option<&[f64]> {
        if index >= self.minor_dim {
            return None;
        }
        let start = index * self.major_dim;
        Some(&self.values[start..start + self.major_dim])
    }

    /// Copies one column out of the array.
    pub fn column(&self, index: usize) -> Option<Vec<f64>> {
        if index >= self.major_dim {
            return None;
        }
        Some(
            (0..self.minor_dim)
                .map(|r| self.values[r * self.major_dim + index])
                .collect(),
        )
    }

    /// Appends a row. Only an array with no rows and no columns adopts the
    /// width of its first row.
    pub fn push_row(&mut self, row: &[f64]) -> Result<()> {
        let adopts_width = self.minor_dim == 0 && self.major_dim == 0;
        if !adopts_width && row.len() != self.major_dim {
            return Err(GcmsError::format(
                format!(
                    "cannot append row of length {} to array with {} columns",
                    row.len(),
                    self.major_dim
                ),
                None,
            ));
        }
        if adopts_width {
            self.major_dim = row.len();
        }
        self.values.extend_from_slice(row);
        self.minor_dim += 1;
        Ok(())
    }

    pub fn nrows(&self) -> usize {
        self.minor_dim
    }

    pub fn ncols(&self) -> usize {
        self.major_dim
    }

    /// Row-wise sums.
    pub fn row_sums(&self) -> Vec<f64> {
        self.row_apply(|row| row.iter().sum()).collect()
    }
}
