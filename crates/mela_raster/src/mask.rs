//! Single-channel intensity matrices as returned by the mask endpoint.

use crate::error::{RasterError, Result};

/// A rectangular, non-empty grid of grayscale intensities.
///
/// Stored row-major. A `MaskMatrix` can only be built through the checked
/// constructors, so every instance is known to be rectangular and in range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaskMatrix {
    width: usize,
    height: usize,
    values: Vec<u8>,
}

impl MaskMatrix {
    /// Build a matrix from rows of bytes.
    ///
    /// Fails on an empty matrix, an empty first row, or rows of unequal length.
    pub fn from_rows<R: AsRef<[u8]>>(rows: &[R]) -> Result<Self> {
        let (width, height) = check_shape(rows.iter().map(|r| r.as_ref().len()), rows.len())?;

        let mut values = Vec::with_capacity(width * height);
        for row in rows {
            values.extend_from_slice(row.as_ref());
        }

        Ok(Self {
            width,
            height,
            values,
        })
    }

    /// Build a matrix from wide integers, rejecting anything outside `0..=255`.
    pub fn from_values(rows: &[Vec<i64>]) -> Result<Self> {
        let (width, height) = check_shape(rows.iter().map(Vec::len), rows.len())?;

        let mut values = Vec::with_capacity(width * height);
        for (row, cells) in rows.iter().enumerate() {
            for (col, &value) in cells.iter().enumerate() {
                let byte = u8::try_from(value)
                    .map_err(|_| RasterError::ValueOutOfRange { row, col, value })?;
                values.push(byte);
            }
        }

        Ok(Self {
            width,
            height,
            values,
        })
    }

    /// Number of columns.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Number of rows.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Intensity at (row, col), if inside the matrix.
    pub fn get(&self, row: usize, col: usize) -> Option<u8> {
        if row < self.height && col < self.width {
            Some(self.values[row * self.width + col])
        } else {
            None
        }
    }

    /// All intensities, row-major.
    pub fn values(&self) -> &[u8] {
        &self.values
    }

    /// Iterate over rows.
    pub fn rows(&self) -> impl Iterator<Item = &[u8]> {
        self.values.chunks_exact(self.width)
    }
}

fn check_shape(mut lengths: impl Iterator<Item = usize>, height: usize) -> Result<(usize, usize)> {
    let width = lengths.next().ok_or(RasterError::EmptyMatrix)?;
    if width == 0 {
        return Err(RasterError::EmptyRow);
    }

    for (offset, found) in lengths.enumerate() {
        if found != width {
            return Err(RasterError::RaggedRow {
                row: offset + 1,
                expected: width,
                found,
            });
        }
    }

    Ok((width, height))
}
