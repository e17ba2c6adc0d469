use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RasterError {
    #[error("Malformed mask matrix: the matrix has no rows")]
    EmptyMatrix,

    #[error("Malformed mask matrix: the first row has no columns")]
    EmptyRow,

    #[error("Malformed mask matrix: row {row} has {found} columns, expected {expected}")]
    RaggedRow {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("Malformed mask matrix: value {value} at ({row}, {col}) is outside 0..=255")]
    ValueOutOfRange { row: usize, col: usize, value: i64 },

    #[error("Invalid raster size: expected {expected} bytes for {width}x{height} RGBA8, got {found}")]
    BufferSize {
        width: u32,
        height: u32,
        expected: usize,
        found: usize,
    },
}

pub type Result<T> = std::result::Result<T, RasterError>;
