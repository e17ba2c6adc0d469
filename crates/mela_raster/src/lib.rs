//! Pixel layer for MELA.
//!
//! Turns single-channel mask matrices returned by the analysis service into
//! opaque RGBA raster buffers, and derives the mesh metrics a raw mask carries.

pub mod config;
pub mod decode;
pub mod error;
pub mod mask;
pub mod metrics;
pub mod raster;

pub use config::MetricsConfig;
pub use decode::decode;
pub use error::{RasterError, Result};
pub use mask::MaskMatrix;
pub use metrics::{MaskMetrics, measure};
pub use raster::RasterBuffer;
