//! Grayscale mask to RGBA raster expansion.

use crate::mask::MaskMatrix;
use crate::raster::{BYTES_PER_PIXEL, RasterBuffer};

/// Expand a mask into an opaque grayscale RGBA raster.
///
/// Every cell with intensity `v` becomes the pixel `(v, v, v, 255)` at offset
/// `(row * width + col) * 4`. No scaling, interpolation or color mapping.
pub fn decode(mask: &MaskMatrix) -> RasterBuffer {
    let mut pixels = Vec::with_capacity(mask.values().len() * BYTES_PER_PIXEL);
    for &v in mask.values() {
        pixels.extend_from_slice(&[v, v, v, u8::MAX]);
    }

    log::trace!("Decoded {}x{} mask into RGBA raster", mask.width(), mask.height());

    RasterBuffer::from_rgba8_unchecked(pixels, mask.width() as u32, mask.height() as u32)
}
