//! Tunables for deriving mesh metrics from a raw mask.

/// Configuration for [`crate::measure`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricsConfig {
    /// Box blur radius applied before binarization (0 disables the blur).
    pub blur_radius: usize,
    /// Pixels strictly above this intensity count as mesh after blurring.
    pub binarize_threshold: u8,
    /// Branch pixels closer than this (in pixels) are merged into one branch point.
    pub branch_cluster_radius: f64,
    /// Number of tiles per side used for the uniformity score.
    pub uniformity_tiles: usize,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            blur_radius: 4,
            binarize_threshold: 100,
            branch_cluster_radius: 5.0,
            uniformity_tiles: 4,
        }
    }
}

impl MetricsConfig {
    /// Config that binarizes the mask as-is, without smoothing.
    pub fn unblurred() -> Self {
        Self {
            blur_radius: 0,
            ..Self::default()
        }
    }
}
