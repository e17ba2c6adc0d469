//! Immutable snapshot of one completed analysis.

use std::sync::Arc;

use base64::Engine;
use mela_raster::{MaskMatrix, MetricsConfig, RasterBuffer};

use crate::analysis::{AnalysisResponse, MetricsPayload};
use crate::error::{AnalysisError, Result};

/// Media type assumed for images the service encodes.
const PNG_MEDIA_TYPE: &str = "image/png";
const UNKNOWN_MEDIA_TYPE: &str = "application/octet-stream";
/// Base64 characters decoded to recognize an image format by its signature.
const SNIFF_BASE64_LEN: usize = 32;

/// A displayable raster: either a base64 payload or a locally decoded buffer.
///
/// Never a preview handle; a result stays renderable after the selection it
/// came from has been released.
#[derive(Debug, Clone, PartialEq)]
pub enum RasterRef {
    Encoded { media_type: String, base64: String },
    Decoded(Arc<RasterBuffer>),
}

impl RasterRef {
    /// Wrap a base64 image payload.
    pub fn encoded(media_type: impl Into<String>, base64: impl Into<String>) -> Self {
        Self::Encoded {
            media_type: media_type.into(),
            base64: base64.into(),
        }
    }

    /// An encoded image whose media type is recognized from its leading bytes.
    /// Unrecognized payloads are labelled `application/octet-stream`.
    pub fn sniffed(base64: String) -> Self {
        let trimmed = base64.trim();
        let head_len = trimmed.len().min(SNIFF_BASE64_LEN) / 4 * 4;
        let media_type = trimmed
            .get(..head_len)
            .and_then(|head| base64::engine::general_purpose::STANDARD.decode(head).ok())
            .and_then(|head| image::guess_format(&head).ok())
            .map_or(UNKNOWN_MEDIA_TYPE, |format| format.to_mime_type());
        Self::encoded(media_type, base64)
    }

    /// The base64 payload, if this is an encoded image.
    pub fn base64(&self) -> Option<&str> {
        match self {
            Self::Encoded { base64, .. } => Some(base64.as_str()),
            Self::Decoded(_) => None,
        }
    }

    /// The decoded buffer, if this is a local raster.
    pub fn raster(&self) -> Option<&RasterBuffer> {
        match self {
            Self::Encoded { .. } => None,
            Self::Decoded(raster) => Some(raster.as_ref()),
        }
    }

    /// Render as a `data:` URL. Local rasters are encoded as PNG.
    pub fn to_data_url(&self) -> Result<String> {
        match self {
            Self::Encoded { media_type, base64 } => {
                Ok(format!("data:{};base64,{}", media_type, base64))
            }
            Self::Decoded(raster) => {
                let mut png = std::io::Cursor::new(Vec::new());
                to_rgba_image(raster)?
                    .write_to(&mut png, image::ImageFormat::Png)
                    .map_err(|e| {
                        AnalysisError::MalformedResponse(format!("PNG encoding failed: {}", e))
                    })?;
                Ok(format!(
                    "data:{};base64,{}",
                    PNG_MEDIA_TYPE,
                    base64::engine::general_purpose::STANDARD.encode(png.into_inner())
                ))
            }
        }
    }

    /// Decode into an RGBA image for export.
    pub fn to_rgba_image(&self) -> Result<image::RgbaImage> {
        match self {
            Self::Encoded { base64, .. } => {
                let bytes = base64::engine::general_purpose::STANDARD
                    .decode(base64.trim())
                    .map_err(|e| {
                        AnalysisError::MalformedResponse(format!("invalid base64 image: {}", e))
                    })?;
                let decoded = image::load_from_memory(&bytes).map_err(|e| {
                    AnalysisError::MalformedResponse(format!("undecodable image: {}", e))
                })?;
                Ok(decoded.to_rgba8())
            }
            Self::Decoded(raster) => to_rgba_image(raster),
        }
    }
}

fn to_rgba_image(raster: &RasterBuffer) -> Result<image::RgbaImage> {
    image::RgbaImage::from_raw(raster.width(), raster.height(), raster.as_bytes().to_vec())
        .ok_or_else(|| {
            AnalysisError::MalformedResponse(format!(
                "raster of {}x{} does not match its buffer",
                raster.width(),
                raster.height()
            ))
        })
}

/// One completed analysis. Built once, read-only afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisResult {
    id: String,
    file_name: String,
    mesh_density: f64,
    branch_points: u32,
    mesh_uniformity: f64,
    quality_score: Option<f64>,
    circularity: Option<f64>,
    days_after_crossing: Option<i64>,
    input_image: Option<RasterRef>,
    detection_image: Option<RasterRef>,
    estimated_mesh_image: Option<RasterRef>,
    contour_image: Option<RasterRef>,
    branch_vis_image: Option<RasterRef>,
    summary: String,
}

impl AnalysisResult {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Mesh density in percent.
    pub fn mesh_density(&self) -> f64 {
        self.mesh_density
    }

    /// Mesh density formatted for display, e.g. `81.3%`.
    pub fn mesh_density_label(&self) -> String {
        format!("{:.1}%", self.mesh_density)
    }

    pub fn branch_points(&self) -> u32 {
        self.branch_points
    }

    pub fn mesh_uniformity(&self) -> f64 {
        self.mesh_uniformity
    }

    pub fn quality_score(&self) -> Option<f64> {
        self.quality_score
    }

    pub fn circularity(&self) -> Option<f64> {
        self.circularity
    }

    /// Whole days since the crossing date, when one was supplied.
    pub fn days_after_crossing(&self) -> Option<i64> {
        self.days_after_crossing
    }

    pub fn input_image(&self) -> Option<&RasterRef> {
        self.input_image.as_ref()
    }

    pub fn detection_image(&self) -> Option<&RasterRef> {
        self.detection_image.as_ref()
    }

    pub fn estimated_mesh_image(&self) -> Option<&RasterRef> {
        self.estimated_mesh_image.as_ref()
    }

    pub fn contour_image(&self) -> Option<&RasterRef> {
        self.contour_image.as_ref()
    }

    pub fn branch_vis_image(&self) -> Option<&RasterRef> {
        self.branch_vis_image.as_ref()
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    /// All rasters present, keyed by a short stable name.
    pub fn images(&self) -> Vec<(&'static str, &RasterRef)> {
        [
            ("input", &self.input_image),
            ("detection", &self.detection_image),
            ("estimated-mesh", &self.estimated_mesh_image),
            ("contour", &self.contour_image),
            ("branch-vis", &self.branch_vis_image),
        ]
        .into_iter()
        .filter_map(|(name, image)| image.as_ref().map(|image| (name, image)))
        .collect()
    }
}

/// Merges a parsed response with request-side facts into an [`AnalysisResult`].
#[derive(Debug, Clone)]
pub struct ResultAssembly {
    id: String,
    file_name: String,
    days_after_crossing: Option<i64>,
    input_image: RasterRef,
    metrics_config: MetricsConfig,
}

impl ResultAssembly {
    /// Start an assembly for the file that was submitted.
    ///
    /// `input_image` is the submitted payload; it is used when the service
    /// does not echo the input back.
    pub fn new(id: impl Into<String>, file_name: impl Into<String>, input_image: RasterRef) -> Self {
        Self {
            id: id.into(),
            file_name: file_name.into(),
            days_after_crossing: None,
            input_image,
            metrics_config: MetricsConfig::default(),
        }
    }

    pub fn days_after_crossing(mut self, days: Option<i64>) -> Self {
        self.days_after_crossing = days;
        self
    }

    pub fn metrics_config(mut self, config: MetricsConfig) -> Self {
        self.metrics_config = config;
        self
    }

    pub fn build(self, response: AnalysisResponse) -> AnalysisResult {
        match response {
            AnalysisResponse::Metrics(payload) => self.metrics_result(*payload),
            AnalysisResponse::Mask(mask) => self.mask_result(&mask),
        }
    }

    fn metrics_result(self, payload: MetricsPayload) -> AnalysisResult {
        let encoded = |b64: Option<String>| b64.map(RasterRef::sniffed);
        let branch_points = payload.branch_points.round() as u32;

        AnalysisResult {
            summary: summary(
                &self.file_name,
                payload.density,
                branch_points,
                payload.mesh_uniformity,
                self.days_after_crossing,
            ),
            id: self.id,
            file_name: self.file_name,
            mesh_density: payload.density,
            branch_points,
            mesh_uniformity: payload.mesh_uniformity,
            quality_score: payload.quality_score,
            circularity: payload.circularity,
            days_after_crossing: self.days_after_crossing,
            input_image: encoded(payload.input_image).or(Some(self.input_image)),
            detection_image: encoded(payload.plotted_image),
            estimated_mesh_image: encoded(payload.mask_image),
            contour_image: encoded(payload.contour_image),
            branch_vis_image: encoded(payload.branch_vis_image),
        }
    }

    fn mask_result(self, mask: &MaskMatrix) -> AnalysisResult {
        let metrics = mela_raster::measure(mask, &self.metrics_config);
        let raster = Arc::new(mela_raster::decode(mask));

        AnalysisResult {
            summary: summary(
                &self.file_name,
                metrics.density_percent,
                metrics.branch_points,
                metrics.uniformity,
                self.days_after_crossing,
            ),
            id: self.id,
            file_name: self.file_name,
            mesh_density: metrics.density_percent,
            branch_points: metrics.branch_points,
            mesh_uniformity: metrics.uniformity,
            quality_score: None,
            circularity: None,
            days_after_crossing: self.days_after_crossing,
            input_image: Some(self.input_image),
            detection_image: None,
            estimated_mesh_image: Some(RasterRef::Decoded(raster)),
            contour_image: None,
            branch_vis_image: None,
        }
    }
}

fn summary(
    file_name: &str,
    density: f64,
    branch_points: u32,
    uniformity: f64,
    days_after_crossing: Option<i64>,
) -> String {
    let mut text = format!(
        "Analyzed the melon mesh of '{}': density {:.1}%, {} branch points, uniformity {:.2}.",
        file_name, density, branch_points, uniformity
    );
    if let Some(days) = days_after_crossing {
        text.push_str(&format!(" Captured {} days after crossing.", days));
    }
    text
}
