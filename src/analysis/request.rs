//! Request body sent to the analysis service.

use base64::Engine;
use serde::Serialize;

use crate::media::MediaFile;

/// `{"image_data": <base64>, "filename": <name>}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalysisRequest {
    image_data: String,
    filename: String,
}

impl AnalysisRequest {
    /// Encode a file's raw bytes as standard base64.
    pub fn encode(file: &MediaFile) -> Self {
        Self {
            image_data: base64::engine::general_purpose::STANDARD.encode(file.bytes()),
            filename: file.name().to_string(),
        }
    }

    /// Base64 of the submitted bytes.
    pub fn image_data(&self) -> &str {
        &self.image_data
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }
}
