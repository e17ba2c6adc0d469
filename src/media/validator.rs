//! Candidate file validation.
//!
//! A file is accepted only when it declares an `image/*` media type. Browsers
//! supply the declared type with the file; for files read from disk the type
//! is declared from the extension, falling back to magic-byte detection.

use std::sync::Arc;

use crate::constants::{IMAGE_EXTENSIONS, IMAGE_MEDIA_PREFIX};
use crate::error::AnalysisError;

/// A file offered by the user, not yet validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFile {
    name: String,
    media_type: Option<String>,
    bytes: Arc<[u8]>,
}

impl CandidateFile {
    /// Create a candidate with the media type its source declared.
    ///
    /// An empty declared type is treated as undeclared.
    pub fn new(
        name: impl Into<String>,
        media_type: Option<String>,
        bytes: impl Into<Arc<[u8]>>,
    ) -> Self {
        Self {
            name: name.into(),
            media_type: media_type.filter(|t| !t.trim().is_empty()),
            bytes: bytes.into(),
        }
    }

    /// Create a candidate and declare its type from the name and content.
    pub fn detect(name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        let name = name.into();
        let bytes = bytes.into();
        let media_type = declared_media_type(&name, &bytes);
        Self {
            name,
            media_type,
            bytes,
        }
    }

    /// Read a candidate from disk.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn from_path(path: &std::path::Path) -> std::io::Result<Self> {
        let bytes = std::fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        log::debug!("📂 Read {} ({} bytes)", name, bytes.len());
        Ok(Self::detect(name, bytes))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn media_type(&self) -> Option<&str> {
        self.media_type.as_deref()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// A file that passed validation. Cheap to clone; the bytes are shared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFile {
    name: String,
    media_type: String,
    bytes: Arc<[u8]>,
}

impl MediaFile {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared `image/*` media type.
    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Why a candidate was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// No candidate was supplied
    Missing,
    /// The candidate does not declare an image type
    NotAnImage {
        /// Name of the rejected file
        file_name: String,
        /// Declared type, if any
        media_type: Option<String>,
    },
}

impl From<RejectReason> for AnalysisError {
    fn from(reason: RejectReason) -> Self {
        match reason {
            RejectReason::Missing => AnalysisError::MissingInput,
            RejectReason::NotAnImage {
                file_name,
                media_type,
            } => AnalysisError::UnsupportedMediaType {
                file_name,
                media_type: media_type.unwrap_or_else(|| "unknown".to_string()),
            },
        }
    }
}

/// Outcome of validating a candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    Accepted(MediaFile),
    Rejected(RejectReason),
}

impl Validation {
    /// Convert into a `Result`.
    pub fn into_result(self) -> Result<MediaFile, AnalysisError> {
        match self {
            Validation::Accepted(file) => Ok(file),
            Validation::Rejected(reason) => Err(reason.into()),
        }
    }
}

/// Accept a candidate only if it declares an image media type.
pub fn validate(candidate: Option<CandidateFile>) -> Validation {
    let Some(candidate) = candidate else {
        return Validation::Rejected(RejectReason::Missing);
    };

    match candidate.media_type {
        Some(media_type) if is_image_media_type(&media_type) => Validation::Accepted(MediaFile {
            name: candidate.name,
            media_type,
            bytes: candidate.bytes,
        }),
        media_type => {
            log::warn!(
                "Rejected '{}': declared type {:?} is not an image",
                candidate.name,
                media_type
            );
            Validation::Rejected(RejectReason::NotAnImage {
                file_name: candidate.name,
                media_type,
            })
        }
    }
}

/// Check whether a media type string names an image type.
pub fn is_image_media_type(media_type: &str) -> bool {
    media_type
        .trim()
        .to_ascii_lowercase()
        .strip_prefix(IMAGE_MEDIA_PREFIX)
        .is_some_and(|subtype| !subtype.is_empty())
}

/// Check if a filename has a supported image extension.
pub fn is_image_file(filename: &str) -> bool {
    extension(filename).is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

fn extension(filename: &str) -> Option<String> {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
}

/// Media type a local file declares: by extension first, then by content.
fn declared_media_type(name: &str, bytes: &[u8]) -> Option<String> {
    if let Some(ext) = extension(name).filter(|_| is_image_file(name)) {
        if ext == "heic" {
            return Some("image/heic".to_string());
        }
        if let Some(format) = image::ImageFormat::from_extension(&ext) {
            return Some(format.to_mime_type().to_string());
        }
    }

    image::guess_format(bytes)
        .ok()
        .map(|format| format.to_mime_type().to_string())
}
