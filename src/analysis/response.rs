//! Response shapes returned by the analysis service.
//!
//! Two contracts exist: a structured metrics object with encoded images, and a
//! bare 2-D intensity array. Both are parsed once, at the boundary, into
//! [`AnalysisResponse`].

use mela_raster::MaskMatrix;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AnalysisError, Result};

/// Which response shape the configured endpoint returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResponseContract {
    /// Classify by the JSON root: object is metrics, array is a mask
    #[default]
    Auto,
    /// Structured metrics object
    Metrics,
    /// Bare intensity matrix
    Mask,
}

impl ResponseContract {
    pub fn name(&self) -> &'static str {
        match self {
            ResponseContract::Auto => "auto",
            ResponseContract::Metrics => "metrics",
            ResponseContract::Mask => "mask",
        }
    }

    /// Parse a contract name case-insensitively.
    pub fn parse(name: &str) -> Option<Self> {
        [Self::Auto, Self::Metrics, Self::Mask]
            .into_iter()
            .find(|c| c.name().eq_ignore_ascii_case(name.trim()))
    }
}

/// Structured metrics response. Images are base64 payloads.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MetricsPayload {
    /// Mesh density in percent
    pub density: f64,
    pub branch_points: f64,
    pub mesh_uniformity: f64,
    #[serde(default)]
    pub quality_score: Option<f64>,
    #[serde(default)]
    pub circularity: Option<f64>,
    #[serde(default)]
    pub input_image: Option<String>,
    /// Detection overlay
    #[serde(default)]
    pub plotted_image: Option<String>,
    /// Estimated mesh mask
    #[serde(default)]
    pub mask_image: Option<String>,
    #[serde(default)]
    pub branch_vis_image: Option<String>,
    #[serde(default)]
    pub contour_image: Option<String>,
}

impl MetricsPayload {
    fn check(self) -> Result<Self> {
        let numbers = [
            ("density", Some(self.density)),
            ("branch_points", Some(self.branch_points)),
            ("mesh_uniformity", Some(self.mesh_uniformity)),
            ("quality_score", self.quality_score),
            ("circularity", self.circularity),
        ];
        if let Some((field, _)) = numbers
            .iter()
            .find(|(_, v)| v.is_some_and(|v| !v.is_finite()))
        {
            return Err(AnalysisError::MalformedResponse(format!(
                "field '{}' is not a finite number",
                field
            )));
        }
        if self.branch_points < 0.0 {
            return Err(AnalysisError::MalformedResponse(
                "field 'branch_points' is negative".to_string(),
            ));
        }
        Ok(self)
    }
}

/// A successful response, tagged by shape.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisResponse {
    Metrics(Box<MetricsPayload>),
    Mask(MaskMatrix),
}

impl AnalysisResponse {
    /// Parse a 2xx response body under `contract`.
    pub fn parse(body: &str, contract: ResponseContract) -> Result<Self> {
        let value: Value = serde_json::from_str(body)?;

        match (contract, &value) {
            (ResponseContract::Metrics, _) | (ResponseContract::Auto, Value::Object(_)) => {
                let payload: MetricsPayload = serde_json::from_value(value)?;
                Ok(Self::Metrics(Box::new(payload.check()?)))
            }
            (ResponseContract::Mask, _) | (ResponseContract::Auto, Value::Array(_)) => {
                let rows: Vec<Vec<i64>> = serde_json::from_value(value)?;
                Ok(Self::Mask(MaskMatrix::from_values(&rows)?))
            }
            (ResponseContract::Auto, other) => Err(AnalysisError::MalformedResponse(format!(
                "expected a metrics object or a mask array, got {}",
                json_kind(other)
            ))),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Extract a human-readable message from a non-2xx response.
///
/// Tries `{"error": ..}` (or `{"message": ..}`) directly, then the same keys
/// inside a JSON string under `body`, then the status text.
pub fn extract_error_message(body: &str, status: u16, status_text: &str) -> String {
    fn direct(value: &Value) -> Option<String> {
        ["error", "message"]
            .iter()
            .filter_map(|key| value.get(key).and_then(Value::as_str))
            .map(str::trim)
            .find(|m| !m.is_empty())
            .map(str::to_string)
    }

    if let Ok(value) = serde_json::from_str::<Value>(body) {
        if let Some(message) = direct(&value) {
            return message;
        }
        let nested = value
            .get("body")
            .and_then(Value::as_str)
            .and_then(|inner| serde_json::from_str::<Value>(inner).ok());
        if let Some(message) = nested.as_ref().and_then(direct) {
            return message;
        }
    }

    if status_text.trim().is_empty() {
        format!("HTTP {}", status)
    } else {
        format!("HTTP {} {}", status, status_text.trim())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use mela_raster::RasterError;

    const METRICS: &str = r#"{
        "density": 81.25,
        "branch_points": 173,
        "mesh_uniformity": 0.82,
        "quality_score": null,
        "input_image": "aW5wdXQ=",
        "plotted_image": "cGxvdA==",
        "mask_image": "bWFzaw==",
        "branch_vis_image": "YnJhbmNo"
    }"#;

    #[test]
    fn test_auto_classifies_metrics() {
        let AnalysisResponse::Metrics(payload) =
            AnalysisResponse::parse(METRICS, ResponseContract::Auto).unwrap()
        else {
            panic!("expected metrics");
        };
        assert_eq!(payload.density, 81.25);
        assert_eq!(payload.branch_points, 173.0);
        assert_eq!(payload.quality_score, None);
        assert_eq!(payload.plotted_image.as_deref(), Some("cGxvdA=="));
        assert_eq!(payload.contour_image, None);
    }

    #[test]
    fn test_auto_classifies_mask() {
        let response = AnalysisResponse::parse("[[0,255],[128,64]]", ResponseContract::Auto);
        let AnalysisResponse::Mask(mask) = response.unwrap() else {
            panic!("expected mask");
        };
        assert_eq!((mask.width(), mask.height()), (2, 2));
    }

    #[test]
    fn test_contract_is_enforced() {
        let err = AnalysisResponse::parse("[[1]]", ResponseContract::Metrics).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedResponse);

        let err = AnalysisResponse::parse(METRICS, ResponseContract::Mask).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedResponse);
    }

    #[test]
    fn test_ragged_mask_is_malformed_matrix() {
        let err = AnalysisResponse::parse("[[1,2],[3]]", ResponseContract::Mask).unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::MalformedMatrix(RasterError::RaggedRow { row: 1, .. })
        ));
    }

    #[test]
    fn test_unparsable_body() {
        for body in ["<html>", "42", "\"ok\""] {
            let err = AnalysisResponse::parse(body, ResponseContract::Auto).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::MalformedResponse, "{}", body);
        }
    }

    #[test]
    fn test_error_message_chain() {
        assert_eq!(
            extract_error_message(r#"{"error":"image too large"}"#, 413, "Payload Too Large"),
            "image too large"
        );
        assert_eq!(
            extract_error_message(r#"{"message":"bad key"}"#, 403, "Forbidden"),
            "bad key"
        );
        assert_eq!(
            extract_error_message(
                r#"{"statusCode":500,"body":"{\"error\":\"model failed\"}"}"#,
                500,
                "Internal Server Error"
            ),
            "model failed"
        );
        assert_eq!(
            extract_error_message(r#"{"body":"not json"}"#, 502, "Bad Gateway"),
            "HTTP 502 Bad Gateway"
        );
        assert_eq!(extract_error_message("", 504, ""), "HTTP 504");
    }

    #[test]
    fn test_contract_parse() {
        assert_eq!(ResponseContract::parse("MASK"), Some(ResponseContract::Mask));
        assert_eq!(ResponseContract::parse("png"), None);
    }
}
