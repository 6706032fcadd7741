//! Staging endpoint wire format and response interpretation.
//!
//! The endpoint takes the composed slide as a base64 data URL and answers
//! `{ "ok": true, "dataUrl": "data:..." }` on success. Failures carry a
//! `detail` (FastAPI style, possibly not a string) or `error` field and a
//! non-2xx status; a body that is not JSON at all is treated as `{}`.

use std::future::Future;

use atelier_pipeline::{PipelineError, Scene};
use serde::Serialize;
use serde_json::Value;

/// Message used when the endpoint reports success without an image.
pub const MISSING_IMAGE_MESSAGE: &str = "No image returned from AI";

/// Outbound staging request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StagingRequest {
    /// Public URL of the artwork, when it has one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// Composed slide 1 as `data:image/jpeg;base64,...`.
    pub image_data: String,
    /// Scene name.
    pub scene: Scene,
    /// Preset and artist prompts combined.
    pub extra_prompt: String,
    /// Language tag.
    pub lang: String,
}

/// Why a staging attempt failed.
#[derive(Debug, thiserror::Error)]
pub enum StagingError {
    /// The request never got a response.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The endpoint refused or failed the request.
    #[error("{message}")]
    Rejected {
        /// HTTP status.
        status: u16,
        /// `detail`, `error` or a generic status message.
        message: String,
    },

    /// The endpoint said ok but sent no image.
    #[error("No image returned from AI")]
    MissingImage,

    /// The returned image could not be decoded or normalized.
    #[error("invalid staged image: {0}")]
    Image(#[from] PipelineError),
}

/// Something that can stage a composed slide.
///
/// Implemented by [`crate::ApiClient`] for the real endpoint and by test
/// doubles.
pub trait StagingBackend: Send + Sync {
    /// Send `request` and return the staged image's data URL.
    fn stage(
        &self,
        request: StagingRequest,
    ) -> impl Future<Output = Result<String, StagingError>> + Send;
}

/// Turn an HTTP status and body into the staged data URL or an error.
///
/// # Errors
///
/// Returns [`StagingError::Rejected`] when the status is not 2xx or the
/// body lacks `"ok": true`, and [`StagingError::MissingImage`] when a
/// successful body has no usable `dataUrl`, either as a string or as an
/// object carrying its own `dataUrl` string.
pub fn interpret_response(status: u16, body: &[u8]) -> Result<String, StagingError> {
    let json: Value =
        serde_json::from_slice(body).unwrap_or_else(|_| Value::Object(serde_json::Map::new()));
    let ok = json.get("ok") == Some(&Value::Bool(true));

    if !(200..300).contains(&status) || !ok {
        let message = message_field(&json, "detail")
            .or_else(|| message_field(&json, "error"))
            .unwrap_or_else(|| format!("stage failed ({status})"));
        return Err(StagingError::Rejected { status, message });
    }

    let image = json.get("dataUrl").and_then(|field| {
        field
            .as_str()
            .or_else(|| field.get("dataUrl").and_then(Value::as_str))
    });
    match image {
        Some(url) if !url.trim().is_empty() => Ok(url.to_owned()),
        _ => Err(StagingError::MissingImage),
    }
}

/// A non-empty message from `field`; non-string values are rendered as
/// JSON text.
fn message_field(json: &Value, field: &str) -> Option<String> {
    match json.get(field)? {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn rejected(result: Result<String, StagingError>) -> (u16, String) {
        match result {
            Err(StagingError::Rejected { status, message }) => (status, message),
            other => unreachable!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn request_uses_camel_case() {
        let req = StagingRequest {
            image_url: None,
            image_data: "data:image/jpeg;base64,AAAA".into(),
            scene: Scene::Gallery,
            extra_prompt: "soft light".into(),
            lang: "en".into(),
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "imageData": "data:image/jpeg;base64,AAAA",
                "scene": "gallery",
                "extraPrompt": "soft light",
                "lang": "en",
            })
        );
    }

    #[test]
    fn success_returns_data_url() {
        let body = br#"{"ok": true, "dataUrl": "data:image/png;base64,AAAA"}"#;
        assert_eq!(
            interpret_response(200, body).unwrap(),
            "data:image/png;base64,AAAA"
        );
    }

    #[test]
    fn nested_data_url_is_accepted() {
        let body = br#"{"ok": true, "dataUrl": {"dataUrl": "data:image/png;base64,AAAA"}}"#;
        assert_eq!(
            interpret_response(200, body).unwrap(),
            "data:image/png;base64,AAAA"
        );
        let empty = br#"{"ok": true, "dataUrl": {"dataUrl": " "}}"#;
        assert!(matches!(
            interpret_response(200, empty),
            Err(StagingError::MissingImage)
        ));
    }

    #[test]
    fn detail_takes_precedence() {
        let body = br#"{"detail": "GOOGLE_API_KEY is not configured", "error": "other"}"#;
        assert_eq!(
            rejected(interpret_response(503, body)),
            (503, "GOOGLE_API_KEY is not configured".into())
        );
    }

    #[test]
    fn error_used_without_detail() {
        let body = br#"{"ok": false, "error": "quota"}"#;
        assert_eq!(rejected(interpret_response(200, body)).1, "quota");
    }

    #[test]
    fn generic_message_includes_status() {
        assert_eq!(
            rejected(interpret_response(502, b"<html>bad gateway</html>")).1,
            "stage failed (502)"
        );
        assert_eq!(
            rejected(interpret_response(200, br#"{"dataUrl": "x"}"#)).1,
            "stage failed (200)"
        );
    }

    #[test]
    fn structured_detail_is_rendered_as_json() {
        let body = br#"{"detail": [{"msg": "field required"}]}"#;
        assert_eq!(
            rejected(interpret_response(422, body)).1,
            r#"[{"msg":"field required"}]"#
        );
    }

    #[test]
    fn ok_without_image_is_missing_image() {
        let result = interpret_response(200, br#"{"ok": true, "dataUrl": ""}"#);
        assert!(matches!(result, Err(StagingError::MissingImage)));
        assert_eq!(
            StagingError::MissingImage.to_string(),
            MISSING_IMAGE_MESSAGE
        );
    }
}
