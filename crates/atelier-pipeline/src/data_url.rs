//! `data:` URL encoding and decoding.
//!
//! The staging endpoint speaks base64 data URLs in both directions and
//! some deployments return bare base64 without the `data:` prefix, so
//! [`decode`] accepts both.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use crate::types::PipelineError;

/// MIME type assumed for bare base64 payloads.
const DEFAULT_MIME: &str = "image/jpeg";

/// A decoded `data:` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUrl {
    /// Declared media type, e.g. `image/png`.
    pub mime: String,
    /// Decoded payload.
    pub bytes: Vec<u8>,
}

/// Build `data:<mime>;base64,<payload>`.
#[must_use]
pub fn encode(mime: &str, bytes: &[u8]) -> String {
    format!("data:{mime};base64,{}", STANDARD.encode(bytes))
}

/// Decode a base64 `data:` URL or a bare base64 string.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidDataUrl`] if the URL is not base64
/// encoded, the payload is not valid base64, or it decodes to nothing.
pub fn decode(input: &str) -> Result<DataUrl, PipelineError> {
    let input = input.trim();
    let (mime, payload) = match input.strip_prefix("data:") {
        Some(rest) => {
            let (header, payload) = rest
                .split_once(',')
                .ok_or_else(|| PipelineError::InvalidDataUrl("missing ',' separator".into()))?;
            let mime = header.strip_suffix(";base64").ok_or_else(|| {
                PipelineError::InvalidDataUrl(format!("not base64 encoded: {header:?}"))
            })?;
            let mime = if mime.is_empty() { DEFAULT_MIME } else { mime };
            (mime, payload)
        }
        None => (DEFAULT_MIME, input),
    };

    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|e| PipelineError::InvalidDataUrl(e.to_string()))?;
    if bytes.is_empty() {
        return Err(PipelineError::InvalidDataUrl("empty payload".into()));
    }
    Ok(DataUrl {
        mime: mime.to_owned(),
        bytes,
    })
}
