//! Oracle seam: the external multimodal/text generation service.
//!
//! The pipeline talks to the oracle through the [`GenerativeOracle`] trait so
//! the two adapter stages ([`crate::pipeline::vision`] and
//! [`crate::pipeline::place`]) can be tested with a scripted in-memory
//! implementation and the production client can be swapped without touching
//! the stage logic.
//!
//! The trait deliberately exposes the *file lifecycle* — `upload_image` /
//! `delete_file` — alongside generation, because the vision adapter's
//! contract is "always release the staged upload, success or failure". A
//! chat-only provider abstraction cannot express that.
//!
//! [`GeminiOracle`] is the production implementation: a thin reqwest client
//! for the Gemini REST API (file upload, `generateContent`, file delete) with
//! a bounded per-call timeout. No retries live here: a timeout or API error
//! is surfaced once and handled by the calling stage.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

use crate::error::IllustraError;

/// Default REST endpoint for the Gemini API.
pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// A file staged on the remote service, pending deletion after use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    /// Server-side resource name, e.g. `files/abc-123`.
    pub name: String,
    /// URI referenced from generation requests.
    pub uri: String,
    /// MIME type the server recorded for the upload.
    pub mime_type: String,
}

/// Errors from a single oracle call.
///
/// Transport failures and timeouts are treated identically to remote API
/// errors by every caller — no retry policy distinguishes them.
#[derive(Debug, Clone, Error)]
pub enum OracleError {
    /// The remote API answered with a non-success status.
    #[error("oracle API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    /// The request never completed (DNS, TLS, connection reset).
    #[error("oracle transport error: {0}")]
    Transport(String),

    /// The bounded per-call timeout elapsed.
    #[error("oracle call timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The response arrived but did not contain generated text.
    #[error("oracle returned a malformed response: {0}")]
    Malformed(String),
}

/// External text/vision generation service, treated as a black-box function
/// with possible failure.
#[async_trait]
pub trait GenerativeOracle: Send + Sync {
    /// Stage an image file on the remote service for a later generation call.
    async fn upload_image(&self, path: &Path) -> Result<RemoteFile, OracleError>;

    /// Run the multimodal model over `prompt` plus a previously staged file.
    async fn describe_upload(&self, prompt: &str, file: &RemoteFile)
        -> Result<String, OracleError>;

    /// Run the text model over a plain prompt, returning the generated text.
    async fn generate_text(&self, prompt: &str) -> Result<String, OracleError>;

    /// Release a staged file. Called unconditionally after generation.
    async fn delete_file(&self, file: &RemoteFile) -> Result<(), OracleError>;
}

/// Production oracle: the Gemini REST API over reqwest.
pub struct GeminiOracle {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    vision_model: String,
    text_model: String,
    timeout_secs: u64,
}

impl GeminiOracle {
    /// Build a client with a bounded per-call timeout.
    pub fn new(
        api_key: impl Into<String>,
        vision_model: impl Into<String>,
        text_model: impl Into<String>,
        timeout_secs: u64,
    ) -> Result<Self, IllustraError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| IllustraError::Internal(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: GEMINI_BASE_URL.to_string(),
            api_key: api_key.into(),
            vision_model: vision_model.into(),
            text_model: text_model.into(),
            timeout_secs,
        })
    }

    /// Point the client at a different endpoint (self-hosted proxy, tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn map_send_error(&self, e: reqwest::Error) -> OracleError {
        if e.is_timeout() {
            OracleError::Timeout {
                secs: self.timeout_secs,
            }
        } else {
            OracleError::Transport(e.to_string())
        }
    }

    async fn check_status(response: reqwest::Response) -> Result<Value, OracleError> {
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(OracleError::Api {
                status: status.as_u16(),
                message,
            });
        }
        response
            .json::<Value>()
            .await
            .map_err(|e| OracleError::Malformed(e.to_string()))
    }

    async fn generate(&self, model: &str, parts: Value) -> Result<String, OracleError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url, model, self.api_key
        );
        let body = json!({
            "contents": [{ "parts": parts }],
            "generationConfig": { "temperature": 0.1 }
        });

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let value = Self::check_status(response).await?;
        extract_candidate_text(&value)
    }
}

#[async_trait]
impl GenerativeOracle for GeminiOracle {
    async fn upload_image(&self, path: &Path) -> Result<RemoteFile, OracleError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| OracleError::Transport(format!("read {}: {e}", path.display())))?;
        let mime = mime_for(path);

        let url = format!("{}/upload/v1beta/files?key={}", self.base_url, self.api_key);
        let response = self
            .client
            .post(&url)
            .header("X-Goog-Upload-Protocol", "raw")
            .header("Content-Type", mime)
            .body(bytes)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let value = Self::check_status(response).await?;
        let file = &value["file"];
        let name = file["name"]
            .as_str()
            .ok_or_else(|| OracleError::Malformed("upload response missing file.name".into()))?;
        let uri = file["uri"]
            .as_str()
            .ok_or_else(|| OracleError::Malformed("upload response missing file.uri".into()))?;

        debug!("Staged upload {} → {}", path.display(), name);
        Ok(RemoteFile {
            name: name.to_string(),
            uri: uri.to_string(),
            mime_type: file["mimeType"].as_str().unwrap_or(mime).to_string(),
        })
    }

    async fn describe_upload(
        &self,
        prompt: &str,
        file: &RemoteFile,
    ) -> Result<String, OracleError> {
        let parts = json!([
            { "text": prompt },
            { "file_data": { "mime_type": file.mime_type, "file_uri": file.uri } }
        ]);
        self.generate(&self.vision_model, parts).await
    }

    async fn generate_text(&self, prompt: &str) -> Result<String, OracleError> {
        let parts = json!([{ "text": prompt }]);
        self.generate(&self.text_model, parts).await
    }

    async fn delete_file(&self, file: &RemoteFile) -> Result<(), OracleError> {
        let url = format!("{}/v1beta/{}?key={}", self.base_url, file.name, self.api_key);
        let response = self
            .client
            .delete(&url)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(OracleError::Api {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }
        debug!("Released staged upload {}", file.name);
        Ok(())
    }
}

/// Pull the generated text out of a `generateContent` response.
///
/// Parts are concatenated; an empty candidate list or a text-free candidate
/// is malformed (blocked prompt, empty generation).
fn extract_candidate_text(value: &Value) -> Result<String, OracleError> {
    let parts = value["candidates"][0]["content"]["parts"]
        .as_array()
        .ok_or_else(|| OracleError::Malformed("response has no candidates".into()))?;

    let text: String = parts
        .iter()
        .filter_map(|p| p["text"].as_str())
        .collect::<Vec<_>>()
        .join("");

    if text.is_empty() {
        return Err(OracleError::Malformed(
            "candidate contains no text parts".into(),
        ));
    }
    Ok(text)
}

fn mime_for(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        _ => "image/png",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_single_text_part() {
        let v = json!({
            "candidates": [{
                "content": { "parts": [{ "text": "Waterfall development model." }] }
            }]
        });
        assert_eq!(
            extract_candidate_text(&v).unwrap(),
            "Waterfall development model."
        );
    }

    #[test]
    fn concatenates_multiple_text_parts() {
        let v = json!({
            "candidates": [{
                "content": { "parts": [{ "text": "Part one. " }, { "text": "Part two." }] }
            }]
        });
        assert_eq!(extract_candidate_text(&v).unwrap(), "Part one. Part two.");
    }

    #[test]
    fn empty_candidates_is_malformed() {
        let v = json!({ "candidates": [] });
        assert!(matches!(
            extract_candidate_text(&v),
            Err(OracleError::Malformed(_))
        ));
    }

    #[test]
    fn mime_from_extension() {
        assert_eq!(mime_for(Path::new("a/b/IMAGE_ID_0_1.png")), "image/png");
        assert_eq!(mime_for(Path::new("photo.jpeg")), "image/jpeg");
        assert_eq!(mime_for(Path::new("no_extension")), "image/png");
    }

    #[test]
    fn timeout_display_names_bound() {
        let e = OracleError::Timeout { secs: 60 };
        assert!(e.to_string().contains("60s"));
    }
}
