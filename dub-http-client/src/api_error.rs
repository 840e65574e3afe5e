//! Classification of API error bodies.
//!
//! Error responses from the API carry an envelope of the form
//! `{"error": {"code": ..., "message": ..., "doc_url": ...}}`. Proxies and
//! misrouted paths may answer with an HTML page instead, and some failures
//! come back as plain text. [`ApiError::parse`] accepts all three and never
//! fails.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Code assigned to HTML error pages.
pub const HTML_ERROR_CODE: &str = "not_found";

/// Message assigned to HTML error pages.
pub const HTML_ERROR_MESSAGE: &str = "Resource not found or endpoint does not exist";

/// Structured error returned by the API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    /// Machine-readable error code.
    #[serde(default)]
    pub code: String,
    /// Human-readable message.
    #[serde(default)]
    pub message: String,
    /// Link to documentation for this error.
    #[serde(default)]
    pub doc_url: String,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ApiError,
}

impl ApiError {
    /// Create an error with a code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            doc_url: String::new(),
        }
    }

    /// Classify an error response body.
    pub fn parse(body: &[u8]) -> Self {
        if let Ok(envelope) = serde_json::from_slice::<ErrorEnvelope>(body) {
            return envelope.error;
        }

        let text = String::from_utf8_lossy(body);
        if looks_like_html(&text) {
            return Self::new(HTML_ERROR_CODE, HTML_ERROR_MESSAGE);
        }

        Self {
            message: text.into_owned(),
            ..Default::default()
        }
    }

    /// Check if the envelope carried a documentation link.
    pub fn has_doc_url(&self) -> bool {
        !self.doc_url.is_empty()
    }
}

fn looks_like_html(text: &str) -> bool {
    text.starts_with('<') || text.trim_start().starts_with("<!")
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.code.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.code, self.message)
        }
    }
}

impl std::error::Error for ApiError {}
