//! HTTP response wrapper.

use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::api_error::ApiError;
use crate::error::{ClientError, Result};
use crate::retry::parse_retry_after;

/// Fully buffered HTTP response.
#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl Response {
    /// Create a response from its parts.
    pub fn new(status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
        }
    }

    /// Buffer a `reqwest` response.
    pub(crate) async fn from_reqwest(response: reqwest::Response) -> reqwest::Result<Self> {
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        Ok(Self {
            status,
            headers,
            body,
        })
    }

    /// Get the status code.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Check if the response was successful (2xx).
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Get the response headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Get a specific header value.
    pub fn header(&self, name: impl AsRef<str>) -> Option<&str> {
        self.headers.get(name.as_ref()).and_then(|v| v.to_str().ok())
    }

    /// Server hint for how long to wait before retrying.
    pub fn retry_after(&self) -> Option<Duration> {
        self.header(http::header::RETRY_AFTER).and_then(parse_retry_after)
    }

    /// Get the response body as bytes.
    pub fn bytes(&self) -> &Bytes {
        &self.body
    }

    /// Consume the response and return the body as bytes.
    pub fn into_bytes(self) -> Bytes {
        self.body
    }

    /// Get the response body as text, replacing invalid UTF-8.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Parse the response body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(|e| ClientError::Decode(e.to_string()))
    }

    /// Classify the body of an error response.
    pub fn api_error(&self) -> Option<ApiError> {
        (self.status.is_client_error() || self.status.is_server_error())
            .then(|| ApiError::parse(&self.body))
    }

    /// Turn a 4xx/5xx response into [`ClientError::Api`].
    pub fn error_for_status(self, method: &Method, url: &str) -> Result<Self> {
        match self.api_error() {
            Some(source) => Err(ClientError::Api {
                method: method.clone(),
                url: url.to_string(),
                status: self.status.as_u16(),
                source,
            }),
            None => Ok(self),
        }
    }
}
