//! Logical API requests.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use http::Method;
use serde::Serialize;

use crate::error::{ClientError, Result};

type BodyFn = dyn Fn() -> std::result::Result<Bytes, String> + Send + Sync;

/// Re-invocable source of a request body.
///
/// The executor calls the factory before every attempt, so a body consumed by
/// one attempt is available unchanged for the next.
#[derive(Clone)]
pub struct BodyFactory(Arc<BodyFn>);

impl BodyFactory {
    /// Create a factory from a closure.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn() -> std::result::Result<Bytes, String> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Create a factory that yields the same bytes every time.
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        Self::new(move || Ok(bytes.clone()))
    }

    /// Serialize `value` once and yield the encoded JSON on every call.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        let encoded = serde_json::to_vec(value)?;
        Ok(Self::from_bytes(encoded))
    }

    /// Produce a fresh body.
    pub fn produce(&self) -> Result<Bytes> {
        (self.0)().map_err(ClientError::BodyReplay)
    }
}

impl fmt::Debug for BodyFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BodyFactory").finish_non_exhaustive()
    }
}

/// One logical call: method, path relative to the base URL, optional body.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    body: Option<BodyFactory>,
}

impl ApiRequest {
    /// Create a request without a body.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    /// Create a request with a JSON body.
    pub fn json<T: Serialize + ?Sized>(
        method: Method,
        path: impl Into<String>,
        body: &T,
    ) -> Result<Self> {
        Ok(Self::new(method, path).with_body(BodyFactory::json(body)?))
    }

    /// Attach a body factory.
    pub fn with_body(mut self, body: BodyFactory) -> Self {
        self.body = Some(body);
        self
    }

    /// Add a query parameter.
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Request method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Path relative to the base URL.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Query parameters.
    pub fn query_pairs(&self) -> &[(String, String)] {
        &self.query
    }

    /// Body factory, if the request has a body.
    pub fn body(&self) -> Option<&BodyFactory> {
        self.body.as_ref()
    }

    /// Build the absolute URL for this request.
    pub fn url(&self, base_url: &str) -> Result<url::Url> {
        let joined = format!("{}{}", base_url.trim_end_matches('/'), self.path);
        let mut url = url::Url::parse(&joined)
            .map_err(|e| ClientError::InvalidUrl(format!("{joined}: {e}")))?;

        if !self.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &self.query {
                pairs.append_pair(key, value);
            }
        }

        Ok(url)
    }
}
