//! Transport seam between the executor and the network.

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, Method};

use crate::config::ClientConfig;
use crate::error::{ClientError, ConfigError, Result};
use crate::response::Response;

/// A single attempt, fully prepared by the executor.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    /// Request method.
    pub method: Method,
    /// Absolute URL.
    pub url: url::Url,
    /// Headers, including authorization and content type.
    pub headers: HeaderMap,
    /// Body for this attempt.
    pub body: Option<Bytes>,
}

/// Sends one attempt and buffers the response.
///
/// Implementations return `Err` only for connection-level failures; every
/// HTTP status, including 5xx, is an `Ok` response.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send the request.
    async fn send(&self, request: TransportRequest) -> Result<Response>;
}

/// Transport backed by a pooled `reqwest` client.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    inner: reqwest::Client,
}

impl ReqwestTransport {
    /// Build the underlying client from the configuration.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let inner = reqwest::Client::builder()
            .timeout(config.timeout)
            .pool_idle_timeout(config.pool_idle_timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .min_tls_version(reqwest::tls::Version::TLS_1_2)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| ClientError::Config(ConfigError::Transport(e.to_string())))?;

        Ok(Self { inner })
    }

    /// Wrap an existing `reqwest` client.
    pub fn from_client(inner: reqwest::Client) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: TransportRequest) -> Result<Response> {
        let TransportRequest {
            method,
            url,
            headers,
            body,
        } = request;
        let url_string = url.to_string();

        let mut builder = self.inner.request(method.clone(), url).headers(headers);
        if let Some(body) = body {
            builder = builder.body(body);
        }

        let wrap = |source| ClientError::Transport {
            method: method.clone(),
            url: url_string.clone(),
            source,
        };

        let response = builder.send().await.map_err(wrap)?;
        Response::from_reqwest(response).await.map_err(wrap)
    }
}

/// Build the connection-level error for a transport not built on `reqwest`.
pub fn transport_error(method: &Method, url: &url::Url, message: impl Into<String>) -> ClientError {
    ClientError::TransportMessage {
        method: method.clone(),
        url: url.to_string(),
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connection_refused_is_transport_error() {
        let config = ClientConfig::builder("dub_test").build();
        let transport = ReqwestTransport::new(&config).unwrap();

        // Port 9 (discard) on localhost is closed on test machines.
        let request = TransportRequest {
            method: Method::GET,
            url: url::Url::parse("http://127.0.0.1:9/links").unwrap(),
            headers: HeaderMap::new(),
            body: None,
        };

        let err = transport.send(request).await.unwrap_err();
        assert!(err.is_transport());
        assert!(err.to_string().starts_with("GET http://127.0.0.1:9/links failed"));
    }
}
