//! # Dub HTTP Client
//!
//! Resilient request engine for the Dub API. Every call goes through a shared
//! circuit breaker, a rate-limit backoff loop, and a conservative server-error
//! retry policy.
//!
//! ## Features
//!
//! - **Rate-limit backoff**: 429 responses are retried with exponential backoff
//!   and jitter, or after the server's `Retry-After` hint
//! - **Server-error retry**: 5xx responses are retried for read-only methods only
//! - **Circuit Breaker**: Consecutive 5xx responses open the circuit and a single
//!   half-open probe decides when to close it again
//! - **Cancellation**: Cancellation tokens and deadlines interrupt attempts and
//!   backoff waits alike
//! - **Replayable bodies**: Request bodies are produced fresh for every attempt
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dub_http_client::{ApiClient, ClientConfig, RequestContext};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = ApiClient::new(ClientConfig::from_env()?)?;
//!     let cx = RequestContext::background();
//!
//!     let response = client.get(&cx, "/links").await?;
//!
//!     println!("Status: {}", response.status());
//!     Ok(())
//! }
//! ```
//!
//! ## Custom Policies
//!
//! ```rust,no_run
//! use dub_http_client::{
//!     ApiClient, CircuitBreakerConfig, ClientConfig, Method, RequestContext, RetryConfig,
//! };
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::builder("dub_xxxxxxxx")
//!         .timeout(Duration::from_secs(10))
//!         .retry(RetryConfig::default().with_rate_limit(5, Duration::from_millis(500)))
//!         .circuit_breaker(CircuitBreakerConfig::new(3, Duration::from_secs(60)))
//!         .build();
//!
//!     let client = ApiClient::new(config)?;
//!     let cx = RequestContext::background().with_timeout(Duration::from_secs(30));
//!
//!     let response = client
//!         .post(&cx, "/links", &serde_json::json!({"url": "https://dub.co"}))
//!         .await?
//!         .error_for_status(&Method::POST, "/links")?;
//!
//!     println!("Created: {}", response.text());
//!     Ok(())
//! }
//! ```

mod api_error;
mod circuit_breaker;
mod client;
mod config;
mod context;
mod error;
mod request;
mod response;
mod retry;
mod transport;

pub use api_error::ApiError;
pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitSnapshot, CircuitState, Permit,
};
pub use client::ApiClient;
pub use config::{ClientConfig, ClientConfigBuilder};
pub use context::RequestContext;
pub use error::{ClientError, ConfigError, Result};
pub use request::{ApiRequest, BodyFactory};
pub use response::Response;
pub use retry::{
    RetryConfig, RetryDecision, RetryState, StatusClass, is_idempotent, jitter,
    parse_retry_after,
};
pub use transport::{ReqwestTransport, Transport, TransportRequest, transport_error};

/// Default values.
pub mod defaults {
    pub use crate::circuit_breaker::{DEFAULT_COOLDOWN, DEFAULT_FAILURE_THRESHOLD};
    pub use crate::config::{
        DEFAULT_BASE_URL, DEFAULT_POOL_IDLE_TIMEOUT, DEFAULT_POOL_MAX_IDLE_PER_HOST,
        DEFAULT_TIMEOUT,
    };
    pub use crate::retry::{
        DEFAULT_MAX_RATE_LIMIT_RETRIES, DEFAULT_MAX_SERVER_ERROR_RETRIES,
        DEFAULT_RATE_LIMIT_BASE_DELAY, DEFAULT_SERVER_ERROR_RETRY_DELAY,
    };
}

/// Environment variable names read by [`ClientConfig::from_env`].
pub mod env {
    pub use crate::config::{
        ENV_API_KEY, ENV_BASE_URL, ENV_CIRCUIT_BREAKER_COOLDOWN_SECS,
        ENV_CIRCUIT_BREAKER_THRESHOLD, ENV_MAX_RATE_LIMIT_RETRIES, ENV_MAX_SERVER_ERROR_RETRIES,
        ENV_TIMEOUT_SECS,
    };
}

// Re-export commonly used types
pub use bytes::Bytes;
pub use http::{HeaderMap, Method, StatusCode};
pub use tokio_util::sync::CancellationToken;
pub use url::Url;

/// Prelude for common imports.
pub mod prelude {
    pub use crate::{
        ApiClient, ApiError, ApiRequest, CircuitState, ClientConfig, ClientError, RequestContext,
        Response, Result,
    };
}
