//! Request executor.

use std::sync::Arc;

use http::header::{AUTHORIZATION, CONTENT_TYPE};
use http::{HeaderMap, HeaderValue, Method};
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::circuit_breaker::{CircuitBreaker, CircuitSnapshot, CircuitState};
use crate::config::ClientConfig;
use crate::context::RequestContext;
use crate::error::{ConfigError, Result};
use crate::request::ApiRequest;
use crate::response::Response;
use crate::retry::{RetryDecision, RetryState, StatusClass};
use crate::transport::{ReqwestTransport, Transport, TransportRequest};

/// API client with rate-limit backoff, retry, and circuit breaking.
///
/// Cloning is cheap; clones share the transport and the circuit breaker.
#[derive(Clone)]
pub struct ApiClient {
    config: Arc<ClientConfig>,
    transport: Arc<dyn Transport>,
    circuit_breaker: Arc<CircuitBreaker>,
    headers: HeaderMap,
}

impl ApiClient {
    /// Create a client that talks to the network through `reqwest`.
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let transport = ReqwestTransport::new(&config)?;
        Self::with_transport(config, Arc::new(transport))
    }

    /// Create a client with a custom transport.
    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        config.validate()?;

        let mut auth = HeaderValue::try_from(format!("Bearer {}", config.api_key)).map_err(|_| {
            ConfigError::Validation("API key contains invalid header characters".into())
        })?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let circuit_breaker = Arc::new(CircuitBreaker::new(config.circuit_breaker.clone()));

        Ok(Self {
            config: Arc::new(config),
            transport,
            circuit_breaker,
            headers,
        })
    }

    /// Get the client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Get the shared circuit breaker.
    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.circuit_breaker
    }

    /// Current breaker state, for diagnostics.
    pub fn circuit_state(&self) -> CircuitState {
        self.circuit_breaker.state()
    }

    /// Full breaker snapshot, for diagnostics.
    pub fn circuit_snapshot(&self) -> CircuitSnapshot {
        self.circuit_breaker.snapshot()
    }

    /// Force the breaker back to closed.
    pub fn reset_circuit_breaker(&self) {
        self.circuit_breaker.reset();
    }

    /// Send a GET request.
    pub async fn get(&self, cx: &RequestContext, path: &str) -> Result<Response> {
        self.execute(cx, ApiRequest::new(Method::GET, path)).await
    }

    /// Send a POST request with a JSON body.
    pub async fn post<T: Serialize + ?Sized>(
        &self,
        cx: &RequestContext,
        path: &str,
        body: &T,
    ) -> Result<Response> {
        self.execute(cx, ApiRequest::json(Method::POST, path, body)?).await
    }

    /// Send a PUT request with a JSON body.
    pub async fn put<T: Serialize + ?Sized>(
        &self,
        cx: &RequestContext,
        path: &str,
        body: &T,
    ) -> Result<Response> {
        self.execute(cx, ApiRequest::json(Method::PUT, path, body)?).await
    }

    /// Send a PATCH request with a JSON body.
    pub async fn patch<T: Serialize + ?Sized>(
        &self,
        cx: &RequestContext,
        path: &str,
        body: &T,
    ) -> Result<Response> {
        self.execute(cx, ApiRequest::json(Method::PATCH, path, body)?).await
    }

    /// Send a DELETE request.
    pub async fn delete(&self, cx: &RequestContext, path: &str) -> Result<Response> {
        self.execute(cx, ApiRequest::new(Method::DELETE, path)).await
    }

    /// Send a DELETE request with a JSON body.
    pub async fn delete_with_body<T: Serialize + ?Sized>(
        &self,
        cx: &RequestContext,
        path: &str,
        body: &T,
    ) -> Result<Response> {
        self.execute(cx, ApiRequest::json(Method::DELETE, path, body)?).await
    }

    /// Execute one logical call.
    ///
    /// Loops over transport attempts until a terminal outcome: a response the
    /// retry policy does not retry, a breaker rejection, a transport failure,
    /// or cancellation. Attempts are strictly sequential.
    pub async fn execute(&self, cx: &RequestContext, request: ApiRequest) -> Result<Response> {
        let url = request.url(&self.config.base_url)?;
        let method = request.method().clone();
        let req_id = generate_request_id();
        let mut retries = RetryState::default();

        loop {
            cx.check()?;

            let body = request.body().map(|factory| factory.produce()).transpose()?;
            let permit = self.circuit_breaker.try_acquire()?;

            debug!(req_id = %req_id, method = %method, url = %url, "api request");
            let started = Instant::now();

            let attempt = TransportRequest {
                method: method.clone(),
                url: url.clone(),
                headers: self.headers.clone(),
                body,
            };

            let response = match cx.run(self.transport.send(attempt)).await {
                Ok(Ok(response)) => response,
                Ok(Err(err)) => {
                    debug!(req_id = %req_id, error = %err, "api request failed");
                    if err.is_transport() && self.config.circuit_breaker.count_transport_errors {
                        permit.record_server_error();
                    }
                    return Err(err);
                }
                Err(err) => {
                    debug!(req_id = %req_id, error = %err, "api request abandoned");
                    return Err(err);
                }
            };

            let status = response.status();
            debug!(
                req_id = %req_id,
                status = status.as_u16(),
                elapsed = ?started.elapsed(),
                "api response"
            );

            let class = StatusClass::of(status);
            match class {
                StatusClass::Success | StatusClass::ClientError => permit.record_success(),
                StatusClass::ServerError => permit.record_server_error(),
                StatusClass::RateLimited | StatusClass::Other => drop(permit),
            }

            match retries.decide(&self.config.retry, &method, status, response.retry_after()) {
                RetryDecision::Return => return Ok(response),
                RetryDecision::Retry { delay, attempt } => {
                    if class == StatusClass::RateLimited {
                        info!(req_id = %req_id, delay = ?delay, attempt, "rate limited, retrying");
                    } else {
                        info!(
                            req_id = %req_id,
                            status = status.as_u16(),
                            delay = ?delay,
                            "retrying after server error"
                        );
                    }
                    cx.sleep(delay).await?;
                }
            }
        }
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("config", &self.config)
            .field("circuit_breaker", &self.circuit_breaker)
            .finish_non_exhaustive()
    }
}

/// Short random identifier correlating the log events of one logical call.
fn generate_request_id() -> String {
    hex::encode(rand::random::<[u8; 4]>())
}
