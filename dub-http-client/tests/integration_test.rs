//! End-to-end behavior against a mock API server.

use std::time::Duration;

use dub_http_client::{
    ApiClient, ApiRequest, CircuitBreakerConfig, CircuitState, ClientConfig, ClientError, Method,
    RequestContext, RetryConfig, StatusCode,
};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(base_url: &str, threshold: u32) -> ClientConfig {
    ClientConfig::builder("dub_test")
        .base_url(base_url)
        .timeout(Duration::from_secs(5))
        .circuit_breaker(CircuitBreakerConfig::new(threshold, Duration::from_secs(30)))
        .retry(
            RetryConfig::default()
                .with_rate_limit(3, Duration::from_millis(10))
                .with_server_errors(1, Duration::from_millis(10)),
        )
        .build()
}

async fn setup(threshold: u32) -> (MockServer, ApiClient) {
    dub_log::init(false);
    let server = MockServer::start().await;
    let client = ApiClient::new(config(&server.uri(), threshold)).expect("client");
    (server, client)
}

fn bg() -> RequestContext {
    RequestContext::background()
}

#[tokio::test]
async fn sends_bearer_and_json_headers() {
    let (server, client) = setup(5).await;

    Mock::given(method("GET"))
        .and(path("/links"))
        .and(header("authorization", "Bearer dub_test"))
        .and(header("content-type", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": "link_1"}])))
        .expect(1)
        .mount(&server)
        .await;

    let response = client.get(&bg(), "/links").await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let links: Vec<serde_json::Value> = response.json().expect("json");
    assert_eq!(links[0]["id"], "link_1");

    let requests = server.received_requests().await.unwrap();
    let user_agent = requests[0].headers.get("user-agent").unwrap().to_str().unwrap();
    assert!(user_agent.starts_with("dub-http-client/"));
}

#[tokio::test]
async fn query_parameters_are_encoded() {
    let (server, client) = setup(5).await;

    Mock::given(method("GET"))
        .and(path("/links/info"))
        .and(wiremock::matchers::query_param("domain", "dub.sh"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let request = ApiRequest::new(Method::GET, "/links/info").query("domain", "dub.sh");
    let response = client.execute(&bg(), request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn rate_limit_honors_retry_after_then_succeeds() {
    let (server, client) = setup(5).await;

    Mock::given(method("POST"))
        .and(path("/links"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/links"))
        .and(body_json(json!({"url": "https://dub.co"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "link_2"})))
        .mount(&server)
        .await;

    let response = client
        .post(&bg(), "/links", &json!({"url": "https://dub.co"}))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::CREATED);

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].body, requests[1].body);
}

#[tokio::test]
async fn rate_limit_exhaustion_returns_last_429() {
    let (server, client) = setup(5).await;

    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(429))
        .expect(4)
        .mount(&server)
        .await;

    let response = client.delete(&bg(), "/links/link_1").await.expect("response");
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(client.circuit_state(), CircuitState::Closed);
}

#[tokio::test]
async fn non_idempotent_server_error_is_not_retried() {
    let (server, client) = setup(5).await;

    Mock::given(method("PATCH"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let response = client
        .patch(&bg(), "/links/link_1", &json!({"archived": true}))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn read_only_server_error_is_retried_once() {
    let (server, client) = setup(5).await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&server)
        .await;

    let response = client.get(&bg(), "/links").await.expect("response");
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(client.circuit_snapshot().consecutive_server_errors, 2);
}

#[tokio::test]
async fn html_error_page_is_classified_as_not_found() {
    let (server, client) = setup(5).await;

    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(404)
                .set_body_string("<!DOCTYPE html><html><body>Not Found</body></html>"),
        )
        .mount(&server)
        .await;

    let response = client.get(&bg(), "/nope").await.expect("response");
    let url = format!("{}/nope", server.uri());
    let err = response.error_for_status(&Method::GET, &url).unwrap_err();

    match &err {
        ClientError::Api { status, source, .. } => {
            assert_eq!(*status, 404);
            assert_eq!(source.code, "not_found");
            assert_eq!(source.message, "Resource not found or endpoint does not exist");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(err.to_string().starts_with(&format!("GET {url} returned 404: not_found")));
}

#[tokio::test]
async fn error_envelope_is_decoded() {
    let (server, client) = setup(5).await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "error": {
                "code": "conflict",
                "message": "Duplicate key",
                "doc_url": "https://dub.co/docs/api-reference/errors#conflict"
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let response = client.post(&bg(), "/links", &json!({"key": "dup"})).await.expect("response");
    let api_error = response.api_error().expect("error body");

    assert_eq!(api_error.code, "conflict");
    assert!(api_error.has_doc_url());
    assert_eq!(client.circuit_snapshot().consecutive_server_errors, 0);
}

#[tokio::test]
async fn breaker_opens_after_threshold_and_blocks_traffic() {
    let (server, client) = setup(5).await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    for _ in 0..2 {
        let response = client.get(&bg(), "/links").await.expect("response");
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
    let third = client.get(&bg(), "/links").await.unwrap_err();
    assert!(third.is_circuit_open());
    assert_eq!(client.circuit_state(), CircuitState::Open);

    let fourth = client.get(&bg(), "/links").await.unwrap_err();
    assert!(fourth.is_circuit_open());
    assert_eq!(server.received_requests().await.unwrap().len(), 5);
}

#[tokio::test]
async fn client_error_resets_failure_count() {
    let (server, client) = setup(3).await;

    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    client.get(&bg(), "/broken").await.expect("response");
    assert_eq!(client.circuit_snapshot().consecutive_server_errors, 2);

    client.get(&bg(), "/missing").await.expect("response");
    assert_eq!(client.circuit_snapshot().consecutive_server_errors, 0);

    client.get(&bg(), "/broken").await.expect("response");
    assert_eq!(client.circuit_state(), CircuitState::Closed);
}

#[tokio::test]
async fn connection_failure_is_terminal() {
    dub_log::init(false);
    let client = ApiClient::new(config("http://127.0.0.1:9", 1)).expect("client");

    let err = client.get(&bg(), "/links").await.unwrap_err();
    assert!(err.is_transport());
    assert_eq!(client.circuit_state(), CircuitState::Open);
}

#[tokio::test]
async fn cancelled_context_makes_no_request() {
    let (server, client) = setup(5).await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let token = dub_http_client::CancellationToken::new();
    token.cancel();
    let cx = RequestContext::background().with_cancellation(token);

    let err = client.get(&cx, "/links").await.unwrap_err();
    assert!(matches!(err, ClientError::Cancelled));
}

#[tokio::test]
async fn deadline_interrupts_slow_response() {
    let (server, client) = setup(5).await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let cx = RequestContext::background().with_timeout(Duration::from_millis(100));
    let err = client.get(&cx, "/links").await.unwrap_err();

    assert!(err.is_cancellation());
    assert_eq!(client.circuit_snapshot().consecutive_server_errors, 0);
}
