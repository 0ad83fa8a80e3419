//! Integration tests for the authenticated request pipeline

use chrono::{Duration, Utc};
use feedback_client::{
    ApiClient, AuthTokens, ClientError, RequestBody, RequestOptions, TokenStore,
};
use reqwest::Method;
use serde_json::json;
use wiremock::matchers::{body_json, body_string, header, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

const IDENTITY_PATH: &str = "/identity/User/JWTBiometric-success";
const API_KEY: &str = "test-api-key";

fn client_for(server: &MockServer, store: TokenStore) -> ApiClient {
    ApiClient::builder()
        .base_url(format!("{}/api", server.uri()))
        .identity_url(format!("{}{IDENTITY_PATH}", server.uri()))
        .api_key(API_KEY)
        .token_store(store)
        .build()
        .unwrap()
}

fn future_expiry() -> String {
    (Utc::now() + Duration::hours(1)).to_rfc3339()
}

async fn store_with_token(token: &str, expires_at: String) -> TokenStore {
    let store = TokenStore::in_memory();
    store
        .write(&AuthTokens {
            token: token.to_string(),
            refresh_token: None,
            expires_at,
            refresh_token_expires_at: None,
        })
        .await
        .unwrap();
    store
}

async fn mount_identity(server: &MockServer, token: &str, times: u64) {
    Mock::given(method("POST"))
        .and(path(IDENTITY_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token": token,
            "expiresAt": future_expiry(),
        })))
        .expect(times)
        .mount(server)
        .await;
}

async fn api_requests(server: &MockServer) -> Vec<Request> {
    server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.url.path().starts_with("/api/"))
        .collect()
}

#[tokio::test]
async fn test_authenticates_then_calls_with_bearer_token() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(IDENTITY_PATH))
        .and(header("content-type", "application/json"))
        .and(header("accept", "application/json"))
        .and(body_json(json!({"message": "success"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token": "abc",
            "expiresAt": future_expiry(),
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/orders"))
        .and(header("authorization", "Bearer abc"))
        .and(header("x-api-key", API_KEY))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 1}])))
        .expect(1)
        .mount(&server)
        .await;

    let store = TokenStore::in_memory();
    let client = client_for(&server, store.clone());

    let response = client.get("/orders").await.unwrap();
    assert_eq!(response, json!([{"id": 1}]));
    assert_eq!(store.read().await.unwrap().as_deref(), Some("abc"));
}

#[tokio::test]
async fn test_access_token_field_wins_over_token() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(IDENTITY_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "accessToken": "primary",
            "token": "secondary",
            "refreshToken": "r",
            "expiresAt": future_expiry(),
        })))
        .expect(1)
        .mount(&server)
        .await;

    let store = TokenStore::in_memory();
    let client = client_for(&server, store.clone());
    let tokens = client.auth().authenticate_with_biometrics().await.unwrap();

    assert_eq!(tokens.token, "primary");
    assert_eq!(tokens.refresh_token.as_deref(), Some("r"));
    assert_eq!(store.read_tokens().await.unwrap(), Some(tokens));
}

#[tokio::test]
async fn test_valid_persisted_token_skips_handshake() {
    let server = MockServer::start().await;
    mount_identity(&server, "unused", 0).await;

    Mock::given(method("GET"))
        .and(path("/api/profile"))
        .and(header("authorization", "Bearer held"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "x"})))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, store_with_token("held", future_expiry()).await);
    client.get("/profile").await.unwrap();
}

#[tokio::test]
async fn test_expired_persisted_token_triggers_handshake() {
    let server = MockServer::start().await;
    mount_identity(&server, "renewed", 1).await;

    Mock::given(method("GET"))
        .and(path("/api/profile"))
        .and(header("authorization", "Bearer renewed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let expired = (Utc::now() - Duration::hours(1)).to_rfc3339();
    let store = store_with_token("old", expired).await;
    let client = client_for(&server, store.clone());

    client.get("/profile").await.unwrap();
    assert_eq!(store.read().await.unwrap().as_deref(), Some("renewed"));
}

#[tokio::test]
async fn test_unauthorized_recovers_with_single_retry() {
    let server = MockServer::start().await;
    mount_identity(&server, "fresh", 1).await;

    Mock::given(method("GET"))
        .and(path("/api/orders"))
        .and(header("authorization", "Bearer stale"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/orders"))
        .and(header("authorization", "Bearer fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"retried": true})))
        .expect(1)
        .mount(&server)
        .await;

    let store = store_with_token("stale", future_expiry()).await;
    let client = client_for(&server, store.clone());

    let response = client.get("/orders").await.unwrap();
    assert_eq!(response, json!({"retried": true}));
    assert_eq!(store.read().await.unwrap().as_deref(), Some("fresh"));
}

#[tokio::test]
async fn test_forbidden_then_failed_retry_reports_retry_status() {
    let server = MockServer::start().await;
    mount_identity(&server, "fresh", 1).await;

    Mock::given(method("GET"))
        .and(path("/api/orders"))
        .and(header("authorization", "Bearer stale"))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/orders"))
        .and(header("authorization", "Bearer fresh"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, store_with_token("stale", future_expiry()).await);

    let err = client.get("/orders").await.unwrap_err();
    match err {
        ClientError::RetryFailed { status, body } => {
            assert_eq!(status, 500);
            assert_eq!(body, "boom");
        }
        other => panic!("expected RetryFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn test_retry_is_attempted_only_once() {
    let server = MockServer::start().await;
    mount_identity(&server, "fresh", 1).await;

    Mock::given(method("GET"))
        .and(path("/api/orders"))
        .respond_with(ResponseTemplate::new(401).set_body_string("still no"))
        .expect(2)
        .mount(&server)
        .await;

    let client = client_for(&server, store_with_token("stale", future_expiry()).await);

    let err = client.get("/orders").await.unwrap_err();
    assert!(matches!(
        err,
        ClientError::RetryFailed { status: 401, ref body } if body == "still no"
    ));
}

#[tokio::test]
async fn test_retry_preserves_caller_headers_and_body() {
    let server = MockServer::start().await;
    mount_identity(&server, "fresh", 1).await;

    Mock::given(method("POST"))
        .and(path("/api/items"))
        .and(header("authorization", "Bearer stale"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/items"))
        .and(header("authorization", "Bearer fresh"))
        .and(header("x-trace", "abc"))
        .and(header("content-type", "application/json"))
        .and(body_json(json!({"n": 1})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 9})))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, store_with_token("stale", future_expiry()).await);
    let options = RequestOptions::new(Method::POST)
        .body(json!({"n": 1}))
        .header("X-Trace", "abc");

    let response = client.request("/items", options).await.unwrap();
    assert_eq!(response["id"], 9);
}

#[tokio::test]
async fn test_json_body_sets_content_type() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/items"))
        .and(header("content-type", "application/json"))
        .and(body_json(json!({"name": "soup"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, store_with_token("t", future_expiry()).await);
    client
        .post("/items", RequestBody::json(&json!({"name": "soup"})).unwrap())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_text_body_is_sent_verbatim_as_plain_text() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/api/orders/1/cancel"))
        .and(header("content-type", "text/plain"))
        .and(body_string("customer changed mind"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, store_with_token("t", future_expiry()).await);
    let response = client
        .patch("/orders/1/cancel", "customer changed mind")
        .await
        .unwrap();
    assert_eq!(response, json!({"success": true}));
}

#[tokio::test]
async fn test_empty_body_sends_no_content_type() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/api/items/4"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/ping"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, store_with_token("t", future_expiry()).await);
    client.delete("/items/4").await.unwrap();
    client.post("/ping", RequestBody::Empty).await.unwrap();

    let requests = api_requests(&server).await;
    assert_eq!(requests.len(), 2);
    for request in requests {
        assert!(
            !request.headers.contains_key("content-type"),
            "{} carried a Content-Type",
            request.url
        );
        assert!(request.body.is_empty());
    }
}

#[tokio::test]
async fn test_caller_headers_override_injected_ones() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/api/settings"))
        .and(header("x-api-key", "caller-key"))
        .and(header("authorization", "Bearer caller-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, store_with_token("t", future_expiry()).await);
    let options = RequestOptions::new(Method::PUT)
        .body(json!({"theme": "dark"}))
        .header("X-API-KEY", "caller-key")
        .header("Authorization", "Bearer caller-token");
    client.request("/settings", options).await.unwrap();
}

#[tokio::test]
async fn test_no_content_yields_success_sentinel() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/api/items/1"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let client = client_for(&server, store_with_token("t", future_expiry()).await);
    let response = client.delete("/items/1").await.unwrap();
    assert_eq!(response, json!({"success": true}));
}

#[tokio::test]
async fn test_non_json_success_body_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/report"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let client = client_for(&server, store_with_token("t", future_expiry()).await);
    let err = client.get("/report").await.unwrap_err();
    assert!(matches!(err, ClientError::MalformedResponse(_)));
}

#[tokio::test]
async fn test_api_error_uses_json_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/feedback"))
        .respond_with(
            ResponseTemplate::new(422).set_body_json(json!({"message": "Rating is required"})),
        )
        .mount(&server)
        .await;

    let client = client_for(&server, store_with_token("t", future_expiry()).await);
    let err = client
        .post("/feedback", json!({"rating": 0}))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ClientError::Api { status: 422, ref message } if message == "Rating is required"
    ));
}

#[tokio::test]
async fn test_api_error_falls_back_to_raw_text() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_string("Not Found"))
        .mount(&server)
        .await;

    let client = client_for(&server, store_with_token("t", future_expiry()).await);
    let err = client.get("/missing").await.unwrap_err();
    assert_eq!(err.status(), Some(404));
    assert_eq!(err.to_string(), "Not Found");
}

#[tokio::test]
async fn test_handshake_failure_stops_before_api_call() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(IDENTITY_PATH))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(path("/api/orders"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(0)
        .mount(&server)
        .await;

    let client = client_for(&server, TokenStore::in_memory());
    let err = client.get("/orders").await.unwrap_err();
    assert!(matches!(err, ClientError::AuthenticationFailed { status: 500 }));
}

#[tokio::test]
async fn test_handshake_without_token_is_missing_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(IDENTITY_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "accessToken": "",
            "expiresAt": future_expiry(),
        })))
        .mount(&server)
        .await;

    let store = TokenStore::in_memory();
    let client = client_for(&server, store.clone());
    let err = client.get("/orders").await.unwrap_err();
    assert!(matches!(err, ClientError::MissingToken));
    assert_eq!(store.read().await.unwrap(), None);
}

#[tokio::test]
async fn test_handshake_failure_during_recovery_propagates() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(IDENTITY_PATH))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/orders"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let store = store_with_token("stale", future_expiry()).await;
    let client = client_for(&server, store.clone());

    let err = client.get("/orders").await.unwrap_err();
    assert!(matches!(err, ClientError::AuthenticationFailed { status: 503 }));
    assert_eq!(store.read().await.unwrap(), None);
}
