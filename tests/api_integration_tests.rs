//! Integration Tests for API Endpoints
//!
//! Tests full request/response cycle for each endpoint against mock identity
//! providers served by wiremock.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use iam_cache::{
    api::create_router,
    cache::{jwks_cache_options, oidc_cache_options, FileStore, PersistentStore, ResourceCache},
    AppState, ReqwestFetcher,
};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// == Helper Functions ==

fn memory_state() -> AppState {
    AppState::new(
        ResourceCache::memory_only(jwks_cache_options()),
        ResourceCache::memory_only(oidc_cache_options()),
        Arc::new(ReqwestFetcher::new(Duration::from_secs(5)).unwrap()),
    )
}

fn persistent_state(store: Arc<dyn PersistentStore>) -> AppState {
    AppState::new(
        ResourceCache::new(jwks_cache_options(), Some(store.clone())),
        ResourceCache::new(oidc_cache_options(), Some(store)),
        Arc::new(ReqwestFetcher::new(Duration::from_secs(5)).unwrap()),
    )
}

fn create_test_app() -> Router {
    create_router(memory_state())
}

async fn body_to_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn get(app: Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    (status, body_to_json(response.into_body()).await)
}

async fn delete(app: Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    (status, body_to_json(response.into_body()).await)
}

async fn post_verify(app: Router, body: Value) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/verify")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    (status, body_to_json(response.into_body()).await)
}

/// Symmetric JWK for `secret`
fn oct_jwk(kid: &str, secret: &[u8]) -> Value {
    json!({
        "kty": "oct",
        "kid": kid,
        "alg": "HS256",
        "k": URL_SAFE_NO_PAD.encode(secret),
    })
}

/// HS256 token signed with `secret` and carrying `kid`
fn signed_token(kid: &str, secret: &[u8]) -> String {
    let mut header = Header::default();
    header.kid = Some(kid.to_string());
    encode(
        &header,
        &json!({"sub": "user-1", "iss": "https://idp.example"}),
        &EncodingKey::from_secret(secret),
    )
    .unwrap()
}

async fn mount_jwks(server: &MockServer, keys: Vec<Value>, expected_calls: u64) {
    Mock::given(method("GET"))
        .and(path("/jwks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "keys": keys })))
        .expect(expected_calls)
        .mount(server)
        .await;
}

// == JWKS Endpoint Tests ==

#[tokio::test]
async fn test_jwks_endpoint_fetches_once() {
    let server = MockServer::start().await;
    mount_jwks(&server, vec![oct_jwk("k1", b"first-secret")], 1).await;

    let app = create_test_app();
    let uri = format!("/jwks?uri={}/jwks", server.uri());

    let (status, json) = get(app.clone(), &uri).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["keys"][0]["kid"], "k1");

    // Second lookup, with a trailing slash, is served from memory
    let (status, json) = get(app, &format!("{uri}/")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["keys"][0]["kid"], "k1");
}

#[tokio::test]
async fn test_jwks_endpoint_upstream_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/jwks"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let (status, json) = get(create_test_app(), &format!("/jwks?uri={}/jwks", server.uri())).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(json["error"].as_str().unwrap().contains("HTTP 500"));
}

#[tokio::test]
async fn test_jwks_endpoint_rejects_document_without_keys() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/jwks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"issuer": "x"})))
        .mount(&server)
        .await;

    let (status, json) = get(create_test_app(), &format!("/jwks?uri={}/jwks", server.uri())).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(json["error"].as_str().unwrap().contains("Invalid JWKS"));
}

// == OIDC Endpoint Tests ==

#[tokio::test]
async fn test_oidc_endpoint_resolves_discovery_url() {
    let server = MockServer::start().await;
    let issuer = server.uri();
    Mock::given(method("GET"))
        .and(path("/.well-known/openid-configuration"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "issuer": issuer,
            "jwks_uri": format!("{issuer}/jwks"),
            "token_endpoint": format!("{issuer}/token"),
        })))
        .expect(1)
        .mount(&server)
        .await;

    let app = create_test_app();
    let (status, json) = get(app.clone(), &format!("/oidc?issuer={issuer}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["issuer"], issuer.as_str());
    assert_eq!(json["jwks_uri"], format!("{issuer}/jwks"));

    // The complete discovery URL maps to the same cache entry
    let (status, _) = get(
        app,
        &format!("/oidc?issuer={issuer}/.well-known/openid-configuration"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

// == Verify Endpoint Tests ==

#[tokio::test]
async fn test_verify_with_inline_jwks() {
    let token = signed_token("k1", b"first-secret");

    let (status, json) = post_verify(
        create_test_app(),
        json!({ "token": token, "jwks": { "keys": [oct_jwk("k1", b"first-secret")] } }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["valid"], true);
    assert!(json.get("error").is_none());
    assert!(json.get("refreshedJwks").is_none());
}

#[tokio::test]
async fn test_verify_refreshes_after_key_rotation() {
    let server = MockServer::start().await;
    mount_jwks(&server, vec![oct_jwk("k2", b"rotated-secret")], 1).await;

    let token = signed_token("k2", b"rotated-secret");
    let (status, json) = post_verify(
        create_test_app(),
        json!({
            "token": token,
            "jwks_uri": format!("{}/jwks", server.uri()),
            "jwks": { "keys": [oct_jwk("k1", b"first-secret")] },
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["valid"], true);
    assert_eq!(json["refreshedJwks"]["keys"][0]["kid"], "k2");
}

#[tokio::test]
async fn test_verify_reports_failed_refresh() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/jwks"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let token = signed_token("k2", b"rotated-secret");
    let (status, json) = post_verify(
        create_test_app(),
        json!({
            "token": token,
            "jwksUri": format!("{}/jwks", server.uri()),
            "jwks": { "keys": [oct_jwk("k1", b"first-secret")] },
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["valid"], false);
    let error = json["error"].as_str().unwrap();
    assert!(error.contains("No key with ID \"k2\""));
    assert!(error.contains("JWKS refresh also failed"));
    assert!(error.contains("HTTP 500"));
}

#[tokio::test]
async fn test_verify_wrong_signature_after_refresh() {
    let server = MockServer::start().await;
    // Initial load plus one refresh
    mount_jwks(&server, vec![oct_jwk("k1", b"first-secret")], 2).await;

    let token = signed_token("k1", b"forged-secret");
    let (status, json) = post_verify(
        create_test_app(),
        json!({
            "token": token,
            "jwks_uri": format!("{}/jwks", server.uri()),
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["valid"], false);
    assert_eq!(json["error"], "Signature verification failed");
}

#[tokio::test]
async fn test_verify_token_without_kid() {
    let token = encode(
        &Header::default(),
        &json!({"sub": "user-1"}),
        &EncodingKey::from_secret(b"first-secret"),
    )
    .unwrap();

    let (status, json) = post_verify(
        create_test_app(),
        json!({ "token": token, "jwks": { "keys": [oct_jwk("k1", b"first-secret")] } }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["valid"], false);
    assert_eq!(json["error"], "Token header does not contain a key ID (kid)");
}

// == Stats and Clear Endpoint Tests ==

#[tokio::test]
async fn test_stats_and_clear() {
    let server = MockServer::start().await;
    mount_jwks(&server, vec![oct_jwk("k1", b"first-secret")], 2).await;

    let app = create_test_app();
    let uri = format!("/jwks?uri={}/jwks", server.uri());
    get(app.clone(), &uri).await;

    let (status, stats) = get(app.clone(), "/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["jwks"]["memoryEntries"], 1);
    assert_eq!(stats["oidc"]["memoryEntries"], 0);

    let (status, json) = delete(app.clone(), "/cache").await;
    assert_eq!(status, StatusCode::OK);
    assert!(json["message"].as_str().is_some());

    let (_, stats) = get(app.clone(), "/stats").await;
    assert_eq!(stats["jwks"]["memoryEntries"], 0);

    // Cleared, so the key set is fetched again
    let (status, _) = get(app, &uri).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_remove_single_jwks() {
    let server = MockServer::start().await;
    mount_jwks(&server, vec![oct_jwk("k1", b"first-secret")], 2).await;

    let app = create_test_app();
    let jwks_uri = format!("{}/jwks", server.uri());
    get(app.clone(), &format!("/jwks?uri={jwks_uri}")).await;

    let (status, json) = delete(app.clone(), &format!("/cache/jwks?uri={jwks_uri}")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(json["message"].as_str().unwrap().contains(&jwks_uri));

    get(app, &format!("/jwks?uri={jwks_uri}")).await;
}

// == Persistence Tests ==

#[tokio::test]
async fn test_persistent_tier_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;
    mount_jwks(&server, vec![oct_jwk("k1", b"first-secret")], 1).await;
    let uri = format!("/jwks?uri={}/jwks", server.uri());

    {
        let store: Arc<dyn PersistentStore> = Arc::new(FileStore::open(dir.path()).unwrap());
        let (status, _) = get(create_router(persistent_state(store)), &uri).await;
        assert_eq!(status, StatusCode::OK);
    }

    // New process, same directory: served from disk without a second fetch
    let store: Arc<dyn PersistentStore> = Arc::new(FileStore::open(dir.path()).unwrap());
    let app = create_router(persistent_state(store));

    let (_, stats) = get(app.clone(), "/stats").await;
    assert_eq!(stats["jwks"]["memoryEntries"], 0);
    assert_eq!(stats["jwks"]["storageEntries"], 1);

    let (status, json) = get(app.clone(), &uri).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["keys"][0]["kid"], "k1");

    let (_, stats) = get(app, "/stats").await;
    assert_eq!(stats["jwks"]["memoryEntries"], 1);
}

// == Health Endpoint Tests ==

#[tokio::test]
async fn test_health_endpoint() {
    let (status, json) = get(create_test_app(), "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
    assert!(json["timestamp"].as_str().is_some());
}

#[tokio::test]
async fn test_unknown_route_returns_404() {
    let response = create_test_app()
        .oneshot(
            Request::builder()
                .uri("/unknown")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
