//! Authentication integration tests.
//!
//! Tests verify:
//! - Public endpoints need no token
//! - Admin endpoints require a valid bearer token with a sufficient role
//! - Expired, forged and malformed tokens are rejected

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::json;

use mapserve::{Role, RoleTokenAuth};

use super::test_utils::{
    body_json, get, mbtiles_bytes, send, TestMap, CUSTOM_TILE, TEST_SECRET,
};

fn token(role: Role) -> String {
    RoleTokenAuth::new(TEST_SECRET)
        .issue(role, Duration::from_secs(3600))
        .unwrap()
        .0
}

fn with_token(method: &str, uri: &str, token: &str, body: Body) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {}", token))
        .body(body)
        .unwrap()
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

// =============================================================================
// Public Endpoints
// =============================================================================

#[tokio::test]
async fn test_public_endpoints_need_no_token() {
    let map = TestMap::new();
    let router = map.router_with_auth();

    for uri in ["/health", "/map", "/map/js", "/map/tile/2/1/1"] {
        let response = get(&router, uri).await;
        assert_eq!(response.status(), StatusCode::OK, "{}", uri);
    }
}

// =============================================================================
// Role Checks
// =============================================================================

#[tokio::test]
async fn test_admin_endpoints_require_token() {
    let map = TestMap::new();
    let router = map.router_with_auth();

    let requests = [
        Request::builder()
            .method("PUT")
            .uri("/map")
            .body(Body::from("{}"))
            .unwrap(),
        Request::builder()
            .method("POST")
            .uri("/map/upload")
            .body(Body::from(mbtiles_bytes("city", CUSTOM_TILE)))
            .unwrap(),
        Request::builder()
            .uri("/map/getCustomMapInfo")
            .body(Body::empty())
            .unwrap(),
        Request::builder()
            .method("DELETE")
            .uri("/map/deleteMap")
            .body(Body::empty())
            .unwrap(),
    ];

    for request in requests {
        let uri = request.uri().to_string();
        let response = send(&router, request).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{}", uri);
        assert_eq!(body_json(response).await["error"], "missing_token");
    }

    let info = body_json(
        send(
            &router,
            with_token("GET", "/map/getCustomMapInfo", &token(Role::ReadAdmin), Body::empty()),
        )
        .await,
    )
    .await;
    assert_eq!(info["isCustom"], false);
}

#[tokio::test]
async fn test_read_admin_cannot_write() {
    let map = TestMap::new();
    let router = map.router_with_auth();
    let read = token(Role::ReadAdmin);

    let response = send(
        &router,
        with_token("GET", "/map/getCustomMapInfo", &read, Body::empty()),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send(
        &router,
        with_token(
            "POST",
            "/map/upload",
            &read,
            Body::from(mbtiles_bytes("city", CUSTOM_TILE)),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(response).await["error"], "insufficient_role");

    let response = send(
        &router,
        with_token("PUT", "/map", &read, Body::from(json!({"zoom": 1.0}).to_string())),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = send(
        &router,
        with_token("DELETE", "/map/deleteMap", &read, Body::empty()),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_write_admin_can_do_everything() {
    let map = TestMap::new();
    let router = map.router_with_auth();
    let write = token(Role::WriteAdmin);

    let response = send(
        &router,
        with_token(
            "POST",
            "/map/upload",
            &write,
            Body::from(mbtiles_bytes("city", CUSTOM_TILE)),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send(
        &router,
        with_token("GET", "/map/getCustomMapInfo", &write, Body::empty()),
    )
    .await;
    assert_eq!(body_json(response).await["isCustom"], true);

    let response = send(
        &router,
        with_token("PUT", "/map", &write, Body::from(json!({"zoom": 1.0}).to_string())),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send(
        &router,
        with_token("DELETE", "/map/deleteMap", &write, Body::empty()),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
}

// =============================================================================
// Bad Tokens
// =============================================================================

#[tokio::test]
async fn test_expired_token_rejected() {
    let map = TestMap::new();
    let router = map.router_with_auth();

    let expired = RoleTokenAuth::new(TEST_SECRET)
        .issue_with_expiry(Role::WriteAdmin, now() - 60)
        .unwrap();

    let response = send(
        &router,
        with_token("GET", "/map/getCustomMapInfo", &expired, Body::empty()),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"], "token_expired");
}

#[tokio::test]
async fn test_token_from_different_key_rejected() {
    let map = TestMap::new();
    let router = map.router_with_auth();

    let (forged, _) = RoleTokenAuth::new("some-other-secret")
        .issue(Role::WriteAdmin, Duration::from_secs(3600))
        .unwrap();

    let response = send(
        &router,
        with_token("DELETE", "/map/deleteMap", &forged, Body::empty()),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"], "invalid_signature");
}

#[tokio::test]
async fn test_role_escalation_rejected() {
    let map = TestMap::new();
    let router = map.router_with_auth();

    // Swap the role of a read token while keeping its MAC.
    let read = token(Role::ReadAdmin);
    let escalated = read.replacen("read-admin", "write-admin", 1);

    let response = send(
        &router,
        with_token("DELETE", "/map/deleteMap", &escalated, Body::empty()),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"], "invalid_signature");
}

#[tokio::test]
async fn test_malformed_tokens_rejected() {
    let map = TestMap::new();
    let router = map.router_with_auth();

    for bad in ["garbage", "write-admin.soon.abcd", "owner.9999999999.abcd", "write-admin.9999999999.xyz"] {
        let response = send(
            &router,
            with_token("GET", "/map/getCustomMapInfo", bad, Body::empty()),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{}", bad);
        assert_eq!(body_json(response).await["error"], "malformed_token", "{}", bad);
    }

    // Basic auth is not a bearer token.
    let request = Request::builder()
        .uri("/map/getCustomMapInfo")
        .header("authorization", "Basic dXNlcjpwYXNz")
        .body(Body::empty())
        .unwrap();
    let response = send(&router, request).await;
    assert_eq!(body_json(response).await["error"], "missing_token");
}

#[tokio::test]
async fn test_auth_disabled_allows_unauthenticated() {
    let map = TestMap::new();
    let router = map.router();

    let response = get(&router, "/map/getCustomMapInfo").await;
    assert_eq!(response.status(), StatusCode::OK);
}
