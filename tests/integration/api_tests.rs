//! API integration tests for tiles, documents and error handling.
//!
//! Tests verify:
//! - Tile retrieval with row flipping and response headers
//! - Style and TileJSON documents built from archive metadata
//! - Error cases (missing tile, malformed coordinates, no archive)

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::json;

use mapserve::{create_router, MapService, RouterConfig, SettingsStore};

use super::test_utils::{body_bytes, body_json, get, send, TestMap, DEFAULT_TILE};

// =============================================================================
// Tiles
// =============================================================================

#[tokio::test]
async fn test_tile_retrieval_success() {
    let map = TestMap::new();
    let router = map.router();

    let response = get(&router, "/map/tile/2/1/1").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "application/vnd.mapbox-vector-tile"
    );
    assert_eq!(
        response.headers().get("cache-control").unwrap(),
        "public, max-age=3600"
    );
    assert!(response.headers().get("content-encoding").is_none());

    assert_eq!(&body_bytes(response).await[..], DEFAULT_TILE);
}

#[tokio::test]
async fn test_tile_rows_are_flipped() {
    let map = TestMap::new();
    let router = map.router();

    // Stored at TMS row 2, which is XYZ row 1; XYZ row 2 has nothing.
    let response = get(&router, "/map/tile/2/1/2").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_tile_with_extension() {
    let map = TestMap::new();
    let router = map.router();

    let response = get(&router, "/map/tile/2/1/1.pbf").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(&body_bytes(response).await[..], DEFAULT_TILE);
}

#[tokio::test]
async fn test_gzip_tile_sets_content_encoding() {
    let map = TestMap::new();
    let router = map.router();

    let response = get(&router, "/map/tile/0/0/0").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get("content-encoding").unwrap(), "gzip");
}

#[tokio::test]
async fn test_cache_hit_header() {
    let map = TestMap::new();
    let router = map.router();

    let first = get(&router, "/map/tile/2/1/1").await;
    assert_eq!(first.headers().get("x-tile-cache-hit").unwrap(), "false");

    let second = get(&router, "/map/tile/2/1/1").await;
    assert_eq!(second.headers().get("x-tile-cache-hit").unwrap(), "true");
    assert_eq!(&body_bytes(second).await[..], DEFAULT_TILE);
}

#[tokio::test]
async fn test_custom_cache_max_age() {
    let map = TestMap::new();
    let router = create_router(
        map.service(),
        RouterConfig::without_auth()
            .with_tracing(false)
            .with_cache_max_age(60),
    );

    let response = get(&router, "/map/tile/2/1/1").await;
    assert_eq!(
        response.headers().get("cache-control").unwrap(),
        "public, max-age=60"
    );
}

#[tokio::test]
async fn test_tile_errors_are_not_found() {
    let map = TestMap::new();
    let router = map.router();

    for uri in [
        // no tile stored
        "/map/tile/3/0/0",
        // outside the grid
        "/map/tile/2/4/0",
        "/map/tile/2/0/-1",
        // outside the archive's zoom range
        "/map/tile/5/0/0",
        // not integers
        "/map/tile/a/0/0",
        "/map/tile/2/1/1.gif",
    ] {
        let response = get(&router, uri).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{}", uri);

        let error = body_json(response).await;
        assert_eq!(error["error"], "not_found", "{}", uri);
        assert_eq!(error["status"], 404);
    }
}

#[tokio::test]
async fn test_no_archive_is_service_unavailable() {
    let map = TestMap::without_default();
    let router = map.router();

    for uri in ["/map/tile/0/0/0", "/map", "/map/js"] {
        let response = get(&router, uri).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE, "{}", uri);
        assert_eq!(body_json(response).await["error"], "archive_unavailable");
    }
}

// =============================================================================
// Documents
// =============================================================================

#[tokio::test]
async fn test_style_document() {
    let map = TestMap::new();
    let router = map.router();

    let request = Request::builder()
        .uri("/map")
        .header("host", "maps.test")
        .body(Body::empty())
        .unwrap();
    let response = send(&router, request).await;
    assert_eq!(response.status(), StatusCode::OK);

    let style = body_json(response).await;
    assert_eq!(style["version"], 8);
    assert_eq!(style["name"], "default");

    let source = &style["sources"]["vector_tiles"];
    assert_eq!(source["type"], "vector");
    assert_eq!(source["tiles"][0], "http://maps.test/map/tile/{z}/{x}/{y}");
    assert_eq!(source["minzoom"], 0);
    assert_eq!(source["maxzoom"], 4);

    let options = &style["options"]["default"];
    assert_eq!(options["center"], json!([8.5, 47.3]));
    assert_eq!(options["bounds"], json!([5.9, 45.8, 10.5, 47.8]));
    assert_eq!(options["zoom"], json!(3.0));
}

#[tokio::test]
async fn test_tilejson_document() {
    let map = TestMap::new();
    let router = map.router();

    let request = Request::builder()
        .uri("/map/js")
        .header("host", "internal:8080")
        .header("x-forwarded-proto", "https")
        .header("x-forwarded-host", "maps.example.com")
        .body(Body::empty())
        .unwrap();
    let response = send(&router, request).await;
    assert_eq!(response.status(), StatusCode::OK);

    let doc = body_json(response).await;
    assert_eq!(doc["tilejson"], "2.2.0");
    assert_eq!(doc["scheme"], "xyz");
    assert_eq!(doc["format"], "pbf");
    assert_eq!(
        doc["tiles"],
        json!(["https://maps.example.com/map/tile/{z}/{x}/{y}"])
    );
    assert_eq!(doc["vector_layers"][0]["id"], "water");
    assert_eq!(doc["attribution"], "© Contributors");
}

#[tokio::test]
async fn test_public_url_overrides_request_headers() {
    let map = TestMap::new();
    let router = create_router(
        map.service(),
        RouterConfig::without_auth()
            .with_tracing(false)
            .with_public_url(Some("https://tiles.example.org".parse().unwrap())),
    );

    let request = Request::builder()
        .uri("/map/js")
        .header("host", "internal:8080")
        .body(Body::empty())
        .unwrap();
    let doc = body_json(send(&router, request).await).await;
    assert_eq!(
        doc["tiles"][0],
        "https://tiles.example.org/map/tile/{z}/{x}/{y}"
    );
}

// =============================================================================
// Misc
// =============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let router = create_router(
        MapService::new(
            mapserve::ArchiveManager::open(TestMap::without_default().lifecycle_config()).unwrap(),
            SettingsStore::in_memory(),
        ),
        RouterConfig::without_auth().with_tracing(false),
    );

    // Health does not depend on an active archive.
    let response = get(&router, "/health").await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let map = TestMap::new();
    let router = map.router();

    let response = get(&router, "/tiles/2/1/1").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
