//! Settings integration tests.
//!
//! Tests verify:
//! - Saved settings flow into the style document
//! - Realms fall back to the default realm
//! - Invalid documents are rejected without changing stored settings
//! - Settings persist across restarts

use axum::http::StatusCode;
use serde_json::json;

use super::test_utils::{body_json, get, put_settings_request, send, TestMap};

#[tokio::test]
async fn test_saved_settings_shape_style() {
    let map = TestMap::new();
    let router = map.router();

    let response = send(
        &router,
        put_settings_request(
            "/map",
            json!({
                "center": [7.44, 46.95],
                "zoom": 2.5,
                "boxZoom": true,
                "geocodeUrl": "https://geocode.example.com/search",
                "style": { "glyphs": "https://fonts.example.com/{fontstack}/{range}.pbf" },
                "theme": "dark",
            }),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let saved = body_json(response).await;
    assert_eq!(saved["center"], json!([7.44, 46.95]));
    assert_eq!(saved["theme"], "dark");

    let style = body_json(get(&router, "/map").await).await;
    assert_eq!(style["center"], json!([7.44, 46.95]));
    assert_eq!(style["zoom"], json!(2.5));
    assert_eq!(
        style["glyphs"],
        "https://fonts.example.com/{fontstack}/{range}.pbf"
    );

    let options = &style["options"]["default"];
    assert_eq!(options["center"], json!([7.44, 46.95]));
    assert_eq!(options["boxZoom"], true);
    assert_eq!(options["geocodeUrl"], "https://geocode.example.com/search");
    assert_eq!(options["theme"], "dark");
    // Not overridden, so still from archive metadata.
    assert_eq!(options["bounds"], json!([5.9, 45.8, 10.5, 47.8]));
}

#[tokio::test]
async fn test_style_overrides_cannot_replace_sources() {
    let map = TestMap::new();
    let router = map.router();

    send(
        &router,
        put_settings_request("/map", json!({ "style": { "sources": {}, "version": 7 } })),
    )
    .await;

    let style = body_json(get(&router, "/map").await).await;
    assert_eq!(style["version"], 8);
    assert!(style["sources"]["vector_tiles"].is_object());
}

#[tokio::test]
async fn test_realm_fallback() {
    let map = TestMap::new();
    let router = map.router();

    send(&router, put_settings_request("/map", json!({ "zoom": 1.0 }))).await;
    send(
        &router,
        put_settings_request("/map?realm=acme", json!({ "zoom": 4.0 })),
    )
    .await;

    let acme = body_json(get(&router, "/map?realm=acme").await).await;
    assert_eq!(acme["options"]["acme"]["zoom"], json!(4.0));

    // Unknown realms use the default realm's settings.
    let other = body_json(get(&router, "/map?realm=other").await).await;
    assert_eq!(other["options"]["other"]["zoom"], json!(1.0));

    let default = body_json(get(&router, "/map").await).await;
    assert_eq!(default["options"]["default"]["zoom"], json!(1.0));
}

#[tokio::test]
async fn test_invalid_settings_rejected() {
    let map = TestMap::new();
    let router = map.router();

    send(&router, put_settings_request("/map", json!({ "zoom": 2.0 }))).await;

    for doc in [
        json!({ "center": [200.0, 0.0] }),
        json!({ "bounds": [0.0, 10.0, 1.0, 5.0] }),
        json!({ "minZoom": 5.0, "maxZoom": 3.0 }),
        json!({ "zoom": 30.0 }),
        json!({ "geocodeUrl": "not a url" }),
        json!(["not", "an", "object"]),
    ] {
        let response = send(&router, put_settings_request("/map", doc.clone())).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", doc);
        assert_eq!(body_json(response).await["error"], "validation_error");
    }

    let style = body_json(get(&router, "/map").await).await;
    assert_eq!(style["options"]["default"]["zoom"], json!(2.0));
}

#[tokio::test]
async fn test_invalid_realm_rejected() {
    let map = TestMap::new();
    let router = map.router();

    let response = send(
        &router,
        put_settings_request("/map?realm=..%2Fetc", json!({ "zoom": 1.0 })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = get(&router, "/map?realm=a%20b").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_malformed_json_rejected() {
    let map = TestMap::new();
    let router = map.router();

    let request = axum::http::Request::builder()
        .method("PUT")
        .uri("/map")
        .header("content-type", "application/json")
        .body(axum::body::Body::from("{ not json"))
        .unwrap();
    let response = send(&router, request).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "validation_error");
}

#[tokio::test]
async fn test_settings_persist_across_restart() {
    let map = TestMap::new();

    {
        let router = map.router();
        let response = send(
            &router,
            put_settings_request("/map?realm=acme", json!({ "center": [1.0, 2.0] })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let router = map.router();
    let style = body_json(get(&router, "/map?realm=acme").await).await;
    assert_eq!(style["options"]["acme"]["center"], json!([1.0, 2.0]));
}

#[tokio::test]
async fn test_settings_survive_map_replacement() {
    let map = TestMap::new();
    let router = map.router();

    send(&router, put_settings_request("/map", json!({ "zoom": 3.5 }))).await;
    send(
        &router,
        super::test_utils::upload_request(
            "/map/upload",
            super::test_utils::mbtiles_bytes("city", b"tile"),
        ),
    )
    .await;

    let style = body_json(get(&router, "/map").await).await;
    assert_eq!(style["name"], "city");
    assert_eq!(style["options"]["default"]["zoom"], json!(3.5));
}
