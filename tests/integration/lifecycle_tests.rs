//! Custom map lifecycle tests.
//!
//! Tests verify:
//! - Uploads replace the served tiles and documents
//! - Invalid or oversized uploads leave the active map untouched
//! - Deleting reverts to the default map
//! - In-flight snapshots survive replacement
//! - The last custom map is recovered after a restart

use std::sync::Arc;

use axum::http::StatusCode;

use mapserve::TileCoord;

use super::test_utils::{
    body_bytes, body_json, delete_request, get, mbtiles_bytes, send, upload_request, TestMap,
    CUSTOM_TILE, DEFAULT_TILE,
};

// =============================================================================
// Upload
// =============================================================================

#[tokio::test]
async fn test_upload_replaces_tiles() {
    let map = TestMap::new();
    let router = map.router();

    // Warm the cache with the default tile first.
    let before = get(&router, "/map/tile/2/1/1").await;
    assert_eq!(&body_bytes(before).await[..], DEFAULT_TILE);

    let response = send(
        &router,
        upload_request(
            "/map/upload?filename=city.mbtiles",
            mbtiles_bytes("city", CUSTOM_TILE),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "uploaded");
    assert_eq!(body["isCustom"], true);
    assert_eq!(body["filename"], "city.mbtiles");

    let after = get(&router, "/map/tile/2/1/1").await;
    assert_eq!(after.headers().get("x-tile-cache-hit").unwrap(), "false");
    assert_eq!(&body_bytes(after).await[..], CUSTOM_TILE);

    let tilejson = body_json(get(&router, "/map/js").await).await;
    assert_eq!(tilejson["name"], "city");
}

#[tokio::test]
async fn test_custom_map_info() {
    let map = TestMap::with_limit(1_000_000);
    let router = map.router();

    let info = body_json(get(&router, "/map/getCustomMapInfo").await).await;
    assert_eq!(info["isCustom"], false);
    assert_eq!(info["maxSizeOrCount"], 1_000_000);

    send(
        &router,
        upload_request("/map/upload", mbtiles_bytes("city", CUSTOM_TILE)),
    )
    .await;

    let info = body_json(get(&router, "/map/getCustomMapInfo").await).await;
    assert_eq!(info["isCustom"], true);
    assert_eq!(info["maxSizeOrCount"], 1_000_000);
}

#[tokio::test]
async fn test_invalid_upload_keeps_active_map() {
    let map = TestMap::new();
    let router = map.router();

    let response = send(
        &router,
        upload_request("/map/upload", b"definitely not sqlite".to_vec()),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "invalid_archive");

    let tile = get(&router, "/map/tile/2/1/1").await;
    assert_eq!(&body_bytes(tile).await[..], DEFAULT_TILE);

    let info = body_json(get(&router, "/map/getCustomMapInfo").await).await;
    assert_eq!(info["isCustom"], false);
}

#[tokio::test]
async fn test_upload_missing_metadata_rejected() {
    let map = TestMap::new();
    let router = map.router();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nameless.mbtiles");
    super::test_utils::write_mbtiles(&path, &[("format", "pbf")], &[(0, 0, 0, b"x")]);

    let response = send(
        &router,
        upload_request("/map/upload", std::fs::read(&path).unwrap()),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Nothing is left behind in storage.
    let leftovers: Vec<_> = std::fs::read_dir(map.storage_dir())
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "mbtiles"))
        .collect();
    assert!(leftovers.is_empty(), "{:?}", leftovers);
}

#[tokio::test]
async fn test_oversized_upload_rejected() {
    let data = mbtiles_bytes("city", CUSTOM_TILE);
    let map = TestMap::with_limit(data.len() as u64 - 1);
    let router = map.router();

    let response = send(&router, upload_request("/map/upload", data)).await;
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);

    let error = body_json(response).await;
    assert_eq!(error["error"], "limit_exceeded");
    assert_eq!(error["status"], 413);

    let info = body_json(get(&router, "/map/getCustomMapInfo").await).await;
    assert_eq!(info["isCustom"], false);
}

#[tokio::test]
async fn test_upload_at_limit_accepted() {
    let data = mbtiles_bytes("city", CUSTOM_TILE);
    let map = TestMap::with_limit(data.len() as u64);
    let router = map.router();

    let response = send(&router, upload_request("/map/upload", data)).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_upload_without_default_archive() {
    let map = TestMap::without_default();
    let router = map.router();

    assert_eq!(
        get(&router, "/map/tile/2/1/1").await.status(),
        StatusCode::SERVICE_UNAVAILABLE
    );

    send(
        &router,
        upload_request("/map/upload", mbtiles_bytes("city", CUSTOM_TILE)),
    )
    .await;

    let tile = get(&router, "/map/tile/2/1/1").await;
    assert_eq!(tile.status(), StatusCode::OK);
    assert_eq!(&body_bytes(tile).await[..], CUSTOM_TILE);
}

// =============================================================================
// Delete
// =============================================================================

#[tokio::test]
async fn test_delete_reverts_to_default() {
    let map = TestMap::new();
    let router = map.router();

    send(
        &router,
        upload_request("/map/upload", mbtiles_bytes("city", CUSTOM_TILE)),
    )
    .await;
    let tile = get(&router, "/map/tile/2/1/1").await;
    assert_eq!(&body_bytes(tile).await[..], CUSTOM_TILE);

    let response = send(&router, delete_request()).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "deleted");
    assert_eq!(body["isCustom"], false);

    let tile = get(&router, "/map/tile/2/1/1").await;
    assert_eq!(&body_bytes(tile).await[..], DEFAULT_TILE);

    let custom_files = std::fs::read_dir(map.storage_dir())
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| e.file_name().to_string_lossy().starts_with("custom-"))
        .count();
    assert_eq!(custom_files, 0);
}

#[tokio::test]
async fn test_delete_without_custom_map() {
    let map = TestMap::new();
    let router = map.router();

    let response = send(&router, delete_request()).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(response).await["error"], "nothing_to_delete");

    let tile = get(&router, "/map/tile/2/1/1").await;
    assert_eq!(tile.status(), StatusCode::OK);
}

// =============================================================================
// Snapshots and Recovery
// =============================================================================

#[tokio::test]
async fn test_snapshot_survives_replacement() {
    let map = TestMap::new();
    let service = map.service();
    let coord = TileCoord::new(2, 1, 1).unwrap();

    service
        .upload(mbtiles_bytes("first", b"first").into(), None)
        .await
        .unwrap();
    let snapshot = service.archives().active().unwrap();
    let first_path = snapshot.archive().path().to_path_buf();

    service
        .upload(mbtiles_bytes("second", b"second").into(), None)
        .await
        .unwrap();

    // The replaced archive still answers through the snapshot.
    assert!(first_path.exists());
    let blob = snapshot.archive().get_tile(coord).unwrap();
    assert_eq!(&blob.data[..], b"first");

    let current = service.get_tile(2, 1, 1).await.unwrap();
    assert_eq!(&current.blob.data[..], b"second");

    // Its file goes with the last reference.
    drop(snapshot);
    assert!(!first_path.exists());
}

#[tokio::test]
async fn test_concurrent_reads_during_replacement() {
    let map = TestMap::new();
    let service = Arc::new(map.service());

    let readers: Vec<_> = (0..8)
        .map(|_| {
            let service = Arc::clone(&service);
            tokio::spawn(async move {
                for _ in 0..25 {
                    let tile = service.get_tile(2, 1, 1).await.unwrap();
                    let data = &tile.blob.data[..];
                    assert!(
                        data == DEFAULT_TILE || data == CUSTOM_TILE || data == b"other",
                        "unexpected tile {:?}",
                        data
                    );
                }
            })
        })
        .collect();

    for i in 0..4 {
        let tile: &[u8] = if i % 2 == 0 { CUSTOM_TILE } else { b"other" };
        service
            .upload(mbtiles_bytes("swap", tile).into(), None)
            .await
            .unwrap();
    }

    for reader in readers {
        reader.await.unwrap();
    }

    let tile = service.get_tile(2, 1, 1).await.unwrap();
    assert_eq!(&tile.blob.data[..], b"other");
}

#[tokio::test]
async fn test_custom_map_recovered_after_restart() {
    let map = TestMap::new();

    {
        let service = map.service();
        service
            .upload(
                mbtiles_bytes("city", CUSTOM_TILE).into(),
                Some("city.mbtiles".to_string()),
            )
            .await
            .unwrap();
    }

    let router = map.router();
    let tile = get(&router, "/map/tile/2/1/1").await;
    assert_eq!(&body_bytes(tile).await[..], CUSTOM_TILE);

    let info = body_json(get(&router, "/map/getCustomMapInfo").await).await;
    assert_eq!(info["isCustom"], true);

    // Uploading again after a restart does not reuse the recovered name.
    send(
        &router,
        upload_request("/map/upload", mbtiles_bytes("next", b"next")),
    )
    .await;
    let tile = get(&router, "/map/tile/2/1/1").await;
    assert_eq!(&body_bytes(tile).await[..], b"next");
}

#[tokio::test]
async fn test_stale_staging_files_removed_on_startup() {
    let map = TestMap::new();
    std::fs::create_dir_all(map.storage_dir()).unwrap();
    let staging = map.storage_dir().join(".staging-7.mbtiles");
    std::fs::write(&staging, b"partial").unwrap();

    let service = map.service();
    assert!(!staging.exists());
    assert!(!service.custom_map_info().is_custom);
}
