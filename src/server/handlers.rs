//! HTTP request handlers for the map API.
//!
//! # Endpoints
//!
//! - `PUT /map` - Save map settings (write-admin)
//! - `GET /map` - Mapbox GL style document
//! - `GET /map/js` - TileJSON document
//! - `GET /map/tile/{zoom}/{column}/{row}` - Serve a tile
//! - `POST /map/upload` - Upload a custom MBTiles archive (write-admin)
//! - `GET /map/getCustomMapInfo` - Custom map state and limit (read-admin)
//! - `DELETE /map/deleteMap` - Revert to the default archive (write-admin)
//! - `GET /health` - Health check endpoint

use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::archive::CustomMapInfo;
use crate::error::MapError;
use crate::service::MapService;
use crate::settings::{MapSettings, DEFAULT_REALM};

/// Extensions clients append to the tile row segment.
const TILE_EXTENSIONS: &[&str] = &["pbf", "mvt", "png", "jpg", "jpeg", "webp"];

// =============================================================================
// Application State
// =============================================================================

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<MapService>,

    /// Cache-Control max-age for tile responses, in seconds
    pub cache_max_age: u32,

    /// Externally visible server root; request headers are used when unset
    pub public_url: Option<Url>,
}

impl AppState {
    pub fn new(service: MapService) -> Self {
        Self::with_shared_service(Arc::new(service))
    }

    pub fn with_shared_service(service: Arc<MapService>) -> Self {
        Self {
            service,
            cache_max_age: 3600,
            public_url: None,
        }
    }

    pub fn with_cache_max_age(mut self, cache_max_age: u32) -> Self {
        self.cache_max_age = cache_max_age;
        self
    }

    pub fn with_public_url(mut self, public_url: Option<Url>) -> Self {
        self.public_url = public_url;
        self
    }

    /// Base URL of the map API as seen by clients, e.g. `https://host/map`.
    pub fn base_url(&self, headers: &HeaderMap) -> String {
        if let Some(url) = &self.public_url {
            return format!("{}/map", url.as_str().trim_end_matches('/'));
        }

        let get = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.split(',').next())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        };

        let proto = get("x-forwarded-proto").unwrap_or("http");
        let host = get("x-forwarded-host")
            .or_else(|| get(header::HOST.as_str()))
            .unwrap_or("localhost");

        format!("{}://{}/map", proto, host)
    }
}

// =============================================================================
// Request Parameters
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct RealmQuery {
    #[serde(default)]
    pub realm: Option<String>,
}

impl RealmQuery {
    pub fn realm(&self) -> &str {
        self.realm
            .as_deref()
            .filter(|r| !r.is_empty())
            .unwrap_or(DEFAULT_REALM)
    }
}

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    #[serde(default)]
    pub filename: Option<String>,
}

/// Path parameters for tile requests.
///
/// Kept as strings so that malformed values surface as 404 rather than a
/// path rejection.
#[derive(Debug, Deserialize)]
pub struct TilePathParams {
    pub zoom: String,
    pub column: String,
    /// Row with optional extension, e.g. `5` or `5.pbf`
    pub row: String,
}

impl TilePathParams {
    /// Parse into `(zoom, column, row)`.
    pub fn coordinates(&self) -> Result<(i64, i64, i64), MapError> {
        let row = match self.row.rsplit_once('.') {
            Some((row, ext)) if TILE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()) => {
                row
            }
            _ => self.row.as_str(),
        };

        let zoom = self.zoom.parse::<i64>();
        let column = self.column.parse::<i64>();
        let row = row.parse::<i64>();

        match (zoom, column, row) {
            (Ok(zoom), Ok(column), Ok(row)) => Ok((zoom, column, row)),
            (zoom, column, row) => Err(MapError::NotFound {
                zoom: zoom.unwrap_or(-1),
                column: column.unwrap_or(-1),
                row: row.unwrap_or(-1),
            }),
        }
    }
}

// =============================================================================
// Response Types
// =============================================================================

/// JSON error response returned for all error conditions.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error type identifier (e.g., "not_found", "limit_exceeded")
    pub error: String,

    /// Human-readable error message
    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: None,
        }
    }

    pub fn with_status(
        error: impl Into<String>,
        message: impl Into<String>,
        status: StatusCode,
    ) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: Some(status.as_u16()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Result of an upload or delete.
#[derive(Debug, Serialize)]
pub struct MapChangeResponse {
    pub status: &'static str,

    #[serde(flatten)]
    pub info: CustomMapInfo,
}

// =============================================================================
// Error Mapping
// =============================================================================

impl MapError {
    /// HTTP status and stable error code for this error.
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            MapError::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
            MapError::ArchiveUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "archive_unavailable")
            }
            MapError::InvalidArchive(_) => (StatusCode::BAD_REQUEST, "invalid_archive"),
            MapError::LimitExceeded { .. } => (StatusCode::PAYLOAD_TOO_LARGE, "limit_exceeded"),
            MapError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            MapError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "io_error"),
            MapError::NothingToDelete => (StatusCode::CONFLICT, "nothing_to_delete"),
        }
    }
}

/// Convert MapError to HTTP response.
///
/// 5xx errors are logged at ERROR, 404s at DEBUG and other 4xx at WARN.
impl IntoResponse for MapError {
    fn into_response(self) -> Response {
        let (status, error_type) = self.status_and_code();
        let message = self.to_string();

        if status.is_server_error() {
            error!(
                error_type = error_type,
                status = status.as_u16(),
                "Server error: {}",
                message
            );
        } else if status == StatusCode::NOT_FOUND {
            debug!(
                error_type = error_type,
                status = status.as_u16(),
                "Resource not found: {}",
                message
            );
        } else {
            warn!(
                error_type = error_type,
                status = status.as_u16(),
                "Client error: {}",
                message
            );
        }

        let error_response = ErrorResponse::with_status(error_type, message, status);
        (status, Json(error_response)).into_response()
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Save settings for a realm.
///
/// `PUT /map?realm=<realm>` with a JSON object body. Responds with the
/// settings as stored.
pub async fn save_settings_handler(
    State(state): State<AppState>,
    Query(query): Query<RealmQuery>,
    body: Bytes,
) -> Result<Json<MapSettings>, MapError> {
    let doc: Value = serde_json::from_slice(&body)
        .map_err(|e| MapError::Validation(format!("body is not valid JSON: {}", e)))?;

    let saved = state.service.save_settings(query.realm(), doc).await?;
    Ok(Json(saved))
}

/// Mapbox GL style document.
///
/// `GET /map?realm=<realm>`
pub async fn style_handler(
    State(state): State<AppState>,
    Query(query): Query<RealmQuery>,
    headers: HeaderMap,
) -> Result<Json<Value>, MapError> {
    let base_url = state.base_url(&headers);
    let style = state.service.style(query.realm(), &base_url).await?;
    Ok(Json(style))
}

/// TileJSON document.
///
/// `GET /map/js`
pub async fn tilejson_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, MapError> {
    let base_url = state.base_url(&headers);
    Ok(Json(state.service.tilejson(&base_url)?))
}

/// Serve one tile.
///
/// `GET /map/tile/{zoom}/{column}/{row}` with `row` in the top-origin
/// convention.
///
/// # Response
///
/// - `200 OK`: raw tile bytes with the archive's MIME type
/// - `404 Not Found`: coordinate out of range or no tile stored there
/// - `503 Service Unavailable`: no archive is active
///
/// # Headers
///
/// - `Content-Type`: tile MIME type
/// - `Content-Encoding: gzip` when the stored blob is gzip-compressed
/// - `Cache-Control: public, max-age={cache_max_age}`
/// - `X-Tile-Cache-Hit: true|false`
pub async fn tile_handler(
    State(state): State<AppState>,
    Path(params): Path<TilePathParams>,
) -> Result<Response, MapError> {
    let (zoom, column, row) = params.coordinates()?;
    let tile = state.service.get_tile(zoom, column, row).await?;

    let mut response = Body::from(tile.blob.data).into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(tile.blob.mime_type),
    );
    if let Some(encoding) = tile.blob.content_encoding {
        headers.insert(header::CONTENT_ENCODING, HeaderValue::from_static(encoding));
    }
    if let Ok(value) = HeaderValue::from_str(&format!("public, max-age={}", state.cache_max_age))
    {
        headers.insert(header::CACHE_CONTROL, value);
    }
    headers.insert(
        "x-tile-cache-hit",
        HeaderValue::from_static(if tile.cache_hit { "true" } else { "false" }),
    );

    Ok(response)
}

/// Upload a custom archive.
///
/// `POST /map/upload?filename=<name>` with the MBTiles file as an
/// `application/octet-stream` body.
///
/// The body is read up to the custom map limit; anything longer is
/// rejected with `413` before it is fully buffered.
pub async fn upload_handler(
    State(state): State<AppState>,
    Query(query): Query<UploadQuery>,
    headers: HeaderMap,
    body: Body,
) -> Result<Json<MapChangeResponse>, MapError> {
    let limit = state.service.custom_map_info().limit;
    let declared = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());

    if let Some(size) = declared.filter(|size| *size > limit) {
        return Err(MapError::LimitExceeded { size, limit });
    }

    let data = read_limited(body, limit, declared).await?;
    info!(
        size = data.len(),
        filename = query.filename.as_deref().unwrap_or(""),
        "Custom map upload received"
    );

    let info = state.service.upload(data, query.filename).await?;
    Ok(Json(MapChangeResponse {
        status: "uploaded",
        info,
    }))
}

async fn read_limited(body: Body, limit: u64, declared: Option<u64>) -> Result<Bytes, MapError> {
    let max = usize::try_from(limit).unwrap_or(usize::MAX);
    match Limited::new(body, max).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => Err(MapError::LimitExceeded {
            size: declared.unwrap_or(limit.saturating_add(1)),
            limit,
        }),
        Err(e) => Err(MapError::Io(format!("failed to read upload body: {}", e))),
    }
}

/// `GET /map/getCustomMapInfo`
pub async fn custom_map_info_handler(State(state): State<AppState>) -> Json<CustomMapInfo> {
    Json(state.service.custom_map_info())
}

/// `DELETE /map/deleteMap`
pub async fn delete_map_handler(
    State(state): State<AppState>,
) -> Result<Json<MapChangeResponse>, MapError> {
    let info = state.service.delete().await?;
    Ok(Json(MapChangeResponse {
        status: "deleted",
        info,
    }))
}

/// `GET /health`
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// =============================================================================
// Tests
// =============================================================================
