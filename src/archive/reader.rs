//! MBTiles archive reader.
//!
//! An MBTiles archive is a SQLite database with two tables:
//!
//! ```text
//! metadata (name TEXT, value TEXT)
//! tiles    (zoom_level INTEGER, tile_column INTEGER, tile_row INTEGER, tile_data BLOB)
//! ```
//!
//! The reader opens the file read-only through a small connection pool,
//! parses the metadata once, and afterwards only runs point lookups against
//! `tiles`. It never writes to the file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bytes::Bytes;
use r2d2::Pool;
use r2d2_sqlite::rusqlite::{params, OpenFlags, OptionalExtension};
use r2d2_sqlite::SqliteConnectionManager;
use serde_json::Value;
use tracing::{debug, warn};

use super::coord::{RowAxis, TileCoord};
use crate::error::ArchiveError;

/// Metadata keys an archive must carry to be accepted.
pub const REQUIRED_METADATA_KEYS: &[&str] = &["name", "format"];

/// Maximum number of pooled SQLite connections per archive.
const POOL_SIZE: u32 = 8;

/// How long a reader waits for a pooled connection.
const POOL_TIMEOUT: Duration = Duration::from_secs(5);

/// MIME type of Mapbox vector tiles.
pub const VECTOR_TILE_MIME: &str = "application/vnd.mapbox-vector-tile";

// =============================================================================
// Tile Format
// =============================================================================

/// Tile payload format declared by the archive's `format` metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileFormat {
    /// Mapbox vector tiles (`pbf` / `mvt`)
    Pbf,
    Png,
    Jpeg,
    Webp,
}

impl TileFormat {
    /// Parse the MBTiles `format` value.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pbf" | "mvt" => Some(TileFormat::Pbf),
            "png" => Some(TileFormat::Png),
            "jpg" | "jpeg" => Some(TileFormat::Jpeg),
            "webp" => Some(TileFormat::Webp),
            _ => None,
        }
    }

    /// MIME type served for tiles of this format.
    pub fn mime_type(&self) -> &'static str {
        match self {
            TileFormat::Pbf => VECTOR_TILE_MIME,
            TileFormat::Png => "image/png",
            TileFormat::Jpeg => "image/jpeg",
            TileFormat::Webp => "image/webp",
        }
    }

    /// Canonical name, as written to TileJSON `format`.
    pub fn name(&self) -> &'static str {
        match self {
            TileFormat::Pbf => "pbf",
            TileFormat::Png => "png",
            TileFormat::Jpeg => "jpg",
            TileFormat::Webp => "webp",
        }
    }

    pub fn is_vector(&self) -> bool {
        matches!(self, TileFormat::Pbf)
    }
}

// =============================================================================
// Metadata
// =============================================================================

/// Parsed archive metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveMetadata {
    pub name: String,
    pub format: TileFormat,
    pub min_zoom: u8,
    pub max_zoom: u8,

    /// `[west, south, east, north]` in degrees
    pub bounds: Option<[f64; 4]>,

    /// `[longitude, latitude, zoom]`
    pub center: Option<[f64; 3]>,

    pub attribution: Option<String>,
    pub description: Option<String>,
    pub version: Option<String>,

    /// `vector_layers` array from the `json` metadata entry
    pub vector_layers: Option<Value>,

    pub row_axis: RowAxis,

    /// All key/value pairs exactly as stored
    pub raw: BTreeMap<String, String>,
}

impl ArchiveMetadata {
    /// Parse stored key/value pairs.
    ///
    /// `zoom_range` supplies `(min, max)` from the tiles table when the
    /// archive does not declare `minzoom`/`maxzoom`.
    fn parse(
        raw: BTreeMap<String, String>,
        zoom_range: impl FnOnce() -> Result<(u8, u8), ArchiveError>,
    ) -> Result<Self, ArchiveError> {
        for key in REQUIRED_METADATA_KEYS {
            if !raw.contains_key(*key) {
                return Err(ArchiveError::invalid(format!(
                    "missing required metadata key '{}'",
                    key
                )));
            }
        }

        let format_value = &raw["format"];
        let format = TileFormat::parse(format_value).ok_or_else(|| {
            ArchiveError::invalid(format!("unsupported tile format '{}'", format_value))
        })?;

        let declared_min = raw.get("minzoom").and_then(|v| parse_zoom("minzoom", v));
        let declared_max = raw.get("maxzoom").and_then(|v| parse_zoom("maxzoom", v));
        let (min_zoom, max_zoom) = match (declared_min, declared_max) {
            (Some(min), Some(max)) => (min, max),
            (min, max) => {
                let (stored_min, stored_max) = zoom_range()?;
                (min.unwrap_or(stored_min), max.unwrap_or(stored_max))
            }
        };

        if min_zoom > max_zoom {
            return Err(ArchiveError::invalid(format!(
                "minzoom {} is greater than maxzoom {}",
                min_zoom, max_zoom
            )));
        }

        let bounds = raw
            .get("bounds")
            .and_then(|v| parse_floats::<4>("bounds", v));

        let center = raw.get("center").and_then(|v| parse_center(v));

        let vector_layers = raw.get("json").and_then(|v| parse_vector_layers(v));

        Ok(Self {
            name: raw["name"].clone(),
            format,
            min_zoom,
            max_zoom,
            bounds,
            center,
            attribution: raw.get("attribution").cloned(),
            description: raw.get("description").cloned(),
            version: raw.get("version").cloned(),
            vector_layers,
            row_axis: RowAxis::from_scheme(raw.get("scheme").map(String::as_str)),
            raw,
        })
    }

    /// Whether `zoom` lies inside the declared zoom range.
    pub fn contains_zoom(&self, zoom: u8) -> bool {
        (self.min_zoom..=self.max_zoom).contains(&zoom)
    }
}

fn parse_zoom(key: &str, value: &str) -> Option<u8> {
    match value.trim().parse::<f64>() {
        Ok(z) if z.fract() == 0.0 && (0.0..=f64::from(super::coord::MAX_ZOOM)).contains(&z) => {
            Some(z as u8)
        }
        _ => {
            warn!("Ignoring unparseable {} value '{}'", key, value);
            None
        }
    }
}

fn parse_floats<const N: usize>(key: &str, value: &str) -> Option<[f64; N]> {
    let parts: Result<Vec<f64>, _> = value.split(',').map(|s| s.trim().parse()).collect();
    match parts {
        Ok(parts) if parts.len() == N => {
            let mut out = [0.0; N];
            out.copy_from_slice(&parts);
            Some(out)
        }
        _ => {
            warn!("Ignoring unparseable {} value '{}'", key, value);
            None
        }
    }
}

/// `center` is `lon,lat,zoom`; some writers omit the zoom.
fn parse_center(value: &str) -> Option<[f64; 3]> {
    if value.split(',').count() == 2 {
        parse_floats::<2>("center", value).map(|[lon, lat]| [lon, lat, 0.0])
    } else {
        parse_floats::<3>("center", value)
    }
}

fn parse_vector_layers(value: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(value) {
        Ok(json) => json.get("vector_layers").cloned(),
        Err(e) => {
            warn!("Ignoring unparseable json metadata: {}", e);
            None
        }
    }
}

// =============================================================================
// Tile Blob
// =============================================================================

/// A tile payload read from an archive.
#[derive(Debug, Clone, PartialEq)]
pub struct TileBlob {
    pub data: Bytes,
    pub mime_type: &'static str,

    /// `Some("gzip")` when the stored blob is gzip-compressed
    pub content_encoding: Option<&'static str>,
}

impl TileBlob {
    fn new(data: Vec<u8>, format: TileFormat) -> Self {
        let content_encoding = if data.starts_with(&[0x1f, 0x8b]) {
            Some("gzip")
        } else {
            None
        };

        Self {
            data: Bytes::from(data),
            mime_type: format.mime_type(),
            content_encoding,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

// =============================================================================
// MBTiles Archive
// =============================================================================

/// A read-only, validated MBTiles archive.
pub struct MbtilesArchive {
    path: PathBuf,
    pool: Pool<SqliteConnectionManager>,
    metadata: ArchiveMetadata,
}

impl MbtilesArchive {
    /// Open and validate an archive.
    ///
    /// # Errors
    ///
    /// - [`ArchiveError::Unavailable`] if the file does not exist or cannot be opened
    /// - [`ArchiveError::Invalid`] if it is not SQLite, lacks the MBTiles
    ///   tables, or misses required metadata
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ArchiveError> {
        let path = path.as_ref().to_path_buf();
        debug!("Opening archive {:?}", path);

        if !path.is_file() {
            return Err(ArchiveError::Unavailable(format!(
                "file {:?} does not exist",
                path
            )));
        }

        let manager = SqliteConnectionManager::file(&path)
            .with_flags(OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX);
        let pool = Pool::builder()
            .max_size(POOL_SIZE)
            .min_idle(Some(0))
            .connection_timeout(POOL_TIMEOUT)
            .build(manager)
            .map_err(|e| ArchiveError::Unavailable(format!("{:?}: {}", path, e)))?;

        let raw = read_metadata_table(&pool)?;
        check_tiles_table(&pool)?;
        let metadata = ArchiveMetadata::parse(raw, || read_zoom_range(&pool))?;

        debug!(
            name = %metadata.name,
            format = metadata.format.name(),
            min_zoom = metadata.min_zoom,
            max_zoom = metadata.max_zoom,
            scheme = metadata.row_axis.as_str(),
            "Opened archive {:?}",
            path
        );

        Ok(Self {
            path,
            pool,
            metadata,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn metadata(&self) -> &ArchiveMetadata {
        &self.metadata
    }

    /// All metadata key/value pairs as stored.
    pub fn raw_metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata.raw
    }

    /// Read a tile addressed in the client (top-origin) convention.
    ///
    /// # Errors
    ///
    /// - [`ArchiveError::TileNotFound`] outside the archive's zoom range or
    ///   when no blob is stored at the coordinate
    /// - [`ArchiveError::Unavailable`] if SQLite cannot be queried
    pub fn get_tile(&self, coord: TileCoord) -> Result<TileBlob, ArchiveError> {
        let not_found = || ArchiveError::TileNotFound {
            zoom: coord.zoom as i64,
            column: coord.column as i64,
            row: coord.row as i64,
        };

        if !self.metadata.contains_zoom(coord.zoom) {
            return Err(not_found());
        }

        let stored = coord.normalize(self.metadata.row_axis);

        let conn = self.pool.get().map_err(|e| self.unavailable(e))?;
        let data: Option<Vec<u8>> = conn
            .query_row(
                "SELECT tile_data FROM tiles \
                 WHERE zoom_level = ?1 AND tile_column = ?2 AND tile_row = ?3",
                params![stored.zoom, stored.column, stored.row],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| self.unavailable(e))?;

        match data {
            Some(data) => Ok(TileBlob::new(data, self.metadata.format)),
            None => Err(not_found()),
        }
    }

    fn unavailable(&self, err: impl std::fmt::Display) -> ArchiveError {
        ArchiveError::Unavailable(format!("{:?}: {}", self.path, err))
    }
}

impl std::fmt::Debug for MbtilesArchive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MbtilesArchive")
            .field("path", &self.path)
            .field("name", &self.metadata.name)
            .field("format", &self.metadata.format)
            .finish()
    }
}

fn read_metadata_table(
    pool: &Pool<SqliteConnectionManager>,
) -> Result<BTreeMap<String, String>, ArchiveError> {
    let conn = pool
        .get()
        .map_err(|e| ArchiveError::Unavailable(e.to_string()))?;

    let mut stmt = conn
        .prepare("SELECT name, CAST(value AS TEXT) FROM metadata")
        .map_err(|e| ArchiveError::invalid(format!("cannot read metadata table: {}", e)))?;

    let rows = stmt
        .query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
        })
        .map_err(|e| ArchiveError::invalid(format!("cannot read metadata table: {}", e)))?;

    let mut raw = BTreeMap::new();
    for entry in rows {
        let (name, value) =
            entry.map_err(|e| ArchiveError::invalid(format!("bad metadata row: {}", e)))?;
        raw.insert(name, value.unwrap_or_default());
    }

    Ok(raw)
}

fn check_tiles_table(pool: &Pool<SqliteConnectionManager>) -> Result<(), ArchiveError> {
    let conn = pool
        .get()
        .map_err(|e| ArchiveError::Unavailable(e.to_string()))?;

    conn.query_row(
        "SELECT zoom_level, tile_column, tile_row, tile_data FROM tiles LIMIT 1",
        [],
        |_| Ok(()),
    )
    .optional()
    .map_err(|e| ArchiveError::invalid(format!("cannot read tiles table: {}", e)))?;

    Ok(())
}

fn read_zoom_range(pool: &Pool<SqliteConnectionManager>) -> Result<(u8, u8), ArchiveError> {
    let conn = pool
        .get()
        .map_err(|e| ArchiveError::Unavailable(e.to_string()))?;

    let (min, max): (Option<i64>, Option<i64>) = conn
        .query_row(
            "SELECT MIN(zoom_level), MAX(zoom_level) FROM tiles",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .map_err(|e| ArchiveError::invalid(format!("cannot read zoom range: {}", e)))?;

    match (min, max) {
        (Some(min), Some(max)) if min >= 0 && max <= super::coord::MAX_ZOOM as i64 => {
            Ok((min as u8, max as u8))
        }
        (None, None) => Err(ArchiveError::invalid(
            "archive declares no zoom range and contains no tiles",
        )),
        (min, max) => Err(ArchiveError::invalid(format!(
            "stored zoom range {:?}..{:?} is out of bounds",
            min, max
        ))),
    }
}

// =============================================================================
// Tests
// =============================================================================
