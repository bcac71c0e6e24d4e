//! Mapbox GL style document generation.
//!
//! The generated style has a single source named `vector_tiles` pointing at
//! this server's tile endpoint, plus an `options` block carrying the realm's
//! viewport settings for the client:
//!
//! ```json
//! {
//!   "version": 8,
//!   "name": "OpenMapTiles",
//!   "sources": {
//!     "vector_tiles": {
//!       "type": "vector",
//!       "tiles": ["https://maps.example.com/map/tile/{z}/{x}/{y}"],
//!       "minzoom": 0,
//!       "maxzoom": 14
//!     }
//!   },
//!   "layers": [],
//!   "options": { "default": { "center": [4.48, 51.92], "zoom": 12 } }
//! }
//! ```

use serde_json::{json, Map, Value};

use super::tile_url_template;
use crate::archive::ArchiveMetadata;
use crate::settings::MapSettings;

/// Name of the tile source inside generated styles.
pub const STYLE_SOURCE_NAME: &str = "vector_tiles";

/// Style keys that settings overrides may not replace.
const PROTECTED_KEYS: &[&str] = &["version", "sources", "options"];

/// Build the style document for `realm`.
pub fn build_style(
    metadata: &ArchiveMetadata,
    settings: &MapSettings,
    realm: &str,
    base_url: &str,
) -> Value {
    let mut style = Map::new();
    style.insert("version".into(), json!(8));
    style.insert("name".into(), json!(metadata.name));
    style.insert(
        "sources".into(),
        json!({ STYLE_SOURCE_NAME: build_source(metadata, base_url) }),
    );
    style.insert("layers".into(), json!([]));

    if let Some(center) = viewport_center(metadata, settings) {
        style.insert("center".into(), json!(center));
    }
    if let Some(zoom) = viewport_zoom(metadata, settings) {
        style.insert("zoom".into(), json!(zoom));
    }

    if let Some(overrides) = &settings.style {
        for (key, value) in overrides {
            if !PROTECTED_KEYS.contains(&key.as_str()) {
                style.insert(key.clone(), value.clone());
            }
        }
    }

    style.insert(
        "options".into(),
        json!({ realm: build_realm_options(metadata, settings) }),
    );

    Value::Object(style)
}

fn build_source(metadata: &ArchiveMetadata, base_url: &str) -> Value {
    let mut source = Map::new();
    let kind = if metadata.format.is_vector() {
        "vector"
    } else {
        "raster"
    };
    source.insert("type".into(), json!(kind));
    source.insert("tiles".into(), json!([tile_url_template(base_url)]));
    source.insert("minzoom".into(), json!(metadata.min_zoom));
    source.insert("maxzoom".into(), json!(metadata.max_zoom));
    if let Some(bounds) = metadata.bounds {
        source.insert("bounds".into(), json!(bounds));
    }
    if let Some(attribution) = &metadata.attribution {
        source.insert("attribution".into(), json!(attribution));
    }
    Value::Object(source)
}

/// Viewport options handed to the client for one realm.
///
/// Saved settings win; archive metadata fills the gaps.
fn build_realm_options(metadata: &ArchiveMetadata, settings: &MapSettings) -> Value {
    let mut options = settings.extra.clone();

    if let Some(center) = viewport_center(metadata, settings) {
        options.insert("center".into(), json!(center));
    }
    if let Some(bounds) = settings.bounds.or(metadata.bounds) {
        options.insert("bounds".into(), json!(bounds));
    }
    if let Some(zoom) = viewport_zoom(metadata, settings) {
        options.insert("zoom".into(), json!(zoom));
    }
    options.insert(
        "minZoom".into(),
        json!(settings.min_zoom.unwrap_or(metadata.min_zoom as f64)),
    );
    options.insert(
        "maxZoom".into(),
        json!(settings.max_zoom.unwrap_or(metadata.max_zoom as f64)),
    );
    options.insert("boxZoom".into(), json!(settings.box_zoom.unwrap_or(false)));
    if let Some(url) = &settings.geocode_url {
        options.insert("geocodeUrl".into(), json!(url));
    }

    Value::Object(options)
}

fn viewport_center(metadata: &ArchiveMetadata, settings: &MapSettings) -> Option<[f64; 2]> {
    settings
        .center
        .or_else(|| metadata.center.map(|[lon, lat, _]| [lon, lat]))
}

fn viewport_zoom(metadata: &ArchiveMetadata, settings: &MapSettings) -> Option<f64> {
    settings.zoom.or_else(|| metadata.center.map(|c| c[2]))
}
