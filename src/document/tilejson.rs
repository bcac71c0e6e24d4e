//! TileJSON 2.2.0 document generation.
//!
//! Tiles are always advertised with `scheme: "xyz"`: the server flips rows
//! of TMS archives itself, so clients never see the stored convention.

use serde_json::{json, Map, Value};

use super::tile_url_template;
use crate::archive::ArchiveMetadata;

pub const TILEJSON_VERSION: &str = "2.2.0";

/// Build the TileJSON document for the active archive.
pub fn build_tilejson(metadata: &ArchiveMetadata, base_url: &str) -> Value {
    let mut doc = Map::new();
    doc.insert("tilejson".into(), json!(TILEJSON_VERSION));
    doc.insert("name".into(), json!(metadata.name));
    doc.insert("scheme".into(), json!("xyz"));
    doc.insert("tiles".into(), json!([tile_url_template(base_url)]));
    doc.insert("format".into(), json!(metadata.format.name()));
    doc.insert("minzoom".into(), json!(metadata.min_zoom));
    doc.insert("maxzoom".into(), json!(metadata.max_zoom));

    if let Some(description) = &metadata.description {
        doc.insert("description".into(), json!(description));
    }
    if let Some(version) = &metadata.version {
        doc.insert("version".into(), json!(version));
    }
    if let Some(attribution) = &metadata.attribution {
        doc.insert("attribution".into(), json!(attribution));
    }
    if let Some(bounds) = metadata.bounds {
        doc.insert("bounds".into(), json!(bounds));
    }
    if let Some(center) = metadata.center {
        doc.insert("center".into(), json!(center));
    }
    if let Some(layers) = &metadata.vector_layers {
        doc.insert("vector_layers".into(), layers.clone());
    }

    Value::Object(doc)
}
