//! Client-facing documents derived from archive metadata.
//!
//! - [`build_style`]: Mapbox GL style for the GL renderer family
//! - [`build_tilejson`]: TileJSON for the Mapbox JS / Leaflet family
//!
//! Both are pure functions of metadata, settings and the public base URL.

mod style;
mod tilejson;

pub use style::{build_style, STYLE_SOURCE_NAME};
pub use tilejson::{build_tilejson, TILEJSON_VERSION};

/// Tile URL template rooted at `base_url`.
pub fn tile_url_template(base_url: &str) -> String {
    format!("{}/tile/{{z}}/{{x}}/{{y}}", base_url.trim_end_matches('/'))
}
