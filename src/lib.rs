//! # mapserve
//!
//! A map tile server backed by MBTiles archives.
//!
//! The server hands out vector or raster tiles from a single active archive,
//! generates the style and TileJSON documents clients need to render them,
//! and lets administrators replace the bundled map with a custom upload at
//! runtime without interrupting in-flight requests.
//!
//! ## Features
//!
//! - **MBTiles reading**: Pooled read-only SQLite access with TMS/XYZ row handling
//! - **Safe replacement**: Uploads are staged, validated and swapped atomically
//! - **Documents**: Style and TileJSON generated from archive metadata and stored settings
//! - **Tile cache**: Byte-bounded LRU keyed by archive generation
//! - **Authentication**: HMAC-SHA256 role tokens for the admin endpoints
//!
//! ## Architecture
//!
//! - [`archive`] - MBTiles reader, coordinates and the active archive lifecycle
//! - [`settings`] - Per-realm map settings and their storage backends
//! - [`document`] - Style and TileJSON generation
//! - [`service`] - Map service and tile cache
//! - [`server`] - Axum-based HTTP server, handlers and role-token auth
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use mapserve::{
//!     create_router, ArchiveManager, LifecycleConfig, MapService, RouterConfig, SettingsStore,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let archives = ArchiveManager::open(LifecycleConfig::new(
//!         "map/mapdata.mbtiles",
//!         "storage/map",
//!     ))?;
//!     let service = MapService::new(archives, SettingsStore::in_memory());
//!     let router = create_router(service, RouterConfig::new("my-secret"));
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//!     axum::serve(listener, router).await?;
//!     Ok(())
//! }
//! ```

pub mod archive;
pub mod config;
pub mod document;
pub mod error;
pub mod server;
pub mod service;
pub mod settings;

// Re-export commonly used types
pub use archive::{
    ArchiveHandle, ArchiveManager, ArchiveMetadata, CustomMapInfo, LifecycleConfig,
    MbtilesArchive, RowAxis, TileBlob, TileCoord, TileFormat, DEFAULT_CUSTOM_MAP_LIMIT,
};
pub use config::{Cli, Command, InspectConfig, ServeConfig, SignConfig, SignOutputFormat};
pub use document::{build_style, build_tilejson};
pub use error::{ArchiveError, MapError, SettingsError};
pub use server::{
    create_router, create_router_with_state, AppState, AuthError, ErrorResponse, Role,
    RoleTokenAuth, RouterConfig,
};
pub use service::{MapService, TileCache, TileResponse, DEFAULT_TILE_CACHE_CAPACITY};
pub use settings::{MapSettings, SettingsStore, DEFAULT_REALM};
