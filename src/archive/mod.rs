//! Tile archive layer.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │               Map Service               │
//! └────────────────────┬────────────────────┘
//!                      │ active() snapshot / upload / delete
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │             ArchiveManager              │
//! │  (atomic slot, serialized writers)      │
//! └────────────────────┬────────────────────┘
//!                      │ Arc<ArchiveHandle>
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │             MbtilesArchive              │
//! │  (read-only SQLite pool, metadata)      │
//! └────────────────────┬────────────────────┘
//!                      │ TileCoord::normalize
//!                      ▼
//!               tiles / metadata
//! ```

pub mod coord;
pub mod lifecycle;
pub mod reader;

pub use coord::{RowAxis, TileCoord, MAX_ZOOM};
pub use lifecycle::{
    ArchiveHandle, ArchiveManager, ArchiveSource, CustomMapInfo, LifecycleConfig,
    DEFAULT_CUSTOM_MAP_LIMIT,
};
pub use reader::{
    ArchiveMetadata, MbtilesArchive, TileBlob, TileFormat, REQUIRED_METADATA_KEYS,
    VECTOR_TILE_MIME,
};
