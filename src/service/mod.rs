//! Async service layer over the archive engine and settings store.
//!
//! - [`MapService`]: request-facing operations, blocking work off the runtime
//! - [`TileCache`]: size-bounded LRU of tile blobs keyed by archive generation

mod cache;
mod map;

pub use cache::{TileCache, TileCacheKey, DEFAULT_TILE_CACHE_CAPACITY};
pub use map::{MapService, TileResponse};
