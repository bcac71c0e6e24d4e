//! Tile cache for archive blobs.
//!
//! Tiles are cached by archive generation plus client coordinate, and the
//! cache tracks total blob bytes, evicting least-recently-used entries once
//! capacity is exceeded. A new generation never sees entries of an older
//! one; the service additionally clears the cache on every publish so the
//! retired archive's bytes are released.

use lru::LruCache;
use std::num::NonZeroUsize;
use tokio::sync::Mutex;

use crate::archive::{TileBlob, TileCoord};

/// Default cache capacity: 64MB
pub const DEFAULT_TILE_CACHE_CAPACITY: usize = 64 * 1024 * 1024;

/// Upper bound on entries, independent of their size
const DEFAULT_MAX_ENTRIES: usize = 50_000;

// =============================================================================
// Cache Key
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileCacheKey {
    /// Archive generation (`0` for the default archive)
    pub generation: u64,
    pub zoom: u8,
    pub column: u32,
    pub row: u32,
}

impl TileCacheKey {
    pub fn new(generation: u64, coord: TileCoord) -> Self {
        Self {
            generation,
            zoom: coord.zoom,
            column: coord.column,
            row: coord.row,
        }
    }
}

// =============================================================================
// Tile Cache
// =============================================================================

struct CacheState {
    entries: LruCache<TileCacheKey, TileBlob>,
    size: usize,
}

/// Size-bounded LRU cache of tile blobs, shareable across tasks.
pub struct TileCache {
    state: Mutex<CacheState>,
    max_size: usize,
}

impl TileCache {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_TILE_CACHE_CAPACITY)
    }

    /// Cache holding at most `max_size` bytes of tile data.
    pub fn with_capacity(max_size: usize) -> Self {
        Self::with_capacity_and_entries(max_size, DEFAULT_MAX_ENTRIES)
    }

    pub fn with_capacity_and_entries(max_size: usize, max_entries: usize) -> Self {
        let max_entries = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            state: Mutex::new(CacheState {
                entries: LruCache::new(max_entries),
                size: 0,
            }),
            max_size,
        }
    }

    /// Look up a tile, marking it recently used.
    pub async fn get(&self, key: &TileCacheKey) -> Option<TileBlob> {
        self.state.lock().await.entries.get(key).cloned()
    }

    pub async fn contains(&self, key: &TileCacheKey) -> bool {
        self.state.lock().await.entries.contains(key)
    }

    /// Store a tile, evicting LRU entries while over capacity.
    ///
    /// Blobs larger than the whole capacity are not cached.
    pub async fn put(&self, key: TileCacheKey, blob: TileBlob) {
        if blob.len() > self.max_size {
            return;
        }

        let mut state = self.state.lock().await;
        let blob_size = blob.len();

        if let Some(old) = state.entries.peek(&key) {
            state.size = state.size.saturating_sub(old.len());
        }
        // `push` also reports the entry dropped by the entry-count bound.
        if let Some((evicted_key, evicted)) = state.entries.push(key, blob) {
            if evicted_key != key {
                state.size = state.size.saturating_sub(evicted.len());
            }
        }
        state.size += blob_size;

        while state.size > self.max_size {
            match state.entries.pop_lru() {
                Some((_, evicted)) => state.size = state.size.saturating_sub(evicted.len()),
                None => break,
            }
        }
    }

    pub async fn clear(&self) {
        let mut state = self.state.lock().await;
        state.entries.clear();
        state.size = 0;
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.entries.is_empty()
    }

    /// Total cached bytes.
    pub async fn size(&self) -> usize {
        self.state.lock().await.size
    }

    pub fn capacity(&self) -> usize {
        self.max_size
    }
}

impl Default for TileCache {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
