//! Map service: the single object request handlers talk to.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          MapService                          │
//! │                                                              │
//! │  get_tile()  ──► TileCache ──miss──► spawn_blocking(read)    │
//! │  style()     ──► active snapshot + SettingsStore ──► style   │
//! │  tilejson()  ──► active snapshot ──► TileJSON                │
//! │  upload()    ──► spawn_blocking(stage + swap) ──► clear cache│
//! │  delete()    ──► spawn_blocking(swap)         ──► clear cache│
//! └──────────────────────────────────────────────────────────────┘
//!          │                     │                     │
//!          ▼                     ▼                     ▼
//!   ┌──────────────┐     ┌───────────────┐     ┌───────────────┐
//!   │  TileCache   │     │ArchiveManager │     │ SettingsStore │
//!   └──────────────┘     └───────────────┘     └───────────────┘
//! ```

use std::sync::Arc;

use bytes::Bytes;
use serde_json::Value;
use tokio::task::JoinError;
use tracing::debug;

use super::cache::{TileCache, TileCacheKey};
use crate::archive::{ArchiveManager, CustomMapInfo, TileBlob, TileCoord};
use crate::document::{build_style, build_tilejson};
use crate::error::MapError;
use crate::settings::{MapSettings, SettingsStore};

/// A tile read, with cache provenance.
#[derive(Debug, Clone)]
pub struct TileResponse {
    pub blob: TileBlob,
    pub cache_hit: bool,
}

/// Tile, document and lifecycle operations over one archive manager.
pub struct MapService {
    archives: Arc<ArchiveManager>,
    settings: SettingsStore,
    cache: TileCache,
}

impl MapService {
    /// Create a service with the default tile cache capacity.
    pub fn new(archives: ArchiveManager, settings: SettingsStore) -> Self {
        Self::with_cache(archives, settings, TileCache::new())
    }

    pub fn with_cache(archives: ArchiveManager, settings: SettingsStore, cache: TileCache) -> Self {
        Self {
            archives: Arc::new(archives),
            settings,
            cache,
        }
    }

    pub fn archives(&self) -> &ArchiveManager {
        &self.archives
    }

    pub fn cache(&self) -> &TileCache {
        &self.cache
    }

    /// Read a tile addressed in the top-origin convention.
    ///
    /// # Errors
    ///
    /// - [`MapError::NotFound`] for out-of-range coordinates and missing tiles
    /// - [`MapError::ArchiveUnavailable`] if no archive is active or it
    ///   cannot be read
    pub async fn get_tile(
        &self,
        zoom: i64,
        column: i64,
        row: i64,
    ) -> Result<TileResponse, MapError> {
        let coord = TileCoord::from_request(zoom, column, row)?;
        let handle = self.archives.active()?;
        let generation = handle.generation();
        let key = TileCacheKey::new(generation, coord);

        if let Some(blob) = self.cache.get(&key).await {
            return Ok(TileResponse {
                blob,
                cache_hit: true,
            });
        }

        let blob = tokio::task::spawn_blocking(move || handle.archive().get_tile(coord))
            .await
            .map_err(join_error)??;

        // Skip caching reads that raced with a publish.
        let still_active = self
            .archives
            .active()
            .map(|h| h.generation() == generation)
            .unwrap_or(false);
        if still_active {
            self.cache.put(key, blob.clone()).await;
        } else {
            debug!(generation, tile = %coord, "Not caching tile from a retired archive");
        }

        Ok(TileResponse {
            blob,
            cache_hit: false,
        })
    }

    /// Style document for `realm` against the active archive.
    pub async fn style(&self, realm: &str, base_url: &str) -> Result<Value, MapError> {
        let handle = self.archives.active()?;
        let settings = self.settings.get(realm).await?;
        Ok(build_style(
            handle.archive().metadata(),
            &settings,
            realm,
            base_url,
        ))
    }

    /// TileJSON document for the active archive.
    pub fn tilejson(&self, base_url: &str) -> Result<Value, MapError> {
        let handle = self.archives.active()?;
        Ok(build_tilejson(handle.archive().metadata(), base_url))
    }

    pub async fn save_settings(&self, realm: &str, doc: Value) -> Result<MapSettings, MapError> {
        self.settings.save(realm, doc).await
    }

    pub async fn settings(&self, realm: &str) -> Result<MapSettings, MapError> {
        self.settings.get(realm).await
    }

    /// Validate and activate an uploaded archive.
    pub async fn upload(
        &self,
        data: Bytes,
        filename: Option<String>,
    ) -> Result<CustomMapInfo, MapError> {
        let archives = Arc::clone(&self.archives);
        let info = tokio::task::spawn_blocking(move || {
            archives.upload(&data, filename.as_deref())
        })
        .await
        .map_err(join_error)??;

        self.cache.clear().await;
        Ok(info)
    }

    /// Revert to the default archive.
    pub async fn delete(&self) -> Result<CustomMapInfo, MapError> {
        let archives = Arc::clone(&self.archives);
        let info = tokio::task::spawn_blocking(move || archives.delete())
            .await
            .map_err(join_error)??;

        self.cache.clear().await;
        Ok(info)
    }

    pub fn custom_map_info(&self) -> CustomMapInfo {
        self.archives.custom_map_info()
    }
}

impl std::fmt::Debug for MapService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapService")
            .field("archives", &self.archives)
            .field("settings", &self.settings)
            .field("cache_capacity", &self.cache.capacity())
            .finish()
    }
}

fn join_error(err: JoinError) -> MapError {
    MapError::Io(format!("blocking task failed: {}", err))
}

// =============================================================================
// Tests
// =============================================================================
