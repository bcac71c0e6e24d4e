//! Settings persistence.
//!
//! Settings are stored per realm behind a [`SettingsBackend`], so a single
//! deployment can serve one global document (the `default` realm) or a
//! document per tenant without changing callers.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::model::MapSettings;
use crate::error::{MapError, SettingsError};

/// Realm used when a request names none, and the fallback for every realm.
pub const DEFAULT_REALM: &str = "default";

// =============================================================================
// Backend Trait
// =============================================================================

/// Durable key/value storage for settings documents.
#[async_trait]
pub trait SettingsBackend: Send + Sync {
    /// Read the document stored under `key`, if any.
    async fn read(&self, key: &str) -> Result<Option<Value>, SettingsError>;

    /// Replace the document stored under `key`.
    async fn write(&self, key: &str, doc: &Value) -> Result<(), SettingsError>;
}

// =============================================================================
// File Backend
// =============================================================================

/// Stores each realm as `<dir>/<realm>.json`.
///
/// Writes go to a synced temporary file that is renamed over the target, so
/// a crash mid-write leaves the previous document in place. Every write
/// gets its own temporary file; concurrent writers never share one.
#[derive(Debug)]
pub struct FileSettingsBackend {
    dir: PathBuf,
    next_tmp: AtomicU64,
}

impl FileSettingsBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            next_tmp: AtomicU64::new(0),
        }
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

#[async_trait]
impl SettingsBackend for FileSettingsBackend {
    async fn read(&self, key: &str) -> Result<Option<Value>, SettingsError> {
        let path = self.path(key);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(SettingsError::Storage(format!("{:?}: {}", path, e))),
        };

        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| SettingsError::Storage(format!("{:?}: {}", path, e)))
    }

    async fn write(&self, key: &str, doc: &Value) -> Result<(), SettingsError> {
        let storage = |e: std::io::Error| SettingsError::Storage(e.to_string());

        tokio::fs::create_dir_all(&self.dir).await.map_err(storage)?;

        let bytes = serde_json::to_vec_pretty(doc)
            .map_err(|e| SettingsError::Storage(e.to_string()))?;
        let n = self.next_tmp.fetch_add(1, Ordering::Relaxed);
        let tmp = self
            .dir
            .join(format!(".{}.json.{}-{}.tmp", key, std::process::id(), n));

        let written: std::io::Result<()> = async {
            let mut file = tokio::fs::File::create(&tmp).await?;
            file.write_all(&bytes).await?;
            file.sync_all().await?;
            drop(file);
            tokio::fs::rename(&tmp, self.path(key)).await
        }
        .await;

        if let Err(e) = written {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(storage(e));
        }

        debug!("Wrote settings for realm '{}' to {:?}", key, self.dir);
        Ok(())
    }
}

// =============================================================================
// Memory Backend
// =============================================================================

/// Non-durable backend for tests and ephemeral deployments.
#[derive(Debug, Default)]
pub struct MemorySettingsBackend {
    docs: RwLock<HashMap<String, Value>>,
}

impl MemorySettingsBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SettingsBackend for MemorySettingsBackend {
    async fn read(&self, key: &str) -> Result<Option<Value>, SettingsError> {
        Ok(self.docs.read().await.get(key).cloned())
    }

    async fn write(&self, key: &str, doc: &Value) -> Result<(), SettingsError> {
        self.docs.write().await.insert(key.to_string(), doc.clone());
        Ok(())
    }
}

// =============================================================================
// Settings Store
// =============================================================================

/// Validates and persists map settings.
///
/// Saves are serialized; reads never wait on them.
#[derive(Clone)]
pub struct SettingsStore {
    backend: Arc<dyn SettingsBackend>,
    write_lock: Arc<Mutex<()>>,
}

impl SettingsStore {
    pub fn new(backend: impl SettingsBackend + 'static) -> Self {
        Self {
            backend: Arc::new(backend),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Store with a [`MemorySettingsBackend`].
    pub fn in_memory() -> Self {
        Self::new(MemorySettingsBackend::new())
    }

    /// Validate, normalize and persist settings for a realm.
    ///
    /// Returns the document as stored.
    pub async fn save(&self, realm: &str, doc: Value) -> Result<MapSettings, MapError> {
        validate_realm(realm)?;

        let settings = MapSettings::from_value(doc)?;
        {
            let _guard = self.write_lock.lock().await;
            self.backend.write(realm, &settings.to_value()).await?;
        }

        info!(realm, "Map settings saved");
        Ok(settings)
    }

    /// Settings for a realm, falling back to the default realm and then to
    /// [`MapSettings::default`].
    pub async fn get(&self, realm: &str) -> Result<MapSettings, MapError> {
        validate_realm(realm)?;

        if let Some(settings) = self.load(realm).await? {
            return Ok(settings);
        }
        if realm != DEFAULT_REALM {
            if let Some(settings) = self.load(DEFAULT_REALM).await? {
                return Ok(settings);
            }
        }
        Ok(MapSettings::default())
    }

    async fn load(&self, key: &str) -> Result<Option<MapSettings>, MapError> {
        let Some(doc) = self.backend.read(key).await? else {
            return Ok(None);
        };

        match MapSettings::from_value(doc) {
            Ok(settings) => Ok(Some(settings)),
            Err(e) => {
                warn!(realm = key, "Ignoring stored settings that no longer validate: {}", e);
                Ok(None)
            }
        }
    }
}

impl std::fmt::Debug for SettingsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingsStore").finish_non_exhaustive()
    }
}

/// Realm names double as storage keys, so keep them filename-safe.
pub fn validate_realm(realm: &str) -> Result<(), SettingsError> {
    let valid = !realm.is_empty()
        && realm.len() <= 64
        && realm
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');

    if valid {
        Ok(())
    } else {
        Err(SettingsError::validation(
            "realm",
            format!("'{}' is not a valid realm name", realm),
        ))
    }
}
