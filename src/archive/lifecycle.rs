//! Active archive lifecycle: upload, swap, delete, recovery.
//!
//! The active archive lives in a single atomically replaceable slot.
//! Readers take an `Arc` snapshot with one lock-free load and keep using it
//! for the rest of their request, whatever writers do in the meantime.
//!
//! Writers are serialized by a mutex and follow a fixed order:
//!
//! ```text
//! write .staging-<g>.mbtiles ─► fsync ─► validate ─► rename to custom-<g>.mbtiles
//!        ─► reopen ─► swap slot ─► retire previous custom archive
//! ```
//!
//! A retired archive's file is removed when the last snapshot referencing it
//! is dropped, after its connection pool has been closed. The default
//! archive is never retired.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::reader::MbtilesArchive;
use crate::error::{ArchiveError, MapError};

/// Default custom map size limit in bytes (30MB).
pub const DEFAULT_CUSTOM_MAP_LIMIT: u64 = 30_000_000;

const CUSTOM_PREFIX: &str = "custom-";
const STAGING_PREFIX: &str = ".staging-";
const ARCHIVE_SUFFIX: &str = ".mbtiles";

// =============================================================================
// Configuration
// =============================================================================

/// Where archives live and how large custom uploads may be.
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// Bundled archive served when no custom map is active
    pub default_archive: PathBuf,

    /// Directory holding custom archives and staging files
    pub storage_dir: PathBuf,

    /// Maximum custom upload size in bytes
    pub custom_map_limit: u64,
}

impl LifecycleConfig {
    pub fn new(default_archive: impl Into<PathBuf>, storage_dir: impl Into<PathBuf>) -> Self {
        Self {
            default_archive: default_archive.into(),
            storage_dir: storage_dir.into(),
            custom_map_limit: DEFAULT_CUSTOM_MAP_LIMIT,
        }
    }

    pub fn with_custom_map_limit(mut self, limit: u64) -> Self {
        self.custom_map_limit = limit;
        self
    }
}

// =============================================================================
// Archive Handle
// =============================================================================

/// Where the active archive came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveSource {
    Default,
    Custom {
        generation: u64,
        /// Client-supplied upload name, informational only
        filename: Option<String>,
    },
}

/// Removes a retired custom archive file once nothing references it.
struct ArchiveFile {
    path: Option<PathBuf>,
    retired: AtomicBool,
}

impl Drop for ArchiveFile {
    fn drop(&mut self) {
        let Some(path) = &self.path else { return };
        if !self.retired.load(Ordering::Acquire) {
            return;
        }
        match fs::remove_file(path) {
            Ok(()) => debug!("Removed retired archive {:?}", path),
            Err(e) => warn!("Failed to remove retired archive {:?}: {}", path, e),
        }
    }
}

/// A snapshot of one archive generation.
///
/// Holding an `Arc<ArchiveHandle>` keeps the archive file readable even if
/// it has since been replaced or deleted.
pub struct ArchiveHandle {
    archive: MbtilesArchive,
    source: ArchiveSource,
    // Must stay the last field: the pool above is closed before the file goes.
    file: ArchiveFile,
}

impl ArchiveHandle {
    fn default_archive(archive: MbtilesArchive) -> Self {
        Self {
            archive,
            source: ArchiveSource::Default,
            file: ArchiveFile {
                path: None,
                retired: AtomicBool::new(false),
            },
        }
    }

    fn custom(archive: MbtilesArchive, generation: u64, filename: Option<String>) -> Self {
        let path = archive.path().to_path_buf();
        Self {
            archive,
            source: ArchiveSource::Custom {
                generation,
                filename,
            },
            file: ArchiveFile {
                path: Some(path),
                retired: AtomicBool::new(false),
            },
        }
    }

    pub fn archive(&self) -> &MbtilesArchive {
        &self.archive
    }

    pub fn source(&self) -> &ArchiveSource {
        &self.source
    }

    pub fn is_custom(&self) -> bool {
        matches!(self.source, ArchiveSource::Custom { .. })
    }

    /// Generation number, `0` for the default archive.
    pub fn generation(&self) -> u64 {
        match self.source {
            ArchiveSource::Default => 0,
            ArchiveSource::Custom { generation, .. } => generation,
        }
    }

    fn retire(&self) {
        self.file.retired.store(true, Ordering::Release);
    }
}

impl std::fmt::Debug for ArchiveHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveHandle")
            .field("archive", &self.archive)
            .field("source", &self.source)
            .finish()
    }
}

// =============================================================================
// Custom Map Info
// =============================================================================

/// Whether a custom map is active, and the upload limit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomMapInfo {
    pub is_custom: bool,

    /// Maximum custom upload size in bytes
    #[serde(rename = "maxSizeOrCount")]
    pub limit: u64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

// =============================================================================
// Archive Manager
// =============================================================================

/// Owns the active archive and serializes every change to it.
pub struct ArchiveManager {
    config: LifecycleConfig,
    default: Option<Arc<ArchiveHandle>>,
    active: ArcSwapOption<ArchiveHandle>,
    write_lock: Mutex<()>,
    next_generation: AtomicU64,
}

impl ArchiveManager {
    /// Open the default archive and recover the last custom upload.
    ///
    /// A missing or invalid default archive is not an error: the manager
    /// starts empty and reads fail with `ArchiveUnavailable` until a custom
    /// map is uploaded.
    pub fn open(config: LifecycleConfig) -> Result<Self, MapError> {
        fs::create_dir_all(&config.storage_dir)?;

        let default = match MbtilesArchive::open(&config.default_archive) {
            Ok(archive) => {
                info!("Default archive: {:?}", config.default_archive);
                Some(Arc::new(ArchiveHandle::default_archive(archive)))
            }
            Err(e) => {
                warn!(
                    "Default archive {:?} not loaded: {}",
                    config.default_archive, e
                );
                None
            }
        };

        let (recovered, last_generation) = recover_custom(&config.storage_dir)?;
        let active = recovered.or_else(|| default.clone());

        Ok(Self {
            config,
            default,
            active: ArcSwapOption::new(active),
            write_lock: Mutex::new(()),
            next_generation: AtomicU64::new(last_generation + 1),
        })
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    /// Snapshot of the active archive for the duration of one request.
    pub fn active(&self) -> Result<Arc<ArchiveHandle>, MapError> {
        self.active
            .load_full()
            .ok_or_else(|| MapError::ArchiveUnavailable("no tile archive is active".to_string()))
    }

    pub fn custom_map_info(&self) -> CustomMapInfo {
        let active = self.active.load();
        let (is_custom, filename) = match active.as_deref().map(|h| &h.source) {
            Some(ArchiveSource::Custom { filename, .. }) => (true, filename.clone()),
            _ => (false, None),
        };

        CustomMapInfo {
            is_custom,
            limit: self.config.custom_map_limit,
            filename,
        }
    }

    /// Validate an uploaded archive and make it the active one.
    ///
    /// # Errors
    ///
    /// - [`MapError::LimitExceeded`] if `data` is larger than the limit
    /// - [`MapError::InvalidArchive`] if it is not a usable MBTiles file
    /// - [`MapError::Io`] on filesystem failures
    ///
    /// On any error the active archive is unchanged.
    pub fn upload(&self, data: &[u8], filename: Option<&str>) -> Result<CustomMapInfo, MapError> {
        let size = data.len() as u64;
        let limit = self.config.custom_map_limit;
        if size > limit {
            warn!(size, limit, "Rejecting custom map upload over the limit");
            return Err(MapError::LimitExceeded { size, limit });
        }
        if data.is_empty() {
            return Err(MapError::InvalidArchive("upload is empty".to_string()));
        }

        let _guard = self.write_lock.lock();
        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        let staging = self.staging_path(generation);
        let target = self.custom_path(generation);

        let archive = match stage(data, &staging, &target) {
            Ok(archive) => archive,
            Err(e) => {
                remove_if_exists(&staging);
                remove_if_exists(&target);
                return Err(e);
            }
        };

        let handle = Arc::new(ArchiveHandle::custom(
            archive,
            generation,
            filename.map(str::to_string),
        ));
        let previous = self.active.swap(Some(handle));
        retire(previous);

        info!(
            generation,
            size,
            filename = filename.unwrap_or(""),
            "Custom map activated"
        );

        Ok(self.custom_map_info())
    }

    /// Remove the custom archive and revert to the default one.
    pub fn delete(&self) -> Result<CustomMapInfo, MapError> {
        let _guard = self.write_lock.lock();

        let is_custom = self
            .active
            .load()
            .as_deref()
            .map(ArchiveHandle::is_custom)
            .unwrap_or(false);
        if !is_custom {
            return Err(MapError::NothingToDelete);
        }

        let previous = self.active.swap(self.default.clone());
        let generation = previous.as_deref().map(ArchiveHandle::generation);
        retire(previous);

        info!(generation, "Custom map deleted, reverted to default");

        Ok(self.custom_map_info())
    }

    fn staging_path(&self, generation: u64) -> PathBuf {
        self.config
            .storage_dir
            .join(format!("{STAGING_PREFIX}{generation}{ARCHIVE_SUFFIX}"))
    }

    fn custom_path(&self, generation: u64) -> PathBuf {
        self.config
            .storage_dir
            .join(format!("{CUSTOM_PREFIX}{generation}{ARCHIVE_SUFFIX}"))
    }
}

impl std::fmt::Debug for ArchiveManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveManager")
            .field("config", &self.config)
            .field("active", &self.active.load_full())
            .finish()
    }
}

/// Write, validate and move an upload into place.
fn stage(data: &[u8], staging: &Path, target: &Path) -> Result<MbtilesArchive, MapError> {
    let mut file = File::create(staging)?;
    file.write_all(data)?;
    file.sync_all()?;
    drop(file);

    match MbtilesArchive::open(staging) {
        Ok(archive) => drop(archive),
        Err(ArchiveError::Unavailable(msg)) => return Err(MapError::Io(msg)),
        Err(e) => return Err(e.into()),
    }

    fs::rename(staging, target)?;

    MbtilesArchive::open(target).map_err(|e| MapError::Io(e.to_string()))
}

/// Mark a replaced handle for removal; the file goes with its last reference.
fn retire(previous: Option<Arc<ArchiveHandle>>) {
    if let Some(handle) = previous {
        if handle.is_custom() {
            handle.retire();
        }
    }
}

fn remove_if_exists(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Failed to clean up {:?}: {}", path, e);
        }
    }
}

/// Find the newest valid custom archive, clearing stale files.
///
/// Returns the recovered handle and the highest generation seen on disk.
fn recover_custom(dir: &Path) -> Result<(Option<Arc<ArchiveHandle>>, u64), MapError> {
    let mut candidates = Vec::new();

    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };

        if name.starts_with(STAGING_PREFIX) {
            debug!("Removing stale staging file {:?}", path);
            remove_if_exists(&path);
        } else if let Some(generation) = name
            .strip_prefix(CUSTOM_PREFIX)
            .and_then(|rest| rest.strip_suffix(ARCHIVE_SUFFIX))
            .and_then(|g| g.parse::<u64>().ok())
        {
            candidates.push((generation, path));
        }
    }

    candidates.sort_by(|a, b| b.0.cmp(&a.0));
    let last_generation = candidates.first().map(|(g, _)| *g).unwrap_or(0);

    let mut recovered = None;
    for (generation, path) in candidates {
        if recovered.is_some() {
            remove_if_exists(&path);
            continue;
        }
        match MbtilesArchive::open(&path) {
            Ok(archive) => {
                info!(generation, "Recovered custom archive {:?}", path);
                recovered = Some(Arc::new(ArchiveHandle::custom(archive, generation, None)));
            }
            Err(e) => {
                warn!("Discarding unusable custom archive {:?}: {}", path, e);
                remove_if_exists(&path);
            }
        }
    }

    Ok((recovered, last_generation))
}

// =============================================================================
// Tests
// =============================================================================
