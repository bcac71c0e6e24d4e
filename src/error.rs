use thiserror::Error;

/// Errors raised while opening or reading a tile archive
#[derive(Debug, Clone, Error)]
pub enum ArchiveError {
    /// No tile is stored at the requested coordinate, or the coordinate is
    /// outside the grid / zoom range of the archive
    #[error("Tile not found: {zoom}/{column}/{row}")]
    TileNotFound { zoom: i64, column: i64, row: i64 },

    /// The archive file is missing or SQLite cannot read it
    #[error("Tile archive unavailable: {0}")]
    Unavailable(String),

    /// The file opened, but it is not a usable MBTiles archive
    #[error("Invalid tile archive: {reason}")]
    Invalid { reason: String },
}

impl ArchiveError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        ArchiveError::Invalid {
            reason: reason.into(),
        }
    }
}

/// Errors raised by the settings store
#[derive(Debug, Clone, Error)]
pub enum SettingsError {
    /// A settings field is malformed
    #[error("Invalid value for {field}: {message}")]
    Validation { field: String, message: String },

    /// The persistence backend failed
    #[error("Settings storage error: {0}")]
    Storage(String),
}

impl SettingsError {
    pub(crate) fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        SettingsError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Errors surfaced at the map service boundary.
///
/// Every variant maps to one client-facing error response; none of them is
/// fatal to the process.
#[derive(Debug, Clone, Error)]
pub enum MapError {
    /// Tile coordinate absent or out of range (HTTP 404)
    #[error("Tile not found: {zoom}/{column}/{row}")]
    NotFound { zoom: i64, column: i64, row: i64 },

    /// No active archive, or its file cannot be read (HTTP 503)
    #[error("Tile archive unavailable: {0}")]
    ArchiveUnavailable(String),

    /// Uploaded file failed structural validation (HTTP 400)
    #[error("Invalid tile archive: {0}")]
    InvalidArchive(String),

    /// Upload is larger than the configured custom map limit (HTTP 413)
    #[error("Custom map of {size} bytes exceeds the limit of {limit} bytes")]
    LimitExceeded { size: u64, limit: u64 },

    /// Malformed settings document (HTTP 400)
    #[error("Invalid map settings: {0}")]
    Validation(String),

    /// Filesystem failure during a write; prior state is left intact (HTTP 500)
    #[error("I/O error: {0}")]
    Io(String),

    /// Delete requested while the default archive is active (HTTP 409)
    #[error("No custom map to delete")]
    NothingToDelete,
}

impl From<ArchiveError> for MapError {
    fn from(err: ArchiveError) -> Self {
        match err {
            ArchiveError::TileNotFound { zoom, column, row } => {
                MapError::NotFound { zoom, column, row }
            }
            ArchiveError::Unavailable(msg) => MapError::ArchiveUnavailable(msg),
            ArchiveError::Invalid { reason } => MapError::InvalidArchive(reason),
        }
    }
}

impl From<SettingsError> for MapError {
    fn from(err: SettingsError) -> Self {
        match err {
            SettingsError::Validation { .. } => MapError::Validation(err.to_string()),
            SettingsError::Storage(msg) => MapError::Io(msg),
        }
    }
}

impl From<std::io::Error> for MapError {
    fn from(err: std::io::Error) -> Self {
        MapError::Io(err.to_string())
    }
}
