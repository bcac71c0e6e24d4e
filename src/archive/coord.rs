//! Tile addressing and row-axis conversion.
//!
//! Clients request tiles with the row origin at the top (north), the XYZ
//! convention. MBTiles archives normally store rows with the origin at the
//! bottom (south), the TMS convention. Every read converts the requested
//! coordinate with [`TileCoord::normalize`] before touching the archive.
//!
//! ```text
//! zoom 2, XYZ row 0  ──►  TMS row 3
//! zoom 2, XYZ row 3  ──►  TMS row 0
//! ```

use crate::error::ArchiveError;

/// Highest zoom level that can be addressed (`2^30` rows still fit in a `u32`).
pub const MAX_ZOOM: u8 = 30;

/// Row-axis convention used by an archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowAxis {
    /// Row 0 is the southernmost row (MBTiles default)
    Tms,

    /// Row 0 is the northernmost row, same as client requests
    Xyz,
}

impl RowAxis {
    /// Resolve the convention from the MBTiles `scheme` metadata value.
    ///
    /// Anything other than `xyz` falls back to TMS, which is what the
    /// MBTiles format mandates when the key is absent.
    pub fn from_scheme(scheme: Option<&str>) -> Self {
        match scheme.map(|s| s.trim().to_ascii_lowercase()) {
            Some(s) if s == "xyz" => RowAxis::Xyz,
            _ => RowAxis::Tms,
        }
    }

    /// The `scheme` value for this convention.
    pub fn as_str(&self) -> &'static str {
        match self {
            RowAxis::Tms => "tms",
            RowAxis::Xyz => "xyz",
        }
    }
}

/// A validated tile address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileCoord {
    pub zoom: u8,
    pub column: u32,
    pub row: u32,
}

impl TileCoord {
    /// Create a coordinate, checking that column and row lie in `[0, 2^zoom)`.
    pub fn new(zoom: u8, column: u32, row: u32) -> Result<Self, ArchiveError> {
        Self::from_request(zoom as i64, column as i64, row as i64)
    }

    /// Create a coordinate from raw request integers.
    ///
    /// Negative values, zoom levels above [`MAX_ZOOM`] and columns or rows
    /// outside the grid all fail with [`ArchiveError::TileNotFound`].
    pub fn from_request(zoom: i64, column: i64, row: i64) -> Result<Self, ArchiveError> {
        let not_found = ArchiveError::TileNotFound { zoom, column, row };

        if !(0..=MAX_ZOOM as i64).contains(&zoom) {
            return Err(not_found);
        }

        let size = 1i64 << zoom;
        if !(0..size).contains(&column) || !(0..size).contains(&row) {
            return Err(not_found);
        }

        Ok(Self {
            zoom: zoom as u8,
            column: column as u32,
            row: row as u32,
        })
    }

    /// Largest valid column/row index at this zoom level.
    pub fn max_index(&self) -> u32 {
        ((1u64 << self.zoom) - 1) as u32
    }

    /// Convert a top-origin coordinate into the archive's stored convention.
    ///
    /// The conversion is its own inverse, so normalizing a stored coordinate
    /// yields the requested one again.
    pub fn normalize(&self, axis: RowAxis) -> TileCoord {
        match axis {
            RowAxis::Xyz => *self,
            RowAxis::Tms => TileCoord {
                zoom: self.zoom,
                column: self.column,
                row: self.max_index() - self.row,
            },
        }
    }
}

impl std::fmt::Display for TileCoord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.column, self.row)
    }
}
