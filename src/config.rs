//! Command-line and environment configuration.
//!
//! Options can be given as flags or as `MAP_`-prefixed environment
//! variables:
//!
//! - `MAP_HOST` - Server bind address (default: 0.0.0.0)
//! - `MAP_PORT` - Server port (default: 8080)
//! - `MAP_DEFAULT_ARCHIVE` - Bundled MBTiles archive (default: map/mapdata.mbtiles)
//! - `MAP_STORAGE_DIR` - Directory for custom uploads (default: storage/map)
//! - `MAP_SETTINGS_DIR` - Directory for settings documents (default: `<storage>/settings`)
//! - `MAP_CUSTOM_MAP_LIMIT` - Maximum custom upload in bytes (default: 30000000)
//! - `MAP_PUBLIC_URL` - Externally visible server root for tile URLs
//! - `MAP_AUTH_ENABLED` - Require role tokens on admin endpoints (default: true)
//! - `MAP_AUTH_SECRET` - HMAC secret for role tokens
//! - `MAP_CACHE_TILES` - Tile cache capacity in bytes (default: 64MB)
//! - `MAP_CACHE_MAX_AGE` - Tile Cache-Control max-age in seconds (default: 3600)
//! - `MAP_CORS_ORIGINS` - Comma-separated allowed origins (default: any)

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use url::Url;

use crate::archive::DEFAULT_CUSTOM_MAP_LIMIT;
use crate::server::Role;
use crate::service::DEFAULT_TILE_CACHE_CAPACITY;

// =============================================================================
// Default Values
// =============================================================================

pub const DEFAULT_HOST: &str = "0.0.0.0";

pub const DEFAULT_PORT: u16 = 8080;

pub const DEFAULT_ARCHIVE_PATH: &str = "map/mapdata.mbtiles";

pub const DEFAULT_STORAGE_DIR: &str = "storage/map";

/// Default HTTP cache max-age in seconds (1 hour).
pub const DEFAULT_CACHE_MAX_AGE: u32 = 3600;

/// Default role token lifetime in seconds (1 hour).
pub const DEFAULT_TOKEN_TTL: u64 = 3600;

// =============================================================================
// CLI
// =============================================================================

/// Map tile server backed by MBTiles archives.
///
/// Running without a subcommand is the same as `serve`.
#[derive(Parser, Debug)]
#[command(name = "mapserve")]
#[command(author, version, about, long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    #[command(flatten)]
    pub serve: ServeConfig,
}

impl Cli {
    pub fn into_command(self) -> Command {
        self.command.unwrap_or(Command::Serve(self.serve))
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the tile server
    Serve(ServeConfig),

    /// Issue a role token for the admin endpoints
    Sign(SignConfig),

    /// Validate an MBTiles archive and print its metadata
    Inspect(InspectConfig),
}

// =============================================================================
// Serve
// =============================================================================

#[derive(Args, Debug, Clone)]
pub struct ServeConfig {
    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "MAP_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "MAP_PORT")]
    pub port: u16,

    /// Bundled MBTiles archive served when no custom map is uploaded.
    #[arg(long, default_value = DEFAULT_ARCHIVE_PATH, env = "MAP_DEFAULT_ARCHIVE")]
    pub default_archive: PathBuf,

    /// Directory holding uploaded custom archives.
    #[arg(long, default_value = DEFAULT_STORAGE_DIR, env = "MAP_STORAGE_DIR")]
    pub storage_dir: PathBuf,

    /// Directory holding settings documents (defaults to `<storage-dir>/settings`).
    #[arg(long, env = "MAP_SETTINGS_DIR")]
    pub settings_dir: Option<PathBuf>,

    /// Maximum size of an uploaded custom map, in bytes.
    #[arg(long, default_value_t = DEFAULT_CUSTOM_MAP_LIMIT, env = "MAP_CUSTOM_MAP_LIMIT")]
    pub custom_map_limit: u64,

    /// Externally visible server root, e.g. `https://maps.example.com`.
    ///
    /// When unset, tile URLs are built from the request's Host and
    /// X-Forwarded-Proto headers.
    #[arg(long, env = "MAP_PUBLIC_URL")]
    pub public_url: Option<Url>,

    /// Require role tokens on admin endpoints.
    ///
    /// WARNING: Only disable authentication in development/testing.
    #[arg(long, default_value_t = true, action = ArgAction::Set, env = "MAP_AUTH_ENABLED")]
    pub auth_enabled: bool,

    /// Secret key for HMAC-SHA256 role tokens.
    #[arg(long, env = "MAP_AUTH_SECRET", hide_env_values = true)]
    pub auth_secret: Option<String>,

    /// Tile cache capacity in bytes.
    #[arg(long, default_value_t = DEFAULT_TILE_CACHE_CAPACITY, env = "MAP_CACHE_TILES")]
    pub cache_tiles: usize,

    /// HTTP Cache-Control max-age for tiles, in seconds.
    #[arg(long, default_value_t = DEFAULT_CACHE_MAX_AGE, env = "MAP_CACHE_MAX_AGE")]
    pub cache_max_age: u32,

    /// Allowed CORS origins (comma-separated). Any origin when unset.
    #[arg(long, env = "MAP_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Option<Vec<String>>,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Disable request tracing.
    #[arg(long, default_value_t = false)]
    pub no_tracing: bool,
}

impl ServeConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.auth_enabled && self.auth_secret.as_deref().map_or(true, str::is_empty) {
            return Err(
                "Authentication is enabled but no secret provided. \
                 Set --auth-secret or MAP_AUTH_SECRET, or disable auth with --auth-enabled=false"
                    .to_string(),
            );
        }

        if self.custom_map_limit == 0 {
            return Err("custom_map_limit must be greater than 0".to_string());
        }

        if self.cache_tiles == 0 {
            return Err("cache_tiles must be greater than 0".to_string());
        }

        if let Some(url) = &self.public_url {
            if !matches!(url.scheme(), "http" | "https") {
                return Err(format!("public_url must be http or https, got {}", url));
            }
        }

        Ok(())
    }

    /// Server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn auth_secret_or_empty(&self) -> &str {
        self.auth_secret.as_deref().unwrap_or("")
    }

    pub fn settings_dir(&self) -> PathBuf {
        self.settings_dir
            .clone()
            .unwrap_or_else(|| self.storage_dir.join("settings"))
    }
}

// =============================================================================
// Sign
// =============================================================================

#[derive(Args, Debug, Clone)]
pub struct SignConfig {
    /// Role granted by the token (read-admin or write-admin).
    #[arg(long, default_value = "read-admin")]
    pub role: Role,

    /// Token lifetime in seconds.
    #[arg(long, default_value_t = DEFAULT_TOKEN_TTL)]
    pub ttl: u64,

    /// Secret key; must match the server's.
    #[arg(long, env = "MAP_AUTH_SECRET", hide_env_values = true)]
    pub secret: String,

    #[arg(long, value_enum, default_value_t = SignOutputFormat::Token)]
    pub format: SignOutputFormat,
}

impl SignConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.secret.is_empty() {
            return Err("secret must not be empty".to_string());
        }
        if self.ttl == 0 {
            return Err("ttl must be greater than 0".to_string());
        }
        Ok(())
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignOutputFormat {
    /// The bare token
    Token,
    /// Token, role and expiry as JSON
    Json,
    /// A ready-to-use `Authorization` header line
    Header,
}

// =============================================================================
// Inspect
// =============================================================================

#[derive(Args, Debug, Clone)]
pub struct InspectConfig {
    /// MBTiles file to open.
    pub path: PathBuf,

    /// Also read one tile, given as `z/x/y` in top-origin rows.
    #[arg(long)]
    pub tile: Option<String>,

    /// Enable verbose logging.
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl InspectConfig {
    /// The requested tile as `(zoom, column, row)`, if any.
    pub fn tile_coordinates(&self) -> Result<Option<(i64, i64, i64)>, String> {
        self.tile.as_deref().map(parse_tile_spec).transpose()
    }
}

/// Parse `z/x/y`.
pub fn parse_tile_spec(spec: &str) -> Result<(i64, i64, i64), String> {
    let parts: Vec<&str> = spec.split('/').collect();
    let [z, x, y] = parts.as_slice() else {
        return Err(format!("tile must be z/x/y, got '{}'", spec));
    };

    let parse = |s: &str| {
        s.trim()
            .parse::<i64>()
            .map_err(|_| format!("tile must be z/x/y integers, got '{}'", spec))
    };
    Ok((parse(z)?, parse(x)?, parse(y)?))
}

// =============================================================================
// Tests
// =============================================================================
