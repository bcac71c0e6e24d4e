//! mapserve - A map tile server backed by MBTiles archives.
//!
//! This binary starts the HTTP server and configures all components.

use clap::Parser;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mapserve::{
    archive::{ArchiveManager, LifecycleConfig, MbtilesArchive, TileCoord},
    config::{Cli, Command, InspectConfig, ServeConfig, SignConfig, SignOutputFormat},
    server::{create_router, RoleTokenAuth, RouterConfig},
    service::{MapService, TileCache},
    settings::{FileSettingsBackend, SettingsStore},
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.into_command() {
        Command::Serve(config) => run_serve(config).await,
        Command::Sign(config) => run_sign(config),
        Command::Inspect(config) => run_inspect(config),
    }
}

// =============================================================================
// Serve Command
// =============================================================================

async fn run_serve(config: ServeConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    print_banner();

    info!("Configuration:");
    info!("  Default archive: {}", config.default_archive.display());
    info!("  Storage: {}", config.storage_dir.display());
    info!("  Settings: {}", config.settings_dir().display());
    info!(
        "  Custom map limit: {:.1}MB",
        config.custom_map_limit as f64 / (1024.0 * 1024.0)
    );
    if let Some(ref url) = config.public_url {
        info!("  Public URL: {}", url);
    }

    if config.auth_enabled {
        info!("  Auth: enabled");
    } else {
        warn!("  Auth: DISABLED - admin endpoints are publicly accessible");
        warn!("        Enable for production: --auth-enabled=true --auth-secret=<secret>");
    }

    info!(
        "  Cache: {}MB tiles, max-age {}s",
        config.cache_tiles / (1024 * 1024),
        config.cache_max_age
    );

    let lifecycle = LifecycleConfig::new(&config.default_archive, &config.storage_dir)
        .with_custom_map_limit(config.custom_map_limit);

    let archives = match ArchiveManager::open(lifecycle) {
        Ok(archives) => archives,
        Err(e) => {
            error!("Failed to open map storage: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match archives.active() {
        Ok(handle) => {
            let metadata = handle.archive().metadata();
            info!(
                "  Active map: '{}' ({}, zoom {}-{}, {})",
                metadata.name,
                metadata.format.name(),
                metadata.min_zoom,
                metadata.max_zoom,
                if handle.is_custom() { "custom" } else { "default" }
            );
        }
        Err(e) => {
            warn!("  Active map: none ({})", e);
            warn!("        Tile and document requests fail until a map is uploaded");
        }
    }

    let settings = SettingsStore::new(FileSettingsBackend::new(config.settings_dir()));
    let service = MapService::with_cache(
        archives,
        settings,
        TileCache::with_capacity(config.cache_tiles),
    );

    let router_config = build_router_config(&config);
    let router = create_router(service, router_config);

    let addr = config.bind_address();

    info!("");
    info!("────────────────────────────────────────────────────────────────");
    info!("  Server listening on: http://{}", addr);
    info!("");
    info!("  Try these endpoints:");
    info!("    curl http://{}/health", addr);
    info!("    curl http://{}/map", addr);
    info!("    curl http://{}/map/js", addr);
    if config.auth_enabled {
        info!("");
        info!("  Issue an admin token:");
        info!("    mapserve sign --role write-admin --format header");
    }
    info!("────────────────────────────────────────────────────────────────");
    info!("");

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = axum::serve(listener, router).await {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

fn print_banner() {
    let version = env!("CARGO_PKG_VERSION");
    info!("");
    info!("┌──────────────────────────────────────┐");
    info!("│  mapserve  ·  MBTiles map server     │");
    info!("└──────────────────────────────────────┘");
    info!("  v{}", version);
    info!("");
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "mapserve=debug,tower_http=debug"
    } else {
        "mapserve=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Build RouterConfig from the application ServeConfig.
fn build_router_config(config: &ServeConfig) -> RouterConfig {
    let mut router_config = if config.auth_enabled {
        RouterConfig::new(config.auth_secret_or_empty())
    } else {
        RouterConfig::without_auth()
    };

    router_config = router_config
        .with_cache_max_age(config.cache_max_age)
        .with_public_url(config.public_url.clone())
        .with_tracing(!config.no_tracing);

    if let Some(ref origins) = config.cors_origins {
        router_config = router_config.with_cors_origins(origins.clone());
    }

    router_config
}

// =============================================================================
// Sign Command
// =============================================================================

fn run_sign(config: SignConfig) -> ExitCode {
    if let Err(e) = config.validate() {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }

    let auth = RoleTokenAuth::new(&config.secret);
    let (token, expiry) = match auth.issue(config.role, Duration::from_secs(config.ttl)) {
        Ok(issued) => issued,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match config.format {
        SignOutputFormat::Token => {
            println!("{}", token);
        }
        SignOutputFormat::Json => {
            let json = serde_json::json!({
                "token": token,
                "role": config.role.as_str(),
                "expiry": expiry,
                "ttl": config.ttl,
            });
            match serde_json::to_string_pretty(&json) {
                Ok(text) => println!("{}", text),
                Err(e) => {
                    eprintln!("Error: {}", e);
                    return ExitCode::FAILURE;
                }
            }
        }
        SignOutputFormat::Header => {
            println!("Authorization: Bearer {}", token);
        }
    }

    ExitCode::SUCCESS
}

// =============================================================================
// Inspect Command
// =============================================================================

fn run_inspect(config: InspectConfig) -> ExitCode {
    if config.verbose {
        init_logging(true);
    }

    let tile = match config.tile_coordinates() {
        Ok(tile) => tile,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    println!("MBTiles Archive Check");
    println!("═════════════════════");
    println!();

    let archive = match MbtilesArchive::open(&config.path) {
        Ok(archive) => {
            println!("✓ Opened: {}", config.path.display());
            archive
        }
        Err(e) => {
            println!("✗ {}: {}", config.path.display(), e);
            return ExitCode::FAILURE;
        }
    };

    let metadata = archive.metadata();
    println!("✓ Name: {}", metadata.name);
    println!("✓ Format: {}", metadata.format.name());
    println!("✓ Zoom: {}-{}", metadata.min_zoom, metadata.max_zoom);
    println!("✓ Scheme: {}", metadata.row_axis.as_str());
    if let Some([west, south, east, north]) = metadata.bounds {
        println!("✓ Bounds: {}, {}, {}, {}", west, south, east, north);
    }
    if let Some([lon, lat, zoom]) = metadata.center {
        println!("✓ Center: {}, {} @ z{}", lon, lat, zoom);
    }
    if let Some(layers) = metadata.vector_layers.as_ref().and_then(|v| v.as_array()) {
        println!("✓ Vector layers: {}", layers.len());
        for layer in layers {
            if let Some(id) = layer.get("id").and_then(|id| id.as_str()) {
                println!("    - {}", id);
            }
        }
    }

    if config.verbose {
        println!();
        println!("Raw metadata:");
        println!("─────────────");
        for (key, value) in archive.raw_metadata() {
            println!("  {} = {}", key, value);
        }
    }

    if let Some((zoom, column, row)) = tile {
        println!();
        let result = TileCoord::from_request(zoom, column, row)
            .and_then(|coord| archive.get_tile(coord));
        match result {
            Ok(blob) => {
                print!("✓ Tile {}/{}/{}: {} bytes, {}", zoom, column, row, blob.len(), blob.mime_type);
                match blob.content_encoding {
                    Some(encoding) => println!(", {}", encoding),
                    None => println!(),
                }
            }
            Err(e) => {
                println!("✗ Tile {}/{}/{}: {}", zoom, column, row, e);
                return ExitCode::FAILURE;
            }
        }
    }

    println!();
    println!("Archive is valid.");
    ExitCode::SUCCESS
}
