//! Router configuration for the map server.
//!
//! # Route Structure
//!
//! ```text
//! /health                                   - Health check (public)
//! /map                          GET         - Style document (public)
//! /map                          PUT         - Save settings (write-admin)
//! /map/js                       GET         - TileJSON (public)
//! /map/tile/{zoom}/{column}/{row}           - Tile endpoint (public)
//! /map/upload                   POST        - Upload archive (write-admin)
//! /map/getCustomMapInfo         GET         - Custom map info (read-admin)
//! /map/deleteMap                DELETE      - Delete custom map (write-admin)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use mapserve::server::routes::{create_router, RouterConfig};
//!
//! let config = RouterConfig::new("my-secret-key")
//!     .with_cors_origins(vec!["https://example.com".to_string()]);
//!
//! let router = create_router(map_service, config);
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(listener, router).await?;
//! ```

use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, post, put, MethodRouter},
    Router,
};
use http::header::{AUTHORIZATION, CONTENT_TYPE};
use http::Method;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use url::Url;

use super::auth::{require_read_admin, require_write_admin, Role, RoleTokenAuth};
use super::handlers::{
    custom_map_info_handler, delete_map_handler, health_handler, save_settings_handler,
    style_handler, tile_handler, tilejson_handler, upload_handler, AppState,
};
use crate::service::MapService;

// =============================================================================
// Router Configuration
// =============================================================================

/// Configuration for the HTTP router.
#[derive(Clone)]
pub struct RouterConfig {
    /// Secret key for role tokens
    pub auth_secret: String,

    /// Whether admin endpoints require a role token
    pub auth_enabled: bool,

    /// Allowed CORS origins (None = allow any origin)
    pub cors_origins: Option<Vec<String>>,

    /// Cache-Control max-age for tiles, in seconds
    pub cache_max_age: u32,

    pub enable_tracing: bool,

    /// Externally visible server root used in tile URL templates
    pub public_url: Option<Url>,
}

impl RouterConfig {
    /// Create a router configuration with the given auth secret.
    ///
    /// By default authentication and tracing are enabled, CORS allows any
    /// origin and tiles are cacheable for one hour.
    pub fn new(auth_secret: impl Into<String>) -> Self {
        Self {
            auth_secret: auth_secret.into(),
            auth_enabled: true,
            cors_origins: None,
            cache_max_age: 3600,
            enable_tracing: true,
            public_url: None,
        }
    }

    /// Create a configuration with authentication disabled.
    ///
    /// **Warning**: every admin endpoint becomes public.
    pub fn without_auth() -> Self {
        Self {
            auth_enabled: false,
            ..Self::new(String::new())
        }
    }

    /// Pass an empty vec to disallow all cross-origin requests.
    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = Some(origins);
        self
    }

    pub fn with_cache_max_age(mut self, seconds: u32) -> Self {
        self.cache_max_age = seconds;
        self
    }

    pub fn with_auth_enabled(mut self, enabled: bool) -> Self {
        self.auth_enabled = enabled;
        self
    }

    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.enable_tracing = enabled;
        self
    }

    pub fn with_public_url(mut self, url: Option<Url>) -> Self {
        self.public_url = url;
        self
    }
}

// =============================================================================
// Router Builder
// =============================================================================

/// Create the application router around a map service.
pub fn create_router(service: MapService, config: RouterConfig) -> Router {
    let state = AppState::new(service)
        .with_cache_max_age(config.cache_max_age)
        .with_public_url(config.public_url.clone());
    create_router_with_state(state, &config)
}

/// Create the application router around an existing state.
pub fn create_router_with_state(state: AppState, config: &RouterConfig) -> Router {
    let auth = config
        .auth_enabled
        .then(|| RoleTokenAuth::new(&config.auth_secret));

    let router = Router::new()
        .route("/health", get(health_handler))
        .route(
            "/map",
            guard(put(save_settings_handler), auth.as_ref(), Role::WriteAdmin).get(style_handler),
        )
        .route("/map/js", get(tilejson_handler))
        .route("/map/tile/{zoom}/{column}/{row}", get(tile_handler))
        .route(
            "/map/upload",
            guard(post(upload_handler), auth.as_ref(), Role::WriteAdmin)
                .layer(DefaultBodyLimit::disable()),
        )
        .route(
            "/map/getCustomMapInfo",
            guard(get(custom_map_info_handler), auth.as_ref(), Role::ReadAdmin),
        )
        .route(
            "/map/deleteMap",
            guard(delete(delete_map_handler), auth.as_ref(), Role::WriteAdmin),
        )
        .with_state(state)
        .layer(build_cors_layer(config));

    if config.enable_tracing {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    }
}

/// Require `role` on a method router when auth is enabled.
fn guard(
    route: MethodRouter<AppState>,
    auth: Option<&RoleTokenAuth>,
    role: Role,
) -> MethodRouter<AppState> {
    let Some(auth) = auth else {
        return route;
    };

    match role {
        Role::ReadAdmin => route.route_layer(middleware::from_fn_with_state(
            auth.clone(),
            require_read_admin,
        )),
        Role::WriteAdmin => route.route_layer(middleware::from_fn_with_state(
            auth.clone(),
            require_write_admin,
        )),
    }
}

fn build_cors_layer(config: &RouterConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::HEAD,
            Method::PUT,
            Method::POST,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .max_age(Duration::from_secs(86400));

    match &config.cors_origins {
        None => cors.allow_origin(Any),
        Some(origins) if origins.is_empty() => cors,
        Some(origins) => {
            let parsed_origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
            cors.allow_origin(parsed_origins)
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
