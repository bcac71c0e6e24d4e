//! HTTP server layer for the map API.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         HTTP Layer                              │
//! │     /map  /map/js  /map/tile/{z}/{x}/{y}  /map/upload  ...      │
//! │                                                                 │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────────┐  │
//! │  │  handlers   │  │    auth     │  │        routes           │  │
//! │  │ (requests)  │  │(role tokens)│  │  (router config)        │  │
//! │  └─────────────┘  └─────────────┘  └─────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod auth;
pub mod handlers;
pub mod routes;

pub use auth::{require_read_admin, require_write_admin, AuthError, Role, RoleTokenAuth};
pub use handlers::{
    custom_map_info_handler, delete_map_handler, health_handler, save_settings_handler,
    style_handler, tile_handler, tilejson_handler, upload_handler, AppState, ErrorResponse,
    HealthResponse, MapChangeResponse, RealmQuery, TilePathParams, UploadQuery,
};
pub use routes::{create_router, create_router_with_state, RouterConfig};
