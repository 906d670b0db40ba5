#![forbid(unsafe_code)]

//! `siphon-server`
//!
//! HTTP surface of the siphon gateway. Routes mirror the upstream hub's URL
//! shapes so download clients can point at the gateway unchanged:
//!
//! | Route | Behavior |
//! |---|---|
//! | `GET /api/models/{owner}/{name}/revision/{version}` | proxy + index capture |
//! | `GET\|HEAD /{owner}/{name}/resolve/{sha}/{filename}` | cache hit, else proxy + file capture |
//! | `GET /api/models/{owner}/{name}/info/{version}` | local facade, never proxied |
//! | `PUT /api/models/{owner}/{name}?path={filename}` | direct upload |
//! | `GET /health` | liveness |

pub mod config;
pub mod error;
pub mod routes;
pub mod state;

use axum::routing::{get, put};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use config::{RefreshPolicy, ServerConfig};
pub use error::AppError;
pub use state::AppState;

/// Assemble the application router.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route(
            "/api/models/:owner/:name/revision/:version",
            get(routes::model_index),
        )
        .route(
            "/api/models/:owner/:name/info/:version",
            get(routes::model_info),
        )
        .route("/api/models/:owner/:name", put(routes::upload_file))
        .route(
            "/:owner/:name/resolve/:sha/*filename",
            get(routes::resolve_file),
        )
        .fallback(routes::fallback_not_found)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
