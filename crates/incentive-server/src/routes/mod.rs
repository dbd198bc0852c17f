//! API routes for the incentive server.

pub mod bonus_schemes;
pub mod credits;
pub mod promo_codes;
pub mod user_segments;

use axum::{routing::get, Json, Router};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::engine::Engine;

/// Creates the main API router with all routes mounted.
pub fn create_router(engine: Engine) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api_v1_routes(engine))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Creates the v1 API routes.
fn api_v1_routes(engine: Engine) -> Router {
    Router::new()
        .nest("/bonus-schemes", bonus_schemes::router(engine.clone()))
        .nest("/credits", credits::router(engine.clone()))
        .nest("/promocodes", promo_codes::router(engine.clone()))
        .nest("/user-segments", user_segments::router(engine))
}

/// GET /health
async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
