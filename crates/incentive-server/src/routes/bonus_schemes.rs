//! Bonus scheme administration endpoints.

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use incentive_core::scheme::{SchemeDraft, SchemeView};
use incentive_core::SchemeId;
use serde_json::{json, Value};

use crate::engine::Engine;
use crate::error::AppError;

/// Creates the bonus schemes router.
pub fn router(engine: Engine) -> Router {
    Router::new()
        .route("/", get(list_schemes).post(create_scheme))
        .route(
            "/{id}",
            get(get_scheme).put(update_scheme).delete(archive_scheme),
        )
        .with_state(engine)
}

/// GET /api/v1/bonus-schemes
async fn list_schemes(State(engine): State<Engine>) -> Result<Json<Value>, AppError> {
    let schemes: Vec<SchemeView> = engine
        .list_schemes()
        .await?
        .iter()
        .map(|s| s.view())
        .collect();
    Ok(Json(json!({ "data": schemes })))
}

/// GET /api/v1/bonus-schemes/{id}
async fn get_scheme(
    State(engine): State<Engine>,
    Path(id): Path<SchemeId>,
) -> Result<Json<SchemeView>, AppError> {
    Ok(Json(engine.get_scheme(id).await?.view()))
}

/// POST /api/v1/bonus-schemes
async fn create_scheme(
    State(engine): State<Engine>,
    Json(draft): Json<SchemeDraft>,
) -> Result<Json<Value>, AppError> {
    let scheme = engine.create_scheme(draft).await?;
    Ok(Json(json!({ "success": true, "id": scheme.id })))
}

/// PUT /api/v1/bonus-schemes/{id}
///
/// Replaces the whole definition.
async fn update_scheme(
    State(engine): State<Engine>,
    Path(id): Path<SchemeId>,
    Json(draft): Json<SchemeDraft>,
) -> Result<Json<Value>, AppError> {
    let scheme = engine.update_scheme(id, draft).await?;
    Ok(Json(json!({ "success": true, "id": scheme.id })))
}

/// DELETE /api/v1/bonus-schemes/{id}
///
/// Archives the scheme.
async fn archive_scheme(
    State(engine): State<Engine>,
    Path(id): Path<SchemeId>,
) -> Result<Json<Value>, AppError> {
    engine.archive_scheme(id).await?;
    Ok(Json(json!({ "success": true })))
}
