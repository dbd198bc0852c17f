//! User segment endpoints.

use axum::{
    extract::{Path, State},
    routing::{get, put},
    Json, Router,
};
use incentive_core::segment::SegmentDraft;
use incentive_core::SegmentId;
use serde_json::{json, Value};

use crate::engine::Engine;
use crate::error::AppError;

/// Creates the user segments router.
pub fn router(engine: Engine) -> Router {
    Router::new()
        .route("/", get(list_segments).post(create_segment))
        .route("/{id}", put(update_segment).delete(delete_segment))
        .with_state(engine)
}

/// GET /api/v1/user-segments
async fn list_segments(State(engine): State<Engine>) -> Result<Json<Value>, AppError> {
    let segments = engine.list_segments().await?;
    Ok(Json(json!({ "data": segments })))
}

/// POST /api/v1/user-segments
async fn create_segment(
    State(engine): State<Engine>,
    Json(draft): Json<SegmentDraft>,
) -> Result<Json<Value>, AppError> {
    let segment = engine.create_segment(draft).await?;
    Ok(Json(json!({ "success": true, "id": segment.id })))
}

/// PUT /api/v1/user-segments/{id}
async fn update_segment(
    State(engine): State<Engine>,
    Path(id): Path<SegmentId>,
    Json(draft): Json<SegmentDraft>,
) -> Result<Json<Value>, AppError> {
    let segment = engine.update_segment(id, draft).await?;
    Ok(Json(json!({ "success": true, "id": segment.id })))
}

/// DELETE /api/v1/user-segments/{id}
async fn delete_segment(
    State(engine): State<Engine>,
    Path(id): Path<SegmentId>,
) -> Result<Json<Value>, AppError> {
    engine.delete_segment(id).await?;
    Ok(Json(json!({ "success": true })))
}
