//! Promo code endpoints: administration, kill switch, validation and
//! redemption.

use axum::{
    extract::{Path, State},
    routing::{get, post, put},
    Json, Router,
};
use incentive_core::{PromoDraft, PromoId, PromoStatus};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::engine::{
    ApplyRequest, ApplyResponse, BatchRequest, BatchResponse, Engine, ValidateRequest,
    ValidateResponse,
};
use crate::error::AppError;

/// Request body for the kill switch.
#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: String,
}

/// Creates the promo codes router.
pub fn router(engine: Engine) -> Router {
    Router::new()
        .route("/", get(list_promos).post(create_promo))
        .route("/generate", post(generate_batch))
        .route("/validate", post(validate_promo))
        .route("/apply", post(apply_promo))
        .route("/{id}/status", put(set_status))
        .with_state(engine)
}

/// GET /api/v1/promocodes
async fn list_promos(State(engine): State<Engine>) -> Result<Json<Value>, AppError> {
    let promos = engine.list_promos().await?;
    Ok(Json(json!({ "data": promos })))
}

/// POST /api/v1/promocodes
async fn create_promo(
    State(engine): State<Engine>,
    Json(draft): Json<PromoDraft>,
) -> Result<Json<Value>, AppError> {
    let promo = engine.create_promo(draft).await?;
    Ok(Json(json!({ "success": true, "id": promo.id })))
}

/// POST /api/v1/promocodes/generate
///
/// Creates a batch of random codes from one template.
async fn generate_batch(
    State(engine): State<Engine>,
    Json(request): Json<BatchRequest>,
) -> Result<Json<BatchResponse>, AppError> {
    Ok(Json(engine.generate_batch(request).await?))
}

/// PUT /api/v1/promocodes/{id}/status
///
/// Kill switch: `{"status": "Disabled"}` stops all further redemptions.
async fn set_status(
    State(engine): State<Engine>,
    Path(id): Path<PromoId>,
    Json(request): Json<StatusRequest>,
) -> Result<Json<Value>, AppError> {
    let status: PromoStatus = request.status.parse()?;
    engine.set_promo_status(id, status).await?;
    Ok(Json(json!({ "success": true })))
}

/// POST /api/v1/promocodes/validate
///
/// Checks a code against a prospective transfer without consuming it.
async fn validate_promo(
    State(engine): State<Engine>,
    Json(request): Json<ValidateRequest>,
) -> Result<Json<ValidateResponse>, AppError> {
    Ok(Json(engine.validate_promo(request).await?))
}

/// POST /api/v1/promocodes/apply
async fn apply_promo(
    State(engine): State<Engine>,
    Json(request): Json<ApplyRequest>,
) -> Result<Json<ApplyResponse>, AppError> {
    Ok(Json(engine.apply_promo(request).await?))
}
