//! Credit ledger endpoints: awards, manual adjustments, balance and history.

use std::str::FromStr;

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use incentive_core::{CreditEventType, HistoryFilter, LedgerScope, PromoId, SchemeId};
use serde::Deserialize;

use crate::engine::{
    AdjustmentRequest, AdjustmentResponse, AwardRequest, AwardResponse, CreditsResponse, Engine,
};
use crate::error::AppError;

/// Query parameters for the history view. Empty values are ignored.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    #[serde(default, alias = "start_date")]
    pub start_date: Option<String>,
    #[serde(default, alias = "end_date")]
    pub end_date: Option<String>,
    #[serde(default, alias = "event_type")]
    pub event_type: Option<String>,
    #[serde(default, alias = "scheme_id")]
    pub scheme_id: Option<String>,
    #[serde(default, alias = "promo_id")]
    pub promo_id: Option<String>,
}

fn parse_param<T>(name: &str, value: Option<&str>) -> Result<Option<T>, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|e| AppError::BadRequest(format!("Invalid {}: {}", name, e))),
    }
}

impl TryFrom<HistoryQuery> for HistoryFilter {
    type Error = AppError;

    fn try_from(query: HistoryQuery) -> Result<Self, Self::Error> {
        let filter = HistoryFilter {
            start_date: parse_param::<NaiveDate>("startDate", query.start_date.as_deref())?,
            end_date: parse_param::<NaiveDate>("endDate", query.end_date.as_deref())?,
            event_type: parse_param::<CreditEventType>("eventType", query.event_type.as_deref())?,
            scheme_id: parse_param::<SchemeId>("schemeId", query.scheme_id.as_deref())?,
            promo_id: parse_param::<PromoId>("promoId", query.promo_id.as_deref())?,
        };
        if let (Some(start), Some(end)) = (filter.start_date, filter.end_date) {
            if start > end {
                return Err(AppError::BadRequest(
                    "startDate must not be after endDate".to_string(),
                ));
            }
        }
        Ok(filter)
    }
}

/// Creates the credits router.
pub fn router(engine: Engine) -> Router {
    Router::new()
        .route("/award-bonus", post(award_bonus))
        .route("/manual", post(manual_adjustment))
        .route("/{user_id}", get(get_credits))
        .with_state(engine)
}

/// POST /api/v1/credits/award-bonus
///
/// Runs the scheme pipeline and appends an `EARNED` entry.
async fn award_bonus(
    State(engine): State<Engine>,
    Json(request): Json<AwardRequest>,
) -> Result<Json<AwardResponse>, AppError> {
    Ok(Json(engine.award_bonus(request).await?))
}

/// POST /api/v1/credits/manual
///
/// Records an administrator's credit adjustment.
async fn manual_adjustment(
    State(engine): State<Engine>,
    Json(request): Json<AdjustmentRequest>,
) -> Result<Json<AdjustmentResponse>, AppError> {
    Ok(Json(engine.manual_adjustment(request).await?))
}

/// GET /api/v1/credits/{user_id}
///
/// Balance and merged history. `all` returns the program-wide view.
async fn get_credits(
    State(engine): State<Engine>,
    Path(user_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<CreditsResponse>, AppError> {
    let filter = HistoryFilter::try_from(query)?;
    let scope = LedgerScope::from_path(&user_id);
    Ok(Json(engine.credits(scope, filter).await?))
}
