//! Promo code registry: administration, validation and redemption.

use bigdecimal::BigDecimal;
use incentive_core::money::{round_money, CapValue};
use incentive_core::promo::{
    check_batch_size, generate_code, normalize_code, TransferContext,
};
use incentive_core::{Limit, PromoCode, PromoDraft, PromoId, PromoRedemption, PromoStatus, RuleViolation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{required_text, Engine};
use crate::error::AppError;
use crate::store::UnitOfWork;

/// Request body for validating a code against a prospective transfer.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ValidateRequest {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub amount: Option<BigDecimal>,
    /// Accepted for compatibility; the corridor comes from the two
    /// currencies below.
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default, alias = "userId")]
    pub user_id: Option<String>,
    #[serde(default, alias = "sourceCurrency")]
    pub source_currency: Option<String>,
    #[serde(default, alias = "destCurrency")]
    pub dest_currency: Option<String>,
    #[serde(default, alias = "paymentMethod")]
    pub payment_method: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidateResponse {
    pub valid: bool,
    pub code: String,
    pub promo_id: PromoId,
    pub discount: BigDecimal,
    pub display_text: String,
}

/// Request body for redeeming a code.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ApplyRequest {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default, alias = "discountAmount")]
    pub discount_amount: Option<BigDecimal>,
    #[serde(default, alias = "transactionId")]
    pub transaction_id: Option<String>,
    #[serde(default, alias = "userId")]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyResponse {
    pub success: bool,
    pub usage_count: i64,
    pub total_discount_utilized: BigDecimal,
}

/// Request body for generating a batch of codes from one template.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BatchRequest {
    #[serde(alias = "batch_size")]
    pub count: usize,
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(alias = "config")]
    pub template: PromoDraft,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResponse {
    pub success: bool,
    pub requested: usize,
    pub created: usize,
    pub codes: Vec<String>,
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Recorded redemptions by `user_id`, or `None` when no per-user cap applies.
async fn user_redemptions(
    uow: &mut dyn UnitOfWork,
    promo: &PromoCode,
    user_id: Option<&str>,
) -> Result<Option<i64>, AppError> {
    match (user_id, &promo.usage_limit_per_user) {
        (Some(user_id), Limit::AtMost(_)) => {
            Ok(Some(uow.count_user_redemptions(promo.id, user_id).await?))
        }
        _ => Ok(None),
    }
}

impl Engine {
    pub async fn list_promos(&self) -> Result<Vec<PromoCode>, AppError> {
        let mut uow = self.store.begin().await?;
        uow.list_promos().await
    }

    pub async fn create_promo(&self, mut draft: PromoDraft) -> Result<PromoCode, AppError> {
        draft.validate()?;
        let mut uow = self.store.begin().await?;
        let promo = uow
            .insert_promo(&draft)
            .await?
            .ok_or_else(|| AppError::Conflict("Promo code already exists".to_string()))?;
        uow.commit().await?;

        tracing::info!(promo_id = %promo.id, code = %promo.code, "Created promo code");
        Ok(promo)
    }

    /// Creates up to `count` codes sharing the template's terms. Codes that
    /// collide with existing ones are skipped.
    pub async fn generate_batch(&self, request: BatchRequest) -> Result<BatchResponse, AppError> {
        check_batch_size(request.count)?;
        request.template.validate_terms()?;

        let drafts = {
            let mut rng = rand::thread_rng();
            let prefix = non_blank(request.prefix.as_deref());
            (0..request.count)
                .map(|_| {
                    let mut draft = request.template.with_code(generate_code(prefix, &mut rng));
                    draft.validate().map(|_| draft)
                })
                .collect::<Result<Vec<_>, _>>()?
        };

        let mut uow = self.store.begin().await?;
        let mut codes = Vec::with_capacity(drafts.len());
        for draft in &drafts {
            if let Some(promo) = uow.insert_promo(draft).await? {
                codes.push(promo.code);
            }
        }
        uow.commit().await?;

        tracing::info!(
            requested = request.count,
            created = codes.len(),
            "Generated promo code batch"
        );

        Ok(BatchResponse {
            success: true,
            requested: request.count,
            created: codes.len(),
            codes,
        })
    }

    /// Kill switch.
    pub async fn set_promo_status(&self, id: PromoId, status: PromoStatus) -> Result<(), AppError> {
        let mut uow = self.store.begin().await?;
        if !uow.set_promo_status(id, status).await? {
            return Err(AppError::NotFound("Promo code not found".to_string()));
        }
        uow.commit().await?;

        tracing::info!(promo_id = %id, status = %status, "Changed promo code status");
        Ok(())
    }

    /// Checks a code against a transfer without consuming it.
    pub async fn validate_promo(
        &self,
        request: ValidateRequest,
    ) -> Result<ValidateResponse, AppError> {
        let code = normalize_code(&required_text(request.code.as_deref(), "code")?);
        let amount = request
            .amount
            .ok_or_else(|| AppError::BadRequest("amount is required".to_string()))?;
        let transfer = TransferContext {
            user_id: non_blank(request.user_id.as_deref()).map(str::to_string),
            amount,
            source_currency: request.source_currency,
            dest_currency: request.dest_currency,
            payment_method: request.payment_method,
        };

        let mut uow = self.store.begin().await?;
        let promo = uow
            .find_promo_by_code(&code, false)
            .await?
            .ok_or(RuleViolation::InvalidCode)?;
        let used = user_redemptions(uow.as_mut(), &promo, transfer.user_id.as_deref()).await?;

        let discount = promo.validate(self.today(), &transfer, used)?;
        Ok(ValidateResponse {
            valid: true,
            code: promo.code,
            promo_id: promo.id,
            discount: discount.amount,
            display_text: discount.display_text,
        })
    }

    /// Consumes one use of a code and `discount_amount` of its budget.
    ///
    /// The caps are re-checked under the row lock, so concurrent
    /// redemptions cannot push `usage_count` past the global limit.
    pub async fn apply_promo(&self, request: ApplyRequest) -> Result<ApplyResponse, AppError> {
        let code = normalize_code(&required_text(request.code.as_deref(), "code")?);
        let discount = request
            .discount_amount
            .as_ref()
            .map(round_money)
            .ok_or_else(|| AppError::BadRequest("discount_amount is required".to_string()))?;
        if discount.is_negative_value() {
            return Err(AppError::BadRequest(
                "discount_amount must not be negative".to_string(),
            ));
        }
        let user_id = non_blank(request.user_id.as_deref());
        let transaction_id = non_blank(request.transaction_id.as_deref());
        // Per-user caps count redemption rows, which are keyed by transaction.
        if user_id.is_some() && transaction_id.is_none() {
            return Err(AppError::BadRequest(
                "transaction_id is required when user_id is given".to_string(),
            ));
        }

        let mut uow = self.store.begin().await?;
        let mut promo = uow
            .find_promo_by_code(&code, true)
            .await?
            .ok_or(RuleViolation::InvalidCode)?;
        let used = user_redemptions(uow.as_mut(), &promo, user_id).await?;

        let reservation = match promo.reserve(self.today(), &discount, used) {
            Ok(reservation) => reservation,
            Err(violation) => {
                tracing::warn!(code = %code, reason = violation.code(), "Rejected promo redemption");
                return Err(violation.into());
            }
        };
        uow.save_promo_counters(&promo).await?;

        if let (Some(user_id), Some(transaction_id)) = (user_id, transaction_id) {
            uow.insert_redemption(&PromoRedemption {
                id: Uuid::new_v4(),
                promo_id: reservation.promo_id,
                code: reservation.code.clone(),
                transaction_id: transaction_id.to_string(),
                user_id: user_id.to_string(),
                discount_amount: reservation.discount_amount.clone(),
                created_at: self.now(),
            })
            .await?;
        }
        uow.commit().await?;

        tracing::info!(
            code = %reservation.code,
            usage_count = reservation.usage_count,
            total_discount_utilized = %reservation.total_discount_utilized,
            "Applied promo code"
        );

        Ok(ApplyResponse {
            success: true,
            usage_count: reservation.usage_count,
            total_discount_utilized: reservation.total_discount_utilized,
        })
    }
}
