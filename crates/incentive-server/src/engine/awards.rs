//! Bonus awards: the scheme pipeline that ends in an `EARNED` entry.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use incentive_core::idempotency::award_reference;
use incentive_core::ledger::SYSTEM_ADMIN;
use incentive_core::scheme::SegmentSelector;
use incentive_core::{IdempotencyKey, NewCreditLedgerEntry, RuleViolation, SchemeId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{required_text, segments, Engine};
use crate::error::AppError;

/// Request body for awarding a scheme bonus.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AwardRequest {
    #[serde(default, alias = "userId")]
    pub user_id: Option<String>,
    #[serde(default, alias = "schemeId")]
    pub scheme_id: Option<SchemeId>,
    /// Triggering transaction; required by tiered and percentage schemes.
    #[serde(default, alias = "transactionId")]
    pub transaction_id: Option<String>,
    #[serde(default, alias = "idempotencyKey")]
    pub idempotency_key: Option<String>,
    #[serde(default, alias = "adminUser")]
    pub admin_user: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwardResponse {
    pub success: bool,
    pub id: Uuid,
    pub amount: BigDecimal,
    pub expires_at: Option<DateTime<Utc>>,
    pub scheme_name: String,
    /// True when the request replayed an earlier award.
    pub idempotent: bool,
}

impl Engine {
    /// Awards a scheme bonus to a user.
    ///
    /// Replays with the same idempotency key return the original entry.
    pub async fn award_bonus(&self, request: AwardRequest) -> Result<AwardResponse, AppError> {
        let user_id = required_text(request.user_id.as_deref(), "user_id")?;
        let scheme_id = request
            .scheme_id
            .ok_or_else(|| AppError::BadRequest("scheme_id is required".to_string()))?;
        let key = IdempotencyKey::parse_optional(request.idempotency_key.as_deref())?;
        let transaction_id = request
            .transaction_id
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty());

        let mut uow = self.store.begin().await?;

        // Step 1: Serialise concurrent awards for this (user, scheme)
        uow.lock_award(&user_id, scheme_id).await?;

        // Step 2: Idempotent replay
        if let Some(key) = &key {
            if let Some(existing) = uow.find_entry_by_reference(&key.reference_id()).await? {
                let scheme_name = match existing.scheme_id {
                    Some(id) => uow.get_scheme(id).await?.map(|s| s.name().to_string()),
                    None => None,
                };
                tracing::info!(
                    user_id = %existing.user_id,
                    reference_id = %existing.reference_id,
                    "Replayed idempotent bonus award"
                );
                return Ok(AwardResponse {
                    success: true,
                    id: existing.id,
                    amount: existing.amount,
                    expires_at: existing.expires_at,
                    scheme_name: scheme_name.unwrap_or_default(),
                    idempotent: true,
                });
            }
        }

        // Step 3: Load the scheme
        let scheme = uow
            .get_scheme(scheme_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Bonus scheme not found".to_string()))?;
        let definition = &scheme.definition;

        // Step 4: Status and date window
        let now = self.now();
        definition.check_window(now.date_naive())?;

        // Step 5: Segment eligibility
        if let SegmentSelector::Any(segment_ids) = &definition.eligibility.segments {
            let eligible = segments::user_in_any(uow.as_mut(), &user_id, segment_ids, now).await?;
            if !eligible {
                return Err(RuleViolation::UserIneligible.into());
            }
        }

        // Step 6: One-time check
        if definition.eligibility.one_time_only {
            if let Some(prior) = uow.first_earned(&user_id, scheme_id).await? {
                tracing::warn!(
                    user_id = %user_id,
                    scheme_id = %scheme_id,
                    "Rejected repeat award of one-time bonus"
                );
                return Err(RuleViolation::AlreadyEarned {
                    name: definition.name.clone(),
                    earned_at: prior.created_at,
                }
                .into());
            }
        }

        // Step 7: Compute the amount
        let transaction_amount = match transaction_id {
            Some(tx) if definition.commission.needs_transaction() => Some(
                uow.transaction_amount(tx)
                    .await?
                    .ok_or_else(|| AppError::NotFound("Transaction not found".to_string()))?,
            ),
            _ => None,
        };
        let amount = definition.commission.compute(transaction_amount.as_ref())?;

        // Step 8: Append the EARNED entry
        let entry_id = Uuid::new_v4();
        let reference_id = award_reference(key.as_ref(), transaction_id, entry_id);
        let admin_user = request
            .admin_user
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .unwrap_or(SYSTEM_ADMIN)
            .to_string();
        let entry = uow
            .append_entry(NewCreditLedgerEntry::earned(
                entry_id,
                user_id.clone(),
                amount,
                scheme_id,
                reference_id,
                admin_user,
                now,
            ))
            .await?;
        uow.commit().await?;

        tracing::info!(
            user_id = %user_id,
            scheme_id = %scheme_id,
            amount = %entry.amount,
            reference_id = %entry.reference_id,
            "Awarded bonus credit"
        );

        Ok(AwardResponse {
            success: true,
            id: entry.id,
            amount: entry.amount,
            expires_at: entry.expires_at,
            scheme_name: scheme.name().to_string(),
            idempotent: false,
        })
    }
}
