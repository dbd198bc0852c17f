//! Manual adjustments and the balance/history view.

use bigdecimal::BigDecimal;
use incentive_core::idempotency::manual_reference;
use incentive_core::ledger::{check_adjustment_sign, cost_incurred, merge_history};
use incentive_core::money::round_money;
use incentive_core::{
    CreditEventType, HistoryFilter, HistoryRow, IdempotencyKey, LedgerScope,
    NewCreditLedgerEntry, SchemeId,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{required_text, Engine};
use crate::error::AppError;

const DEFAULT_ADJUSTER: &str = "Admin";

/// Request body for a manual credit adjustment.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AdjustmentRequest {
    #[serde(default, alias = "userId")]
    pub user_id: Option<String>,
    #[serde(default)]
    pub amount: Option<BigDecimal>,
    #[serde(default, rename = "type")]
    pub event_type: Option<String>,
    #[serde(default, alias = "reasonCode")]
    pub reason_code: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default, alias = "schemeId")]
    pub scheme_id: Option<SchemeId>,
    #[serde(default, alias = "idempotencyKey")]
    pub idempotency_key: Option<String>,
    #[serde(default, alias = "adminUser")]
    pub admin_user: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdjustmentResponse {
    pub success: bool,
    pub id: Uuid,
    /// Signed amount the entry contributes to the balance.
    pub new_balance_impact: BigDecimal,
    pub idempotent: bool,
}

/// Balance summary plus the filtered, merged history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditsResponse {
    /// `None` for the all-users view.
    pub user_id: Option<String>,
    pub balance: BigDecimal,
    pub cost_incurred: BigDecimal,
    pub currency: String,
    pub history: Vec<HistoryRow>,
}

impl Engine {
    /// Records an administrator's credit adjustment.
    pub async fn manual_adjustment(
        &self,
        request: AdjustmentRequest,
    ) -> Result<AdjustmentResponse, AppError> {
        // Step 1: Validate the request
        let user_id = required_text(request.user_id.as_deref(), "user_id")?;
        let amount = request
            .amount
            .as_ref()
            .map(round_money)
            .ok_or_else(|| AppError::BadRequest("amount is required".to_string()))?;
        let event_type: CreditEventType =
            required_text(request.event_type.as_deref(), "type")?.parse()?;
        let reason_code = required_text(request.reason_code.as_deref(), "Reason code")?;
        let notes = required_text(request.notes.as_deref(), "notes")?;
        check_adjustment_sign(event_type, &amount)?;
        let key = IdempotencyKey::parse_optional(request.idempotency_key.as_deref())?;

        let mut uow = self.store.begin().await?;

        // Step 2: Idempotent replay
        if let Some(key) = &key {
            if let Some(existing) = uow.find_entry_by_reference(&key.reference_id()).await? {
                return Ok(AdjustmentResponse {
                    success: true,
                    id: existing.id,
                    new_balance_impact: existing.amount,
                    idempotent: true,
                });
            }
        }

        // Step 3: Referenced scheme must exist
        if let Some(scheme_id) = request.scheme_id {
            if uow.get_scheme(scheme_id).await?.is_none() {
                return Err(AppError::NotFound("Bonus scheme not found".to_string()));
            }
        }

        // Step 4: Append
        let entry_id = Uuid::new_v4();
        let admin_user = request
            .admin_user
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .unwrap_or(DEFAULT_ADJUSTER)
            .to_string();
        let entry = uow
            .append_entry(NewCreditLedgerEntry::manual(
                entry_id,
                user_id,
                amount,
                event_type,
                request.scheme_id,
                manual_reference(key.as_ref(), entry_id),
                reason_code,
                notes,
                admin_user,
                self.now(),
            ))
            .await?;
        uow.commit().await?;

        tracing::info!(
            user_id = %entry.user_id,
            event_type = %entry.event_type,
            amount = %entry.amount,
            admin_user = %entry.admin_user,
            "Recorded manual credit adjustment"
        );

        Ok(AdjustmentResponse {
            success: true,
            id: entry.id,
            new_balance_impact: entry.amount,
            idempotent: false,
        })
    }

    /// Balance and unified history for one user or for everyone.
    ///
    /// The balance ignores `filter`; `cost_incurred` covers exactly the
    /// returned rows.
    pub async fn credits(
        &self,
        scope: LedgerScope,
        filter: HistoryFilter,
    ) -> Result<CreditsResponse, AppError> {
        let mut uow = self.store.begin().await?;

        let balance = uow.ledger_balance(&scope).await?;

        let ledger_rows = if filter.includes_ledger_rows() {
            uow.ledger_history(&scope, &filter)
                .await?
                .into_iter()
                .map(|row| HistoryRow::from_entry(row.entry, row.scheme_name))
                .collect()
        } else {
            Vec::new()
        };

        let promo_rows = if filter.includes_redemptions() {
            uow.redemption_history(&scope, &filter)
                .await?
                .iter()
                .map(|r| r.to_history_row())
                .collect()
        } else {
            Vec::new()
        };

        let history = merge_history(ledger_rows, promo_rows);
        let cost_incurred = cost_incurred(&history);

        Ok(CreditsResponse {
            user_id: scope.user_id().map(str::to_string),
            balance,
            cost_incurred,
            currency: self.currency.clone(),
            history,
        })
    }
}
