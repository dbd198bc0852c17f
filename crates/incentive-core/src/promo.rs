//! Promo codes: definition, the validation pipeline, discount computation
//! and counter reservation.

use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, NaiveDate, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{DefinitionError, RuleViolation};
use crate::ids::PromoId;
use crate::ledger::{CreditEventType, HistoryFilter, HistoryRow, HistorySource, SYSTEM_ADMIN};
use crate::money::{is_positive, percent_of, round_money, CapValue, Limit};
use crate::scheme::DEFAULT_CURRENCY;

/// Longest code accepted at creation.
pub const MAX_CODE_LEN: usize = 64;

/// Largest batch `generate_batch` will create in one request.
pub const MAX_BATCH_SIZE: usize = 1000;

/// Random bytes in a generated code suffix.
const CODE_SUFFIX_BYTES: usize = 4;

/// `reason_code` shown on redemption rows in ledger history.
pub const PROMO_REASON_CODE: &str = "PROMO_REDEMPTION";

text_enum! {
    pub enum PromoType ("promo type") {
        Fixed => "Fixed",
        Percentage => "Percentage",
        /// Exchange-rate uplift, valued as a share of the transfer amount.
        FxBoost => "FX_BOOST",
    }
}

text_enum! {
    #[derive(Default)]
    pub enum PromoStatus ("promo status") {
        #[default]
        Active => "Active",
        Disabled => "Disabled",
    }
}

/// Allow-lists narrowing where a code can be used. Empty lists allow all.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Restrictions {
    /// `"<SOURCE>-<DEST>"` currency pairs, e.g. `"GBP-NGN"`.
    #[serde(default)]
    pub corridors: Vec<String>,
    #[serde(default)]
    pub payment_methods: Vec<String>,
}

impl Restrictions {
    fn allows(list: &[String], candidate: &str) -> bool {
        list.is_empty() || list.iter().any(|entry| entry.trim().eq_ignore_ascii_case(candidate))
    }
}

fn unlimited<T>() -> Limit<T> {
    Limit::Unlimited
}

fn once_per_user() -> Limit<i64> {
    Limit::AtMost(1)
}

/// Promo fields as sent by administrators. Also the template for batch
/// generation, where `code` is ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromoDraft {
    #[serde(default)]
    pub code: String,
    #[serde(rename = "type")]
    pub promo_type: PromoType,
    pub value: BigDecimal,
    #[serde(default)]
    pub min_threshold: BigDecimal,
    #[serde(default)]
    pub max_discount: Option<BigDecimal>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default = "unlimited")]
    pub usage_limit_global: Limit<i64>,
    #[serde(default = "once_per_user")]
    pub usage_limit_per_user: Limit<i64>,
    #[serde(default = "unlimited")]
    pub budget_limit: Limit<BigDecimal>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default)]
    pub restrictions: Restrictions,
}

impl PromoDraft {
    /// Validates everything but the code string.
    pub fn validate_terms(&self) -> Result<(), DefinitionError> {
        if !is_positive(&self.value) {
            return Err(DefinitionError::InvalidValue {
                field: "value",
                reason: "must be greater than 0".to_string(),
            });
        }
        if self.min_threshold.is_negative_value() {
            return Err(DefinitionError::InvalidValue {
                field: "min_threshold",
                reason: "must not be negative".to_string(),
            });
        }
        if let Some(max_discount) = &self.max_discount {
            if !is_positive(max_discount) {
                return Err(DefinitionError::InvalidValue {
                    field: "max_discount",
                    reason: "must be greater than 0".to_string(),
                });
            }
        }
        if self.start_date >= self.end_date {
            return Err(DefinitionError::InvalidDateRange);
        }
        Ok(())
    }

    /// Full validation for a single code; normalises `code` on success.
    pub fn validate(&mut self) -> Result<(), DefinitionError> {
        self.code = normalize_code(&self.code);
        check_code_format(&self.code)?;
        self.validate_terms()
    }

    /// Copy of this template carrying `code`.
    pub fn with_code(&self, code: String) -> Self {
        Self {
            code,
            ..self.clone()
        }
    }
}

/// Upper-cases and trims a code for storage and lookup.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

fn check_code_format(code: &str) -> Result<(), DefinitionError> {
    if code.is_empty() {
        return Err(DefinitionError::Missing("code"));
    }
    if code.len() > MAX_CODE_LEN {
        return Err(DefinitionError::InvalidValue {
            field: "code",
            reason: format!("must be at most {} characters", MAX_CODE_LEN),
        });
    }
    if !code
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(DefinitionError::InvalidValue {
            field: "code",
            reason: "only letters, digits, '-' and '_' are allowed".to_string(),
        });
    }
    Ok(())
}

/// A random batch code: `<PREFIX>-<8 HEX>` or just the hex suffix.
pub fn generate_code<R: RngCore + ?Sized>(prefix: Option<&str>, rng: &mut R) -> String {
    let mut bytes = [0u8; CODE_SUFFIX_BYTES];
    rng.fill_bytes(&mut bytes);
    let suffix = hex::encode_upper(bytes);
    match prefix.map(normalize_code).filter(|p| !p.is_empty()) {
        Some(prefix) => format!("{}-{}", prefix, suffix),
        None => suffix,
    }
}

/// Checks a batch request before any code is generated.
pub fn check_batch_size(count: usize) -> Result<(), DefinitionError> {
    if count == 0 || count > MAX_BATCH_SIZE {
        return Err(DefinitionError::InvalidValue {
            field: "count",
            reason: format!("must be between 1 and {}", MAX_BATCH_SIZE),
        });
    }
    Ok(())
}

/// The transfer a code is being validated against.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransferContext {
    pub user_id: Option<String>,
    pub amount: BigDecimal,
    pub source_currency: Option<String>,
    pub dest_currency: Option<String>,
    pub payment_method: Option<String>,
}

impl TransferContext {
    pub fn corridor(&self) -> String {
        format!(
            "{}-{}",
            self.source_currency.as_deref().unwrap_or("").trim(),
            self.dest_currency.as_deref().unwrap_or("").trim()
        )
    }
}

/// A computed discount.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Discount {
    pub amount: BigDecimal,
    pub display_text: String,
}

/// Counters after a successful reservation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reservation {
    pub promo_id: PromoId,
    pub code: String,
    pub discount_amount: BigDecimal,
    pub usage_count: i64,
    pub total_discount_utilized: BigDecimal,
}

/// A stored promo code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromoCode {
    pub id: PromoId,
    pub code: String,
    #[serde(rename = "type")]
    pub promo_type: PromoType,
    pub value: BigDecimal,
    pub min_threshold: BigDecimal,
    pub max_discount: Option<BigDecimal>,
    pub currency: Option<String>,
    pub usage_limit_global: Limit<i64>,
    pub usage_limit_per_user: Limit<i64>,
    pub usage_count: i64,
    pub total_discount_utilized: BigDecimal,
    pub budget_limit: Limit<BigDecimal>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: PromoStatus,
    pub restrictions: Restrictions,
    pub created_at: DateTime<Utc>,
}

impl PromoCode {
    /// A fresh, active code with zeroed counters.
    pub fn from_draft(id: PromoId, draft: PromoDraft, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            code: draft.code,
            promo_type: draft.promo_type,
            value: draft.value,
            min_threshold: draft.min_threshold,
            max_discount: draft.max_discount,
            currency: draft.currency,
            usage_limit_global: draft.usage_limit_global,
            usage_limit_per_user: draft.usage_limit_per_user,
            usage_count: 0,
            total_discount_utilized: BigDecimal::zero(),
            budget_limit: draft.budget_limit,
            start_date: draft.start_date,
            end_date: draft.end_date,
            status: PromoStatus::Active,
            restrictions: draft.restrictions,
            created_at,
        }
    }

    pub fn is_live_on(&self, today: NaiveDate) -> bool {
        self.status == PromoStatus::Active && self.start_date <= today && today <= self.end_date
    }

    /// Status, window and cap checks shared by validation and reservation.
    ///
    /// `user_redemptions` is the number of recorded redemptions by the
    /// requesting user; `None` skips the per-user cap.
    pub fn check_redeemable(
        &self,
        today: NaiveDate,
        user_redemptions: Option<i64>,
    ) -> Result<(), RuleViolation> {
        if !self.is_live_on(today) {
            return Err(RuleViolation::CodeInactive);
        }
        if self.usage_limit_global.is_reached_by(&self.usage_count) {
            return Err(RuleViolation::CountLimitReached);
        }
        if self.budget_limit.is_reached_by(&self.total_discount_utilized) {
            return Err(RuleViolation::BudgetLimitReached);
        }
        if let Some(used) = user_redemptions {
            if self.usage_limit_per_user.is_reached_by(&used) {
                return Err(RuleViolation::PerUserLimitReached);
            }
        }
        Ok(())
    }

    /// Threshold and allow-list checks against a specific transfer.
    pub fn check_transfer(&self, transfer: &TransferContext) -> Result<(), RuleViolation> {
        if transfer.amount < self.min_threshold {
            return Err(RuleViolation::BelowThreshold {
                min_threshold: self.min_threshold.clone(),
            });
        }
        let corridor = transfer.corridor();
        if !Restrictions::allows(&self.restrictions.corridors, &corridor) {
            return Err(RuleViolation::CorridorNotAllowed { corridor });
        }
        let payment_method = transfer.payment_method.as_deref().unwrap_or("").trim();
        if !Restrictions::allows(&self.restrictions.payment_methods, payment_method) {
            return Err(RuleViolation::PaymentMethodNotAllowed {
                payment_method: payment_method.to_string(),
            });
        }
        Ok(())
    }

    /// Discount granted on a transfer of `amount`, capped at `max_discount`.
    pub fn discount_for(&self, amount: &BigDecimal) -> Discount {
        let raw = match self.promo_type {
            PromoType::Percentage | PromoType::FxBoost => percent_of(amount, &self.value),
            PromoType::Fixed => round_money(&self.value),
        };
        let capped = match &self.max_discount {
            Some(max) if &raw > max => round_money(max),
            _ => raw,
        };
        Discount {
            amount: capped,
            display_text: self.display_text(),
        }
    }

    pub fn display_text(&self) -> String {
        let value = plain_number(&self.value);
        match self.promo_type {
            PromoType::Percentage => format!("{}% off", value),
            PromoType::Fixed => format!(
                "{} {} off",
                self.currency.as_deref().unwrap_or(DEFAULT_CURRENCY),
                value
            ),
            PromoType::FxBoost => format!("+{}% FX rate boost", value),
        }
    }

    /// The full validation pipeline, short-circuiting on the first failure.
    pub fn validate(
        &self,
        today: NaiveDate,
        transfer: &TransferContext,
        user_redemptions: Option<i64>,
    ) -> Result<Discount, RuleViolation> {
        self.check_redeemable(today, user_redemptions)?;
        self.check_transfer(transfer)?;
        Ok(self.discount_for(&transfer.amount))
    }

    /// Re-checks the caps and advances the counters in one step.
    ///
    /// Callers must hold the code exclusively (row lock or equivalent)
    /// between loading it and persisting the updated counters.
    pub fn reserve(
        &mut self,
        today: NaiveDate,
        discount_amount: &BigDecimal,
        user_redemptions: Option<i64>,
    ) -> Result<Reservation, RuleViolation> {
        self.check_redeemable(today, user_redemptions)?;
        self.usage_count += 1;
        self.total_discount_utilized = &self.total_discount_utilized + discount_amount;
        Ok(Reservation {
            promo_id: self.id,
            code: self.code.clone(),
            discount_amount: discount_amount.clone(),
            usage_count: self.usage_count,
            total_discount_utilized: self.total_discount_utilized.clone(),
        })
    }
}

/// Renders a decimal without trailing fractional zeros.
fn plain_number(value: &BigDecimal) -> String {
    let text = value.to_string();
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        text
    }
}

/// A recorded use of a promo code against a transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromoRedemption {
    pub id: Uuid,
    pub promo_id: PromoId,
    pub code: String,
    pub transaction_id: String,
    pub user_id: String,
    pub discount_amount: BigDecimal,
    pub created_at: DateTime<Utc>,
}

impl PromoRedemption {
    pub fn matches(&self, filter: &HistoryFilter) -> bool {
        filter.includes_redemptions()
            && filter.date_matches(self.created_at)
            && filter.promo_id.map_or(true, |id| id == self.promo_id)
    }

    /// Presents the redemption as a synthetic `APPLIED` ledger row.
    pub fn to_history_row(&self) -> HistoryRow {
        HistoryRow {
            id: self.id,
            user_id: self.user_id.clone(),
            amount: -self.discount_amount.clone(),
            event_type: CreditEventType::Applied,
            source_type: HistorySource::Promo,
            scheme_id: None,
            promo_id: Some(self.promo_id),
            scheme_name: Some(format!("{} (Promo Code)", self.code)),
            reference_id: self.transaction_id.clone(),
            reason_code: Some(PROMO_REASON_CODE.to_string()),
            notes: Some(format!("Promo Code: {}", self.code)),
            admin_user: SYSTEM_ADMIN.to_string(),
            expires_at: None,
            created_at: self.created_at,
        }
    }
}
