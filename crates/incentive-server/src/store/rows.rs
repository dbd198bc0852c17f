//! Database row shapes and their conversion into domain types.

use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use incentive_core::ledger::CreditLedgerEntry;
use incentive_core::promo::{PromoCode, PromoRedemption, Restrictions};
use incentive_core::scheme::{BonusScheme, EligibilityDraft, SchemeDefinition, SchemeDraft, Tier};
use incentive_core::segment::{SegmentCriteria, UserSegment};
use incentive_core::{Limit, PromoId, SchemeId, SegmentId};
use sqlx::types::Json;
use sqlx::FromRow;
use std::str::FromStr;
use uuid::Uuid;

use super::LedgerRow;
use crate::error::AppError;

fn parse_column<T>(table: &str, value: &str) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse::<T>()
        .map_err(|e| AppError::Internal(format!("Corrupt {} row: {}", table, e)))
}

fn limit_column<T: incentive_core::money::CapValue>(
    column: &str,
    raw: T,
) -> Result<Limit<T>, AppError> {
    Limit::from_raw(raw).map_err(|e| AppError::Internal(format!("Corrupt {}: {}", column, e)))
}

#[derive(Debug, FromRow)]
pub struct LedgerEntryRow {
    pub id: Uuid,
    pub user_id: String,
    pub amount: BigDecimal,
    #[sqlx(rename = "type")]
    pub event_type: String,
    pub scheme_id: Option<i64>,
    pub reference_id: String,
    pub reason_code: Option<String>,
    pub notes: Option<String>,
    pub admin_user: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<LedgerEntryRow> for CreditLedgerEntry {
    type Error = AppError;

    fn try_from(row: LedgerEntryRow) -> Result<Self, Self::Error> {
        Ok(CreditLedgerEntry {
            id: row.id,
            user_id: row.user_id,
            amount: row.amount,
            event_type: parse_column("credit_ledger", &row.event_type)?,
            scheme_id: row.scheme_id.map(SchemeId),
            reference_id: row.reference_id,
            reason_code: row.reason_code,
            notes: row.notes,
            admin_user: row.admin_user,
            expires_at: row.expires_at,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct LedgerHistoryRow {
    #[sqlx(flatten)]
    pub entry: LedgerEntryRow,
    pub scheme_name: Option<String>,
}

impl TryFrom<LedgerHistoryRow> for LedgerRow {
    type Error = AppError;

    fn try_from(row: LedgerHistoryRow) -> Result<Self, Self::Error> {
        Ok(LedgerRow {
            entry: row.entry.try_into()?,
            scheme_name: row.scheme_name,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct SchemeRow {
    pub id: i64,
    pub name: String,
    pub bonus_type: String,
    pub credit_amount: BigDecimal,
    pub currency: String,
    pub commission_type: String,
    pub commission_percentage: Option<BigDecimal>,
    pub is_tiered: bool,
    pub tiers: Json<Vec<Tier>>,
    pub min_transactions: Option<i32>,
    pub time_period_days: Option<i32>,
    pub min_transaction_threshold: Option<BigDecimal>,
    pub eligibility_rules: Json<EligibilityDraft>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<SchemeRow> for BonusScheme {
    type Error = AppError;

    fn try_from(row: SchemeRow) -> Result<Self, Self::Error> {
        let draft = SchemeDraft {
            name: row.name,
            bonus_type: parse_column("bonus_schemes", &row.bonus_type)?,
            credit_amount: row.credit_amount,
            currency: row.currency,
            commission_type: parse_column("bonus_schemes", &row.commission_type)?,
            commission_percentage: row.commission_percentage,
            is_tiered: row.is_tiered,
            tiers: row.tiers.0,
            min_transactions: row.min_transactions,
            time_period_days: row.time_period_days,
            min_transaction_threshold: row.min_transaction_threshold,
            eligibility_rules: row.eligibility_rules.0,
            start_date: row.start_date,
            end_date: row.end_date,
            status: parse_column("bonus_schemes", &row.status)?,
        };
        let definition = SchemeDefinition::try_from(draft).map_err(|e| {
            AppError::Internal(format!("Stored bonus scheme {} is invalid: {}", row.id, e))
        })?;
        Ok(BonusScheme {
            id: SchemeId(row.id),
            definition,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct SegmentRow {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub criteria: Json<SegmentCriteria>,
    pub created_at: DateTime<Utc>,
}

impl From<SegmentRow> for UserSegment {
    fn from(row: SegmentRow) -> Self {
        UserSegment {
            id: SegmentId(row.id),
            name: row.name,
            description: row.description,
            criteria: row.criteria.0,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct PromoRow {
    pub id: i64,
    pub code: String,
    #[sqlx(rename = "type")]
    pub promo_type: String,
    pub value: BigDecimal,
    pub min_threshold: BigDecimal,
    pub max_discount: Option<BigDecimal>,
    pub currency: Option<String>,
    pub usage_limit_global: i64,
    pub usage_limit_per_user: i64,
    pub usage_count: i64,
    pub total_discount_utilized: BigDecimal,
    pub budget_limit: BigDecimal,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: String,
    pub restrictions: Json<Restrictions>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<PromoRow> for PromoCode {
    type Error = AppError;

    fn try_from(row: PromoRow) -> Result<Self, Self::Error> {
        Ok(PromoCode {
            id: PromoId(row.id),
            code: row.code,
            promo_type: parse_column("promo_codes", &row.promo_type)?,
            value: row.value,
            min_threshold: row.min_threshold,
            max_discount: row.max_discount,
            currency: row.currency,
            usage_limit_global: limit_column("usage_limit_global", row.usage_limit_global)?,
            usage_limit_per_user: limit_column("usage_limit_per_user", row.usage_limit_per_user)?,
            usage_count: row.usage_count,
            total_discount_utilized: row.total_discount_utilized,
            budget_limit: limit_column("budget_limit", row.budget_limit)?,
            start_date: row.start_date,
            end_date: row.end_date,
            status: parse_column("promo_codes", &row.status)?,
            restrictions: row.restrictions.0,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct RedemptionRow {
    pub id: Uuid,
    pub promo_code_id: i64,
    pub code: String,
    pub transaction_id: String,
    pub user_id: String,
    pub discount_amount: BigDecimal,
    pub created_at: DateTime<Utc>,
}

impl From<RedemptionRow> for PromoRedemption {
    fn from(row: RedemptionRow) -> Self {
        PromoRedemption {
            id: row.id,
            promo_id: PromoId(row.promo_code_id),
            code: row.code,
            transaction_id: row.transaction_id,
            user_id: row.user_id,
            discount_amount: row.discount_amount,
            created_at: row.created_at,
        }
    }
}
