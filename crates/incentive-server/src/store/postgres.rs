//! PostgreSQL store. A unit of work is one database transaction.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use incentive_core::ledger::{
    CreditLedgerEntry, HistoryFilter, LedgerScope, NewCreditLedgerEntry,
};
use incentive_core::promo::{PromoCode, PromoDraft, PromoRedemption, PromoStatus};
use incentive_core::scheme::{BonusScheme, SchemeDefinition, SchemeStatus};
use incentive_core::segment::{SegmentDraft, TransactionStats, UserSegment};
use incentive_core::{PromoId, SchemeId, SegmentId};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};

use super::rows::{
    LedgerEntryRow, LedgerHistoryRow, PromoRow, RedemptionRow, SchemeRow, SegmentRow,
};
use super::{
    ActivityReader, IncentiveStore, LedgerRepository, LedgerRow, PromoRepository,
    SchemeRepository, SegmentRepository, UnitOfWork,
};
use crate::error::AppError;

const LEDGER_COLUMNS: &str = "id, user_id, amount, type, scheme_id, reference_id, reason_code, \
                              notes, admin_user, expires_at, created_at";

const FIND_PROMO: &str = "SELECT * FROM promo_codes WHERE code = $1";
const FIND_PROMO_FOR_UPDATE: &str = "SELECT * FROM promo_codes WHERE code = $1 FOR UPDATE";

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IncentiveStore for PgStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, AppError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgUnitOfWork { tx }))
    }
}

pub struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .map_or(false, |db| db.is_unique_violation())
}

#[async_trait]
impl LedgerRepository for PgUnitOfWork {
    async fn find_entry_by_reference(
        &mut self,
        reference_id: &str,
    ) -> Result<Option<CreditLedgerEntry>, AppError> {
        let row: Option<LedgerEntryRow> = sqlx::query_as(&format!(
            "SELECT {} FROM credit_ledger WHERE reference_id = $1",
            LEDGER_COLUMNS
        ))
        .bind(reference_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to look up ledger reference: {}", e)))?;

        row.map(CreditLedgerEntry::try_from).transpose()
    }

    async fn append_entry(
        &mut self,
        entry: NewCreditLedgerEntry,
    ) -> Result<CreditLedgerEntry, AppError> {
        let row: LedgerEntryRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO credit_ledger
                (id, user_id, amount, type, scheme_id, reference_id, reason_code, notes, admin_user, expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING {}
            "#,
            LEDGER_COLUMNS
        ))
        .bind(entry.id)
        .bind(&entry.user_id)
        .bind(&entry.amount)
        .bind(entry.event_type.as_str())
        .bind(entry.scheme_id.map(SchemeId::get))
        .bind(&entry.reference_id)
        .bind(&entry.reason_code)
        .bind(&entry.notes)
        .bind(&entry.admin_user)
        .bind(entry.expires_at)
        .bind(entry.created_at)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Conflict(format!("Duplicate ledger reference: {}", entry.reference_id))
            } else {
                AppError::Internal(format!("Failed to insert ledger entry: {}", e))
            }
        })?;

        row.try_into()
    }

    async fn first_earned(
        &mut self,
        user_id: &str,
        scheme_id: SchemeId,
    ) -> Result<Option<CreditLedgerEntry>, AppError> {
        let row: Option<LedgerEntryRow> = sqlx::query_as(&format!(
            r#"
            SELECT {}
            FROM credit_ledger
            WHERE user_id = $1 AND scheme_id = $2 AND type = 'EARNED'
            ORDER BY created_at ASC
            LIMIT 1
            "#,
            LEDGER_COLUMNS
        ))
        .bind(user_id)
        .bind(scheme_id.get())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to check prior awards: {}", e)))?;

        row.map(CreditLedgerEntry::try_from).transpose()
    }

    async fn ledger_balance(&mut self, scope: &LedgerScope) -> Result<BigDecimal, AppError> {
        let balance: BigDecimal = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(amount), 0)
            FROM credit_ledger
            WHERE ($1::text IS NULL OR user_id = $1)
            "#,
        )
        .bind(scope.user_id())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to compute balance: {}", e)))?;

        Ok(balance)
    }

    async fn ledger_history(
        &mut self,
        scope: &LedgerScope,
        filter: &HistoryFilter,
    ) -> Result<Vec<LedgerRow>, AppError> {
        let rows: Vec<LedgerHistoryRow> = sqlx::query_as(
            r#"
            SELECT l.id, l.user_id, l.amount, l.type, l.scheme_id, l.reference_id,
                   l.reason_code, l.notes, l.admin_user, l.expires_at, l.created_at,
                   s.name AS scheme_name
            FROM credit_ledger l
            LEFT JOIN bonus_schemes s ON s.id = l.scheme_id
            WHERE ($1::text IS NULL OR l.user_id = $1)
              AND ($2::date IS NULL OR (l.created_at AT TIME ZONE 'UTC')::date >= $2)
              AND ($3::date IS NULL OR (l.created_at AT TIME ZONE 'UTC')::date <= $3)
              AND ($4::text IS NULL OR l.type = $4)
              AND ($5::bigint IS NULL OR l.scheme_id = $5)
            ORDER BY l.created_at DESC
            "#,
        )
        .bind(scope.user_id())
        .bind(filter.start_date)
        .bind(filter.end_date)
        .bind(filter.event_type.map(|t| t.as_str()))
        .bind(filter.scheme_id.map(SchemeId::get))
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to load ledger history: {}", e)))?;

        rows.into_iter().map(LedgerRow::try_from).collect()
    }
}

#[async_trait]
impl SchemeRepository for PgUnitOfWork {
    async fn list_schemes(&mut self) -> Result<Vec<BonusScheme>, AppError> {
        let rows: Vec<SchemeRow> =
            sqlx::query_as("SELECT * FROM bonus_schemes ORDER BY created_at DESC, id DESC")
                .fetch_all(&mut *self.tx)
                .await
                .map_err(|e| AppError::Internal(format!("Failed to list bonus schemes: {}", e)))?;

        rows.into_iter().map(BonusScheme::try_from).collect()
    }

    async fn get_scheme(&mut self, id: SchemeId) -> Result<Option<BonusScheme>, AppError> {
        let row: Option<SchemeRow> = sqlx::query_as("SELECT * FROM bonus_schemes WHERE id = $1")
            .bind(id.get())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to load bonus scheme: {}", e)))?;

        row.map(BonusScheme::try_from).transpose()
    }

    async fn insert_scheme(
        &mut self,
        definition: &SchemeDefinition,
    ) -> Result<BonusScheme, AppError> {
        let d = definition.to_draft();
        let row: SchemeRow = sqlx::query_as(
            r#"
            INSERT INTO bonus_schemes
                (name, bonus_type, credit_amount, currency, commission_type, commission_percentage,
                 is_tiered, tiers, min_transactions, time_period_days, min_transaction_threshold,
                 eligibility_rules, start_date, end_date, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            RETURNING *
            "#,
        )
        .bind(&d.name)
        .bind(d.bonus_type.as_str())
        .bind(&d.credit_amount)
        .bind(&d.currency)
        .bind(d.commission_type.as_str())
        .bind(&d.commission_percentage)
        .bind(d.is_tiered)
        .bind(Json(&d.tiers))
        .bind(d.min_transactions)
        .bind(d.time_period_days)
        .bind(&d.min_transaction_threshold)
        .bind(Json(&d.eligibility_rules))
        .bind(d.start_date)
        .bind(d.end_date)
        .bind(d.status.as_str())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to insert bonus scheme: {}", e)))?;

        row.try_into()
    }

    async fn update_scheme(
        &mut self,
        id: SchemeId,
        definition: &SchemeDefinition,
    ) -> Result<Option<BonusScheme>, AppError> {
        let d = definition.to_draft();
        let row: Option<SchemeRow> = sqlx::query_as(
            r#"
            UPDATE bonus_schemes SET
                name = $2, bonus_type = $3, credit_amount = $4, currency = $5,
                commission_type = $6, commission_percentage = $7, is_tiered = $8, tiers = $9,
                min_transactions = $10, time_period_days = $11, min_transaction_threshold = $12,
                eligibility_rules = $13, start_date = $14, end_date = $15, status = $16,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id.get())
        .bind(&d.name)
        .bind(d.bonus_type.as_str())
        .bind(&d.credit_amount)
        .bind(&d.currency)
        .bind(d.commission_type.as_str())
        .bind(&d.commission_percentage)
        .bind(d.is_tiered)
        .bind(Json(&d.tiers))
        .bind(d.min_transactions)
        .bind(d.time_period_days)
        .bind(&d.min_transaction_threshold)
        .bind(Json(&d.eligibility_rules))
        .bind(d.start_date)
        .bind(d.end_date)
        .bind(d.status.as_str())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to update bonus scheme: {}", e)))?;

        row.map(BonusScheme::try_from).transpose()
    }

    async fn set_scheme_status(
        &mut self,
        id: SchemeId,
        status: SchemeStatus,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE bonus_schemes SET status = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id.get())
        .bind(status.as_str())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to update scheme status: {}", e)))?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl SegmentRepository for PgUnitOfWork {
    async fn list_segments(&mut self) -> Result<Vec<UserSegment>, AppError> {
        let rows: Vec<SegmentRow> =
            sqlx::query_as("SELECT * FROM user_segments ORDER BY created_at DESC, id DESC")
                .fetch_all(&mut *self.tx)
                .await
                .map_err(|e| AppError::Internal(format!("Failed to list segments: {}", e)))?;

        Ok(rows.into_iter().map(UserSegment::from).collect())
    }

    async fn get_segment(&mut self, id: SegmentId) -> Result<Option<UserSegment>, AppError> {
        let row: Option<SegmentRow> = sqlx::query_as("SELECT * FROM user_segments WHERE id = $1")
            .bind(id.get())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to load segment: {}", e)))?;

        Ok(row.map(UserSegment::from))
    }

    async fn insert_segment(&mut self, draft: &SegmentDraft) -> Result<UserSegment, AppError> {
        let row: SegmentRow = sqlx::query_as(
            r#"
            INSERT INTO user_segments (name, description, criteria)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(draft.name.trim())
        .bind(&draft.description)
        .bind(Json(&draft.criteria))
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to insert segment: {}", e)))?;

        Ok(row.into())
    }

    async fn update_segment(
        &mut self,
        id: SegmentId,
        draft: &SegmentDraft,
    ) -> Result<Option<UserSegment>, AppError> {
        let row: Option<SegmentRow> = sqlx::query_as(
            r#"
            UPDATE user_segments SET name = $2, description = $3, criteria = $4
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id.get())
        .bind(draft.name.trim())
        .bind(&draft.description)
        .bind(Json(&draft.criteria))
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to update segment: {}", e)))?;

        Ok(row.map(UserSegment::from))
    }

    async fn delete_segment(&mut self, id: SegmentId) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM user_segments WHERE id = $1")
            .bind(id.get())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to delete segment: {}", e)))?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl PromoRepository for PgUnitOfWork {
    async fn list_promos(&mut self) -> Result<Vec<PromoCode>, AppError> {
        let rows: Vec<PromoRow> =
            sqlx::query_as("SELECT * FROM promo_codes ORDER BY created_at DESC, id DESC")
                .fetch_all(&mut *self.tx)
                .await
                .map_err(|e| AppError::Internal(format!("Failed to list promo codes: {}", e)))?;

        rows.into_iter().map(PromoCode::try_from).collect()
    }

    async fn find_promo_by_code(
        &mut self,
        code: &str,
        for_update: bool,
    ) -> Result<Option<PromoCode>, AppError> {
        let sql = if for_update { FIND_PROMO_FOR_UPDATE } else { FIND_PROMO };
        let row: Option<PromoRow> = sqlx::query_as(sql)
            .bind(code)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to load promo code: {}", e)))?;

        row.map(PromoCode::try_from).transpose()
    }

    async fn insert_promo(&mut self, draft: &PromoDraft) -> Result<Option<PromoCode>, AppError> {
        let row: Option<PromoRow> = sqlx::query_as(
            r#"
            INSERT INTO promo_codes
                (code, type, value, min_threshold, max_discount, currency,
                 usage_limit_global, usage_limit_per_user, budget_limit,
                 start_date, end_date, status, restrictions)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, 'Active', $12)
            ON CONFLICT (code) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(&draft.code)
        .bind(draft.promo_type.as_str())
        .bind(&draft.value)
        .bind(&draft.min_threshold)
        .bind(&draft.max_discount)
        .bind(&draft.currency)
        .bind(draft.usage_limit_global.to_raw())
        .bind(draft.usage_limit_per_user.to_raw())
        .bind(draft.budget_limit.to_raw())
        .bind(draft.start_date)
        .bind(draft.end_date)
        .bind(Json(&draft.restrictions))
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to insert promo code: {}", e)))?;

        row.map(PromoCode::try_from).transpose()
    }

    async fn save_promo_counters(&mut self, promo: &PromoCode) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE promo_codes
            SET usage_count = $2, total_discount_utilized = $3
            WHERE id = $1
            "#,
        )
        .bind(promo.id.get())
        .bind(promo.usage_count)
        .bind(&promo.total_discount_utilized)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to update promo counters: {}", e)))?;

        Ok(())
    }

    async fn set_promo_status(
        &mut self,
        id: PromoId,
        status: PromoStatus,
    ) -> Result<bool, AppError> {
        let result = sqlx::query("UPDATE promo_codes SET status = $2 WHERE id = $1")
            .bind(id.get())
            .bind(status.as_str())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to update promo status: {}", e)))?;

        Ok(result.rows_affected() > 0)
    }

    async fn count_user_redemptions(
        &mut self,
        promo_id: PromoId,
        user_id: &str,
    ) -> Result<i64, AppError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM promo_redemptions WHERE promo_code_id = $1 AND user_id = $2",
        )
        .bind(promo_id.get())
        .bind(user_id)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to count redemptions: {}", e)))?;

        Ok(count)
    }

    async fn insert_redemption(&mut self, redemption: &PromoRedemption) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO promo_redemptions
                (id, promo_code_id, code, transaction_id, user_id, discount_amount, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(redemption.id)
        .bind(redemption.promo_id.get())
        .bind(&redemption.code)
        .bind(&redemption.transaction_id)
        .bind(&redemption.user_id)
        .bind(&redemption.discount_amount)
        .bind(redemption.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Conflict(format!(
                    "Transaction {} already redeemed this code",
                    redemption.transaction_id
                ))
            } else {
                AppError::Internal(format!("Failed to record redemption: {}", e))
            }
        })?;

        Ok(())
    }

    async fn redemption_history(
        &mut self,
        scope: &LedgerScope,
        filter: &HistoryFilter,
    ) -> Result<Vec<PromoRedemption>, AppError> {
        let rows: Vec<RedemptionRow> = sqlx::query_as(
            r#"
            SELECT id, promo_code_id, code, transaction_id, user_id, discount_amount, created_at
            FROM promo_redemptions
            WHERE ($1::text IS NULL OR user_id = $1)
              AND ($2::date IS NULL OR (created_at AT TIME ZONE 'UTC')::date >= $2)
              AND ($3::date IS NULL OR (created_at AT TIME ZONE 'UTC')::date <= $3)
              AND ($4::bigint IS NULL OR promo_code_id = $4)
            ORDER BY created_at DESC
            "#,
        )
        .bind(scope.user_id())
        .bind(filter.start_date)
        .bind(filter.end_date)
        .bind(filter.promo_id.map(PromoId::get))
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to load promo redemptions: {}", e)))?;

        Ok(rows.into_iter().map(PromoRedemption::from).collect())
    }
}

#[async_trait]
impl ActivityReader for PgUnitOfWork {
    async fn transaction_stats(
        &mut self,
        user_id: &str,
        since: Option<DateTime<Utc>>,
        currency: Option<&str>,
    ) -> Result<TransactionStats, AppError> {
        let (count, volume): (i64, BigDecimal) = sqlx::query_as(
            r#"
            SELECT COUNT(*), COALESCE(SUM(amount_debit), 0)
            FROM transactions
            WHERE merchant_id = $1
              AND ($2::timestamptz IS NULL OR debit_date >= $2)
              AND ($3::text IS NULL OR UPPER(currency) = UPPER($3))
            "#,
        )
        .bind(user_id)
        .bind(since)
        .bind(currency)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to aggregate transactions: {}", e)))?;

        Ok(TransactionStats::new(count.max(0) as u64, volume))
    }

    async fn transaction_amount(
        &mut self,
        transaction_id: &str,
    ) -> Result<Option<BigDecimal>, AppError> {
        let amount: Option<BigDecimal> =
            sqlx::query_scalar("SELECT amount_debit FROM transactions WHERE id = $1")
                .bind(transaction_id)
                .fetch_optional(&mut *self.tx)
                .await
                .map_err(|e| AppError::Internal(format!("Failed to load transaction: {}", e)))?;

        Ok(amount)
    }

    async fn registered_at(&mut self, user_id: &str) -> Result<Option<DateTime<Utc>>, AppError> {
        let created_at: Option<DateTime<Utc>> =
            sqlx::query_scalar("SELECT created_at FROM merchants WHERE id = $1")
                .bind(user_id)
                .fetch_optional(&mut *self.tx)
                .await
                .map_err(|e| AppError::Internal(format!("Failed to load merchant: {}", e)))?;

        Ok(created_at)
    }
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn lock_award(&mut self, user_id: &str, scheme_id: SchemeId) -> Result<(), AppError> {
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(format!("award:{}:{}", user_id, scheme_id))
            .execute(&mut *self.tx)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to acquire award lock: {}", e)))?;

        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), AppError> {
        self.tx
            .commit()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to commit transaction: {}", e)))
    }
}
