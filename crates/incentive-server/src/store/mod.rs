//! Storage seam.
//!
//! Every engine operation runs inside one [`UnitOfWork`]: it sees a single
//! consistent view of the data and its writes become visible together on
//! [`UnitOfWork::commit`]. Dropping a unit of work without committing
//! discards its writes.

pub mod memory;
pub mod postgres;
mod rows;

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use incentive_core::ledger::{CreditLedgerEntry, HistoryFilter, LedgerScope, NewCreditLedgerEntry};
use incentive_core::promo::{PromoCode, PromoDraft, PromoRedemption, PromoStatus};
use incentive_core::scheme::{BonusScheme, SchemeDefinition, SchemeStatus};
use incentive_core::segment::{SegmentDraft, TransactionStats, UserSegment};
use incentive_core::{PromoId, SchemeId, SegmentId};

use crate::error::AppError;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// A ledger entry together with the name of the scheme it references.
#[derive(Debug, Clone)]
pub struct LedgerRow {
    pub entry: CreditLedgerEntry,
    pub scheme_name: Option<String>,
}

#[async_trait]
pub trait LedgerRepository: Send {
    async fn find_entry_by_reference(
        &mut self,
        reference_id: &str,
    ) -> Result<Option<CreditLedgerEntry>, AppError>;

    /// Appends an entry. Fails with [`AppError::Conflict`] when the
    /// `reference_id` is already taken.
    async fn append_entry(
        &mut self,
        entry: NewCreditLedgerEntry,
    ) -> Result<CreditLedgerEntry, AppError>;

    /// Earliest `EARNED` entry for the pair, if any.
    async fn first_earned(
        &mut self,
        user_id: &str,
        scheme_id: SchemeId,
    ) -> Result<Option<CreditLedgerEntry>, AppError>;

    /// Σ amount over every entry in scope.
    async fn ledger_balance(&mut self, scope: &LedgerScope) -> Result<BigDecimal, AppError>;

    /// Entries in scope matching `filter`, newest first.
    async fn ledger_history(
        &mut self,
        scope: &LedgerScope,
        filter: &HistoryFilter,
    ) -> Result<Vec<LedgerRow>, AppError>;
}

#[async_trait]
pub trait SchemeRepository: Send {
    /// Newest first.
    async fn list_schemes(&mut self) -> Result<Vec<BonusScheme>, AppError>;

    async fn get_scheme(&mut self, id: SchemeId) -> Result<Option<BonusScheme>, AppError>;

    async fn insert_scheme(
        &mut self,
        definition: &SchemeDefinition,
    ) -> Result<BonusScheme, AppError>;

    async fn update_scheme(
        &mut self,
        id: SchemeId,
        definition: &SchemeDefinition,
    ) -> Result<Option<BonusScheme>, AppError>;

    /// Returns `false` if no such scheme exists.
    async fn set_scheme_status(
        &mut self,
        id: SchemeId,
        status: SchemeStatus,
    ) -> Result<bool, AppError>;
}

#[async_trait]
pub trait SegmentRepository: Send {
    async fn list_segments(&mut self) -> Result<Vec<UserSegment>, AppError>;

    async fn get_segment(&mut self, id: SegmentId) -> Result<Option<UserSegment>, AppError>;

    async fn insert_segment(&mut self, draft: &SegmentDraft) -> Result<UserSegment, AppError>;

    async fn update_segment(
        &mut self,
        id: SegmentId,
        draft: &SegmentDraft,
    ) -> Result<Option<UserSegment>, AppError>;

    async fn delete_segment(&mut self, id: SegmentId) -> Result<bool, AppError>;
}

#[async_trait]
pub trait PromoRepository: Send {
    /// Newest first.
    async fn list_promos(&mut self) -> Result<Vec<PromoCode>, AppError>;

    /// Looks a code up by its normalised form. With `for_update` the row
    /// stays locked until the unit of work ends.
    async fn find_promo_by_code(
        &mut self,
        code: &str,
        for_update: bool,
    ) -> Result<Option<PromoCode>, AppError>;

    /// Inserts a new active code; `None` if the code string is taken.
    async fn insert_promo(&mut self, draft: &PromoDraft) -> Result<Option<PromoCode>, AppError>;

    /// Persists `usage_count` and `total_discount_utilized`.
    async fn save_promo_counters(&mut self, promo: &PromoCode) -> Result<(), AppError>;

    async fn set_promo_status(&mut self, id: PromoId, status: PromoStatus)
        -> Result<bool, AppError>;

    async fn count_user_redemptions(
        &mut self,
        promo_id: PromoId,
        user_id: &str,
    ) -> Result<i64, AppError>;

    /// Fails with [`AppError::Conflict`] if the transaction already
    /// redeemed this code.
    async fn insert_redemption(&mut self, redemption: &PromoRedemption) -> Result<(), AppError>;

    async fn redemption_history(
        &mut self,
        scope: &LedgerScope,
        filter: &HistoryFilter,
    ) -> Result<Vec<PromoRedemption>, AppError>;
}

/// Read access to the external transaction and merchant tables.
#[async_trait]
pub trait ActivityReader: Send {
    async fn transaction_stats(
        &mut self,
        user_id: &str,
        since: Option<DateTime<Utc>>,
        currency: Option<&str>,
    ) -> Result<TransactionStats, AppError>;

    async fn transaction_amount(
        &mut self,
        transaction_id: &str,
    ) -> Result<Option<BigDecimal>, AppError>;

    async fn registered_at(&mut self, user_id: &str) -> Result<Option<DateTime<Utc>>, AppError>;
}

#[async_trait]
pub trait UnitOfWork:
    LedgerRepository + SchemeRepository + SegmentRepository + PromoRepository + ActivityReader
{
    /// Serialises award attempts for the same user and scheme until the
    /// unit of work ends.
    ///
    /// The lock does not cover idempotency keys. Concurrent requests that
    /// reuse one key for different (user, scheme) pairs are not serialised;
    /// the loser hits the unique `reference_id` and gets a conflict instead
    /// of a replay.
    async fn lock_award(&mut self, user_id: &str, scheme_id: SchemeId) -> Result<(), AppError>;

    async fn commit(self: Box<Self>) -> Result<(), AppError>;
}

#[async_trait]
pub trait IncentiveStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, AppError>;
}

/// A transaction row from the external activity feed.
#[derive(Debug, Clone)]
pub struct ExternalTransaction {
    pub id: String,
    pub user_id: String,
    pub amount: BigDecimal,
    pub currency: String,
    pub debit_date: DateTime<Utc>,
}
