//! In-process store used for local runs and HTTP tests.
//!
//! One mutex serialises units of work. Each unit of work edits a private
//! copy of the state, which replaces the shared state on commit.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, Utc};
use incentive_core::ledger::{
    balance_of, CreditEventType, CreditLedgerEntry, HistoryFilter, LedgerScope,
    NewCreditLedgerEntry,
};
use incentive_core::promo::{PromoCode, PromoDraft, PromoRedemption, PromoStatus};
use incentive_core::scheme::{BonusScheme, SchemeDefinition, SchemeStatus};
use incentive_core::segment::{SegmentDraft, TransactionStats, UserSegment};
use incentive_core::{PromoId, SchemeId, SegmentId};
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{
    ActivityReader, ExternalTransaction, IncentiveStore, LedgerRepository, LedgerRow,
    PromoRepository, SchemeRepository, SegmentRepository, UnitOfWork,
};
use crate::error::AppError;

#[derive(Debug, Clone, Default)]
struct MemoryState {
    ledger: Vec<CreditLedgerEntry>,
    schemes: BTreeMap<SchemeId, BonusScheme>,
    segments: BTreeMap<SegmentId, UserSegment>,
    promos: BTreeMap<PromoId, PromoCode>,
    redemptions: Vec<PromoRedemption>,
    transactions: Vec<ExternalTransaction>,
    merchants: HashMap<String, DateTime<Utc>>,
    last_scheme_id: i64,
    last_segment_id: i64,
    last_promo_id: i64,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a transaction in the external activity feed.
    pub async fn seed_transaction(&self, transaction: ExternalTransaction) {
        self.state.lock().await.transactions.push(transaction);
    }

    /// Records a user's registration date.
    pub async fn seed_merchant(&self, user_id: &str, registered_at: DateTime<Utc>) {
        self.state
            .lock()
            .await
            .merchants
            .insert(user_id.to_string(), registered_at);
    }
}

#[async_trait]
impl IncentiveStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, AppError> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryUnitOfWork { guard, working }))
    }
}

pub struct MemoryUnitOfWork {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

fn newest_first<T, F>(items: &mut [T], created_at: F)
where
    F: Fn(&T) -> DateTime<Utc>,
{
    items.sort_by(|a, b| created_at(b).cmp(&created_at(a)));
}

#[async_trait]
impl LedgerRepository for MemoryUnitOfWork {
    async fn find_entry_by_reference(
        &mut self,
        reference_id: &str,
    ) -> Result<Option<CreditLedgerEntry>, AppError> {
        Ok(self
            .working
            .ledger
            .iter()
            .find(|e| e.reference_id == reference_id)
            .cloned())
    }

    async fn append_entry(
        &mut self,
        entry: NewCreditLedgerEntry,
    ) -> Result<CreditLedgerEntry, AppError> {
        if self
            .working
            .ledger
            .iter()
            .any(|e| e.reference_id == entry.reference_id)
        {
            return Err(AppError::Conflict(format!(
                "Duplicate ledger reference: {}",
                entry.reference_id
            )));
        }
        let entry = entry.into_entry();
        self.working.ledger.push(entry.clone());
        Ok(entry)
    }

    async fn first_earned(
        &mut self,
        user_id: &str,
        scheme_id: SchemeId,
    ) -> Result<Option<CreditLedgerEntry>, AppError> {
        Ok(self
            .working
            .ledger
            .iter()
            .filter(|e| {
                e.user_id == user_id
                    && e.scheme_id == Some(scheme_id)
                    && e.event_type == CreditEventType::Earned
            })
            .min_by_key(|e| e.created_at)
            .cloned())
    }

    async fn ledger_balance(&mut self, scope: &LedgerScope) -> Result<BigDecimal, AppError> {
        Ok(balance_of(
            self.working
                .ledger
                .iter()
                .filter(|e| scope.includes(&e.user_id))
                .map(|e| &e.amount),
        ))
    }

    async fn ledger_history(
        &mut self,
        scope: &LedgerScope,
        filter: &HistoryFilter,
    ) -> Result<Vec<LedgerRow>, AppError> {
        let mut rows: Vec<LedgerRow> = self
            .working
            .ledger
            .iter()
            .filter(|e| scope.includes(&e.user_id) && filter.matches_entry(e))
            .map(|e| LedgerRow {
                entry: e.clone(),
                scheme_name: e
                    .scheme_id
                    .and_then(|id| self.working.schemes.get(&id))
                    .map(|s| s.name().to_string()),
            })
            .collect();
        newest_first(&mut rows, |r| r.entry.created_at);
        Ok(rows)
    }
}

#[async_trait]
impl SchemeRepository for MemoryUnitOfWork {
    async fn list_schemes(&mut self) -> Result<Vec<BonusScheme>, AppError> {
        let mut schemes: Vec<BonusScheme> = self.working.schemes.values().cloned().collect();
        newest_first(&mut schemes, |s| s.created_at);
        Ok(schemes)
    }

    async fn get_scheme(&mut self, id: SchemeId) -> Result<Option<BonusScheme>, AppError> {
        Ok(self.working.schemes.get(&id).cloned())
    }

    async fn insert_scheme(
        &mut self,
        definition: &SchemeDefinition,
    ) -> Result<BonusScheme, AppError> {
        self.working.last_scheme_id += 1;
        let now = Utc::now();
        let scheme = BonusScheme {
            id: SchemeId(self.working.last_scheme_id),
            definition: definition.clone(),
            created_at: now,
            updated_at: now,
        };
        self.working.schemes.insert(scheme.id, scheme.clone());
        Ok(scheme)
    }

    async fn update_scheme(
        &mut self,
        id: SchemeId,
        definition: &SchemeDefinition,
    ) -> Result<Option<BonusScheme>, AppError> {
        Ok(self.working.schemes.get_mut(&id).map(|scheme| {
            scheme.definition = definition.clone();
            scheme.updated_at = Utc::now();
            scheme.clone()
        }))
    }

    async fn set_scheme_status(
        &mut self,
        id: SchemeId,
        status: SchemeStatus,
    ) -> Result<bool, AppError> {
        match self.working.schemes.get_mut(&id) {
            Some(scheme) => {
                scheme.definition.status = status;
                scheme.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl SegmentRepository for MemoryUnitOfWork {
    async fn list_segments(&mut self) -> Result<Vec<UserSegment>, AppError> {
        let mut segments: Vec<UserSegment> = self.working.segments.values().cloned().collect();
        newest_first(&mut segments, |s| s.created_at);
        Ok(segments)
    }

    async fn get_segment(&mut self, id: SegmentId) -> Result<Option<UserSegment>, AppError> {
        Ok(self.working.segments.get(&id).cloned())
    }

    async fn insert_segment(&mut self, draft: &SegmentDraft) -> Result<UserSegment, AppError> {
        self.working.last_segment_id += 1;
        let segment = UserSegment {
            id: SegmentId(self.working.last_segment_id),
            name: draft.name.trim().to_string(),
            description: draft.description.clone(),
            criteria: draft.criteria.clone(),
            created_at: Utc::now(),
        };
        self.working.segments.insert(segment.id, segment.clone());
        Ok(segment)
    }

    async fn update_segment(
        &mut self,
        id: SegmentId,
        draft: &SegmentDraft,
    ) -> Result<Option<UserSegment>, AppError> {
        Ok(self.working.segments.get_mut(&id).map(|segment| {
            segment.name = draft.name.trim().to_string();
            segment.description = draft.description.clone();
            segment.criteria = draft.criteria.clone();
            segment.clone()
        }))
    }

    async fn delete_segment(&mut self, id: SegmentId) -> Result<bool, AppError> {
        Ok(self.working.segments.remove(&id).is_some())
    }
}

#[async_trait]
impl PromoRepository for MemoryUnitOfWork {
    async fn list_promos(&mut self) -> Result<Vec<PromoCode>, AppError> {
        let mut promos: Vec<PromoCode> = self.working.promos.values().cloned().collect();
        newest_first(&mut promos, |p| p.created_at);
        Ok(promos)
    }

    async fn find_promo_by_code(
        &mut self,
        code: &str,
        _for_update: bool,
    ) -> Result<Option<PromoCode>, AppError> {
        Ok(self
            .working
            .promos
            .values()
            .find(|p| p.code == code)
            .cloned())
    }

    async fn insert_promo(&mut self, draft: &PromoDraft) -> Result<Option<PromoCode>, AppError> {
        if self.working.promos.values().any(|p| p.code == draft.code) {
            return Ok(None);
        }
        self.working.last_promo_id += 1;
        let promo = PromoCode::from_draft(
            PromoId(self.working.last_promo_id),
            draft.clone(),
            Utc::now(),
        );
        self.working.promos.insert(promo.id, promo.clone());
        Ok(Some(promo))
    }

    async fn save_promo_counters(&mut self, promo: &PromoCode) -> Result<(), AppError> {
        let stored = self
            .working
            .promos
            .get_mut(&promo.id)
            .ok_or_else(|| AppError::NotFound("Promo code not found".to_string()))?;
        stored.usage_count = promo.usage_count;
        stored.total_discount_utilized = promo.total_discount_utilized.clone();
        Ok(())
    }

    async fn set_promo_status(
        &mut self,
        id: PromoId,
        status: PromoStatus,
    ) -> Result<bool, AppError> {
        match self.working.promos.get_mut(&id) {
            Some(promo) => {
                promo.status = status;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn count_user_redemptions(
        &mut self,
        promo_id: PromoId,
        user_id: &str,
    ) -> Result<i64, AppError> {
        Ok(self
            .working
            .redemptions
            .iter()
            .filter(|r| r.promo_id == promo_id && r.user_id == user_id)
            .count() as i64)
    }

    async fn insert_redemption(&mut self, redemption: &PromoRedemption) -> Result<(), AppError> {
        if self.working.redemptions.iter().any(|r| {
            r.promo_id == redemption.promo_id && r.transaction_id == redemption.transaction_id
        }) {
            return Err(AppError::Conflict(format!(
                "Transaction {} already redeemed this code",
                redemption.transaction_id
            )));
        }
        self.working.redemptions.push(redemption.clone());
        Ok(())
    }

    async fn redemption_history(
        &mut self,
        scope: &LedgerScope,
        filter: &HistoryFilter,
    ) -> Result<Vec<PromoRedemption>, AppError> {
        let mut rows: Vec<PromoRedemption> = self
            .working
            .redemptions
            .iter()
            .filter(|r| scope.includes(&r.user_id) && r.matches(filter))
            .cloned()
            .collect();
        newest_first(&mut rows, |r| r.created_at);
        Ok(rows)
    }
}

#[async_trait]
impl ActivityReader for MemoryUnitOfWork {
    async fn transaction_stats(
        &mut self,
        user_id: &str,
        since: Option<DateTime<Utc>>,
        currency: Option<&str>,
    ) -> Result<TransactionStats, AppError> {
        let matching = self.working.transactions.iter().filter(|t| {
            t.user_id == user_id
                && since.map_or(true, |since| t.debit_date >= since)
                && currency.map_or(true, |c| t.currency.eq_ignore_ascii_case(c))
        });
        let mut stats = TransactionStats::new(0, BigDecimal::zero());
        for t in matching {
            stats.count += 1;
            stats.volume += &t.amount;
        }
        Ok(stats)
    }

    async fn transaction_amount(
        &mut self,
        transaction_id: &str,
    ) -> Result<Option<BigDecimal>, AppError> {
        Ok(self
            .working
            .transactions
            .iter()
            .find(|t| t.id == transaction_id)
            .map(|t| t.amount.clone()))
    }

    async fn registered_at(&mut self, user_id: &str) -> Result<Option<DateTime<Utc>>, AppError> {
        Ok(self.working.merchants.get(user_id).copied())
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn lock_award(&mut self, _user_id: &str, _scheme_id: SchemeId) -> Result<(), AppError> {
        // The store mutex already serialises every unit of work.
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), AppError> {
        let MemoryUnitOfWork { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}
