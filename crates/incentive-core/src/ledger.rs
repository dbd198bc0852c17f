//! Append-only credit ledger types and the folds computed over them.

use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DefinitionError;
use crate::ids::{PromoId, SchemeId};
use crate::money::is_positive;

/// Days an earned bonus credit stays spendable.
pub const CREDIT_EXPIRY_DAYS: i64 = 90;

/// Admin recorded on entries written by the award pipeline.
pub const SYSTEM_ADMIN: &str = "System";

text_enum! {
    /// Kinds of credit ledger events.
    pub enum CreditEventType ("event type") {
        /// Credit granted to the user (bonus award or goodwill).
        Earned => "EARNED",
        /// Credit spent against a transfer.
        Applied => "APPLIED",
        /// Unused credit that lapsed.
        Expired => "EXPIRED",
        /// Credit reversed by an administrator.
        Voided => "VOIDED",
    }
}

impl CreditEventType {
    /// Earned entries add to the balance; every other kind draws it down.
    pub fn is_credit(&self) -> bool {
        matches!(self, CreditEventType::Earned)
    }
}

/// An immutable ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditLedgerEntry {
    pub id: Uuid,
    pub user_id: String,
    /// Signed amount: positive for credits, negative for debits.
    pub amount: BigDecimal,
    #[serde(rename = "type")]
    pub event_type: CreditEventType,
    /// Scheme that produced the entry; `None` for manual adjustments.
    pub scheme_id: Option<SchemeId>,
    /// Idempotency anchor; unique across the ledger.
    pub reference_id: String,
    pub reason_code: Option<String>,
    pub notes: Option<String>,
    pub admin_user: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Data required to append a ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCreditLedgerEntry {
    pub id: Uuid,
    pub user_id: String,
    pub amount: BigDecimal,
    pub event_type: CreditEventType,
    pub scheme_id: Option<SchemeId>,
    pub reference_id: String,
    pub reason_code: Option<String>,
    pub notes: Option<String>,
    pub admin_user: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl NewCreditLedgerEntry {
    /// An `EARNED` entry written by the award pipeline. It expires
    /// [`CREDIT_EXPIRY_DAYS`] after `created_at`.
    pub fn earned(
        id: Uuid,
        user_id: String,
        amount: BigDecimal,
        scheme_id: SchemeId,
        reference_id: String,
        admin_user: String,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            user_id,
            amount,
            event_type: CreditEventType::Earned,
            scheme_id: Some(scheme_id),
            reference_id,
            reason_code: None,
            notes: None,
            admin_user,
            expires_at: Some(credit_expiry(created_at)),
            created_at,
        }
    }

    /// A manual adjustment recorded by an administrator.
    #[allow(clippy::too_many_arguments)]
    pub fn manual(
        id: Uuid,
        user_id: String,
        amount: BigDecimal,
        event_type: CreditEventType,
        scheme_id: Option<SchemeId>,
        reference_id: String,
        reason_code: String,
        notes: String,
        admin_user: String,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            user_id,
            amount,
            event_type,
            scheme_id,
            reference_id,
            reason_code: Some(reason_code),
            notes: Some(notes),
            admin_user,
            expires_at: None,
            created_at,
        }
    }

    /// Materialises the entry as stored.
    pub fn into_entry(self) -> CreditLedgerEntry {
        CreditLedgerEntry {
            id: self.id,
            user_id: self.user_id,
            amount: self.amount,
            event_type: self.event_type,
            scheme_id: self.scheme_id,
            reference_id: self.reference_id,
            reason_code: self.reason_code,
            notes: self.notes,
            admin_user: self.admin_user,
            expires_at: self.expires_at,
            created_at: self.created_at,
        }
    }
}

/// Expiry stamped on a credit earned at `now`.
pub fn credit_expiry(now: DateTime<Utc>) -> DateTime<Utc> {
    now + Duration::days(CREDIT_EXPIRY_DAYS)
}

/// Checks that a manual adjustment's sign agrees with its event type.
pub fn check_adjustment_sign(
    event_type: CreditEventType,
    amount: &BigDecimal,
) -> Result<(), DefinitionError> {
    if amount.is_zero() {
        return Err(DefinitionError::InvalidValue {
            field: "amount",
            reason: "must not be zero".to_string(),
        });
    }
    let positive = is_positive(amount);
    if event_type.is_credit() != positive {
        let expected = if event_type.is_credit() { "positive" } else { "negative" };
        return Err(DefinitionError::InvalidValue {
            field: "amount",
            reason: format!("{} entries must carry a {} amount", event_type, expected),
        });
    }
    Ok(())
}

/// Whose ledger a query covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerScope {
    User(String),
    /// Every user: the global liability view.
    All,
}

impl LedgerScope {
    /// Parses a path segment; `all` (any case) selects every user.
    pub fn from_path(segment: &str) -> Self {
        if segment.eq_ignore_ascii_case("all") {
            LedgerScope::All
        } else {
            LedgerScope::User(segment.to_string())
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        match self {
            LedgerScope::User(user_id) => Some(user_id),
            LedgerScope::All => None,
        }
    }

    pub fn includes(&self, user_id: &str) -> bool {
        match self {
            LedgerScope::User(scope) => scope == user_id,
            LedgerScope::All => true,
        }
    }
}

/// Filters applied to ledger history.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryFilter {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub event_type: Option<CreditEventType>,
    pub scheme_id: Option<SchemeId>,
    pub promo_id: Option<PromoId>,
}

impl HistoryFilter {
    /// Whether bonus-ledger rows can match this filter.
    pub fn includes_ledger_rows(&self) -> bool {
        self.promo_id.is_none()
    }

    /// Whether promo redemption rows can match this filter.
    pub fn includes_redemptions(&self) -> bool {
        self.scheme_id.is_none()
            && matches!(self.event_type, None | Some(CreditEventType::Applied))
    }

    /// Inclusive calendar-date window check on a timestamp.
    pub fn date_matches(&self, at: DateTime<Utc>) -> bool {
        let day = at.date_naive();
        self.start_date.map_or(true, |start| day >= start)
            && self.end_date.map_or(true, |end| day <= end)
    }

    /// Full match for a ledger entry.
    pub fn matches_entry(&self, entry: &CreditLedgerEntry) -> bool {
        self.includes_ledger_rows()
            && self.date_matches(entry.created_at)
            && self.event_type.map_or(true, |t| t == entry.event_type)
            && self.scheme_id.map_or(true, |id| entry.scheme_id == Some(id))
    }
}

/// Where a history row came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HistorySource {
    Bonus,
    Promo,
}

/// One row of the unified ledger history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRow {
    pub id: Uuid,
    pub user_id: String,
    pub amount: BigDecimal,
    #[serde(rename = "type")]
    pub event_type: CreditEventType,
    pub source_type: HistorySource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheme_id: Option<SchemeId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub promo_id: Option<PromoId>,
    pub scheme_name: Option<String>,
    pub reference_id: String,
    pub reason_code: Option<String>,
    pub notes: Option<String>,
    pub admin_user: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl HistoryRow {
    /// History row for a bonus-ledger entry.
    pub fn from_entry(entry: CreditLedgerEntry, scheme_name: Option<String>) -> Self {
        Self {
            id: entry.id,
            user_id: entry.user_id,
            amount: entry.amount,
            event_type: entry.event_type,
            source_type: HistorySource::Bonus,
            scheme_id: entry.scheme_id,
            promo_id: None,
            scheme_name,
            reference_id: entry.reference_id,
            reason_code: entry.reason_code,
            notes: entry.notes,
            admin_user: entry.admin_user,
            expires_at: entry.expires_at,
            created_at: entry.created_at,
        }
    }
}

/// Σ amount: the balance implied by a set of entries.
pub fn balance_of<'a, I>(amounts: I) -> BigDecimal
where
    I: IntoIterator<Item = &'a BigDecimal>,
{
    amounts
        .into_iter()
        .fold(BigDecimal::zero(), |acc, amount| acc + amount)
}

/// Σ |amount| over a result set: gross exposure, not liability.
pub fn cost_incurred(rows: &[HistoryRow]) -> BigDecimal {
    rows.iter()
        .fold(BigDecimal::zero(), |acc, row| acc + row.amount.abs())
}

/// Merges ledger and promo rows, newest first.
pub fn merge_history(mut ledger: Vec<HistoryRow>, promos: Vec<HistoryRow>) -> Vec<HistoryRow> {
    ledger.extend(promos);
    ledger.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    ledger
}
