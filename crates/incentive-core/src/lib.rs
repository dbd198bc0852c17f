//! Domain model for the incentive program: the credit ledger, bonus schemes,
//! user segments and promo codes.
//!
//! Everything here is pure. Loading and persisting state is the job of the
//! server crate; this crate decides what a given state means.

#[macro_use]
mod macros;

pub mod error;
pub mod idempotency;
pub mod ids;
pub mod ledger;
pub mod money;
pub mod promo;
pub mod scheme;
pub mod segment;

pub use error::{DefinitionError, RuleViolation};
pub use idempotency::IdempotencyKey;
pub use ids::{PromoId, SchemeId, SegmentId};
pub use ledger::{
    CreditEventType, CreditLedgerEntry, HistoryFilter, HistoryRow, HistorySource, LedgerScope,
    NewCreditLedgerEntry,
};
pub use money::Limit;
pub use promo::{PromoCode, PromoDraft, PromoRedemption, PromoStatus, PromoType};
pub use scheme::{BonusScheme, Commission, SchemeDefinition, SchemeDraft, SchemeStatus, TierTable};
pub use segment::{SegmentCriteria, TransactionStats, UserSegment};
