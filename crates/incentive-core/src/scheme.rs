//! Bonus scheme definitions and the commission calculation.
//!
//! Schemes arrive as a flat [`SchemeDraft`] (the shape used on the wire and
//! in storage) and are validated into a [`SchemeDefinition`] whose bonus kind,
//! commission and eligibility rules are tagged variants. Anything that passes
//! `SchemeDefinition::try_from` can be awarded without further shape checks.

use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DefinitionError, RuleViolation};
use crate::ids::{SchemeId, SegmentId};
use crate::money::{is_positive, percent_of, round_money, CapValue};

pub const DEFAULT_CURRENCY: &str = "GBP";

/// Segment list entry that admits every user.
pub const ALL_SEGMENTS: &str = "all";

text_enum! {
    /// What behaviour a scheme rewards.
    pub enum BonusType ("bonus type") {
        LoyaltyCredit => "LOYALTY_CREDIT",
        TransactionThresholdCredit => "TRANSACTION_THRESHOLD_CREDIT",
        RequestMoney => "REQUEST_MONEY",
        ReferralCredit => "REFERRAL_CREDIT",
    }
}

text_enum! {
    /// How a commission value is interpreted.
    #[derive(Default)]
    pub enum CommissionType ("commission type") {
        #[default]
        Fixed => "FIXED",
        Percentage => "PERCENTAGE",
    }
}

text_enum! {
    #[derive(Default)]
    pub enum SchemeStatus ("scheme status") {
        #[default]
        Active => "ACTIVE",
        Inactive => "INACTIVE",
        Expired => "EXPIRED",
        /// Terminal; replaces deletion.
        Archived => "ARCHIVED",
    }
}

/// One commission bracket. `max = None` is unbounded above.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tier {
    pub min: BigDecimal,
    #[serde(default)]
    pub max: Option<BigDecimal>,
    pub value: BigDecimal,
}

impl Tier {
    pub fn contains(&self, amount: &BigDecimal) -> bool {
        amount >= &self.min && self.max.as_ref().map_or(true, |max| amount <= max)
    }
}

/// A non-empty, sorted, non-overlapping list of tiers.
///
/// Neighbouring tiers may share an endpoint; the lower tier then wins.
/// Only the last tier may be unbounded.
#[derive(Debug, Clone, PartialEq)]
pub struct TierTable(Vec<Tier>);

impl TierTable {
    pub fn new(tiers: Vec<Tier>) -> Result<Self, DefinitionError> {
        if tiers.is_empty() {
            return Err(DefinitionError::InvalidTiers(
                "at least one tier is required".to_string(),
            ));
        }
        for (i, tier) in tiers.iter().enumerate() {
            if tier.value.is_negative_value() {
                return Err(DefinitionError::InvalidTiers(format!(
                    "tier {} has a negative value",
                    i + 1
                )));
            }
            if let Some(max) = &tier.max {
                if max < &tier.min {
                    return Err(DefinitionError::InvalidTiers(format!(
                        "tier {} has max {} below min {}",
                        i + 1,
                        max,
                        tier.min
                    )));
                }
            }
        }
        for (i, pair) in tiers.windows(2).enumerate() {
            let (lower, upper) = (&pair[0], &pair[1]);
            match &lower.max {
                None => {
                    return Err(DefinitionError::InvalidTiers(format!(
                        "tier {} is unbounded but is not the last tier",
                        i + 1
                    )))
                }
                Some(max) if max > &upper.min => {
                    return Err(DefinitionError::InvalidTiers(format!(
                        "tier {} overlaps tier {}",
                        i + 1,
                        i + 2
                    )))
                }
                Some(_) => {}
            }
        }
        Ok(Self(tiers))
    }

    /// The first tier whose bracket contains `amount`.
    pub fn find(&self, amount: &BigDecimal) -> Option<&Tier> {
        self.0.iter().find(|tier| tier.contains(amount))
    }

    pub fn tiers(&self) -> &[Tier] {
        &self.0
    }
}

/// How the awarded amount is computed.
#[derive(Debug, Clone, PartialEq)]
pub enum Commission {
    /// A flat credit.
    Fixed { credit_amount: BigDecimal },
    /// A share of the triggering transaction.
    Percentage { percentage: BigDecimal },
    /// Bracketed by the triggering transaction's amount; tier values are
    /// read according to `basis`.
    Tiered {
        basis: CommissionType,
        tiers: TierTable,
    },
}

impl Commission {
    fn label(&self) -> &'static str {
        match self {
            Commission::Fixed { .. } => "fixed",
            Commission::Percentage { .. } => "percentage",
            Commission::Tiered { .. } => "tiered",
        }
    }

    /// Whether computing the amount needs the triggering transaction.
    pub fn needs_transaction(&self) -> bool {
        !matches!(self, Commission::Fixed { .. })
    }

    /// Computes the credit for a transaction of `transaction_amount`.
    pub fn compute(
        &self,
        transaction_amount: Option<&BigDecimal>,
    ) -> Result<BigDecimal, RuleViolation> {
        match self {
            Commission::Fixed { credit_amount } => Ok(round_money(credit_amount)),
            Commission::Percentage { percentage } => {
                let amount = self.require_transaction(transaction_amount)?;
                Ok(percent_of(amount, percentage))
            }
            Commission::Tiered { basis, tiers } => {
                let amount = self.require_transaction(transaction_amount)?;
                let tier = tiers.find(amount).ok_or_else(|| RuleViolation::TierMismatch {
                    amount: amount.clone(),
                })?;
                Ok(match basis {
                    CommissionType::Fixed => round_money(&tier.value),
                    CommissionType::Percentage => percent_of(amount, &tier.value),
                })
            }
        }
    }

    fn require_transaction<'a>(
        &self,
        transaction_amount: Option<&'a BigDecimal>,
    ) -> Result<&'a BigDecimal, RuleViolation> {
        transaction_amount.ok_or(RuleViolation::TransactionRequired(self.label()))
    }
}

/// Bonus type together with the configuration only that type uses.
#[derive(Debug, Clone, PartialEq)]
pub enum BonusKind {
    LoyaltyCredit {
        min_transactions: i32,
        time_period_days: i32,
    },
    TransactionThresholdCredit {
        min_transaction_threshold: Option<BigDecimal>,
    },
    RequestMoney,
    ReferralCredit,
}

impl BonusKind {
    pub fn bonus_type(&self) -> BonusType {
        match self {
            BonusKind::LoyaltyCredit { .. } => BonusType::LoyaltyCredit,
            BonusKind::TransactionThresholdCredit { .. } => BonusType::TransactionThresholdCredit,
            BonusKind::RequestMoney => BonusType::RequestMoney,
            BonusKind::ReferralCredit => BonusType::ReferralCredit,
        }
    }
}

/// Which segments gate a scheme.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegmentSelector {
    /// No gate: every user qualifies.
    All,
    /// The user must match at least one of these segments.
    Any(Vec<SegmentId>),
}

/// A segment reference as written by clients: a numeric id, a numeric
/// string, or the `all` sentinel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SegmentRef {
    Id(i64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EligibilityDraft {
    #[serde(default)]
    pub segments: Vec<SegmentRef>,
    #[serde(default = "default_true", alias = "oneTimeOnly")]
    pub one_time_only: bool,
}

fn default_true() -> bool {
    true
}

impl Default for EligibilityDraft {
    fn default() -> Self {
        Self {
            segments: Vec::new(),
            one_time_only: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EligibilityRules {
    pub segments: SegmentSelector,
    pub one_time_only: bool,
}

impl TryFrom<EligibilityDraft> for EligibilityRules {
    type Error = DefinitionError;

    fn try_from(draft: EligibilityDraft) -> Result<Self, Self::Error> {
        let mut ids = Vec::with_capacity(draft.segments.len());
        let mut all = false;
        for segment in draft.segments {
            match segment {
                SegmentRef::Id(id) => ids.push(SegmentId(id)),
                SegmentRef::Text(text) if text.trim().eq_ignore_ascii_case(ALL_SEGMENTS) => {
                    all = true
                }
                SegmentRef::Text(text) => {
                    let id = text.parse::<SegmentId>().map_err(|_| {
                        DefinitionError::InvalidValue {
                            field: "eligibility_rules.segments",
                            reason: format!("\"{}\" is neither a segment id nor \"all\"", text),
                        }
                    })?;
                    ids.push(id);
                }
            }
        }
        let segments = if all || ids.is_empty() {
            SegmentSelector::All
        } else {
            ids.sort();
            ids.dedup();
            SegmentSelector::Any(ids)
        };
        Ok(Self {
            segments,
            one_time_only: draft.one_time_only,
        })
    }
}

impl From<&EligibilityRules> for EligibilityDraft {
    fn from(rules: &EligibilityRules) -> Self {
        let segments = match &rules.segments {
            SegmentSelector::All => vec![SegmentRef::Text(ALL_SEGMENTS.to_string())],
            SegmentSelector::Any(ids) => ids.iter().map(|id| SegmentRef::Id(id.get())).collect(),
        };
        Self {
            segments,
            one_time_only: rules.one_time_only,
        }
    }
}

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

/// Flat scheme fields as sent by administrators and stored in the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemeDraft {
    #[serde(default)]
    pub name: String,
    pub bonus_type: BonusType,
    #[serde(default)]
    pub credit_amount: BigDecimal,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default)]
    pub commission_type: CommissionType,
    #[serde(default)]
    pub commission_percentage: Option<BigDecimal>,
    #[serde(default)]
    pub is_tiered: bool,
    #[serde(default)]
    pub tiers: Vec<Tier>,
    #[serde(default)]
    pub min_transactions: Option<i32>,
    #[serde(default)]
    pub time_period_days: Option<i32>,
    #[serde(default)]
    pub min_transaction_threshold: Option<BigDecimal>,
    #[serde(default)]
    pub eligibility_rules: EligibilityDraft,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default)]
    pub status: SchemeStatus,
}

/// A validated scheme.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemeDefinition {
    pub name: String,
    pub kind: BonusKind,
    pub currency: String,
    pub commission: Commission,
    pub eligibility: EligibilityRules,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: SchemeStatus,
}

impl TryFrom<SchemeDraft> for SchemeDefinition {
    type Error = DefinitionError;

    fn try_from(draft: SchemeDraft) -> Result<Self, Self::Error> {
        let name = draft.name.trim().to_string();
        if name.is_empty() {
            return Err(DefinitionError::Missing("Scheme name"));
        }
        if draft.start_date >= draft.end_date {
            return Err(DefinitionError::InvalidDateRange);
        }

        let kind = match draft.bonus_type {
            BonusType::LoyaltyCredit => {
                let min_transactions = draft.min_transactions.unwrap_or(0);
                if min_transactions <= 0 {
                    return Err(DefinitionError::InvalidValue {
                        field: "min_transactions",
                        reason: "Minimum Transactions must be greater than 0".to_string(),
                    });
                }
                let time_period_days = draft.time_period_days.unwrap_or(0);
                if time_period_days <= 0 {
                    return Err(DefinitionError::InvalidValue {
                        field: "time_period_days",
                        reason: "Time Period must be greater than 0 days".to_string(),
                    });
                }
                BonusKind::LoyaltyCredit {
                    min_transactions,
                    time_period_days,
                }
            }
            BonusType::TransactionThresholdCredit => BonusKind::TransactionThresholdCredit {
                min_transaction_threshold: draft.min_transaction_threshold,
            },
            BonusType::RequestMoney => BonusKind::RequestMoney,
            BonusType::ReferralCredit => BonusKind::ReferralCredit,
        };

        let commission = if draft.is_tiered {
            Commission::Tiered {
                basis: draft.commission_type,
                tiers: TierTable::new(draft.tiers)?,
            }
        } else {
            match draft.commission_type {
                CommissionType::Percentage => {
                    let percentage = draft
                        .commission_percentage
                        .ok_or(DefinitionError::Missing("commission_percentage"))?;
                    if !is_positive(&percentage) {
                        return Err(DefinitionError::InvalidValue {
                            field: "commission_percentage",
                            reason: "must be greater than 0".to_string(),
                        });
                    }
                    Commission::Percentage { percentage }
                }
                CommissionType::Fixed => {
                    if draft.credit_amount.is_negative_value() {
                        return Err(DefinitionError::InvalidValue {
                            field: "credit_amount",
                            reason: "must not be negative".to_string(),
                        });
                    }
                    Commission::Fixed {
                        credit_amount: draft.credit_amount,
                    }
                }
            }
        };

        let currency = match draft.currency.trim() {
            "" => default_currency(),
            currency => currency.to_ascii_uppercase(),
        };

        Ok(Self {
            name,
            kind,
            currency,
            commission,
            eligibility: EligibilityRules::try_from(draft.eligibility_rules)?,
            start_date: draft.start_date,
            end_date: draft.end_date,
            status: draft.status,
        })
    }
}

impl SchemeDefinition {
    /// Flattens the definition back into its wire/storage shape.
    pub fn to_draft(&self) -> SchemeDraft {
        let (min_transactions, time_period_days, min_transaction_threshold) = match &self.kind {
            BonusKind::LoyaltyCredit {
                min_transactions,
                time_period_days,
            } => (Some(*min_transactions), Some(*time_period_days), None),
            BonusKind::TransactionThresholdCredit {
                min_transaction_threshold,
            } => (None, None, min_transaction_threshold.clone()),
            BonusKind::RequestMoney | BonusKind::ReferralCredit => (None, None, None),
        };
        let (credit_amount, commission_type, commission_percentage, is_tiered, tiers) =
            match &self.commission {
                Commission::Fixed { credit_amount } => (
                    credit_amount.clone(),
                    CommissionType::Fixed,
                    None,
                    false,
                    Vec::new(),
                ),
                Commission::Percentage { percentage } => (
                    BigDecimal::zero(),
                    CommissionType::Percentage,
                    Some(percentage.clone()),
                    false,
                    Vec::new(),
                ),
                Commission::Tiered { basis, tiers } => (
                    BigDecimal::zero(),
                    *basis,
                    None,
                    true,
                    tiers.tiers().to_vec(),
                ),
            };
        SchemeDraft {
            name: self.name.clone(),
            bonus_type: self.kind.bonus_type(),
            credit_amount,
            currency: self.currency.clone(),
            commission_type,
            commission_percentage,
            is_tiered,
            tiers,
            min_transactions,
            time_period_days,
            min_transaction_threshold,
            eligibility_rules: EligibilityDraft::from(&self.eligibility),
            start_date: self.start_date,
            end_date: self.end_date,
            status: self.status,
        }
    }

    /// Status and date window check for an award on `today`.
    ///
    /// Both window ends are inclusive.
    pub fn check_window(&self, today: NaiveDate) -> Result<(), RuleViolation> {
        if self.status != SchemeStatus::Active {
            return Err(RuleViolation::SchemeInactive {
                name: self.name.clone(),
                status: self.status.to_string(),
            });
        }
        if today < self.start_date {
            return Err(RuleViolation::SchemeNotStarted {
                name: self.name.clone(),
                start_date: self.start_date,
            });
        }
        if today > self.end_date {
            return Err(RuleViolation::SchemeExpired {
                name: self.name.clone(),
                end_date: self.end_date,
            });
        }
        Ok(())
    }
}

/// A stored scheme.
#[derive(Debug, Clone, PartialEq)]
pub struct BonusScheme {
    pub id: SchemeId,
    pub definition: SchemeDefinition,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// JSON view of a stored scheme.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemeView {
    pub id: SchemeId,
    #[serde(flatten)]
    pub fields: SchemeDraft,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BonusScheme {
    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn view(&self) -> SchemeView {
        SchemeView {
            id: self.id,
            fields: self.definition.to_draft(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}
