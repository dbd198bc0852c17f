//! Business-rule and definition errors.

use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};

/// A business rule rejected the request.
///
/// Every variant has a stable machine-readable code (see [`RuleViolation::code`])
/// that callers can match on; the `Display` text is meant for humans.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RuleViolation {
    #[error("Bonus scheme \"{name}\" is not active (status: {status})")]
    SchemeInactive { name: String, status: String },

    #[error("Bonus scheme \"{name}\" has not started yet (starts {start_date})")]
    SchemeNotStarted { name: String, start_date: NaiveDate },

    #[error("Bonus scheme \"{name}\" expired on {end_date}")]
    SchemeExpired { name: String, end_date: NaiveDate },

    #[error("User does not meet the requirements for this bonus segment")]
    UserIneligible,

    #[error("User has already earned bonus from \"{name}\" on {earned_at}. This is a one-time bonus.")]
    AlreadyEarned {
        name: String,
        earned_at: DateTime<Utc>,
    },

    #[error("A transaction_id is required for {0} commissions")]
    TransactionRequired(&'static str),

    #[error("Transaction amount {amount} does not match any commission tiers")]
    TierMismatch { amount: BigDecimal },

    #[error("Invalid promo code")]
    InvalidCode,

    #[error("Promo code expired or inactive")]
    CodeInactive,

    #[error("Promo code fully redeemed (Count Limit)")]
    CountLimitReached,

    #[error("Promo code fully redeemed (Budget Limit)")]
    BudgetLimitReached,

    #[error("Promo code already used the maximum number of times by this user")]
    PerUserLimitReached,

    #[error("Transfer amount too low (Min: {min_threshold})")]
    BelowThreshold { min_threshold: BigDecimal },

    #[error("Code not valid for the {corridor} corridor")]
    CorridorNotAllowed { corridor: String },

    #[error("Code not valid for payment method {payment_method}")]
    PaymentMethodNotAllowed { payment_method: String },
}

impl RuleViolation {
    /// Stable machine-readable code for this violation.
    pub fn code(&self) -> &'static str {
        match self {
            RuleViolation::SchemeInactive { .. } => "SCHEME_INACTIVE",
            RuleViolation::SchemeNotStarted { .. } => "SCHEME_NOT_STARTED",
            RuleViolation::SchemeExpired { .. } => "SCHEME_EXPIRED",
            RuleViolation::UserIneligible => "USER_INELIGIBLE",
            RuleViolation::AlreadyEarned { .. } => "ALREADY_EARNED",
            RuleViolation::TransactionRequired(_) => "TRANSACTION_REQUIRED",
            RuleViolation::TierMismatch { .. } => "TIER_MISMATCH",
            RuleViolation::InvalidCode => "INVALID_CODE",
            RuleViolation::CodeInactive => "CODE_INACTIVE",
            RuleViolation::CountLimitReached => "COUNT_LIMIT_REACHED",
            RuleViolation::BudgetLimitReached => "BUDGET_LIMIT_REACHED",
            RuleViolation::PerUserLimitReached => "PER_USER_LIMIT_REACHED",
            RuleViolation::BelowThreshold { .. } => "BELOW_THRESHOLD",
            RuleViolation::CorridorNotAllowed { .. } => "CORRIDOR_NOT_ALLOWED",
            RuleViolation::PaymentMethodNotAllowed { .. } => "PAYMENT_METHOD_NOT_ALLOWED",
        }
    }
}

/// A scheme, segment, tier table or promo definition failed validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DefinitionError {
    #[error("{0} is required")]
    Missing(&'static str),

    #[error("Please select a valid date range. Start date must be before end date.")]
    InvalidDateRange,

    #[error("Invalid tier table: {0}")]
    InvalidTiers(String),

    #[error("Unknown {field}: {value}")]
    UnknownVariant { field: &'static str, value: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}
