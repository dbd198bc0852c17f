//! End-to-end decisions over the pure domain model: a scheme, a segment and
//! a promo code evaluated the way the server evaluates them.

use bigdecimal::BigDecimal;
use chrono::{NaiveDate, TimeZone, Utc};
use incentive_core::promo::TransferContext;
use incentive_core::scheme::SegmentSelector;
use incentive_core::{
    DefinitionError, Limit, PromoCode, PromoDraft, PromoId, RuleViolation, SchemeDefinition,
    SchemeDraft, SegmentCriteria, SegmentId, TransactionStats,
};
use serde_json::json;
use std::str::FromStr;

fn dec(s: &str) -> BigDecimal {
    BigDecimal::from_str(s).unwrap()
}

fn scheme(value: serde_json::Value) -> Result<SchemeDefinition, DefinitionError> {
    let draft: SchemeDraft = serde_json::from_value(value).unwrap();
    SchemeDefinition::try_from(draft)
}

#[test]
fn tiered_fixed_scheme_brackets_transactions() {
    let def = scheme(json!({
        "name": "Tiered Cashback",
        "bonus_type": "TRANSACTION_THRESHOLD_CREDIT",
        "is_tiered": true,
        "commission_type": "FIXED",
        "tiers": [
            {"min": 0, "max": 100, "value": 5},
            {"min": 100, "max": null, "value": 10}
        ],
        "start_date": "2025-01-01",
        "end_date": "2025-12-31"
    }))
    .unwrap();

    assert_eq!(def.commission.compute(Some(&dec("50"))).unwrap(), dec("5"));
    assert_eq!(def.commission.compute(Some(&dec("150"))).unwrap(), dec("10"));
    let err = def.commission.compute(Some(&dec("-10"))).unwrap_err();
    assert_eq!(
        err,
        RuleViolation::TierMismatch {
            amount: dec("-10")
        }
    );
}

#[test]
fn percentage_scheme_pays_share_of_transaction() {
    let def = scheme(json!({
        "name": "Ten Percent Back",
        "bonus_type": "REQUEST_MONEY",
        "commission_type": "PERCENTAGE",
        "commission_percentage": 10,
        "start_date": "2025-01-01",
        "end_date": "2025-12-31"
    }))
    .unwrap();

    let amount = def.commission.compute(Some(&dec("200"))).unwrap();
    assert_eq!(amount, dec("20.00"));
    assert_eq!(amount.to_string(), "20.00");
}

#[test]
fn scheme_is_expired_the_day_after_its_end_date() {
    let def = scheme(json!({
        "name": "Summer Bonus",
        "bonus_type": "REFERRAL_CREDIT",
        "credit_amount": 15,
        "start_date": "2024-06-01",
        "end_date": "2024-12-31",
        "status": "ACTIVE"
    }))
    .unwrap();

    let new_year = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
    let err = def.check_window(new_year).unwrap_err();
    assert_eq!(err.code(), "SCHEME_EXPIRED");
}

#[test]
fn scheme_segments_are_carried_through_validation() {
    let def = scheme(json!({
        "name": "VIP Bonus",
        "bonus_type": "LOYALTY_CREDIT",
        "credit_amount": 25,
        "min_transactions": 5,
        "time_period_days": 30,
        "eligibility_rules": {"segments": ["2", 7], "one_time_only": true},
        "start_date": "2025-01-01",
        "end_date": "2025-12-31"
    }))
    .unwrap();

    assert_eq!(
        def.eligibility.segments,
        SegmentSelector::Any(vec![SegmentId(2), SegmentId(7)])
    );
    assert!(def.eligibility.one_time_only);
}

#[test]
fn lifetime_volume_segment_boundary() {
    let criteria: SegmentCriteria = serde_json::from_value(json!({
        "type": "TRANSACTION_VOLUME",
        "min": 1000,
        "max": null,
        "period_days": null
    }))
    .unwrap();

    assert!(criteria.window_start(Utc::now()).is_none());
    assert!(!criteria.matches(&TransactionStats::new(4, dec("950")), None));
    assert!(criteria.matches(&TransactionStats::new(4, dec("1000")), None));
}

#[test]
fn exhausted_promo_fails_before_threshold_check() {
    let draft: PromoDraft = serde_json::from_value(json!({
        "code": "welcome5",
        "type": "Fixed",
        "value": 5,
        "min_threshold": 100,
        "usage_limit_global": 10,
        "start_date": "2025-01-01",
        "end_date": "2025-12-31"
    }))
    .unwrap();
    let mut promo = PromoCode::from_draft(
        PromoId(1),
        draft,
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
    );
    assert_eq!(promo.usage_limit_global, Limit::AtMost(10));

    let today = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
    let small = TransferContext {
        amount: dec("40"),
        ..Default::default()
    };

    assert_eq!(
        promo.validate(today, &small, None).unwrap_err().code(),
        "BELOW_THRESHOLD"
    );

    promo.usage_count = 10;
    assert_eq!(
        promo.validate(today, &small, None).unwrap_err(),
        RuleViolation::CountLimitReached
    );
}
