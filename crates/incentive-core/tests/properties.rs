//! Property tests for tier lookup, the ledger folds and promo caps.

use bigdecimal::BigDecimal;
use chrono::{Duration, TimeZone, Utc};
use incentive_core::ledger::{balance_of, cost_incurred, merge_history, SYSTEM_ADMIN};
use incentive_core::promo::TransferContext;
use incentive_core::scheme::Tier;
use incentive_core::{
    CreditEventType, CreditLedgerEntry, HistoryRow, Limit, PromoCode, PromoDraft, PromoId,
    SchemeId, TierTable,
};
use proptest::prelude::*;
use uuid::Uuid;

/// Contiguous tiers built from a list of bracket widths; the last is
/// unbounded.
fn tiers_from_widths(widths: &[u32]) -> Vec<Tier> {
    let mut tiers = Vec::with_capacity(widths.len());
    let mut lower = 0i64;
    for (i, width) in widths.iter().enumerate() {
        let upper = lower + i64::from(*width);
        let last = i + 1 == widths.len();
        tiers.push(Tier {
            min: BigDecimal::from(lower),
            max: if last { None } else { Some(BigDecimal::from(upper)) },
            value: BigDecimal::from(i as i64 + 1),
        });
        lower = upper;
    }
    tiers
}

fn row(amount: i64, event_type: CreditEventType, minutes: i64) -> HistoryRow {
    let created_at = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(minutes);
    HistoryRow::from_entry(
        CreditLedgerEntry {
            id: Uuid::new_v4(),
            user_id: "user_1".to_string(),
            amount: BigDecimal::from(amount),
            event_type,
            scheme_id: Some(SchemeId(1)),
            reference_id: Uuid::new_v4().to_string(),
            reason_code: None,
            notes: None,
            admin_user: SYSTEM_ADMIN.to_string(),
            expires_at: None,
            created_at,
        },
        None,
    )
}

proptest! {
    #[test]
    fn contiguous_tiers_always_validate_and_cover_non_negative_amounts(
        widths in prop::collection::vec(1u32..500, 1..8),
        amount in 0i64..10_000,
    ) {
        let table = TierTable::new(tiers_from_widths(&widths)).unwrap();
        let amount = BigDecimal::from(amount);
        let tier = table.find(&amount);
        prop_assert!(tier.is_some());
        prop_assert!(tier.unwrap().contains(&amount));
    }

    #[test]
    fn negative_amounts_never_match_tiers_starting_at_zero(
        widths in prop::collection::vec(1u32..500, 1..8),
        amount in -10_000i64..0,
    ) {
        let table = TierTable::new(tiers_from_widths(&widths)).unwrap();
        prop_assert!(table.find(&BigDecimal::from(amount)).is_none());
    }

    #[test]
    fn balance_is_sum_and_cost_bounds_it(
        amounts in prop::collection::vec(-1_000i64..1_000, 0..40),
    ) {
        let rows: Vec<HistoryRow> = amounts
            .iter()
            .enumerate()
            .map(|(i, a)| {
                let kind = if *a >= 0 { CreditEventType::Earned } else { CreditEventType::Applied };
                row(*a, kind, i as i64)
            })
            .collect();
        let expected: i64 = amounts.iter().sum();
        let balance = balance_of(rows.iter().map(|r| &r.amount));
        prop_assert_eq!(balance.clone(), BigDecimal::from(expected));

        let cost = cost_incurred(&rows);
        let abs_balance = if expected < 0 { BigDecimal::from(-expected) } else { balance };
        prop_assert!(cost >= abs_balance);
    }

    #[test]
    fn merged_history_is_newest_first(
        ledger in prop::collection::vec(0i64..10_000, 0..20),
        promos in prop::collection::vec(0i64..10_000, 0..20),
    ) {
        let ledger_rows = ledger.iter().map(|m| row(1, CreditEventType::Earned, *m)).collect();
        let promo_rows = promos.iter().map(|m| row(-1, CreditEventType::Applied, *m)).collect();
        let merged = merge_history(ledger_rows, promo_rows);
        prop_assert_eq!(merged.len(), ledger.len() + promos.len());
        for pair in merged.windows(2) {
            prop_assert!(pair[0].created_at >= pair[1].created_at);
        }
    }

    #[test]
    fn reservations_never_exceed_the_global_cap(limit in 0i64..20, attempts in 0usize..40) {
        let draft: PromoDraft = serde_json::from_value(serde_json::json!({
            "code": "CAP",
            "type": "Fixed",
            "value": 1,
            "start_date": "2025-01-01",
            "end_date": "2025-12-31"
        }))
        .unwrap();
        let mut promo = PromoCode::from_draft(PromoId(1), draft, Utc::now());
        promo.usage_limit_global = Limit::AtMost(limit);
        let today = chrono::NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        let transfer = TransferContext { amount: BigDecimal::from(10), ..Default::default() };

        let mut granted = 0i64;
        for _ in 0..attempts {
            if promo.validate(today, &transfer, None).is_ok() {
                let discount = promo.discount_for(&transfer.amount).amount;
                if promo.reserve(today, &discount, None).is_ok() {
                    granted += 1;
                }
            }
        }
        prop_assert!(granted <= limit);
        prop_assert_eq!(promo.usage_count, granted);
    }
}
