//! End-to-end HTTP tests against the in-memory store.
//!
//! Every test builds a fresh router with `create_router` and drives it with
//! `tower::ServiceExt::oneshot`.

use std::str::FromStr;
use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use bigdecimal::BigDecimal;
use chrono::{TimeZone, Utc};
use incentive_server::store::{ExternalTransaction, MemoryStore};
use incentive_server::{create_router, Engine};
use serde_json::{json, Value};
use tower::ServiceExt;

fn app(store: &MemoryStore) -> Router {
    create_router(Engine::new(Arc::new(store.clone()), "GBP"))
}

/// Helper to parse a response body; plain-text bodies come back as strings.
async fn json_body(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read response body");
    serde_json::from_slice(&body)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&body).to_string()))
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("Content-Type", "application/json");
    let request = match body {
        Some(body) => request.body(Body::from(body.to_string())),
        None => request.body(Body::empty()),
    }
    .unwrap();

    let response = app.clone().oneshot(request).await.expect("Request failed");
    let status = response.status();
    (status, json_body(response).await)
}

/// Decimals serialise as strings; compare them by value.
fn dec(value: &Value) -> BigDecimal {
    match value {
        Value::String(s) => BigDecimal::from_str(s).expect("Not a decimal string"),
        Value::Number(n) => BigDecimal::from_str(&n.to_string()).expect("Not a decimal"),
        other => panic!("Expected a decimal, got {}", other),
    }
}

fn d(s: &str) -> BigDecimal {
    BigDecimal::from_str(s).unwrap()
}

async fn seed_tx(store: &MemoryStore, id: &str, user: &str, amount: &str) {
    store
        .seed_transaction(ExternalTransaction {
            id: id.to_string(),
            user_id: user.to_string(),
            amount: d(amount),
            currency: "NGN".to_string(),
            debit_date: Utc::now(),
        })
        .await;
}

fn fixed_scheme(name: &str, credit: i64) -> Value {
    json!({
        "name": name,
        "bonus_type": "REFERRAL_CREDIT",
        "credit_amount": credit,
        "start_date": "2020-01-01",
        "end_date": "2099-12-31"
    })
}

async fn create_scheme(app: &Router, scheme: Value) -> i64 {
    let (status, body) = send(app, "POST", "/api/v1/bonus-schemes", Some(scheme)).await;
    assert_eq!(status, StatusCode::OK, "create scheme failed: {}", body);
    body["id"].as_i64().expect("scheme id")
}

fn promo(code: &str) -> Value {
    json!({
        "code": code,
        "type": "Percentage",
        "value": 10,
        "min_threshold": 50,
        "usage_limit_global": 1,
        "start_date": "2020-01-01",
        "end_date": "2099-12-31"
    })
}

#[tokio::test]
async fn test_health() {
    let app = app(&MemoryStore::new());
    let (status, body) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_award_is_idempotent_per_key() {
    let app = app(&MemoryStore::new());
    let scheme_id = create_scheme(&app, fixed_scheme("Welcome", 25)).await;

    let award = json!({ "user_id": "M1", "scheme_id": scheme_id, "idempotency_key": "k-1" });
    let (status, first) = send(&app, "POST", "/api/v1/credits/award-bonus", Some(award.clone())).await;
    assert_eq!(status, StatusCode::OK, "{}", first);
    assert_eq!(first["idempotent"], false);
    assert_eq!(first["scheme_name"], "Welcome");
    assert_eq!(dec(&first["amount"]), d("25"));
    assert!(first["expires_at"].is_string());

    let (status, replay) = send(&app, "POST", "/api/v1/credits/award-bonus", Some(award)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(replay["idempotent"], true);
    assert_eq!(replay["id"], first["id"]);

    let (_, credits) = send(&app, "GET", "/api/v1/credits/M1", None).await;
    assert_eq!(dec(&credits["balance"]), d("25"));
    assert_eq!(credits["history"].as_array().unwrap().len(), 1);
    assert_eq!(credits["history"][0]["reference_id"], "idem_k-1");
    assert_eq!(credits["currency"], "GBP");
}

#[tokio::test]
async fn test_idempotency_key_is_global_across_users() {
    let app = app(&MemoryStore::new());
    let scheme_id = create_scheme(&app, fixed_scheme("Welcome", 25)).await;

    let (_, first) = send(
        &app,
        "POST",
        "/api/v1/credits/award-bonus",
        Some(json!({ "user_id": "M1", "scheme_id": scheme_id, "idempotency_key": "shared" })),
    )
    .await;

    // The key, not the (user, scheme) pair, identifies the write.
    let (status, replay) = send(
        &app,
        "POST",
        "/api/v1/credits/award-bonus",
        Some(json!({ "user_id": "M2", "scheme_id": scheme_id, "idempotency_key": "shared" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(replay["idempotent"], true);
    assert_eq!(replay["id"], first["id"]);

    let (_, credits) = send(&app, "GET", "/api/v1/credits/M2", None).await;
    assert!(credits["history"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_one_time_scheme_rejects_second_award() {
    let app = app(&MemoryStore::new());
    let scheme_id = create_scheme(&app, fixed_scheme("Welcome", 10)).await;
    let award = json!({ "userId": "M2", "schemeId": scheme_id });

    let (status, _) = send(&app, "POST", "/api/v1/credits/award-bonus", Some(award.clone())).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, "POST", "/api/v1/credits/award-bonus", Some(award)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "ALREADY_EARNED");

    let (_, credits) = send(&app, "GET", "/api/v1/credits/M2", None).await;
    assert_eq!(dec(&credits["balance"]), d("10"));
}

#[tokio::test]
async fn test_award_validates_request() {
    let app = app(&MemoryStore::new());

    let (status, _) = send(
        &app,
        "POST",
        "/api/v1/credits/award-bonus",
        Some(json!({ "scheme_id": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        "POST",
        "/api/v1/credits/award-bonus",
        Some(json!({ "user_id": "M1", "scheme_id": 999 })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_tiered_award_uses_transaction_amount() {
    let store = MemoryStore::new();
    let app = app(&store);
    seed_tx(&store, "tx-50", "M3", "50").await;
    seed_tx(&store, "tx-150", "M3", "150").await;
    seed_tx(&store, "tx-neg", "M3", "-10").await;

    let scheme_id = create_scheme(
        &app,
        json!({
            "name": "Tiered",
            "bonus_type": "TRANSACTION_THRESHOLD_CREDIT",
            "is_tiered": true,
            "commission_type": "FIXED",
            "tiers": [
                { "min": 0, "max": 100, "value": 5 },
                { "min": 100, "max": null, "value": 10 }
            ],
            "eligibility_rules": { "segments": ["all"], "one_time_only": false },
            "start_date": "2020-01-01",
            "end_date": "2099-12-31"
        }),
    )
    .await;

    let award = |tx: &str| json!({ "user_id": "M3", "scheme_id": scheme_id, "transaction_id": tx });

    let (status, body) = send(&app, "POST", "/api/v1/credits/award-bonus", Some(award("tx-50"))).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(dec(&body["amount"]), d("5"));

    let (_, body) = send(&app, "POST", "/api/v1/credits/award-bonus", Some(award("tx-150"))).await;
    assert_eq!(dec(&body["amount"]), d("10"));

    let (status, body) = send(&app, "POST", "/api/v1/credits/award-bonus", Some(award("tx-neg"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "TIER_MISMATCH");

    let (status, _) = send(&app, "POST", "/api/v1/credits/award-bonus", Some(award("tx-missing"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(
        &app,
        "POST",
        "/api/v1/credits/award-bonus",
        Some(json!({ "user_id": "M3", "scheme_id": scheme_id })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "TRANSACTION_REQUIRED");

    // The transaction id doubles as the reference, so a repeat collides.
    let (status, _) = send(&app, "POST", "/api/v1/credits/award-bonus", Some(award("tx-50"))).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_percentage_award() {
    let store = MemoryStore::new();
    let app = app(&store);
    seed_tx(&store, "tx-200", "M4", "200").await;

    let scheme_id = create_scheme(
        &app,
        json!({
            "name": "Ten percent",
            "bonus_type": "REQUEST_MONEY",
            "commission_type": "PERCENTAGE",
            "commission_percentage": 10,
            "start_date": "2020-01-01",
            "end_date": "2099-12-31"
        }),
    )
    .await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/v1/credits/award-bonus",
        Some(json!({ "user_id": "M4", "scheme_id": scheme_id, "transaction_id": "tx-200" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["amount"], "20.00");
}

#[tokio::test]
async fn test_segment_gate_is_evaluated_live() {
    let store = MemoryStore::new();
    let app = app(&store);

    let (status, segment) = send(
        &app,
        "POST",
        "/api/v1/user-segments",
        Some(json!({
            "name": "High volume",
            "criteria": { "type": "TRANSACTION_VOLUME", "min": 1000 }
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", segment);
    let segment_id = segment["id"].as_i64().unwrap();

    let mut scheme = fixed_scheme("VIP", 50);
    scheme["eligibility_rules"] = json!({ "segments": [segment_id.to_string()] });
    let scheme_id = create_scheme(&app, scheme).await;
    let award = json!({ "user_id": "M5", "scheme_id": scheme_id });

    seed_tx(&store, "a", "M5", "950").await;
    let (status, body) = send(&app, "POST", "/api/v1/credits/award-bonus", Some(award.clone())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "USER_INELIGIBLE");

    seed_tx(&store, "b", "M5", "50").await;
    let (status, body) = send(&app, "POST", "/api/v1/credits/award-bonus", Some(award)).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
}

#[tokio::test]
async fn test_deleted_segment_never_matches() {
    let store = MemoryStore::new();
    let app = app(&store);
    seed_tx(&store, "a", "M6", "10").await;

    let (_, segment) = send(
        &app,
        "POST",
        "/api/v1/user-segments",
        Some(json!({ "name": "Any", "criteria": { "type": "TRANSACTION_COUNT", "min": 1 } })),
    )
    .await;
    let segment_id = segment["id"].as_i64().unwrap();

    let mut scheme = fixed_scheme("Gated", 5);
    scheme["eligibility_rules"] = json!({ "segments": [segment_id] });
    let scheme_id = create_scheme(&app, scheme).await;

    let uri = format!("/api/v1/user-segments/{}", segment_id);
    let (status, _) = send(&app, "DELETE", &uri, None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(
        &app,
        "POST",
        "/api/v1/credits/award-bonus",
        Some(json!({ "user_id": "M6", "scheme_id": scheme_id })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_expired_scheme_is_rejected() {
    let store = MemoryStore::new();
    let engine = Engine::new(Arc::new(store.clone()), "GBP")
        .with_clock(Arc::new(|| Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap()));
    let app = create_router(engine);

    let mut scheme = fixed_scheme("2024 only", 5);
    scheme["start_date"] = json!("2024-06-01");
    scheme["end_date"] = json!("2024-12-31");
    let scheme_id = create_scheme(&app, scheme).await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/v1/credits/award-bonus",
        Some(json!({ "user_id": "M7", "scheme_id": scheme_id })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "SCHEME_EXPIRED");
}

#[tokio::test]
async fn test_ledger_rows_use_engine_clock() {
    let store = MemoryStore::new();
    let pinned = Utc.with_ymd_and_hms(2030, 3, 15, 10, 30, 0).unwrap();
    let engine = Engine::new(Arc::new(store.clone()), "GBP").with_clock(Arc::new(move || pinned));
    let app = create_router(engine);
    let scheme_id = create_scheme(&app, fixed_scheme("Spring", 5)).await;

    let (status, award) = send(
        &app,
        "POST",
        "/api/v1/credits/award-bonus",
        Some(json!({ "user_id": "M20", "scheme_id": scheme_id })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", award);
    assert_eq!(award["expires_at"], json!(Utc.with_ymd_and_hms(2030, 6, 13, 10, 30, 0).unwrap()));

    let (status, _) = send(
        &app,
        "POST",
        "/api/v1/credits/manual",
        Some(json!({ "user_id": "M20", "amount": -2, "type": "APPLIED", "reason_code": "SPEND", "notes": "Used on transfer" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, credits) = send(&app, "GET", "/api/v1/credits/M20?startDate=2030-03-15&endDate=2030-03-15", None).await;
    let history = credits["history"].as_array().unwrap();
    assert_eq!(history.len(), 2);
    for row in history {
        assert_eq!(row["created_at"], json!(pinned));
    }
}

#[tokio::test]
async fn test_manual_adjustments() {
    let app = app(&MemoryStore::new());

    let (status, _) = send(
        &app,
        "POST",
        "/api/v1/credits/manual",
        Some(json!({ "user_id": "M8", "amount": 30, "type": "EARNED", "reason_code": "GOODWILL", "notes": "Late transfer" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // Sign must agree with the type.
    let (status, _) = send(
        &app,
        "POST",
        "/api/v1/credits/manual",
        Some(json!({ "user_id": "M8", "amount": 10, "type": "VOIDED", "reason_code": "FRAUD", "notes": "Reversal" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &app,
        "POST",
        "/api/v1/credits/manual",
        Some(json!({ "user_id": "M8", "amount": 10, "type": "EARNED", "notes": "No reason" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, "Reason code is required");

    let voided = json!({
        "user_id": "M8",
        "amount": "-12.50",
        "type": "VOIDED",
        "reason_code": "FRAUD",
        "notes": "Reversal",
        "idempotency_key": "void-1"
    });
    let (status, first) = send(&app, "POST", "/api/v1/credits/manual", Some(voided.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(dec(&first["new_balance_impact"]), d("-12.50"));
    let (_, replay) = send(&app, "POST", "/api/v1/credits/manual", Some(voided)).await;
    assert_eq!(replay["idempotent"], true);
    assert_eq!(replay["id"], first["id"]);

    let (_, credits) = send(&app, "GET", "/api/v1/credits/M8", None).await;
    assert_eq!(dec(&credits["balance"]), d("17.50"));
    assert_eq!(dec(&credits["cost_incurred"]), d("42.50"));
    assert_eq!(credits["history"][0]["admin_user"], "Admin");

    let (_, voided_only) = send(&app, "GET", "/api/v1/credits/M8?eventType=VOIDED", None).await;
    assert_eq!(voided_only["history"].as_array().unwrap().len(), 1);
    assert_eq!(dec(&voided_only["balance"]), d("17.50"));
}

#[tokio::test]
async fn test_promo_validate_and_apply_respect_caps() {
    let app = app(&MemoryStore::new());

    let (status, created) = send(&app, "POST", "/api/v1/promocodes", Some(promo("save10"))).await;
    assert_eq!(status, StatusCode::OK, "{}", created);

    let (status, _) = send(&app, "POST", "/api/v1/promocodes", Some(promo("SAVE10"))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = send(
        &app,
        "POST",
        "/api/v1/promocodes/validate",
        Some(json!({ "code": "Save10", "amount": 100 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["valid"], true);
    assert_eq!(body["code"], "SAVE10");
    assert_eq!(dec(&body["discount"]), d("10"));
    assert_eq!(body["display_text"], "10% off");

    let (status, body) = send(
        &app,
        "POST",
        "/api/v1/promocodes/validate",
        Some(json!({ "code": "SAVE10", "amount": 20 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "BELOW_THRESHOLD");

    let (status, body) = send(
        &app,
        "POST",
        "/api/v1/promocodes/apply",
        Some(json!({ "code": "SAVE10", "discount_amount": 10 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["usage_count"], 1);

    let (status, body) = send(
        &app,
        "POST",
        "/api/v1/promocodes/validate",
        Some(json!({ "code": "SAVE10", "amount": 100 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "COUNT_LIMIT_REACHED");

    let (status, body) = send(
        &app,
        "POST",
        "/api/v1/promocodes/apply",
        Some(json!({ "code": "SAVE10", "discount_amount": 10 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "COUNT_LIMIT_REACHED");

    let (status, body) = send(
        &app,
        "POST",
        "/api/v1/promocodes/validate",
        Some(json!({ "code": "NOPE", "amount": 100 })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "INVALID_CODE");
}

#[tokio::test]
async fn test_per_user_cap_counts_recorded_redemptions() {
    let app = app(&MemoryStore::new());
    let mut once = promo("ONCE");
    once["usage_limit_global"] = json!(-1);
    once["usage_limit_per_user"] = json!(1);
    send(&app, "POST", "/api/v1/promocodes", Some(once)).await;

    let apply = |tx: &str| {
        json!({ "code": "ONCE", "discount_amount": 5, "user_id": "M9", "transaction_id": tx })
    };
    let (status, _) = send(&app, "POST", "/api/v1/promocodes/apply", Some(apply("t1"))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, "POST", "/api/v1/promocodes/apply", Some(apply("t2"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "PER_USER_LIMIT_REACHED");

    // Another user is unaffected.
    let (status, _) = send(
        &app,
        "POST",
        "/api/v1/promocodes/validate",
        Some(json!({ "code": "ONCE", "amount": 100, "userId": "M10" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_apply_with_user_needs_transaction() {
    let app = app(&MemoryStore::new());
    let mut once = promo("ONCE");
    once["usage_limit_global"] = json!(-1);
    once["usage_limit_per_user"] = json!(1);
    send(&app, "POST", "/api/v1/promocodes", Some(once)).await;

    let without_tx = json!({ "code": "ONCE", "discount_amount": 5, "user_id": "M9" });
    for _ in 0..2 {
        let (status, body) =
            send(&app, "POST", "/api/v1/promocodes/apply", Some(without_tx.clone())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.as_str().unwrap().contains("transaction_id"));
    }

    // Rejected calls consume nothing: the user still has their one use.
    let (status, body) = send(
        &app,
        "POST",
        "/api/v1/promocodes/apply",
        Some(json!({ "code": "ONCE", "discount_amount": 5, "user_id": "M9", "transaction_id": "t1" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["usage_count"], 1);

    let (status, body) = send(
        &app,
        "POST",
        "/api/v1/promocodes/validate",
        Some(json!({ "code": "ONCE", "amount": 100, "userId": "M9" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "PER_USER_LIMIT_REACHED");
}

#[tokio::test]
async fn test_kill_switch() {
    let app = app(&MemoryStore::new());
    let (_, created) = send(&app, "POST", "/api/v1/promocodes", Some(promo("KILLME"))).await;
    let id = created["id"].as_i64().unwrap();

    let uri = format!("/api/v1/promocodes/{}/status", id);
    let (status, _) = send(&app, "PUT", &uri, Some(json!({ "status": "Disabled" }))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &app,
        "POST",
        "/api/v1/promocodes/validate",
        Some(json!({ "code": "KILLME", "amount": 100 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "CODE_INACTIVE");

    let (status, _) = send(
        &app,
        "PUT",
        "/api/v1/promocodes/9999/status",
        Some(json!({ "status": "Disabled" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, "PUT", &uri, Some(json!({ "status": "Paused" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_batch_generation() {
    let app = app(&MemoryStore::new());
    let (status, body) = send(
        &app,
        "POST",
        "/api/v1/promocodes/generate",
        Some(json!({ "batch_size": 5, "prefix": "summer", "config": promo("") })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["requested"], 5);
    assert_eq!(body["created"], 5);
    for code in body["codes"].as_array().unwrap() {
        let code = code.as_str().unwrap();
        assert!(code.starts_with("SUMMER-"), "{}", code);
        assert_eq!(code.len(), "SUMMER-".len() + 8);
    }

    let (_, listed) = send(&app, "GET", "/api/v1/promocodes", None).await;
    assert_eq!(listed["data"].as_array().unwrap().len(), 5);

    let (status, _) = send(
        &app,
        "POST",
        "/api/v1/promocodes/generate",
        Some(json!({ "count": 0, "template": promo("") })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_history_merges_promo_redemptions() {
    let app = app(&MemoryStore::new());
    let scheme_id = create_scheme(&app, fixed_scheme("Welcome", 20)).await;
    send(
        &app,
        "POST",
        "/api/v1/credits/award-bonus",
        Some(json!({ "user_id": "M11", "scheme_id": scheme_id })),
    )
    .await;

    let mut code = promo("FIVER");
    code["type"] = json!("Fixed");
    code["value"] = json!(5);
    code["currency"] = json!("GBP");
    send(&app, "POST", "/api/v1/promocodes", Some(code)).await;
    let (status, _) = send(
        &app,
        "POST",
        "/api/v1/promocodes/apply",
        Some(json!({ "code": "FIVER", "discount_amount": 5, "user_id": "M11", "transaction_id": "tx-9" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, credits) = send(&app, "GET", "/api/v1/credits/M11", None).await;
    let history = credits["history"].as_array().unwrap();
    assert_eq!(history.len(), 2);
    let promo_row = history
        .iter()
        .find(|row| row["source_type"] == "PROMO")
        .expect("promo row");
    assert_eq!(promo_row["type"], "APPLIED");
    assert_eq!(promo_row["scheme_name"], "FIVER (Promo Code)");
    assert_eq!(dec(&promo_row["amount"]), d("-5"));
    // Redemptions are not ledger entries.
    assert_eq!(dec(&credits["balance"]), d("20"));
    assert_eq!(dec(&credits["cost_incurred"]), d("25"));

    let uri = format!("/api/v1/credits/M11?schemeId={}", scheme_id);
    let (_, by_scheme) = send(&app, "GET", &uri, None).await;
    assert_eq!(by_scheme["history"].as_array().unwrap().len(), 1);
    assert_eq!(by_scheme["history"][0]["source_type"], "BONUS");

    let (_, applied) = send(&app, "GET", "/api/v1/credits/M11?eventType=APPLIED", None).await;
    assert_eq!(applied["history"].as_array().unwrap().len(), 1);
    assert_eq!(dec(&applied["cost_incurred"]), d("5"));

    let (_, everyone) = send(&app, "GET", "/api/v1/credits/all", None).await;
    assert!(everyone["user_id"].is_null());
    assert_eq!(everyone["history"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_scheme_lifecycle() {
    let app = app(&MemoryStore::new());

    let (status, body) = send(
        &app,
        "POST",
        "/api/v1/bonus-schemes",
        Some(json!({
            "name": "Backwards",
            "bonus_type": "REFERRAL_CREDIT",
            "start_date": "2025-02-01",
            "end_date": "2025-01-01"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{}", body);

    let scheme_id = create_scheme(&app, fixed_scheme("Loyal", 15)).await;
    let uri = format!("/api/v1/bonus-schemes/{}", scheme_id);

    let (status, fetched) = send(&app, "GET", &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["name"], "Loyal");
    assert_eq!(fetched["currency"], "GBP");
    assert_eq!(fetched["status"], "ACTIVE");

    let mut renamed = fixed_scheme("Loyal v2", 15);
    renamed["status"] = json!("INACTIVE");
    let (status, _) = send(&app, "PUT", &uri, Some(renamed.clone())).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &app,
        "POST",
        "/api/v1/credits/award-bonus",
        Some(json!({ "user_id": "M12", "scheme_id": scheme_id })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "SCHEME_INACTIVE");

    let (status, _) = send(&app, "DELETE", &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, "PUT", &uri, Some(renamed)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, listed) = send(&app, "GET", "/api/v1/bonus-schemes", None).await;
    assert_eq!(listed["data"][0]["status"], "ARCHIVED");

    let (status, _) = send(&app, "GET", "/api/v1/bonus-schemes/999", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
