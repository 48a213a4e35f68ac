use actix_web::{http::StatusCode, test::TestRequest};
use checkout_engine::{db_types::OrderId, CheckoutRequest, InventoryLedger};
use chrono::Duration;
use serde_json::json;

use super::helpers::{seeded_api, send, EVENT, WEBHOOK_SECRET};
use crate::{helpers::calculate_hmac, middleware::PAYMENT_HMAC_HEADER};

fn signed_confirmation(order_id: &OrderId, secret: &str) -> TestRequest {
    let body = json!({ "order_id": order_id, "payment_reference": "pi_3PQxR2" }).to_string();
    let signature = calculate_hmac(secret, body.as_bytes());
    TestRequest::post()
        .uri("/webhook/payment_confirmed")
        .insert_header(("content-type", "application/json"))
        .insert_header((PAYMENT_HMAC_HEADER, signature))
        .set_payload(body)
}

#[actix_web::test]
async fn payment_completes_the_order() {
    let _ = env_logger::try_init().ok();
    let (api, _) = seeded_api().await;
    let result = api.create_checkout(CheckoutRequest::new(EVENT).with_tickets("ga", 2)).await.unwrap();
    let (status, body) = send(&api, signed_confirmation(&result.order_id, WEBHOOK_SECRET)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "Completed");
    let unit = api.db().unit_snapshot(&"ga".into()).await.unwrap().unwrap();
    assert_eq!((unit.reserved, unit.sold), (0, 2));
}

#[actix_web::test]
async fn duplicate_confirmations_are_harmless() {
    let _ = env_logger::try_init().ok();
    let (api, _) = seeded_api().await;
    let result = api.create_checkout(CheckoutRequest::new(EVENT).with_tickets("ga", 2)).await.unwrap();
    for _ in 0..2 {
        let (status, body) = send(&api, signed_confirmation(&result.order_id, WEBHOOK_SECRET)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["state"], "Completed");
    }
    let unit = api.db().unit_snapshot(&"ga".into()).await.unwrap().unwrap();
    assert_eq!((unit.reserved, unit.sold), (0, 2));
}

#[actix_web::test]
async fn unsigned_confirmations_are_rejected() {
    let _ = env_logger::try_init().ok();
    let (api, _) = seeded_api().await;
    let result = api.create_checkout(CheckoutRequest::new(EVENT).with_tickets("ga", 1)).await.unwrap();
    let req = TestRequest::post()
        .uri("/webhook/payment_confirmed")
        .set_json(json!({ "order_id": result.order_id, "payment_reference": "pi_forged" }));
    let (status, _) = send(&api, req).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(&api, signed_confirmation(&result.order_id, "not-the-secret")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let order = api.fetch_order(&result.order_id).await.unwrap();
    assert_eq!(order.status.to_string(), "Pending");
}

#[actix_web::test]
async fn payment_after_expiry_is_a_conflict() {
    let _ = env_logger::try_init().ok();
    let (api, clock) = seeded_api().await;
    let result = api.create_checkout(CheckoutRequest::new(EVENT).with_tickets("vip", 1)).await.unwrap();
    clock.advance(Duration::minutes(16));
    let reaped = api.expire_stale_orders().await.unwrap();
    assert_eq!(reaped.expired_count(), 1);

    let (status, body) = send(&api, signed_confirmation(&result.order_id, WEBHOOK_SECRET)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "state-conflict");
    let unit = api.db().unit_snapshot(&"vip".into()).await.unwrap().unwrap();
    assert_eq!((unit.reserved, unit.sold), (0, 0));
}

#[actix_web::test]
async fn payment_for_unknown_order() {
    let _ = env_logger::try_init().ok();
    let (api, _) = seeded_api().await;
    let (status, body) = send(&api, signed_confirmation(&OrderId::new("ord-ghost"), WEBHOOK_SECRET)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "order-not-found");
}
