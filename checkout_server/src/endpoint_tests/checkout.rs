use actix_web::{http::StatusCode, test::TestRequest};
use checkout_engine::{CheckoutRequest, InventoryLedger};
use chrono::Duration;
use serde_json::json;

use super::helpers::{seeded_api, send, EVENT};

#[actix_web::test]
async fn health_check() {
    let _ = env_logger::try_init().ok();
    let (api, _) = seeded_api().await;
    let (status, _) = send(&api, TestRequest::get().uri("/health")).await;
    assert_eq!(status, StatusCode::OK);
}

#[actix_web::test]
async fn create_checkout() {
    let _ = env_logger::try_init().ok();
    let (api, _) = seeded_api().await;
    let body = json!({ "event_id": EVENT, "line_items": [{ "unit_id": "ga", "quantity": 2 }] });
    let (status, body) = send(&api, TestRequest::post().uri("/checkout").set_json(body)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(body["order_id"].as_str().is_some_and(|s| !s.is_empty()));
    assert_eq!(body["status"], "Pending");
    assert_eq!(body["expires_at"], "2024-06-01T12:15:00Z");
    let summary = &body["summary"];
    assert_eq!(summary["subtotal"], 8_000);
    assert_eq!(summary["service_fee"], 800);
    assert_eq!(summary["facility_fee"], 500);
    assert_eq!(summary["tax_amount"], 660);
    assert_eq!(summary["total_amount"], 9_960);
    assert_eq!(body["line_items"][0]["unit_price"], 4_000);
    let unit = api.db().unit_snapshot(&"ga".into()).await.unwrap().unwrap();
    assert_eq!(unit.reserved, 2);
}

#[actix_web::test]
async fn checkout_reports_every_shortfall() {
    let _ = env_logger::try_init().ok();
    let (api, _) = seeded_api().await;
    let body = json!({
        "event_id": EVENT,
        "line_items": [{ "unit_id": "vip", "quantity": 2 }, { "unit_id": "ga", "quantity": 1 }],
        "addons": [{ "unit_id": "parking", "quantity": 6 }]
    });
    let (status, body) = send(&api, TestRequest::post().uri("/checkout").set_json(body)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "insufficient-inventory");
    let shortfalls = body["shortfalls"].as_array().expect("No shortfalls in body");
    assert_eq!(shortfalls.len(), 2);
    let vip = shortfalls.iter().find(|s| s["unit_id"] == "vip").expect("No vip shortfall");
    assert_eq!(vip["available"], 1);
    assert_eq!(vip["shortfall"], 1);
    let parking = shortfalls.iter().find(|s| s["unit_id"] == "parking").expect("No parking shortfall");
    assert_eq!(parking["shortfall"], 1);
    // Nothing was held, not even the line that could have been supplied
    let unit = api.db().unit_snapshot(&"ga".into()).await.unwrap().unwrap();
    assert_eq!(unit.reserved, 0);
}

#[actix_web::test]
async fn invalid_checkout_requests() {
    let _ = env_logger::try_init().ok();
    let (api, _) = seeded_api().await;
    let no_lines = json!({ "event_id": EVENT, "line_items": [] });
    let (status, body) = send(&api, TestRequest::post().uri("/checkout").set_json(no_lines)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation-error");

    let too_many = json!({ "event_id": EVENT, "line_items": [{ "unit_id": "ga", "quantity": 11 }] });
    let (status, body) = send(&api, TestRequest::post().uri("/checkout").set_json(too_many)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation-error");

    let malformed = TestRequest::post()
        .uri("/checkout")
        .insert_header(("content-type", "application/json"))
        .set_payload(r#"{"event_id": 12, "line_items": "#);
    let (status, body) = send(&api, malformed).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation-error");
}

#[actix_web::test]
async fn unknown_event_and_unit() {
    let _ = env_logger::try_init().ok();
    let (api, _) = seeded_api().await;
    let body = json!({ "event_id": "evt-nope", "line_items": [{ "unit_id": "ga", "quantity": 1 }] });
    let (status, body) = send(&api, TestRequest::post().uri("/checkout").set_json(body)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "event-not-found");

    let body = json!({ "event_id": EVENT, "line_items": [{ "unit_id": "balcony", "quantity": 1 }] });
    let (status, body) = send(&api, TestRequest::post().uri("/checkout").set_json(body)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "unit-not-found");
}

#[actix_web::test]
async fn status_expires_stale_orders() {
    let _ = env_logger::try_init().ok();
    let (api, clock) = seeded_api().await;
    let result = api.create_checkout(CheckoutRequest::new(EVENT).with_tickets("ga", 3)).await.unwrap();
    let uri = format!("/checkout?order_id={}", result.order_id);

    let (status, body) = send(&api, TestRequest::get().uri(&uri)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "Pending");
    assert_eq!(body["order"]["total"], result.summary.total_amount.value());

    clock.advance(Duration::minutes(16));
    let (status, body) = send(&api, TestRequest::get().uri(&uri)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "Expired");
    let unit = api.db().unit_snapshot(&"ga".into()).await.unwrap().unwrap();
    assert_eq!(unit.reserved, 0);
}

#[actix_web::test]
async fn status_of_unknown_order() {
    let _ = env_logger::try_init().ok();
    let (api, _) = seeded_api().await;
    let (status, body) = send(&api, TestRequest::get().uri("/checkout?order_id=ord-missing")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "order-not-found");

    let (status, body) = send(&api, TestRequest::get().uri("/checkout")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation-error");
}

#[actix_web::test]
async fn cancel_checkout() {
    let _ = env_logger::try_init().ok();
    let (api, _) = seeded_api().await;
    let result = api.create_checkout(CheckoutRequest::new(EVENT).with_tickets("ga", 4)).await.unwrap();
    let uri = format!("/checkout/{}/cancel", result.order_id);
    let req = TestRequest::post().uri(&uri).set_json(json!({ "reason": "Changed my mind" }));
    let (status, body) = send(&api, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "Cancelled");
    assert_eq!(body["order"]["status_reason"], "Changed my mind");
    let unit = api.db().unit_snapshot(&"ga".into()).await.unwrap().unwrap();
    assert_eq!(unit.reserved, 0);

    // Cancelling again is a no-op, and needs no body
    let (status, body) = send(&api, TestRequest::post().uri(&uri)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "Cancelled");
}

#[actix_web::test]
async fn completed_orders_cannot_be_cancelled() {
    let _ = env_logger::try_init().ok();
    let (api, _) = seeded_api().await;
    let result = api.create_checkout(CheckoutRequest::new(EVENT).with_tickets("vip", 1)).await.unwrap();
    api.complete(&result.order_id).await.unwrap();
    let uri = format!("/checkout/{}/cancel", result.order_id);
    let (status, body) = send(&api, TestRequest::post().uri(&uri)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "state-conflict");
    let unit = api.db().unit_snapshot(&"vip".into()).await.unwrap().unwrap();
    assert_eq!(unit.sold, 1);
}
