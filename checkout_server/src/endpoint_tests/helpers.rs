use std::sync::Arc;

use actix_web::{body, http::StatusCode, test, test::TestRequest, App};
use checkout_engine::{
    db_types::{Cents, EventId, NewSellableUnit, TicketedEvent, UnitId},
    events::EventProducers,
    helpers::{Clock, MockClock},
    CatalogManagement,
    CheckoutFlowApi,
    MemoryDatabase,
};
use chrono::{Duration, TimeZone, Utc};
use log::debug;
use serde_json::Value;
use tcg_common::Secret;

use crate::{config::PaymentWebhookConfig, server::configure_checkout_app};

pub const EVENT: &str = "evt-harbour-lights";
// DO NOT re-use this secret anywhere.
pub const WEBHOOK_SECRET: &str = "whsec_endpoint_tests_only";

/// A checkout API over a fresh in-memory catalog:
/// * `ga`: 10 tickets at $40.00
/// * `vip`: 1 ticket at $250.00
/// * `parking`: 5 add-ons at $15.00
pub async fn seeded_api() -> (CheckoutFlowApi<MemoryDatabase>, MockClock) {
    let clock = MockClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap());
    let db = MemoryDatabase::new();
    let event = TicketedEvent::on_sale(EventId::new(EVENT), "Harbour Lights", clock.now() + Duration::days(30));
    db.upsert_event(event).await.expect("Error creating event");
    let units = [
        NewSellableUnit::ticket(UnitId::new("ga"), EVENT.into(), "General admission", 10, Cents::from(4_000)),
        NewSellableUnit::ticket(UnitId::new("vip"), EVENT.into(), "VIP", 1, Cents::from(25_000)),
        NewSellableUnit::addon(UnitId::new("parking"), EVENT.into(), "Parking", 5, Cents::from(1_500)),
    ];
    for unit in units {
        db.insert_unit(unit).await.expect("Error creating unit");
    }
    let api = CheckoutFlowApi::new(db, EventProducers::default()).with_clock(Arc::new(clock.clone()));
    (api, clock)
}

pub fn webhook_config() -> PaymentWebhookConfig {
    PaymentWebhookConfig { hmac_secret: Secret::new(WEBHOOK_SECRET.to_string()), hmac_checks: true }
}

/// Sends `req` to a checkout app backed by `api` and returns the status and the parsed JSON body (`Null` if the body
/// is not JSON).
pub async fn send(api: &CheckoutFlowApi<MemoryDatabase>, req: TestRequest) -> (StatusCode, Value) {
    let api = api.clone();
    let webhook = webhook_config();
    let app = App::new().configure(|cfg| configure_checkout_app(cfg, api, &webhook));
    let service = test::init_service(app).await;
    debug!("Making request");
    // Middleware rejections surface as errors rather than responses
    let (status, body) = match test::try_call_service(&service, req.to_request()).await {
        Ok(res) => (res.status(), test::read_body(res).await),
        Err(e) => {
            let res = e.error_response();
            (res.status(), body::to_bytes(res.into_body()).await.unwrap_or_default())
        },
    };
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}
