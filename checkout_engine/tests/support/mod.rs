#![allow(dead_code)]
use std::sync::Arc;

use checkout_engine::{
    db_types::{Cents, EventId, NewSellableUnit, ReservationItem, SellableUnit, TicketedEvent, UnitId},
    events::EventProducers,
    helpers::MockClock,
    test_utils::prepare_env::{prepare_test_env, random_db_path},
    CatalogManagement,
    CheckoutDatabase,
    CheckoutFlowApi,
    InventoryLedger,
    SqliteDatabase,
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use log::*;
use sqlx::{migrate::MigrateDatabase, Sqlite};

pub const EVENT: &str = "evt-arena-0601";

pub fn checkout_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

pub async fn sqlite_db() -> SqliteDatabase {
    let url = random_db_path();
    prepare_test_env(&url).await;
    SqliteDatabase::new_with_url(&url, 25).await.expect("Error creating database")
}

pub async fn tear_down(db: SqliteDatabase) {
    let url = db.url().to_string();
    db.close().await;
    if let Err(e) = Sqlite::drop_database(&url).await {
        error!("🚀️ Failed to drop database {url}: {e}");
    }
}

/// An on-sale event starting `days` after the checkout time.
pub async fn seed_event<B: CatalogManagement>(db: &B, days: i64) -> TicketedEvent {
    let event = TicketedEvent::on_sale(EventId::new(EVENT), "Summer Arena Night", checkout_time() + Duration::days(days));
    db.upsert_event(event).await.expect("Error creating event")
}

pub async fn seed_ticket<B: CatalogManagement>(db: &B, id: &str, capacity: u32, price: Cents) -> SellableUnit {
    let unit = NewSellableUnit::ticket(UnitId::new(id), EVENT.into(), format!("{id} admission"), capacity, price);
    db.insert_unit(unit).await.expect("Error creating ticket unit")
}

pub async fn seed_addon<B: CatalogManagement>(db: &B, id: &str, capacity: u32, price: Cents) -> SellableUnit {
    let unit = NewSellableUnit::addon(UnitId::new(id), EVENT.into(), id, capacity, price);
    db.insert_unit(unit).await.expect("Error creating add-on unit")
}

/// Moves `quantity` units straight to sold, as if earlier buyers had completed.
pub async fn sell_directly<B: InventoryLedger>(db: &B, id: &str, quantity: u32) {
    let reservation =
        db.reserve_all(&[ReservationItem::new(id.into(), quantity)], checkout_time()).await.expect("Error reserving");
    assert!(db.commit(&reservation.id, checkout_time()).await.expect("Error committing"));
}

pub fn api_with_clock<B>(db: B, clock: &MockClock) -> CheckoutFlowApi<B> {
    CheckoutFlowApi::new(db, EventProducers::default()).with_clock(Arc::new(clock.clone()))
}

pub async fn counters<B: InventoryLedger>(db: &B, id: &str) -> (u32, u32, u32) {
    let unit = db.unit_snapshot(&id.into()).await.expect("Error reading unit").expect("Unit does not exist");
    (unit.capacity, unit.reserved, unit.sold)
}
