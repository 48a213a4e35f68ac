use checkout_engine::{
    db_types::{EventId, GiftCard, NewSellableUnit, PromoCode, ReservationItem, TicketedEvent, UnitId},
    pricing::{InventoryBucket, PricingRule, PricingStrategy},
    CatalogManagement,
    InventoryLedger,
};
use chrono::Duration;
use cucumber::given;

use crate::cucumber::{checkout_world::CheckoutSystem, steps::dollars, CheckoutWorld};

#[given("a fresh install")]
async fn fresh_database(world: &mut CheckoutWorld) {
    let system = CheckoutSystem::new().await;
    world.system = Some(system);
}

#[given(expr = "an event {string} on sale starting in {int} days")]
async fn event_on_sale(world: &mut CheckoutWorld, event_id: String, days: i64) {
    let starts_at = world.api().now() + Duration::days(days);
    let event = TicketedEvent::on_sale(EventId::new(event_id), "Cucumber Gala", starts_at);
    world.api().db().upsert_event(event).await.expect("Error creating event");
}

#[given(regex = r#"^an? (ticket|add-on) unit "([^"]+)" for "([^"]+)" with capacity (\d+) priced at \$(\d+\.\d\d)$"#)]
async fn sellable_unit(
    world: &mut CheckoutWorld,
    kind: String,
    unit_id: String,
    event_id: String,
    capacity: u32,
    price: String,
) {
    let (id, event_id, price) = (UnitId::new(unit_id.as_str()), EventId::new(event_id), dollars(&price));
    let unit = match kind.as_str() {
        "ticket" => NewSellableUnit::ticket(id, event_id, unit_id, capacity, price),
        _ => NewSellableUnit::addon(id, event_id, unit_id, capacity, price),
    };
    world.api().db().insert_unit(unit).await.expect("Error creating unit");
}

#[given(
    regex = r#"^unit "([^"]+)" costs ([\d.]+) times as much from (\d+)% sold, within \$(\d+\.\d\d) and \$(\d+\.\d\d)$"#
)]
async fn inventory_rule(
    world: &mut CheckoutWorld,
    unit_id: String,
    multiplier: f64,
    percent_sold: f64,
    min: String,
    max: String,
) {
    let strategy = PricingStrategy::InventoryBased { buckets: vec![InventoryBucket::new(percent_sold, multiplier)] };
    let rule = PricingRule::new(UnitId::new(unit_id), strategy, dollars(&min), dollars(&max));
    world.api().db().upsert_pricing_rule(rule).await.expect("Error saving pricing rule");
}

#[given(expr = "{int} units of {string} have already been sold")]
async fn already_sold(world: &mut CheckoutWorld, quantity: u32, unit_id: String) {
    let now = world.api().now();
    let db = world.api().db();
    let reservation =
        db.reserve_all(&[ReservationItem::new(UnitId::new(unit_id), quantity)], now).await.expect("Error reserving");
    assert!(db.commit(&reservation.id, now).await.expect("Error committing"));
}

#[given(regex = r#"^a promo code "([^"]+)" for (\d+)% off$"#)]
async fn promo_code(world: &mut CheckoutWorld, code: String, percent: u32) {
    let promo = PromoCode::percentage(code, percent * 100);
    world.api().db().upsert_promo_code(promo).await.expect("Error saving promo code");
}

#[given(regex = r#"^a gift card "([^"]+)" with a balance of \$(\d+\.\d\d)$"#)]
async fn gift_card(world: &mut CheckoutWorld, code: String, balance: String) {
    let card = GiftCard::new(code, dollars(&balance));
    world.api().db().upsert_gift_card(card).await.expect("Error saving gift card");
}
