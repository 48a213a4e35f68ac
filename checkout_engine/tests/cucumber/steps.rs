use checkout_engine::{
    db_types::{Cents, OrderStatusType, UnitId},
    CheckoutError,
    CheckoutRequest,
    InventoryLedger,
};
use chrono::Duration;
use cucumber::{then, when};

use crate::cucumber::CheckoutWorld;

/// Parses `123.45` into cents.
pub fn dollars(s: &str) -> Cents {
    let (whole, cents) = s.split_once('.').unwrap_or((s, "0"));
    let whole = whole.parse::<i64>().expect("Invalid dollar amount");
    let cents = cents.parse::<i64>().expect("Invalid cent amount");
    Cents::from(whole * 100 + cents)
}

async fn checkout(world: &mut CheckoutWorld, buyer: String, request: CheckoutRequest) {
    let result = world.api().create_checkout(request).await;
    world.system().checkouts.insert(buyer, result);
}

#[when(expr = "{word} checks out {int} ticket(s) of {string} for {string}")]
async fn checks_out(world: &mut CheckoutWorld, buyer: String, quantity: u32, unit_id: String, event_id: String) {
    let request = CheckoutRequest::new(event_id).with_tickets(unit_id, quantity);
    checkout(world, buyer, request).await;
}

#[when(expr = "{word} checks out {int} ticket(s) of {string} for {string} with promo code {string} and gift card {string}")]
async fn checks_out_with_discounts(
    world: &mut CheckoutWorld,
    buyer: String,
    quantity: u32,
    unit_id: String,
    event_id: String,
    promo: String,
    gift_card: String,
) {
    let request =
        CheckoutRequest::new(event_id).with_tickets(unit_id, quantity).with_promo_code(promo).with_gift_card(gift_card);
    checkout(world, buyer, request).await;
}

#[when(expr = "{word} and {word} both check out {int} ticket(s) of {string} for {string} at the same time")]
async fn race(world: &mut CheckoutWorld, a: String, b: String, quantity: u32, unit_id: String, event_id: String) {
    let request = CheckoutRequest::new(event_id).with_tickets(unit_id, quantity);
    let api = world.api().clone();
    let (ra, rb) = tokio::join!(api.create_checkout(request.clone()), api.create_checkout(request));
    world.system().checkouts.insert(a, ra);
    world.system().checkouts.insert(b, rb);
}

#[when(expr = "the payment for {word} is confirmed")]
async fn payment_confirmed(world: &mut CheckoutWorld, buyer: String) {
    let order_id = world.checkout(&buyer).order_id.clone();
    let order = world.api().complete(&order_id).await.expect("Error completing order");
    assert_eq!(order.status, OrderStatusType::Completed);
}

#[when(expr = "{word} cancels the order")]
async fn cancels(world: &mut CheckoutWorld, buyer: String) {
    let order_id = world.checkout(&buyer).order_id.clone();
    world.api().cancel(&order_id, Some("Buyer cancelled")).await.expect("Error cancelling order");
}

#[when(expr = "{int} minutes pass")]
async fn minutes_pass(world: &mut CheckoutWorld, minutes: i64) {
    world.system().clock.advance(Duration::minutes(minutes));
}

#[when("the expiry reaper runs")]
async fn reaper_runs(world: &mut CheckoutWorld) {
    let result = world.api().expire_stale_orders().await.expect("Reaper pass failed");
    world.system().last_expiry = Some(result);
}

#[then(expr = "the checkout for {word} succeeds")]
async fn checkout_succeeds(world: &mut CheckoutWorld, buyer: String) {
    let result = world.checkout(&buyer);
    assert_eq!(result.status, OrderStatusType::Pending);
}

#[then(expr = "the checkout for {word} fails with a shortfall of {int} on {string}")]
async fn checkout_fails(world: &mut CheckoutWorld, buyer: String, shortfall: u32, unit_id: String) {
    let system = world.system();
    match system.checkouts.get(&buyer) {
        Some(Err(CheckoutError::InsufficientInventory(shortfalls))) => {
            let s = shortfalls.iter().find(|s| s.unit_id.as_str() == unit_id).expect("No shortfall for unit");
            assert_eq!(s.shortfall, shortfall);
        },
        other => panic!("Expected an inventory shortfall for {buyer}, got {other:?}"),
    }
}

#[then(expr = "exactly one of {word} and {word} holds a ticket")]
async fn exactly_one_winner(world: &mut CheckoutWorld, a: String, b: String) {
    let system = world.system();
    let winners = [a, b].iter().filter(|buyer| matches!(system.checkouts.get(*buyer), Some(Ok(_)))).count();
    assert_eq!(winners, 1);
}

#[then(regex = r"^the unit price for (\S+) is \$(\d+\.\d\d)$")]
async fn unit_price(world: &mut CheckoutWorld, buyer: String, price: String) {
    let result = world.checkout(&buyer);
    assert_eq!(result.line_items[0].unit_price, dollars(&price));
}

#[then(regex = r"^after discounts (\S+) pays \$(\d+\.\d\d) before fees and tax$")]
async fn payable_after_discounts(world: &mut CheckoutWorld, buyer: String, amount: String) {
    let s = world.checkout(&buyer).summary;
    assert_eq!(s.subtotal - s.discount_amount - s.gift_card_amount, dollars(&amount));
}

#[then(regex = r"^the total for (\S+) is \$(\d+\.\d\d)$")]
async fn total(world: &mut CheckoutWorld, buyer: String, amount: String) {
    let result = world.checkout(&buyer);
    assert_eq!(result.summary.total_amount, dollars(&amount));
}

#[then(expr = "the order for {word} is {word}")]
async fn order_status(world: &mut CheckoutWorld, buyer: String, status: String) {
    let expected = status.parse::<OrderStatusType>().expect("Not an order status");
    let order_id = world.checkout(&buyer).order_id.clone();
    let order = world.api().fetch_order(&order_id).await.expect("Error fetching order");
    assert_eq!(order.status, expected);
}

#[then(expr = "unit {string} has {int} reserved and {int} sold")]
async fn unit_counters(world: &mut CheckoutWorld, unit_id: String, reserved: u32, sold: u32) {
    let unit = world
        .api()
        .db()
        .unit_snapshot(&UnitId::new(unit_id))
        .await
        .expect("Error fetching unit")
        .expect("Unit does not exist");
    assert_eq!((unit.reserved, unit.sold), (reserved, sold));
}

#[then(expr = "the reaper expired {int} order(s)")]
async fn reaper_expired(world: &mut CheckoutWorld, count: usize) {
    let result = world.system().last_expiry.as_ref().expect("The reaper has not run");
    assert_eq!(result.expired_count(), count);
}
