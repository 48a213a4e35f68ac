//! `MemoryDatabase` is an in-process implementation of the checkout engine backend.
//!
//! Inventory counters live in an arena of per-unit mutexes. `reserve_all` locks every unit it touches in unit-id order,
//! checks them all, and only then increments, so concurrent reservations against the same unit are totally ordered and
//! deadlock-free.
//!
//! Lock order, where more than one lock is held: orders, sales, promo codes, gift cards, reservations, the unit arena,
//! then individual units. No lock is ever held across an `.await`.
use std::{
    collections::{BTreeMap, HashMap, HashSet},
    fmt::Debug,
    sync::{Arc, Mutex, MutexGuard, RwLock},
};

use chrono::{DateTime, Utc};
use log::*;

use crate::{
    db_types::{
        merge_reservation_items,
        normalize_code,
        Cents,
        EventId,
        GiftCard,
        NewOrder,
        NewSellableUnit,
        Order,
        OrderId,
        OrderStatusType,
        PromoCode,
        Reservation,
        ReservationId,
        ReservationItem,
        ReservationStatus,
        SaleRecord,
        SellableUnit,
        Shortfall,
        TicketedEvent,
        UnitId,
    },
    helpers::new_reservation_id,
    pricing::PricingRule,
    traits::{CatalogManagement, CheckoutDatabase, CheckoutDbError, InventoryLedger, OrderTransition},
};

type UnitRecord = Arc<Mutex<SellableUnit>>;

#[derive(Default)]
struct MemoryStore {
    units: RwLock<BTreeMap<UnitId, UnitRecord>>,
    reservations: Mutex<HashMap<ReservationId, Reservation>>,
    orders: Mutex<HashMap<OrderId, Order>>,
    events: RwLock<HashMap<EventId, TicketedEvent>>,
    rules: RwLock<HashMap<UnitId, PricingRule>>,
    promo_codes: Mutex<HashMap<String, PromoCode>>,
    gift_cards: Mutex<HashMap<String, GiftCard>>,
    sales: Mutex<Vec<SaleRecord>>,
}

#[derive(Clone, Default)]
pub struct MemoryDatabase {
    inner: Arc<MemoryStore>,
}

impl Debug for MemoryDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MemoryDatabase")
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> CheckoutDbError {
    error!("🗃️ A memory store lock is poisoned. {e}");
    CheckoutDbError::DatabaseError(format!("Lock poisoned: {e}"))
}

fn lock<T>(m: &Mutex<T>) -> Result<MutexGuard<'_, T>, CheckoutDbError> {
    m.lock().map_err(poisoned)
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up the arena records for the given items. Items must already be merged and sorted.
    fn unit_records(&self, items: &[ReservationItem]) -> Result<Vec<UnitRecord>, CheckoutDbError> {
        let units = self.inner.units.read().map_err(poisoned)?;
        items
            .iter()
            .map(|item| units.get(&item.unit_id).cloned().ok_or_else(|| CheckoutDbError::UnitNotFound(item.unit_id.clone())))
            .collect()
    }

    /// Moves a held reservation to `target`, adjusting unit counters. The caller may hold the orders lock.
    fn settle_reservation(
        &self,
        id: &ReservationId,
        target: ReservationStatus,
        at: DateTime<Utc>,
    ) -> Result<bool, CheckoutDbError> {
        let mut reservations = lock(&self.inner.reservations)?;
        let reservation =
            reservations.get_mut(id).ok_or_else(|| CheckoutDbError::ReservationNotFound(id.clone()))?;
        if reservation.status != ReservationStatus::Held {
            trace!("🗃️ Reservation {id} is already {}. Nothing to do.", reservation.status);
            return Ok(false);
        }
        let records = self.unit_records(&reservation.items)?;
        let mut guards = records.iter().map(|r| lock(r)).collect::<Result<Vec<_>, _>>()?;
        for (item, unit) in reservation.items.iter().zip(guards.iter_mut()) {
            unit.reserved = unit.reserved.saturating_sub(item.quantity);
            if target == ReservationStatus::Committed {
                unit.sold += item.quantity;
            }
        }
        reservation.status = target;
        reservation.updated_at = at;
        Ok(true)
    }

}

fn redeem_discounts(
    order: &mut Order,
    promo_codes: &mut HashMap<String, PromoCode>,
    gift_cards: &mut HashMap<String, GiftCard>,
) {
    if let Some(code) = &order.promo_code {
        match promo_codes.get_mut(code) {
            Some(promo) => promo.times_used += 1,
            None => warn!("🗃️ Promo code {code} on order {} no longer exists", order.id),
        }
    }
    if let Some(code) = &order.gift_card_code {
        if order.gift_card_amount > Cents::ZERO {
            let debited = match gift_cards.get_mut(code) {
                Some(card) => {
                    let debit = card.balance.min(order.gift_card_amount).max(Cents::ZERO);
                    card.balance -= debit;
                    debit
                },
                None => Cents::ZERO,
            };
            if debited < order.gift_card_amount {
                warn!("🗃️ Gift card {code} only covered {debited} of {} for order {}", order.gift_card_amount, order.id);
                order.needs_review = true;
            }
        }
    }
}

impl InventoryLedger for MemoryDatabase {
    async fn reserve_all(&self, items: &[ReservationItem], at: DateTime<Utc>) -> Result<Reservation, CheckoutDbError> {
        let items = merge_reservation_items(items);
        if items.is_empty() {
            return Err(CheckoutDbError::InvalidData("A reservation needs at least one unit".into()));
        }
        let records = self.unit_records(&items)?;
        {
            let mut guards = records.iter().map(|r| lock(r)).collect::<Result<Vec<_>, _>>()?;
            let shortfalls = items
                .iter()
                .zip(guards.iter())
                .filter(|(item, unit)| unit.available() < item.quantity)
                .map(|(item, unit)| Shortfall::new(item.unit_id.clone(), item.quantity, unit.available()))
                .collect::<Vec<_>>();
            if !shortfalls.is_empty() {
                debug!("📦️ Reservation refused. {} unit type(s) oversubscribed", shortfalls.len());
                return Err(CheckoutDbError::InsufficientInventory(shortfalls));
            }
            for (item, unit) in items.iter().zip(guards.iter_mut()) {
                unit.reserved += item.quantity;
            }
        }
        let reservation = Reservation {
            id: new_reservation_id(),
            status: ReservationStatus::Held,
            created_at: at,
            updated_at: at,
            items,
        };
        lock(&self.inner.reservations)?.insert(reservation.id.clone(), reservation.clone());
        debug!("📦️ Reservation {} is holding {} unit type(s)", reservation.id, reservation.items.len());
        Ok(reservation)
    }

    async fn commit(&self, reservation: &ReservationId, at: DateTime<Utc>) -> Result<bool, CheckoutDbError> {
        self.settle_reservation(reservation, ReservationStatus::Committed, at)
    }

    async fn release(&self, reservation: &ReservationId, at: DateTime<Utc>) -> Result<bool, CheckoutDbError> {
        self.settle_reservation(reservation, ReservationStatus::Released, at)
    }

    async fn fetch_reservation(&self, reservation: &ReservationId) -> Result<Option<Reservation>, CheckoutDbError> {
        Ok(lock(&self.inner.reservations)?.get(reservation).cloned())
    }

    async fn unit_snapshot(&self, unit_id: &UnitId) -> Result<Option<SellableUnit>, CheckoutDbError> {
        let Some(record) = self.inner.units.read().map_err(poisoned)?.get(unit_id).cloned() else {
            return Ok(None);
        };
        let unit = lock(&record)?.clone();
        Ok(Some(unit))
    }

    async fn purchases_since(&self, unit_id: &UnitId, since: DateTime<Utc>) -> Result<u32, CheckoutDbError> {
        let sales = lock(&self.inner.sales)?;
        Ok(sales.iter().filter(|s| &s.unit_id == unit_id && s.sold_at >= since).map(|s| s.quantity).sum())
    }
}

impl CatalogManagement for MemoryDatabase {
    async fn upsert_event(&self, event: TicketedEvent) -> Result<TicketedEvent, CheckoutDbError> {
        self.inner.events.write().map_err(poisoned)?.insert(event.id.clone(), event.clone());
        Ok(event)
    }

    async fn fetch_event(&self, event_id: &EventId) -> Result<Option<TicketedEvent>, CheckoutDbError> {
        Ok(self.inner.events.read().map_err(poisoned)?.get(event_id).cloned())
    }

    async fn insert_unit(&self, unit: NewSellableUnit) -> Result<SellableUnit, CheckoutDbError> {
        if !self.inner.events.read().map_err(poisoned)?.contains_key(&unit.event_id) {
            return Err(CheckoutDbError::InvalidData(format!("Event {} does not exist", unit.event_id)));
        }
        if unit.base_price.is_negative() {
            return Err(CheckoutDbError::InvalidData(format!("Unit {} has a negative base price", unit.id)));
        }
        let mut units = self.inner.units.write().map_err(poisoned)?;
        if units.contains_key(&unit.id) {
            return Err(CheckoutDbError::UnitAlreadyExists(unit.id));
        }
        let record = SellableUnit {
            id: unit.id,
            event_id: unit.event_id,
            kind: unit.kind,
            name: unit.name,
            capacity: unit.capacity,
            reserved: 0,
            sold: 0,
            base_price: unit.base_price,
        };
        units.insert(record.id.clone(), Arc::new(Mutex::new(record.clone())));
        Ok(record)
    }

    async fn fetch_units(&self, ids: &[UnitId]) -> Result<Vec<SellableUnit>, CheckoutDbError> {
        let units = self.inner.units.read().map_err(poisoned)?;
        ids.iter().filter_map(|id| units.get(id)).map(|r| lock(r).map(|u| u.clone())).collect()
    }

    async fn fetch_units_for_event(&self, event_id: &EventId) -> Result<Vec<SellableUnit>, CheckoutDbError> {
        let units = self.inner.units.read().map_err(poisoned)?;
        let all = units.values().map(|r| lock(r).map(|u| u.clone())).collect::<Result<Vec<_>, _>>()?;
        Ok(all.into_iter().filter(|u| &u.event_id == event_id).collect())
    }

    async fn upsert_pricing_rule(&self, rule: PricingRule) -> Result<PricingRule, CheckoutDbError> {
        let unit = self.unit_snapshot(&rule.unit_id).await?.ok_or_else(|| CheckoutDbError::UnitNotFound(rule.unit_id.clone()))?;
        rule.validate(unit.base_price).map_err(|e| CheckoutDbError::InvalidData(e.to_string()))?;
        self.inner.rules.write().map_err(poisoned)?.insert(rule.unit_id.clone(), rule.clone());
        Ok(rule)
    }

    async fn fetch_pricing_rule(&self, unit_id: &UnitId) -> Result<Option<PricingRule>, CheckoutDbError> {
        Ok(self.inner.rules.read().map_err(poisoned)?.get(unit_id).cloned())
    }

    async fn remove_pricing_rule(&self, unit_id: &UnitId) -> Result<bool, CheckoutDbError> {
        Ok(self.inner.rules.write().map_err(poisoned)?.remove(unit_id).is_some())
    }

    async fn upsert_promo_code(&self, mut promo: PromoCode) -> Result<PromoCode, CheckoutDbError> {
        promo.code = normalize_code(&promo.code);
        lock(&self.inner.promo_codes)?.insert(promo.code.clone(), promo.clone());
        Ok(promo)
    }

    async fn fetch_promo_code(&self, code: &str) -> Result<Option<PromoCode>, CheckoutDbError> {
        Ok(lock(&self.inner.promo_codes)?.get(&normalize_code(code)).cloned())
    }

    async fn upsert_gift_card(&self, mut card: GiftCard) -> Result<GiftCard, CheckoutDbError> {
        card.code = normalize_code(&card.code);
        lock(&self.inner.gift_cards)?.insert(card.code.clone(), card.clone());
        Ok(card)
    }

    async fn fetch_gift_card(&self, code: &str) -> Result<Option<GiftCard>, CheckoutDbError> {
        Ok(lock(&self.inner.gift_cards)?.get(&normalize_code(code)).cloned())
    }
}

impl CheckoutDatabase for MemoryDatabase {
    fn url(&self) -> &str {
        "memory://"
    }

    async fn insert_order(&self, order: NewOrder) -> Result<Order, CheckoutDbError> {
        let mut orders = lock(&self.inner.orders)?;
        if orders.contains_key(&order.id) {
            return Err(CheckoutDbError::OrderAlreadyExists(order.id));
        }
        match lock(&self.inner.reservations)?.get(&order.reservation_id) {
            Some(r) if r.status == ReservationStatus::Held => {},
            Some(_) => return Err(CheckoutDbError::ReservationNotHeld(order.reservation_id)),
            None => return Err(CheckoutDbError::ReservationNotFound(order.reservation_id)),
        }
        let order = order.into_order();
        orders.insert(order.id.clone(), order.clone());
        debug!("🗃️ Order {} has been saved with {} line item(s)", order.id, order.line_items.len());
        Ok(order)
    }

    async fn fetch_order(&self, order_id: &OrderId) -> Result<Option<Order>, CheckoutDbError> {
        Ok(lock(&self.inner.orders)?.get(order_id).cloned())
    }

    async fn complete_order(&self, order_id: &OrderId, at: DateTime<Utc>) -> Result<OrderTransition, CheckoutDbError> {
        let mut orders = lock(&self.inner.orders)?;
        let order = orders.get_mut(order_id).ok_or_else(|| CheckoutDbError::OrderNotFound(order_id.clone()))?;
        if order.status != OrderStatusType::Pending {
            return Ok(OrderTransition::unchanged(order.clone()));
        }
        // Every lock is taken before the ledger moves, so a poisoned lock leaves the order and its hold untouched
        let mut sales = lock(&self.inner.sales)?;
        let mut promo_codes = lock(&self.inner.promo_codes)?;
        let mut gift_cards = lock(&self.inner.gift_cards)?;
        if !self.settle_reservation(&order.reservation_id, ReservationStatus::Committed, at)? {
            return Err(CheckoutDbError::ReservationNotHeld(order.reservation_id.clone()));
        }
        sales.extend(order.line_items.iter().map(|l| SaleRecord {
            unit_id: l.unit_id.clone(),
            order_id: order.id.clone(),
            quantity: l.quantity,
            sold_at: at,
        }));
        redeem_discounts(order, &mut promo_codes, &mut gift_cards);
        order.status = OrderStatusType::Completed;
        order.status_reason = None;
        order.updated_at = at;
        debug!("🗃️ Order {order_id} marked as Completed");
        Ok(OrderTransition::changed(order.clone()))
    }

    async fn annul_order(
        &self,
        order_id: &OrderId,
        status: OrderStatusType,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<OrderTransition, CheckoutDbError> {
        if !matches!(status, OrderStatusType::Expired | OrderStatusType::Cancelled) {
            return Err(CheckoutDbError::InvalidData(format!("Orders cannot be annulled to {status}")));
        }
        let mut orders = lock(&self.inner.orders)?;
        let order = orders.get_mut(order_id).ok_or_else(|| CheckoutDbError::OrderNotFound(order_id.clone()))?;
        if order.status != OrderStatusType::Pending {
            return Ok(OrderTransition::unchanged(order.clone()));
        }
        if !self.settle_reservation(&order.reservation_id, ReservationStatus::Released, at)? {
            warn!("🗃️ Reservation {} for pending order {order_id} was not held", order.reservation_id);
        }
        order.status = status;
        order.status_reason = Some(reason.to_string());
        order.updated_at = at;
        debug!("🗃️ Order {order_id} marked as {status}. {reason}");
        Ok(OrderTransition::changed(order.clone()))
    }

    async fn fetch_expired_pending_orders(&self, now: DateTime<Utc>) -> Result<Vec<Order>, CheckoutDbError> {
        let orders = lock(&self.inner.orders)?;
        let mut due = orders
            .values()
            .filter(|o| o.status == OrderStatusType::Pending && o.expires_at <= now)
            .cloned()
            .collect::<Vec<_>>();
        due.sort_by_key(|o| o.expires_at);
        Ok(due)
    }

    async fn release_orphaned_reservations(
        &self,
        created_before: DateTime<Utc>,
        at: DateTime<Utc>,
    ) -> Result<Vec<ReservationId>, CheckoutDbError> {
        // Holding the orders lock keeps `insert_order` from claiming a candidate while it is released
        let orders = lock(&self.inner.orders)?;
        let claimed = orders.values().map(|o| &o.reservation_id).collect::<HashSet<_>>();
        let mut candidates = lock(&self.inner.reservations)?
            .values()
            .filter(|r| r.status == ReservationStatus::Held && r.created_at <= created_before && !claimed.contains(&r.id))
            .map(|r| (r.created_at, r.id.clone()))
            .collect::<Vec<_>>();
        candidates.sort();
        let mut released = Vec::with_capacity(candidates.len());
        for (_, id) in candidates {
            if self.settle_reservation(&id, ReservationStatus::Released, at)? {
                warn!("🗃️ Reservation {id} was never claimed by an order. Its units are back on sale.");
                released.push(id);
            }
        }
        Ok(released)
    }
}
