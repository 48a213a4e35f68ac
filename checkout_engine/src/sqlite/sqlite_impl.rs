//! `SqliteDatabase` is a concrete implementation of a checkout engine backend.
//!
//! Unsurprisingly, it uses SQLite as the backend and implements all the traits defined in the [`crate::traits`]
//! module.
use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;
use sqlx::{migrate, SqlitePool};

use super::db::{catalog, db_url, inventory, new_pool, orders, redemptions};
use crate::{
    db_types::{
        merge_reservation_items,
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
        SellableUnit,
        Shortfall,
        TicketedEvent,
        UnitId,
    },
    helpers::new_reservation_id,
    pricing::PricingRule,
    traits::{CatalogManagement, CheckoutDatabase, CheckoutDbError, InventoryLedger, OrderTransition},
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl InventoryLedger for SqliteDatabase {
    /// Reserves every item in one transaction. Each unit is claimed with a conditional increment, so the first
    /// statement of the transaction is a write and concurrent reservations serialise on the SQLite write lock.
    async fn reserve_all(&self, items: &[ReservationItem], at: DateTime<Utc>) -> Result<Reservation, CheckoutDbError> {
        let items = merge_reservation_items(items);
        if items.is_empty() {
            return Err(CheckoutDbError::InvalidData("A reservation needs at least one unit".into()));
        }
        let mut tx = self.pool.begin().await?;
        let mut shortfalls = Vec::new();
        for item in &items {
            if !inventory::try_reserve(&item.unit_id, item.quantity, &mut tx).await? {
                let unit = catalog::fetch_unit(&item.unit_id, &mut tx)
                    .await?
                    .ok_or_else(|| CheckoutDbError::UnitNotFound(item.unit_id.clone()))?;
                shortfalls.push(Shortfall::new(item.unit_id.clone(), item.quantity, unit.available()));
            }
        }
        if !shortfalls.is_empty() {
            tx.rollback().await?;
            debug!("📦️ Reservation refused. {} unit type(s) oversubscribed", shortfalls.len());
            return Err(CheckoutDbError::InsufficientInventory(shortfalls));
        }
        let reservation = inventory::insert_reservation(new_reservation_id(), items, at, &mut tx).await?;
        tx.commit().await?;
        debug!("📦️ Reservation {} is holding {} unit type(s)", reservation.id, reservation.items.len());
        Ok(reservation)
    }

    async fn commit(&self, reservation: &ReservationId, at: DateTime<Utc>) -> Result<bool, CheckoutDbError> {
        self.settle(reservation, ReservationStatus::Committed, at).await
    }

    async fn release(&self, reservation: &ReservationId, at: DateTime<Utc>) -> Result<bool, CheckoutDbError> {
        self.settle(reservation, ReservationStatus::Released, at).await
    }

    async fn fetch_reservation(&self, reservation: &ReservationId) -> Result<Option<Reservation>, CheckoutDbError> {
        let mut conn = self.pool.acquire().await?;
        let reservation = inventory::fetch_reservation(reservation, &mut conn).await?;
        Ok(reservation)
    }

    async fn unit_snapshot(&self, unit_id: &UnitId) -> Result<Option<SellableUnit>, CheckoutDbError> {
        let mut conn = self.pool.acquire().await?;
        let unit = catalog::fetch_unit(unit_id, &mut conn).await?;
        Ok(unit)
    }

    async fn purchases_since(&self, unit_id: &UnitId, since: DateTime<Utc>) -> Result<u32, CheckoutDbError> {
        let mut conn = self.pool.acquire().await?;
        let total = inventory::purchases_since(unit_id, since, &mut conn).await?;
        Ok(total)
    }
}

impl CatalogManagement for SqliteDatabase {
    async fn upsert_event(&self, event: TicketedEvent) -> Result<TicketedEvent, CheckoutDbError> {
        let mut conn = self.pool.acquire().await?;
        let event = catalog::upsert_event(event, &mut conn).await?;
        Ok(event)
    }

    async fn fetch_event(&self, event_id: &EventId) -> Result<Option<TicketedEvent>, CheckoutDbError> {
        let mut conn = self.pool.acquire().await?;
        let event = catalog::fetch_event(event_id, &mut conn).await?;
        Ok(event)
    }

    async fn insert_unit(&self, unit: NewSellableUnit) -> Result<SellableUnit, CheckoutDbError> {
        let mut conn = self.pool.acquire().await?;
        catalog::insert_unit(unit, &mut conn).await
    }

    async fn fetch_units(&self, ids: &[UnitId]) -> Result<Vec<SellableUnit>, CheckoutDbError> {
        let mut conn = self.pool.acquire().await?;
        let mut units = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(unit) = catalog::fetch_unit(id, &mut conn).await? {
                units.push(unit);
            }
        }
        Ok(units)
    }

    async fn fetch_units_for_event(&self, event_id: &EventId) -> Result<Vec<SellableUnit>, CheckoutDbError> {
        let mut conn = self.pool.acquire().await?;
        let units = catalog::fetch_units_for_event(event_id, &mut conn).await?;
        Ok(units)
    }

    async fn upsert_pricing_rule(&self, rule: PricingRule) -> Result<PricingRule, CheckoutDbError> {
        let mut conn = self.pool.acquire().await?;
        let unit = catalog::fetch_unit(&rule.unit_id, &mut conn)
            .await?
            .ok_or_else(|| CheckoutDbError::UnitNotFound(rule.unit_id.clone()))?;
        rule.validate(unit.base_price).map_err(|e| CheckoutDbError::InvalidData(e.to_string()))?;
        let rule = catalog::upsert_pricing_rule(rule, &mut conn).await?;
        Ok(rule)
    }

    async fn fetch_pricing_rule(&self, unit_id: &UnitId) -> Result<Option<PricingRule>, CheckoutDbError> {
        let mut conn = self.pool.acquire().await?;
        let rule = catalog::fetch_pricing_rule(unit_id, &mut conn).await?;
        Ok(rule)
    }

    async fn remove_pricing_rule(&self, unit_id: &UnitId) -> Result<bool, CheckoutDbError> {
        let mut conn = self.pool.acquire().await?;
        let removed = catalog::remove_pricing_rule(unit_id, &mut conn).await?;
        Ok(removed)
    }

    async fn upsert_promo_code(&self, promo: PromoCode) -> Result<PromoCode, CheckoutDbError> {
        let mut conn = self.pool.acquire().await?;
        let promo = catalog::upsert_promo_code(promo, &mut conn).await?;
        Ok(promo)
    }

    async fn fetch_promo_code(&self, code: &str) -> Result<Option<PromoCode>, CheckoutDbError> {
        let mut conn = self.pool.acquire().await?;
        let promo = catalog::fetch_promo_code(code, &mut conn).await?;
        Ok(promo)
    }

    async fn upsert_gift_card(&self, card: GiftCard) -> Result<GiftCard, CheckoutDbError> {
        let mut conn = self.pool.acquire().await?;
        let card = catalog::upsert_gift_card(card, &mut conn).await?;
        Ok(card)
    }

    async fn fetch_gift_card(&self, code: &str) -> Result<Option<GiftCard>, CheckoutDbError> {
        let mut conn = self.pool.acquire().await?;
        let card = catalog::fetch_gift_card(code, &mut conn).await?;
        Ok(card)
    }
}

impl CheckoutDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn insert_order(&self, order: NewOrder) -> Result<Order, CheckoutDbError> {
        let mut tx = self.pool.begin().await?;
        let reservation_id = order.reservation_id.clone();
        let order = orders::insert_order(order, &mut tx).await?;
        match inventory::reservation_status(&reservation_id, &mut tx).await? {
            Some(ReservationStatus::Held) => {},
            Some(_) => return Err(CheckoutDbError::ReservationNotHeld(reservation_id)),
            None => return Err(CheckoutDbError::ReservationNotFound(reservation_id)),
        }
        tx.commit().await?;
        debug!("🗃️ Order {} has been saved in the DB", order.id);
        Ok(order)
    }

    async fn fetch_order(&self, order_id: &OrderId) -> Result<Option<Order>, CheckoutDbError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order(order_id, &mut conn).await?;
        Ok(order)
    }

    /// Completes the order in a single atomic transaction. The order status compare-and-set is the first statement,
    /// so a racing expiry or cancellation either sees `Completed` or loses.
    async fn complete_order(&self, order_id: &OrderId, at: DateTime<Utc>) -> Result<OrderTransition, CheckoutDbError> {
        let mut tx = self.pool.begin().await?;
        let updated = orders::transition_pending_order(order_id, OrderStatusType::Completed, None, at, &mut tx).await?;
        let Some(mut order) = updated else {
            let current =
                orders::fetch_order(order_id, &mut tx).await?.ok_or_else(|| CheckoutDbError::OrderNotFound(order_id.clone()))?;
            tx.rollback().await?;
            trace!("🗃️ Order {order_id} is {}. Not completing it.", current.status);
            return Ok(OrderTransition::unchanged(current));
        };
        if !inventory::settle_reservation(&order.reservation_id, ReservationStatus::Committed, at, &mut tx).await? {
            error!("🗃️ Reservation {} for pending order {order_id} is not held. Rolling back.", order.reservation_id);
            return Err(CheckoutDbError::ReservationNotHeld(order.reservation_id));
        }
        order.line_items = orders::fetch_line_items(order_id, &mut tx).await?;
        inventory::record_sales(&order, at, &mut tx).await?;
        if let Some(code) = &order.promo_code {
            redemptions::increment_promo_usage(code, &mut tx).await?;
        }
        if let Some(code) = &order.gift_card_code {
            let debited = redemptions::debit_gift_card(code, order.gift_card_amount, &mut tx).await?;
            if debited < order.gift_card_amount {
                warn!(
                    "🗃️ Gift card {code} only covered {debited} of {} for order {order_id}. Flagging for review.",
                    order.gift_card_amount
                );
                orders::flag_for_review(order_id, &mut tx).await?;
                order.needs_review = true;
            }
        }
        tx.commit().await?;
        debug!("🗃️ Order {order_id} marked as Completed");
        Ok(OrderTransition::changed(order))
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
        let mut tx = self.pool.begin().await?;
        let updated = orders::transition_pending_order(order_id, status, Some(reason), at, &mut tx).await?;
        let Some(mut order) = updated else {
            let current =
                orders::fetch_order(order_id, &mut tx).await?.ok_or_else(|| CheckoutDbError::OrderNotFound(order_id.clone()))?;
            tx.rollback().await?;
            trace!("🗃️ Order {order_id} is {}. Not moving it to {status}.", current.status);
            return Ok(OrderTransition::unchanged(current));
        };
        if !inventory::settle_reservation(&order.reservation_id, ReservationStatus::Released, at, &mut tx).await? {
            warn!("🗃️ Reservation {} for pending order {order_id} was not held", order.reservation_id);
        }
        order.line_items = orders::fetch_line_items(order_id, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Order {order_id} marked as {status}. {reason}");
        Ok(OrderTransition::changed(order))
    }

    async fn fetch_expired_pending_orders(&self, now: DateTime<Utc>) -> Result<Vec<Order>, CheckoutDbError> {
        let mut conn = self.pool.acquire().await?;
        let orders = orders::fetch_expired_pending_orders(now, &mut conn).await?;
        Ok(orders)
    }

    async fn release_orphaned_reservations(
        &self,
        created_before: DateTime<Utc>,
        at: DateTime<Utc>,
    ) -> Result<Vec<ReservationId>, CheckoutDbError> {
        let candidates = {
            let mut conn = self.pool.acquire().await?;
            inventory::fetch_orphaned_holds(created_before, &mut conn).await?
        };
        let mut released = Vec::with_capacity(candidates.len());
        for id in candidates {
            let mut tx = self.pool.begin().await?;
            if inventory::release_orphaned_hold(&id, at, &mut tx).await? {
                tx.commit().await?;
                warn!("🗃️ Reservation {id} was never claimed by an order. Its units are back on sale.");
                released.push(id);
            } else {
                tx.rollback().await?;
            }
        }
        Ok(released)
    }
}

impl SqliteDatabase {
    /// Creates a new database API object using the `TCG_DATABASE_URL` environment variable, or the default location.
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        trace!("Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    /// Brings the schema up to date.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        migrate!("./src/sqlite/migrations").run(&self.pool).await?;
        info!("🗃️ Database migrations complete");
        Ok(())
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn settle(
        &self,
        reservation: &ReservationId,
        target: ReservationStatus,
        at: DateTime<Utc>,
    ) -> Result<bool, CheckoutDbError> {
        let mut tx = self.pool.begin().await?;
        let settled = inventory::settle_reservation(reservation, target, at, &mut tx).await?;
        if !settled && inventory::reservation_status(reservation, &mut tx).await?.is_none() {
            return Err(CheckoutDbError::ReservationNotFound(reservation.clone()));
        }
        tx.commit().await?;
        Ok(settled)
    }
}
