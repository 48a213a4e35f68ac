use std::{collections::HashMap, fmt::Debug, sync::Arc};

use chrono::{DateTime, Duration, Utc};
use log::*;

use crate::{
    checkout_api::{
        checkout_objects::{CheckoutPolicy, CheckoutRequest, CheckoutResult, CheckoutSummary},
        errors::CheckoutError,
    },
    db_types::{
        NewOrder,
        Order,
        OrderId,
        OrderLineItem,
        OrderStatusType,
        Reservation,
        ReservationItem,
        SellableUnit,
        TicketedEvent,
        UnitId,
    },
    discounts::resolve_discounts,
    events::{EventProducers, OrderAnnulledEvent, OrderCompletedEvent, OrderCreatedEvent},
    helpers::{new_order_id, new_order_number, Clock, SystemClock},
    pricing::{quote_price, PricingSnapshot},
    traits::{CheckoutDatabase, ExpiryResult, OrderTransition},
};

pub const EXPIRED_REASON: &str = "Payment was not received before the hold expired";
pub const DEFAULT_CANCEL_REASON: &str = "Cancelled on request";

/// `CheckoutFlowApi` is the order assembler. It turns checkout requests into priced, reserved pending orders and owns
/// every subsequent state transition of those orders.
///
/// ```text
///            ┌──────────► Completed   (payment confirmed)
///  Pending ──┼──────────► Expired     (hold elapsed)
///            └──────────► Cancelled   (buyer or operator)
/// ```
#[derive(Clone)]
pub struct CheckoutFlowApi<B> {
    db: B,
    clock: Arc<dyn Clock>,
    policy: CheckoutPolicy,
    producers: EventProducers,
}

impl<B> Debug for CheckoutFlowApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CheckoutFlowApi ({:?})", self.policy)
    }
}

impl<B> CheckoutFlowApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, clock: Arc::new(SystemClock), policy: CheckoutPolicy::default(), producers }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_policy(mut self, policy: CheckoutPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    pub fn policy(&self) -> &CheckoutPolicy {
        &self.policy
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

impl<B> CheckoutFlowApi<B>
where B: CheckoutDatabase
{
    /// Creates a pending order for the request.
    ///
    /// The request is validated and priced before anything is reserved. Inventory for every line is then reserved in
    /// one all-or-nothing step. If anything fails after the reservation succeeded, the reservation is released before
    /// the error is returned, so a failed checkout never leaves a hold behind.
    pub async fn create_checkout(&self, request: CheckoutRequest) -> Result<CheckoutResult, CheckoutError> {
        let now = self.now();
        request.validate(&self.policy)?;
        let event = self.fetch_sellable_event(&request, now).await?;
        let units = self.fetch_requested_units(&request).await?;
        let mut priced = Vec::with_capacity(units.len());
        for (kind, line) in request.lines() {
            let unit = units.get(&line.unit_id).ok_or_else(|| CheckoutError::UnitNotFound(line.unit_id.clone()))?;
            if unit.kind != kind {
                return Err(CheckoutError::Validation(format!("Unit {} is a {}, not a {kind}", unit.id, unit.kind)));
            }
            priced.push(self.price_line(unit, line.quantity, &event, now).await?);
        }
        let items = priced.iter().map(|l| ReservationItem::new(l.unit_id.clone(), l.quantity)).collect::<Vec<_>>();
        let reservation = self.db.reserve_all(&items, now).await.map_err(|e| {
            info!("🛒️ Could not reserve inventory for event {}. {e}", event.id);
            CheckoutError::from(e)
        })?;
        trace!("🛒️ Reservation {} holds {} line(s)", reservation.id, items.len());
        match self.assemble_order(&request, &event, &reservation, priced, now).await {
            Ok(order) => {
                info!(
                    "🛒️ Order {} ({}) created for event {}. Total {} held until {}",
                    order.id, order.order_number, order.event_id, order.total, order.expires_at
                );
                self.producers.publish_order_created(OrderCreatedEvent::new(order.clone())).await;
                Ok(CheckoutResult::from(order))
            },
            Err(e) => {
                warn!("🛒️ Checkout failed after reserving inventory. Releasing reservation {}. {e}", reservation.id);
                if let Err(release_err) = self.db.release(&reservation.id, now).await {
                    error!(
                        "🛒️ Could not release reservation {} after a failed checkout. The reaper will release it once \
                         the hold has elapsed. {release_err}",
                        reservation.id
                    );
                }
                Err(e)
            },
        }
    }

    async fn fetch_sellable_event(
        &self,
        request: &CheckoutRequest,
        now: DateTime<Utc>,
    ) -> Result<TicketedEvent, CheckoutError> {
        let event = self
            .db
            .fetch_event(&request.event_id)
            .await?
            .ok_or_else(|| CheckoutError::EventNotFound(request.event_id.clone()))?;
        if !event.is_sellable(now) {
            debug!("🛒️ Event {} is not sellable. Status: {}, starts at {}", event.id, event.status, event.starts_at);
            return Err(CheckoutError::EventNotSellable { event_id: event.id, status: event.status });
        }
        Ok(event)
    }

    async fn fetch_requested_units(
        &self,
        request: &CheckoutRequest,
    ) -> Result<HashMap<UnitId, SellableUnit>, CheckoutError> {
        let ids = request.lines().map(|(_, l)| l.unit_id.clone()).collect::<Vec<_>>();
        let units = self.db.fetch_units(&ids).await?;
        let units = units.into_iter().map(|u| (u.id.clone(), u)).collect::<HashMap<_, _>>();
        if let Some(missing) = ids.iter().find(|id| !units.contains_key(*id)) {
            return Err(CheckoutError::UnitNotFound(missing.clone()));
        }
        if let Some(stray) = units.values().find(|u| u.event_id != request.event_id) {
            return Err(CheckoutError::Validation(format!(
                "Unit {} belongs to event {}, not {}",
                stray.id, stray.event_id, request.event_id
            )));
        }
        Ok(units)
    }

    /// Prices a line from a snapshot taken before the reservation. The trailing-hour sales count is advisory: sales
    /// that complete between the snapshot and the reservation are not reflected in this price.
    async fn price_line(
        &self,
        unit: &SellableUnit,
        quantity: u32,
        event: &TicketedEvent,
        now: DateTime<Utc>,
    ) -> Result<OrderLineItem, CheckoutError> {
        let rule = self.db.fetch_pricing_rule(&unit.id).await?;
        let purchases_last_hour = match &rule {
            Some(r) if r.strategy.uses_demand() => self.db.purchases_since(&unit.id, now - Duration::hours(1)).await?,
            _ => 0,
        };
        let snapshot = PricingSnapshot::for_unit(unit, purchases_last_hour, event.starts_at);
        let quote = quote_price(unit.base_price, rule.as_ref(), &snapshot, now);
        if quote.unit_price != quote.base_price {
            debug!(
                "🏷️ {} priced at {} (base {}, multiplier {:.4}{})",
                unit.id,
                quote.unit_price,
                quote.base_price,
                quote.multiplier,
                if quote.clamped { ", clamped" } else { "" }
            );
        }
        Ok(OrderLineItem {
            unit_id: unit.id.clone(),
            kind: unit.kind,
            name: unit.name.clone(),
            quantity,
            unit_price: quote.unit_price,
            line_total: quote.unit_price * i64::from(quantity),
        })
    }

    async fn assemble_order(
        &self,
        request: &CheckoutRequest,
        event: &TicketedEvent,
        reservation: &Reservation,
        lines: Vec<OrderLineItem>,
        now: DateTime<Utc>,
    ) -> Result<Order, CheckoutError> {
        let subtotal = lines.iter().map(|l| l.line_total).sum();
        let discounts = resolve_discounts(
            &self.db,
            subtotal,
            &event.id,
            request.promo_code.as_deref(),
            request.gift_card_code.as_deref(),
            now,
        )
        .await?;
        let summary = CheckoutSummary::assemble(&self.policy, &lines, &discounts);
        if summary.needs_review {
            warn!("🛒️ Checkout for event {} would have a negative total. Clamped to zero for review.", event.id);
        }
        let order = NewOrder {
            id: new_order_id(),
            order_number: new_order_number(now),
            event_id: event.id.clone(),
            reservation_id: reservation.id.clone(),
            line_items: lines,
            subtotal: summary.subtotal,
            discount_amount: summary.discount_amount,
            gift_card_amount: summary.gift_card_amount,
            service_fee: summary.service_fee,
            facility_fee: summary.facility_fee,
            tax_amount: summary.tax_amount,
            total: summary.total_amount,
            promo_code: discounts.promo_code,
            gift_card_code: discounts.gift_card_code,
            needs_review: summary.needs_review,
            discount_notes: discounts.notes,
            expires_at: now + self.policy.hold_duration,
            created_at: now,
        };
        let order = self.db.insert_order(order).await?;
        Ok(order)
    }

    /// Marks a pending order as paid and converts its held inventory into sales.
    ///
    /// Completing an order that is already complete returns it unchanged, so payment webhooks can be retried freely.
    /// A pending order whose hold has elapsed can still be completed as long as the reaper has not expired it yet.
    pub async fn complete(&self, order_id: &OrderId) -> Result<Order, CheckoutError> {
        let transition = self.db.complete_order(order_id, self.now()).await?;
        let OrderTransition { order, previous_status, changed } = transition;
        if changed {
            info!("🛒️ Order {order_id} is complete. {} ticket(s) sold for {}", order.ticket_count(), order.total);
            if order.needs_review {
                warn!("🛒️ Order {order_id} needs review. The gift card no longer covered the amount applied at checkout.");
            }
            self.producers.publish_order_completed(OrderCompletedEvent::new(order.clone())).await;
            return Ok(order);
        }
        match previous_status {
            OrderStatusType::Completed => {
                debug!("🛒️ Order {order_id} was already complete. Nothing to do.");
                Ok(order)
            },
            from => {
                warn!("🛒️ Payment confirmed for order {order_id}, but it is {from}. It cannot be completed.");
                Err(CheckoutError::StateConflict { order_id: order_id.clone(), from, to: OrderStatusType::Completed })
            },
        }
    }

    /// Expires a pending order whose hold has elapsed, returning its inventory to the pool.
    ///
    /// Orders that already left `Pending` are returned unchanged. An order whose hold is still running is an error.
    pub async fn expire(&self, order_id: &OrderId) -> Result<OrderTransition, CheckoutError> {
        let now = self.now();
        let order = self.fetch_order(order_id).await?;
        if order.status.is_terminal() {
            trace!("🕰️ Order {order_id} is already {}. Not expiring it.", order.status);
            return Ok(OrderTransition::unchanged(order));
        }
        if !order.hold_elapsed(now) {
            return Err(CheckoutError::HoldStillActive { order_id: order_id.clone(), expires_at: order.expires_at });
        }
        let transition = self.db.annul_order(order_id, OrderStatusType::Expired, EXPIRED_REASON, now).await?;
        if transition.changed {
            debug!("🕰️ Order {order_id} expired. Its reservation was released.");
            self.producers.publish_order_annulled(OrderAnnulledEvent::new(transition.order.clone())).await;
        }
        Ok(transition)
    }

    /// Releases a pending order early.
    ///
    /// Cancelling a cancelled order is a no-op. Completed and expired orders cannot be cancelled.
    pub async fn cancel(&self, order_id: &OrderId, reason: Option<&str>) -> Result<Order, CheckoutError> {
        let reason = reason.map(str::trim).filter(|r| !r.is_empty()).unwrap_or(DEFAULT_CANCEL_REASON);
        let transition = self.db.annul_order(order_id, OrderStatusType::Cancelled, reason, self.now()).await?;
        let OrderTransition { order, previous_status, changed } = transition;
        if changed {
            info!("🛒️ Order {order_id} was cancelled. {reason}");
            self.producers.publish_order_annulled(OrderAnnulledEvent::new(order.clone())).await;
            return Ok(order);
        }
        match previous_status {
            OrderStatusType::Cancelled => Ok(order),
            from => Err(CheckoutError::StateConflict { order_id: order_id.clone(), from, to: OrderStatusType::Cancelled }),
        }
    }

    pub async fn fetch_order(&self, order_id: &OrderId) -> Result<Order, CheckoutError> {
        self.db.fetch_order(order_id).await?.ok_or_else(|| CheckoutError::OrderNotFound(order_id.clone()))
    }

    /// Fetches an order for display. A pending order whose hold has elapsed is expired first, so the caller never sees
    /// a stale `Pending` state.
    pub async fn order_status(&self, order_id: &OrderId) -> Result<Order, CheckoutError> {
        let order = self.fetch_order(order_id).await?;
        if order.status == OrderStatusType::Pending && order.hold_elapsed(self.now()) {
            debug!("🕰️ Order {order_id} is past its hold. Expiring it before reporting its status.");
            let transition = self.expire(order_id).await?;
            return Ok(transition.order);
        }
        Ok(order)
    }

    /// One reaper pass. Every pending order whose hold has elapsed is expired.
    ///
    /// Orders that were completed or cancelled between the query and the transition are reported as skipped. Failures
    /// on individual orders are logged and left for the next pass.
    ///
    /// The pass also releases held reservations older than the hold duration that no order claimed. These are left
    /// behind when a checkout dies between reserving inventory and saving its order.
    pub async fn expire_stale_orders(&self) -> Result<ExpiryResult, CheckoutError> {
        let now = self.now();
        let due = self.db.fetch_expired_pending_orders(now).await?;
        let mut result = ExpiryResult::default();
        for order in due {
            match self.db.annul_order(&order.id, OrderStatusType::Expired, EXPIRED_REASON, now).await {
                Ok(t) if t.changed => {
                    self.producers.publish_order_annulled(OrderAnnulledEvent::new(t.order.clone())).await;
                    result.expired.push(t.order);
                },
                Ok(t) => {
                    debug!("🕰️ Order {} became {} before it could be expired", t.order.id, t.order.status);
                    result.skipped.push(t.order.id);
                },
                Err(e) => error!("🕰️ Could not expire order {}. It will be retried on the next pass. {e}", order.id),
            }
        }
        match self.db.release_orphaned_reservations(now - self.policy.hold_duration, now).await {
            Ok(released) => result.released_reservations = released,
            Err(e) => error!("🕰️ Could not release unclaimed reservations. They will be retried on the next pass. {e}"),
        }
        if !result.is_empty() {
            info!(
                "🕰️ Expired {} order(s). {} skipped. {} unclaimed reservation(s) released",
                result.expired_count(),
                result.skipped_count(),
                result.released_count()
            );
        }
        Ok(result)
    }
}
