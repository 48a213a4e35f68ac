use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    checkout_api::errors::CheckoutError,
    db_types::{Cents, EventId, Order, OrderId, OrderLineItem, OrderStatusType, UnitId, UnitKind},
    discounts::AppliedDiscounts,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItemRequest {
    pub unit_id: UnitId,
    pub quantity: u32,
}

impl LineItemRequest {
    pub fn new<S: Into<String>>(unit_id: S, quantity: u32) -> Self {
        Self { unit_id: UnitId::new(unit_id), quantity }
    }
}

/// A buyer's checkout request. `line_items` are tickets; `addons` are extras.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub event_id: EventId,
    #[serde(default)]
    pub line_items: Vec<LineItemRequest>,
    #[serde(default)]
    pub addons: Vec<LineItemRequest>,
    #[serde(default)]
    pub promo_code: Option<String>,
    #[serde(default)]
    pub gift_card_code: Option<String>,
}

impl CheckoutRequest {
    pub fn new<S: Into<String>>(event_id: S) -> Self {
        Self {
            event_id: EventId::new(event_id),
            line_items: Vec::new(),
            addons: Vec::new(),
            promo_code: None,
            gift_card_code: None,
        }
    }

    pub fn with_tickets<S: Into<String>>(mut self, unit_id: S, quantity: u32) -> Self {
        self.line_items.push(LineItemRequest::new(unit_id, quantity));
        self
    }

    pub fn with_addon<S: Into<String>>(mut self, unit_id: S, quantity: u32) -> Self {
        self.addons.push(LineItemRequest::new(unit_id, quantity));
        self
    }

    pub fn with_promo_code<S: Into<String>>(mut self, code: S) -> Self {
        self.promo_code = Some(code.into());
        self
    }

    pub fn with_gift_card<S: Into<String>>(mut self, code: S) -> Self {
        self.gift_card_code = Some(code.into());
        self
    }

    /// Every requested line, tagged with the kind of unit it must refer to.
    pub fn lines(&self) -> impl Iterator<Item = (UnitKind, &LineItemRequest)> {
        let tickets = self.line_items.iter().map(|l| (UnitKind::Ticket, l));
        let addons = self.addons.iter().map(|l| (UnitKind::Addon, l));
        tickets.chain(addons)
    }

    /// Shape checks that need no storage access.
    pub fn validate(&self, policy: &CheckoutPolicy) -> Result<(), CheckoutError> {
        if self.event_id.as_str().trim().is_empty() {
            return Err(CheckoutError::Validation("An event id is required".into()));
        }
        if self.line_items.is_empty() {
            return Err(CheckoutError::Validation("At least one ticket line is required".into()));
        }
        let max = policy.max_tickets_per_line;
        if let Some(l) = self.line_items.iter().find(|l| l.quantity == 0 || l.quantity > max) {
            return Err(CheckoutError::Validation(format!(
                "Ticket quantity for {} must be between 1 and {max}, not {}",
                l.unit_id, l.quantity
            )));
        }
        if let Some(l) = self.addons.iter().find(|l| l.quantity == 0) {
            return Err(CheckoutError::Validation(format!("Add-on quantity for {} must be at least 1", l.unit_id)));
        }
        let mut seen = HashSet::new();
        for (_, l) in self.lines() {
            if !seen.insert(&l.unit_id) {
                return Err(CheckoutError::Validation(format!("Unit {} appears more than once", l.unit_id)));
            }
        }
        Ok(())
    }
}

/// Fee, tax and hold settings applied to every checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckoutPolicy {
    pub hold_duration: Duration,
    pub service_fee_bps: u32,
    pub facility_fee_per_ticket: Cents,
    pub tax_rate_bps: u32,
    pub max_tickets_per_line: u32,
}

impl Default for CheckoutPolicy {
    fn default() -> Self {
        Self {
            hold_duration: Duration::minutes(15),
            service_fee_bps: 1_000,
            facility_fee_per_ticket: Cents::from(250),
            tax_rate_bps: 825,
            max_tickets_per_line: 10,
        }
    }
}

/// The money breakdown of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSummary {
    pub subtotal: Cents,
    pub service_fee: Cents,
    pub facility_fee: Cents,
    pub tax_amount: Cents,
    pub discount_amount: Cents,
    pub gift_card_amount: Cents,
    pub total_amount: Cents,
    /// The total would have been negative and was clamped to zero.
    pub needs_review: bool,
}

impl CheckoutSummary {
    /// Computes fees, tax and the payable total for the given lines and discounts.
    ///
    /// Tax is charged on the subtotal after the promo discount. Gift cards are a payment method and do not reduce the
    /// taxable amount.
    pub fn assemble(policy: &CheckoutPolicy, lines: &[OrderLineItem], discounts: &AppliedDiscounts) -> Self {
        let subtotal: Cents = lines.iter().map(|l| l.line_total).sum();
        let tickets: u32 = lines.iter().filter(|l| l.kind == UnitKind::Ticket).map(|l| l.quantity).sum();
        let service_fee = subtotal.mul_bps(policy.service_fee_bps);
        let facility_fee = policy.facility_fee_per_ticket * i64::from(tickets);
        let tax_amount = (subtotal - discounts.discount_amount).mul_bps(policy.tax_rate_bps);
        let total =
            subtotal + service_fee + facility_fee + tax_amount - discounts.discount_amount - discounts.gift_card_amount;
        let needs_review = total.is_negative();
        Self {
            subtotal,
            service_fee,
            facility_fee,
            tax_amount,
            discount_amount: discounts.discount_amount,
            gift_card_amount: discounts.gift_card_amount,
            total_amount: total.max(Cents::ZERO),
            needs_review,
        }
    }

    pub fn from_order(order: &Order) -> Self {
        Self {
            subtotal: order.subtotal,
            service_fee: order.service_fee,
            facility_fee: order.facility_fee,
            tax_amount: order.tax_amount,
            discount_amount: order.discount_amount,
            gift_card_amount: order.gift_card_amount,
            total_amount: order.total,
            needs_review: order.needs_review,
        }
    }
}

/// What a buyer gets back from a successful checkout. Payment is collected against `total_amount` before
/// `expires_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutResult {
    pub order_id: OrderId,
    pub order_number: String,
    pub status: OrderStatusType,
    pub summary: CheckoutSummary,
    pub line_items: Vec<OrderLineItem>,
    pub expires_at: DateTime<Utc>,
    /// Discount codes that could not be applied, and why.
    pub warnings: Vec<String>,
}

impl From<Order> for CheckoutResult {
    fn from(order: Order) -> Self {
        let summary = CheckoutSummary::from_order(&order);
        Self {
            order_id: order.id,
            order_number: order.order_number,
            status: order.status,
            summary,
            line_items: order.line_items,
            expires_at: order.expires_at,
            warnings: order.discount_notes.0,
        }
    }
}
