//! Storage-facing data types for the checkout engine.
//!
//! These are the records that backends persist and hand back to the checkout API. They are deliberately thin; the
//! rules that govern how they change live in [`crate::checkout_api`], [`crate::pricing`] and [`crate::discounts`].
use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use log::error;
use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow, Type};
pub use tcg_common::Cents;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("Invalid value: {0}")]
pub struct ConversionError(String);

macro_rules! string_id {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Type, Serialize, Deserialize)]
        #[sqlx(transparent)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new<S: Into<String>>(id: S) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl FromStr for $name {
            type Err = ConversionError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let s = s.trim();
                if s.is_empty() {
                    return Err(ConversionError(format!("{} cannot be empty", stringify!($name))));
                }
                Ok(Self(s.to_string()))
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(UnitId, "Identifies a sellable unit: a ticket tier or an add-on.");
string_id!(EventId, "Identifies a ticketed event.");
string_id!(OrderId, "Identifies a checkout order.");
string_id!(ReservationId, "Identifies an inventory hold. This is the reservation token handed out by the ledger.");

//--------------------------------------       UnitKind        ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    /// Admission to the event. Ticket lines attract the per-ticket facility fee.
    Ticket,
    /// Merchandise, parking and other extras sold alongside tickets.
    Addon,
}

impl Display for UnitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnitKind::Ticket => write!(f, "Ticket"),
            UnitKind::Addon => write!(f, "Addon"),
        }
    }
}

//--------------------------------------     SellableUnit      ---------------------------------------------------------
/// A ticket tier or add-on with finite capacity.
///
/// `capacity` never changes after creation. `reserved + sold <= capacity` holds at all times.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct SellableUnit {
    pub id: UnitId,
    pub event_id: EventId,
    pub kind: UnitKind,
    pub name: String,
    pub capacity: u32,
    pub reserved: u32,
    pub sold: u32,
    pub base_price: Cents,
}

impl SellableUnit {
    pub fn available(&self) -> u32 {
        self.capacity.saturating_sub(self.reserved + self.sold)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSellableUnit {
    pub id: UnitId,
    pub event_id: EventId,
    pub kind: UnitKind,
    pub name: String,
    pub capacity: u32,
    pub base_price: Cents,
}

impl NewSellableUnit {
    pub fn ticket<S: Into<String>>(id: UnitId, event_id: EventId, name: S, capacity: u32, base_price: Cents) -> Self {
        Self { id, event_id, kind: UnitKind::Ticket, name: name.into(), capacity, base_price }
    }

    pub fn addon<S: Into<String>>(id: UnitId, event_id: EventId, name: S, capacity: u32, base_price: Cents) -> Self {
        Self { id, event_id, kind: UnitKind::Addon, name: name.into(), capacity, base_price }
    }
}

//--------------------------------------      EventStatus      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Draft,
    OnSale,
    SoldOut,
    Cancelled,
    Completed,
}

impl Display for EventStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventStatus::Draft => write!(f, "Draft"),
            EventStatus::OnSale => write!(f, "OnSale"),
            EventStatus::SoldOut => write!(f, "SoldOut"),
            EventStatus::Cancelled => write!(f, "Cancelled"),
            EventStatus::Completed => write!(f, "Completed"),
        }
    }
}

//--------------------------------------     TicketedEvent     ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct TicketedEvent {
    pub id: EventId,
    pub name: String,
    pub status: EventStatus,
    pub starts_at: DateTime<Utc>,
}

impl TicketedEvent {
    /// A new event that is already on sale.
    pub fn on_sale<S: Into<String>>(id: EventId, name: S, starts_at: DateTime<Utc>) -> Self {
        Self { id, name: name.into(), status: EventStatus::OnSale, starts_at }
    }

    pub fn with_status(mut self, status: EventStatus) -> Self {
        self.status = status;
        self
    }

    /// Tickets can only be sold while the event is on sale and has not started yet.
    pub fn is_sellable(&self, now: DateTime<Utc>) -> bool {
        self.status == EventStatus::OnSale && now < self.starts_at
    }
}

//--------------------------------------   OrderStatusType     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
pub enum OrderStatusType {
    /// The order is holding inventory and waiting for payment confirmation.
    Pending,
    /// Payment was confirmed and the held inventory was converted into sales.
    Completed,
    /// The hold deadline passed before payment arrived. Inventory was returned to the pool.
    Expired,
    /// The buyer or an operator released the order early.
    Cancelled,
}

impl OrderStatusType {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OrderStatusType::Pending)
    }
}

impl Display for OrderStatusType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatusType::Pending => write!(f, "Pending"),
            OrderStatusType::Completed => write!(f, "Completed"),
            OrderStatusType::Expired => write!(f, "Expired"),
            OrderStatusType::Cancelled => write!(f, "Cancelled"),
        }
    }
}

impl From<String> for OrderStatusType {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid order status: {value}. But this conversion cannot fail. Defaulting to Pending");
            OrderStatusType::Pending
        })
    }
}

impl FromStr for OrderStatusType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Completed" => Ok(Self::Completed),
            "Expired" => Ok(Self::Expired),
            "Cancelled" => Ok(Self::Cancelled),
            s => Err(ConversionError(format!("Invalid order status: {s}"))),
        }
    }
}

//--------------------------------------    OrderLineItem      ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct OrderLineItem {
    pub unit_id: UnitId,
    pub kind: UnitKind,
    pub name: String,
    pub quantity: u32,
    /// The unit price quoted at reservation time. Later price changes never touch it.
    pub unit_price: Cents,
    pub line_total: Cents,
}

//--------------------------------------         Order         ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    /// Human-friendly reference printed on receipts, e.g. `ORD-1718000000000-7QX2K`.
    pub order_number: String,
    pub event_id: EventId,
    pub reservation_id: ReservationId,
    pub status: OrderStatusType,
    pub subtotal: Cents,
    pub discount_amount: Cents,
    pub gift_card_amount: Cents,
    pub service_fee: Cents,
    pub facility_fee: Cents,
    pub tax_amount: Cents,
    pub total: Cents,
    pub promo_code: Option<String>,
    pub gift_card_code: Option<String>,
    /// Set when the computed total had to be clamped, or a redemption could not be honoured in full.
    pub needs_review: bool,
    /// Reasons a requested discount was not applied.
    pub discount_notes: Json<Vec<String>>,
    /// Audit reason for the last terminal transition.
    pub status_reason: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[sqlx(skip)]
    pub line_items: Vec<OrderLineItem>,
}

impl Order {
    pub fn fees(&self) -> Cents {
        self.service_fee + self.facility_fee
    }

    pub fn ticket_count(&self) -> u32 {
        self.line_items.iter().filter(|l| l.kind == UnitKind::Ticket).map(|l| l.quantity).sum()
    }

    pub fn hold_elapsed(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

//--------------------------------------        NewOrder       ---------------------------------------------------------
/// A fully priced order, ready to be persisted against an existing reservation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub id: OrderId,
    pub order_number: String,
    pub event_id: EventId,
    pub reservation_id: ReservationId,
    pub line_items: Vec<OrderLineItem>,
    pub subtotal: Cents,
    pub discount_amount: Cents,
    pub gift_card_amount: Cents,
    pub service_fee: Cents,
    pub facility_fee: Cents,
    pub tax_amount: Cents,
    pub total: Cents,
    pub promo_code: Option<String>,
    pub gift_card_code: Option<String>,
    pub needs_review: bool,
    pub discount_notes: Vec<String>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl NewOrder {
    /// The order record as it looks straight after insertion.
    pub fn into_order(self) -> Order {
        Order {
            id: self.id,
            order_number: self.order_number,
            event_id: self.event_id,
            reservation_id: self.reservation_id,
            status: OrderStatusType::Pending,
            subtotal: self.subtotal,
            discount_amount: self.discount_amount,
            gift_card_amount: self.gift_card_amount,
            service_fee: self.service_fee,
            facility_fee: self.facility_fee,
            tax_amount: self.tax_amount,
            total: self.total,
            promo_code: self.promo_code,
            gift_card_code: self.gift_card_code,
            needs_review: self.needs_review,
            discount_notes: Json(self.discount_notes),
            status_reason: None,
            expires_at: self.expires_at,
            created_at: self.created_at,
            updated_at: self.created_at,
            line_items: self.line_items,
        }
    }
}

//--------------------------------------  ReservationStatus    ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum ReservationStatus {
    /// Quantities are counted in `reserved`.
    Held,
    /// Quantities were moved from `reserved` to `sold`.
    Committed,
    /// Quantities were returned to the available pool.
    Released,
}

impl Display for ReservationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReservationStatus::Held => write!(f, "Held"),
            ReservationStatus::Committed => write!(f, "Committed"),
            ReservationStatus::Released => write!(f, "Released"),
        }
    }
}

//--------------------------------------      Reservation      ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct ReservationItem {
    pub unit_id: UnitId,
    pub quantity: u32,
}

impl ReservationItem {
    pub fn new(unit_id: UnitId, quantity: u32) -> Self {
        Self { unit_id, quantity }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub status: ReservationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[sqlx(skip)]
    pub items: Vec<ReservationItem>,
}

impl Reservation {
    pub fn quantity_for(&self, unit_id: &UnitId) -> u32 {
        self.items.iter().filter(|i| &i.unit_id == unit_id).map(|i| i.quantity).sum()
    }
}

/// Merges quantities requested for the same unit and drops zero-quantity entries. The result is sorted by unit id,
/// which is also the order in which backends lock units.
pub fn merge_reservation_items(items: &[ReservationItem]) -> Vec<ReservationItem> {
    let mut merged = std::collections::BTreeMap::<UnitId, u32>::new();
    for item in items.iter().filter(|i| i.quantity > 0) {
        *merged.entry(item.unit_id.clone()).or_default() += item.quantity;
    }
    merged.into_iter().map(|(unit_id, quantity)| ReservationItem { unit_id, quantity }).collect()
}

//--------------------------------------       Shortfall       ---------------------------------------------------------
/// Why a unit could not be reserved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shortfall {
    pub unit_id: UnitId,
    pub requested: u32,
    pub available: u32,
    pub shortfall: u32,
}

impl Shortfall {
    pub fn new(unit_id: UnitId, requested: u32, available: u32) -> Self {
        Self { unit_id, requested, available, shortfall: requested.saturating_sub(available) }
    }
}

impl Display for Shortfall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: requested {}, only {} available", self.unit_id, self.requested, self.available)
    }
}

//--------------------------------------      SaleRecord       ---------------------------------------------------------
/// One completed purchase of a unit. The trailing window of these drives demand pricing.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct SaleRecord {
    pub unit_id: UnitId,
    pub order_id: OrderId,
    pub quantity: u32,
    pub sold_at: DateTime<Utc>,
}

//--------------------------------------     DiscountType      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountType {
    /// `discount_value` is in basis points of the subtotal.
    Percentage,
    /// `discount_value` is a fixed amount in cents.
    FixedAmount,
}

//--------------------------------------       PromoCode       ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct PromoCode {
    /// Stored normalised: trimmed and upper-case.
    pub code: String,
    pub discount_type: DiscountType,
    pub discount_value: i64,
    /// When set, the code is only valid for this event.
    pub event_id: Option<EventId>,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub max_uses: Option<u32>,
    pub times_used: u32,
    pub is_active: bool,
}

impl PromoCode {
    pub fn percentage<S: AsRef<str>>(code: S, bps: u32) -> Self {
        Self::new(code, DiscountType::Percentage, i64::from(bps))
    }

    pub fn fixed_amount<S: AsRef<str>>(code: S, amount: Cents) -> Self {
        Self::new(code, DiscountType::FixedAmount, amount.value())
    }

    fn new<S: AsRef<str>>(code: S, discount_type: DiscountType, discount_value: i64) -> Self {
        Self {
            code: normalize_code(code.as_ref()),
            discount_type,
            discount_value,
            event_id: None,
            starts_at: None,
            ends_at: None,
            max_uses: None,
            times_used: 0,
            is_active: true,
        }
    }

    pub fn for_event(mut self, event_id: EventId) -> Self {
        self.event_id = Some(event_id);
        self
    }

    pub fn valid_between(mut self, starts_at: Option<DateTime<Utc>>, ends_at: Option<DateTime<Utc>>) -> Self {
        self.starts_at = starts_at;
        self.ends_at = ends_at;
        self
    }

    pub fn with_max_uses(mut self, max_uses: u32) -> Self {
        self.max_uses = Some(max_uses);
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }
}

/// Promo and gift card codes are matched case-insensitively, ignoring surrounding whitespace.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

//--------------------------------------       GiftCard        ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct GiftCard {
    /// Stored normalised: trimmed and upper-case.
    pub code: String,
    pub balance: Cents,
    pub is_active: bool,
}

impl GiftCard {
    pub fn new<S: AsRef<str>>(code: S, balance: Cents) -> Self {
        Self { code: normalize_code(code.as_ref()), balance, is_active: true }
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }
}
