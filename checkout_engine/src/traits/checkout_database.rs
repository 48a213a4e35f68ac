use std::future::Future;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{
    db_types::{NewOrder, Order, OrderId, OrderStatusType, ReservationId, Shortfall, UnitId},
    traits::{CatalogManagement, InventoryLedger, OrderTransition},
};

/// This trait defines the highest level of behaviour for backends supporting the checkout engine.
///
/// Every order state transition is a compare-and-set on `Pending`, carried out in the same atomic unit of work as the
/// ledger movement it implies. A payment confirmation racing the expiry reaper therefore has exactly one winner.
pub trait CheckoutDatabase: InventoryLedger + CatalogManagement {
    /// The URL of the database
    fn url(&self) -> &str;

    /// Stores a new pending order against an existing held reservation.
    fn insert_order(&self, order: NewOrder) -> impl Future<Output = Result<Order, CheckoutDbError>> + Send;

    /// Fetches an order, including its line items.
    fn fetch_order(&self, order_id: &OrderId) -> impl Future<Output = Result<Option<Order>, CheckoutDbError>> + Send;

    /// Moves a pending order to `Completed`. In one atomic unit of work:
    /// * the order status changes from `Pending` to `Completed`,
    /// * the reservation is committed, moving its quantities from `reserved` to `sold`,
    /// * a sale record is written for every line item,
    /// * the promo code's usage count is incremented and the gift card is debited by the applied amount. If the card
    ///   no longer covers the applied amount, whatever is left is taken and the order is flagged for review.
    ///
    /// If the order is not `Pending`, nothing changes and the stored order is returned unchanged.
    fn complete_order(
        &self,
        order_id: &OrderId,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<OrderTransition, CheckoutDbError>> + Send;

    /// Moves a pending order to `Expired` or `Cancelled`, releasing its reservation in the same unit of work.
    ///
    /// If the order is not `Pending`, nothing changes and the stored order is returned unchanged.
    fn annul_order(
        &self,
        order_id: &OrderId,
        status: OrderStatusType,
        reason: &str,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<OrderTransition, CheckoutDbError>> + Send;

    /// All `Pending` orders whose hold deadline is at or before `now`, oldest deadline first.
    fn fetch_expired_pending_orders(
        &self,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<Order>, CheckoutDbError>> + Send;

    /// Releases every held reservation created at or before `created_before` that no order refers to.
    ///
    /// Such a hold is left behind when a checkout dies between reserving inventory and saving its order. The check
    /// that no order refers to the reservation is made in the same unit of work as the release, so a hold that gains
    /// an order concurrently is never released. Returns the reservations that were released.
    fn release_orphaned_reservations(
        &self,
        created_before: DateTime<Utc>,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<ReservationId>, CheckoutDbError>> + Send;
}

#[derive(Debug, Clone, Error)]
pub enum CheckoutDbError {
    #[error("We have an internal database engine (configuration/uptime etc.) : {0}")]
    DatabaseError(String),
    #[error("Not enough inventory to reserve {} unit type(s)", .0.len())]
    InsufficientInventory(Vec<Shortfall>),
    #[error("The requested unit {0} does not exist")]
    UnitNotFound(UnitId),
    #[error("The unit {0} already exists")]
    UnitAlreadyExists(UnitId),
    #[error("The requested reservation {0} does not exist")]
    ReservationNotFound(ReservationId),
    #[error("The reservation {0} is not held, so it cannot back this order")]
    ReservationNotHeld(ReservationId),
    #[error("The requested order {0} does not exist")]
    OrderNotFound(OrderId),
    #[error("Cannot insert order, since it already exists with id {0}")]
    OrderAlreadyExists(OrderId),
    #[error("Invalid data. {0}")]
    InvalidData(String),
}

impl From<sqlx::Error> for CheckoutDbError {
    fn from(e: sqlx::Error) -> Self {
        CheckoutDbError::DatabaseError(e.to_string())
    }
}
