use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{
    db_types::{EventId, EventStatus, OrderId, OrderStatusType, Shortfall, UnitId},
    traits::CheckoutDbError,
};

#[derive(Debug, Clone, Error)]
pub enum CheckoutError {
    /// The request is malformed. Nothing was reserved.
    #[error("Invalid checkout request. {0}")]
    Validation(String),
    #[error("Event {0} does not exist")]
    EventNotFound(EventId),
    #[error("Event {event_id} is not on sale (status: {status})")]
    EventNotSellable { event_id: EventId, status: EventStatus },
    #[error("Unit {0} does not exist")]
    UnitNotFound(UnitId),
    /// Someone else got there first, or the unit is sold out. The buyer has to adjust quantities.
    #[error("Not enough inventory. {}", format_shortfalls(.0))]
    InsufficientInventory(Vec<Shortfall>),
    #[error("Order {0} does not exist")]
    OrderNotFound(OrderId),
    #[error("Order {order_id} cannot move from {from} to {to}")]
    StateConflict { order_id: OrderId, from: OrderStatusType, to: OrderStatusType },
    #[error("Order {order_id} is held until {expires_at}")]
    HoldStillActive { order_id: OrderId, expires_at: DateTime<Utc> },
    /// Transient. The whole checkout can be retried safely.
    #[error("Storage is unavailable. {0}")]
    StorageUnavailable(String),
    #[error("Internal data error. {0}")]
    Internal(String),
}

fn format_shortfalls(shortfalls: &[Shortfall]) -> String {
    shortfalls.iter().map(|s| s.to_string()).collect::<Vec<_>>().join("; ")
}

impl From<CheckoutDbError> for CheckoutError {
    fn from(e: CheckoutDbError) -> Self {
        match e {
            CheckoutDbError::DatabaseError(s) => CheckoutError::StorageUnavailable(s),
            CheckoutDbError::InsufficientInventory(shortfalls) => CheckoutError::InsufficientInventory(shortfalls),
            CheckoutDbError::UnitNotFound(id) => CheckoutError::UnitNotFound(id),
            CheckoutDbError::OrderNotFound(id) => CheckoutError::OrderNotFound(id),
            CheckoutDbError::InvalidData(s) => CheckoutError::Validation(s),
            e @ (CheckoutDbError::UnitAlreadyExists(_)
            | CheckoutDbError::ReservationNotFound(_)
            | CheckoutDbError::ReservationNotHeld(_)
            | CheckoutDbError::OrderAlreadyExists(_)) => CheckoutError::Internal(e.to_string()),
        }
    }
}
