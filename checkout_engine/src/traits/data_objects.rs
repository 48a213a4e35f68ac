use serde::{Deserialize, Serialize};

use crate::db_types::{Order, OrderId, OrderStatusType, ReservationId};

/// The result of an attempted order state transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTransition {
    /// The order as it is stored after the attempt.
    pub order: Order,
    /// The status the order had when the attempt was made.
    pub previous_status: OrderStatusType,
    /// False if the order was not `Pending`, in which case nothing was changed.
    pub changed: bool,
}

impl OrderTransition {
    pub fn changed(order: Order) -> Self {
        Self { order, previous_status: OrderStatusType::Pending, changed: true }
    }

    pub fn unchanged(order: Order) -> Self {
        let previous_status = order.status;
        Self { order, previous_status, changed: false }
    }
}

/// The outcome of one expiry pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpiryResult {
    /// Orders that this pass moved to `Expired`.
    pub expired: Vec<Order>,
    /// Orders that were due but had already left `Pending` by the time this pass reached them.
    pub skipped: Vec<OrderId>,
    /// Held reservations that no order ever claimed, released by this pass.
    #[serde(default)]
    pub released_reservations: Vec<ReservationId>,
}

impl ExpiryResult {
    pub fn expired_count(&self) -> usize {
        self.expired.len()
    }

    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }

    pub fn released_count(&self) -> usize {
        self.released_reservations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.expired.is_empty() && self.skipped.is_empty() && self.released_reservations.is_empty()
    }
}
