use checkout_engine::db_types::{Order, OrderId, OrderStatusType};
use serde::{Deserialize, Serialize};

/// An order as reported to clients, with its state broken out for convenience.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderView {
    pub order: Order,
    pub state: OrderStatusType,
}

impl From<Order> for OrderView {
    fn from(order: Order) -> Self {
        let state = order.status;
        Self { order, state }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderQuery {
    pub order_id: OrderId,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CancelRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

/// The payment provider's notification that an order has been paid for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentConfirmation {
    pub order_id: OrderId,
    /// The provider's own reference for the payment. Logged for reconciliation.
    pub payment_reference: String,
}
