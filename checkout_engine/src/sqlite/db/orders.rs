use chrono::{DateTime, Utc};
use log::{debug, trace};
use sqlx::{types::Json, SqliteConnection};

use super::map_insert_error;
use crate::{
    db_types::{NewOrder, Order, OrderId, OrderLineItem, OrderStatusType},
    traits::CheckoutDbError,
};

/// Inserts a new order and its line items using the given connection. This is not atomic. You can embed this call
/// inside a transaction if you need to ensure atomicity, and pass `&mut *tx` as the connection argument.
pub async fn insert_order(order: NewOrder, conn: &mut SqliteConnection) -> Result<Order, CheckoutDbError> {
    let order_id = order.id.clone();
    let mut inserted: Order = sqlx::query_as(
        r#"
            INSERT INTO orders (
                id,
                order_number,
                event_id,
                reservation_id,
                status,
                subtotal,
                discount_amount,
                gift_card_amount,
                service_fee,
                facility_fee,
                tax_amount,
                total,
                promo_code,
                gift_card_code,
                needs_review,
                discount_notes,
                expires_at,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $18)
            RETURNING *;
        "#,
    )
    .bind(order.id)
    .bind(order.order_number)
    .bind(order.event_id)
    .bind(order.reservation_id)
    .bind(OrderStatusType::Pending)
    .bind(order.subtotal)
    .bind(order.discount_amount)
    .bind(order.gift_card_amount)
    .bind(order.service_fee)
    .bind(order.facility_fee)
    .bind(order.tax_amount)
    .bind(order.total)
    .bind(order.promo_code)
    .bind(order.gift_card_code)
    .bind(order.needs_review)
    .bind(Json(order.discount_notes))
    .bind(order.expires_at)
    .bind(order.created_at)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| map_insert_error(e, || CheckoutDbError::OrderAlreadyExists(order_id)))?;
    for (position, line) in order.line_items.iter().enumerate() {
        insert_line_item(&inserted.id, position, line, &mut *conn).await?;
    }
    inserted.line_items = order.line_items;
    debug!("📝️ Order [{}] inserted with {} line item(s)", inserted.id, inserted.line_items.len());
    Ok(inserted)
}

async fn insert_line_item(
    order_id: &OrderId,
    position: usize,
    line: &OrderLineItem,
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
            INSERT INTO order_line_items (order_id, position, unit_id, kind, name, quantity, unit_price, line_total)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(order_id.as_str())
    .bind(i64::try_from(position).unwrap_or(i64::MAX))
    .bind(line.unit_id.as_str())
    .bind(line.kind)
    .bind(line.name.as_str())
    .bind(line.quantity)
    .bind(line.unit_price)
    .bind(line.line_total)
    .execute(conn)
    .await?;
    Ok(())
}

/// Returns the order with the given id, without its line items.
pub async fn fetch_order_record(order_id: &OrderId, conn: &mut SqliteConnection) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as("SELECT * FROM orders WHERE id = $1").bind(order_id.as_str()).fetch_optional(conn).await?;
    Ok(order)
}

/// Returns the order with the given id, including its line items.
pub async fn fetch_order(order_id: &OrderId, conn: &mut SqliteConnection) -> Result<Option<Order>, sqlx::Error> {
    let order = fetch_order_record(order_id, &mut *conn).await?;
    match order {
        Some(mut o) => {
            o.line_items = fetch_line_items(order_id, conn).await?;
            Ok(Some(o))
        },
        None => Ok(None),
    }
}

pub async fn fetch_line_items(order_id: &OrderId, conn: &mut SqliteConnection) -> Result<Vec<OrderLineItem>, sqlx::Error> {
    let items = sqlx::query_as(
        r#"
            SELECT unit_id, kind, name, quantity, unit_price, line_total FROM order_line_items
            WHERE order_id = $1 ORDER BY position
        "#,
    )
    .bind(order_id.as_str())
    .fetch_all(conn)
    .await?;
    Ok(items)
}

/// Changes the order status from `Pending` to `status`. This is the compare-and-set every order transition goes
/// through.
///
/// Returns the updated order (without line items), or `None` if the order is not pending or does not exist.
pub async fn transition_pending_order(
    order_id: &OrderId,
    status: OrderStatusType,
    reason: Option<&str>,
    at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as(
        r#"
            UPDATE orders SET status = $1, status_reason = $2, updated_at = $3
            WHERE id = $4 AND status = $5
            RETURNING *;
        "#,
    )
    .bind(status)
    .bind(reason)
    .bind(at)
    .bind(order_id.as_str())
    .bind(OrderStatusType::Pending)
    .fetch_optional(conn)
    .await?;
    if order.is_some() {
        trace!("📝️ Order {order_id} moved from Pending to {status}");
    }
    Ok(order)
}

pub async fn flag_for_review(order_id: &OrderId, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE orders SET needs_review = 1 WHERE id = $1").bind(order_id.as_str()).execute(conn).await?;
    Ok(())
}

/// Pending orders whose hold deadline is at or before `now`, oldest deadline first.
pub async fn fetch_expired_pending_orders(
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Vec<Order>, sqlx::Error> {
    let mut orders: Vec<Order> =
        sqlx::query_as("SELECT * FROM orders WHERE status = $1 AND expires_at <= $2 ORDER BY expires_at ASC")
            .bind(OrderStatusType::Pending)
            .bind(now)
            .fetch_all(&mut *conn)
            .await?;
    for order in orders.iter_mut() {
        order.line_items = fetch_line_items(&order.id, &mut *conn).await?;
    }
    Ok(orders)
}
