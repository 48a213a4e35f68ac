//! Inventory counters, reservations and the sales history used for demand pricing.
use chrono::{DateTime, Utc};
use log::trace;
use sqlx::SqliteConnection;

use crate::db_types::{Order, Reservation, ReservationId, ReservationItem, ReservationStatus, UnitId};

/// Adds `quantity` to the unit's reserved count if, and only if, that much is still available.
///
/// Returns `false` if the unit does not exist or is short. The check and the increment are a single statement.
pub async fn try_reserve(unit_id: &UnitId, quantity: u32, conn: &mut SqliteConnection) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
            UPDATE sellable_units SET reserved = reserved + $1
            WHERE id = $2 AND capacity - reserved - sold >= $1
        "#,
    )
    .bind(quantity)
    .bind(unit_id.as_str())
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn insert_reservation(
    id: ReservationId,
    items: Vec<ReservationItem>,
    at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Reservation, sqlx::Error> {
    let mut reservation: Reservation = sqlx::query_as(
        r#"
            INSERT INTO reservations (id, status, created_at, updated_at) VALUES ($1, $2, $3, $3)
            RETURNING *;
        "#,
    )
    .bind(id)
    .bind(ReservationStatus::Held)
    .bind(at)
    .fetch_one(&mut *conn)
    .await?;
    for item in &items {
        sqlx::query("INSERT INTO reservation_items (reservation_id, unit_id, quantity) VALUES ($1, $2, $3)")
            .bind(reservation.id.as_str())
            .bind(item.unit_id.as_str())
            .bind(item.quantity)
            .execute(&mut *conn)
            .await?;
    }
    reservation.items = items;
    Ok(reservation)
}

pub async fn fetch_reservation(
    id: &ReservationId,
    conn: &mut SqliteConnection,
) -> Result<Option<Reservation>, sqlx::Error> {
    let reservation: Option<Reservation> =
        sqlx::query_as("SELECT * FROM reservations WHERE id = $1").bind(id.as_str()).fetch_optional(&mut *conn).await?;
    match reservation {
        Some(mut r) => {
            r.items = fetch_reservation_items(id, conn).await?;
            Ok(Some(r))
        },
        None => Ok(None),
    }
}

pub async fn fetch_reservation_items(
    id: &ReservationId,
    conn: &mut SqliteConnection,
) -> Result<Vec<ReservationItem>, sqlx::Error> {
    let items = sqlx::query_as(
        "SELECT unit_id, quantity FROM reservation_items WHERE reservation_id = $1 ORDER BY unit_id",
    )
    .bind(id.as_str())
    .fetch_all(conn)
    .await?;
    Ok(items)
}

pub async fn reservation_status(
    id: &ReservationId,
    conn: &mut SqliteConnection,
) -> Result<Option<ReservationStatus>, sqlx::Error> {
    let row: Option<(ReservationStatus,)> =
        sqlx::query_as("SELECT status FROM reservations WHERE id = $1").bind(id.as_str()).fetch_optional(conn).await?;
    Ok(row.map(|(status,)| status))
}

/// Moves a held reservation to `target` and adjusts the unit counters to match.
///
/// The status change is a compare-and-set on `Held`, and is made before anything is read. Returns `false`, changing
/// nothing, if the reservation is not held or does not exist.
pub async fn settle_reservation(
    id: &ReservationId,
    target: ReservationStatus,
    at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE reservations SET status = $1, updated_at = $2 WHERE id = $3 AND status = $4")
        .bind(target)
        .bind(at)
        .bind(id.as_str())
        .bind(ReservationStatus::Held)
        .execute(&mut *conn)
        .await?;
    if result.rows_affected() == 0 {
        return Ok(false);
    }
    adjust_unit_counters(id, target, conn).await?;
    trace!("🗃️ Reservation {id} is now {target}");
    Ok(true)
}

/// Held reservations created at or before `created_before` that no order refers to, oldest first.
pub async fn fetch_orphaned_holds(
    created_before: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Vec<ReservationId>, sqlx::Error> {
    let rows: Vec<(ReservationId,)> = sqlx::query_as(
        r#"
            SELECT r.id FROM reservations r
            WHERE r.status = $1 AND r.created_at <= $2
              AND NOT EXISTS (SELECT 1 FROM orders o WHERE o.reservation_id = r.id)
            ORDER BY r.created_at
        "#,
    )
    .bind(ReservationStatus::Held)
    .bind(created_before)
    .fetch_all(conn)
    .await?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

/// Releases a held reservation, but only if no order refers to it. The check and the status change are a single
/// statement.
pub async fn release_orphaned_hold(
    id: &ReservationId,
    at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
            UPDATE reservations SET status = $1, updated_at = $2
            WHERE id = $3 AND status = $4
              AND NOT EXISTS (SELECT 1 FROM orders WHERE reservation_id = $3)
        "#,
    )
    .bind(ReservationStatus::Released)
    .bind(at)
    .bind(id.as_str())
    .bind(ReservationStatus::Held)
    .execute(&mut *conn)
    .await?;
    if result.rows_affected() == 0 {
        return Ok(false);
    }
    adjust_unit_counters(id, ReservationStatus::Released, conn).await?;
    trace!("🗃️ Orphaned reservation {id} released");
    Ok(true)
}

async fn adjust_unit_counters(
    id: &ReservationId,
    target: ReservationStatus,
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    let items = fetch_reservation_items(id, &mut *conn).await?;
    let sql = match target {
        ReservationStatus::Committed => {
            "UPDATE sellable_units SET reserved = MAX(reserved - $1, 0), sold = sold + $1 WHERE id = $2"
        },
        _ => "UPDATE sellable_units SET reserved = MAX(reserved - $1, 0) WHERE id = $2",
    };
    for item in items {
        sqlx::query(sql).bind(item.quantity).bind(item.unit_id.as_str()).execute(&mut *conn).await?;
    }
    Ok(())
}

/// Writes one sale record per line item of the order.
pub async fn record_sales(order: &Order, at: DateTime<Utc>, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    for line in &order.line_items {
        sqlx::query("INSERT INTO unit_sales (unit_id, order_id, quantity, sold_at) VALUES ($1, $2, $3, $4)")
            .bind(line.unit_id.as_str())
            .bind(order.id.as_str())
            .bind(line.quantity)
            .bind(at)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

pub async fn purchases_since(
    unit_id: &UnitId,
    since: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<u32, sqlx::Error> {
    let (total,): (i64,) =
        sqlx::query_as("SELECT COALESCE(SUM(quantity), 0) FROM unit_sales WHERE unit_id = $1 AND sold_at >= $2")
            .bind(unit_id.as_str())
            .bind(since)
            .fetch_one(conn)
            .await?;
    Ok(u32::try_from(total).unwrap_or(u32::MAX))
}
