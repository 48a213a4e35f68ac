//! Events, sellable units, pricing rules and discount codes.
use log::{debug, trace};
use sqlx::{types::Json, FromRow, SqliteConnection};

use super::map_insert_error;
use crate::{
    db_types::{normalize_code, Cents, EventId, GiftCard, NewSellableUnit, PromoCode, SellableUnit, TicketedEvent, UnitId},
    pricing::{PricingRule, PricingStrategy},
    traits::CheckoutDbError,
};

pub async fn upsert_event(event: TicketedEvent, conn: &mut SqliteConnection) -> Result<TicketedEvent, sqlx::Error> {
    let event = sqlx::query_as(
        r#"
            INSERT INTO ticketed_events (id, name, status, starts_at) VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE SET name = excluded.name, status = excluded.status, starts_at = excluded.starts_at
            RETURNING *;
        "#,
    )
    .bind(event.id)
    .bind(event.name)
    .bind(event.status)
    .bind(event.starts_at)
    .fetch_one(conn)
    .await?;
    Ok(event)
}

pub async fn fetch_event(event_id: &EventId, conn: &mut SqliteConnection) -> Result<Option<TicketedEvent>, sqlx::Error> {
    let event = sqlx::query_as("SELECT * FROM ticketed_events WHERE id = $1")
        .bind(event_id.as_str())
        .fetch_optional(conn)
        .await?;
    Ok(event)
}

pub async fn insert_unit(unit: NewSellableUnit, conn: &mut SqliteConnection) -> Result<SellableUnit, CheckoutDbError> {
    let id = unit.id.clone();
    let unit: SellableUnit = sqlx::query_as(
        r#"
            INSERT INTO sellable_units (id, event_id, kind, name, capacity, base_price)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *;
        "#,
    )
    .bind(unit.id)
    .bind(unit.event_id)
    .bind(unit.kind)
    .bind(unit.name)
    .bind(unit.capacity)
    .bind(unit.base_price)
    .fetch_one(conn)
    .await
    .map_err(|e| map_insert_error(e, || CheckoutDbError::UnitAlreadyExists(id)))?;
    debug!("🗃️ Unit {} added to event {} with capacity {}", unit.id, unit.event_id, unit.capacity);
    Ok(unit)
}

pub async fn fetch_unit(unit_id: &UnitId, conn: &mut SqliteConnection) -> Result<Option<SellableUnit>, sqlx::Error> {
    let unit =
        sqlx::query_as("SELECT * FROM sellable_units WHERE id = $1").bind(unit_id.as_str()).fetch_optional(conn).await?;
    Ok(unit)
}

pub async fn fetch_units_for_event(
    event_id: &EventId,
    conn: &mut SqliteConnection,
) -> Result<Vec<SellableUnit>, sqlx::Error> {
    let units = sqlx::query_as("SELECT * FROM sellable_units WHERE event_id = $1 ORDER BY id")
        .bind(event_id.as_str())
        .fetch_all(conn)
        .await?;
    Ok(units)
}

#[derive(FromRow)]
struct PricingRuleRow {
    unit_id: UnitId,
    strategy: Json<PricingStrategy>,
    min_price: Cents,
    max_price: Cents,
}

impl From<PricingRuleRow> for PricingRule {
    fn from(row: PricingRuleRow) -> Self {
        Self { unit_id: row.unit_id, strategy: row.strategy.0, min_price: row.min_price, max_price: row.max_price }
    }
}

/// Stores the rule, replacing any existing rule for the unit. Validation is the caller's job.
pub async fn upsert_pricing_rule(rule: PricingRule, conn: &mut SqliteConnection) -> Result<PricingRule, sqlx::Error> {
    let row: PricingRuleRow = sqlx::query_as(
        r#"
            INSERT INTO pricing_rules (unit_id, strategy, min_price, max_price) VALUES ($1, $2, $3, $4)
            ON CONFLICT (unit_id) DO UPDATE SET
                strategy = excluded.strategy,
                min_price = excluded.min_price,
                max_price = excluded.max_price
            RETURNING *;
        "#,
    )
    .bind(rule.unit_id)
    .bind(Json(rule.strategy))
    .bind(rule.min_price)
    .bind(rule.max_price)
    .fetch_one(conn)
    .await?;
    trace!("🗃️ Pricing rule for {} saved", row.unit_id);
    Ok(row.into())
}

pub async fn fetch_pricing_rule(
    unit_id: &UnitId,
    conn: &mut SqliteConnection,
) -> Result<Option<PricingRule>, sqlx::Error> {
    let row: Option<PricingRuleRow> = sqlx::query_as("SELECT * FROM pricing_rules WHERE unit_id = $1")
        .bind(unit_id.as_str())
        .fetch_optional(conn)
        .await?;
    Ok(row.map(PricingRule::from))
}

pub async fn remove_pricing_rule(unit_id: &UnitId, conn: &mut SqliteConnection) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM pricing_rules WHERE unit_id = $1").bind(unit_id.as_str()).execute(conn).await?;
    Ok(result.rows_affected() > 0)
}

pub async fn upsert_promo_code(promo: PromoCode, conn: &mut SqliteConnection) -> Result<PromoCode, sqlx::Error> {
    let promo = sqlx::query_as(
        r#"
            INSERT INTO promo_codes (
                code,
                discount_type,
                discount_value,
                event_id,
                starts_at,
                ends_at,
                max_uses,
                times_used,
                is_active
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (code) DO UPDATE SET
                discount_type = excluded.discount_type,
                discount_value = excluded.discount_value,
                event_id = excluded.event_id,
                starts_at = excluded.starts_at,
                ends_at = excluded.ends_at,
                max_uses = excluded.max_uses,
                times_used = excluded.times_used,
                is_active = excluded.is_active
            RETURNING *;
        "#,
    )
    .bind(normalize_code(&promo.code))
    .bind(promo.discount_type)
    .bind(promo.discount_value)
    .bind(promo.event_id)
    .bind(promo.starts_at)
    .bind(promo.ends_at)
    .bind(promo.max_uses)
    .bind(promo.times_used)
    .bind(promo.is_active)
    .fetch_one(conn)
    .await?;
    Ok(promo)
}

pub async fn fetch_promo_code(code: &str, conn: &mut SqliteConnection) -> Result<Option<PromoCode>, sqlx::Error> {
    let promo = sqlx::query_as("SELECT * FROM promo_codes WHERE code = $1")
        .bind(normalize_code(code))
        .fetch_optional(conn)
        .await?;
    Ok(promo)
}

pub async fn upsert_gift_card(card: GiftCard, conn: &mut SqliteConnection) -> Result<GiftCard, sqlx::Error> {
    let card = sqlx::query_as(
        r#"
            INSERT INTO gift_cards (code, balance, is_active) VALUES ($1, $2, $3)
            ON CONFLICT (code) DO UPDATE SET balance = excluded.balance, is_active = excluded.is_active
            RETURNING *;
        "#,
    )
    .bind(normalize_code(&card.code))
    .bind(card.balance)
    .bind(card.is_active)
    .fetch_one(conn)
    .await?;
    Ok(card)
}

pub async fn fetch_gift_card(code: &str, conn: &mut SqliteConnection) -> Result<Option<GiftCard>, sqlx::Error> {
    let card = sqlx::query_as("SELECT * FROM gift_cards WHERE code = $1")
        .bind(normalize_code(code))
        .fetch_optional(conn)
        .await?;
    Ok(card)
}
