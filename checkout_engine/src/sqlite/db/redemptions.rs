//! Discount redemption. These run inside the order completion transaction.
use log::{trace, warn};
use sqlx::SqliteConnection;

use crate::db_types::{normalize_code, Cents};

pub async fn increment_promo_usage(code: &str, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    let result = sqlx::query("UPDATE promo_codes SET times_used = times_used + 1 WHERE code = $1")
        .bind(normalize_code(code))
        .execute(conn)
        .await?;
    if result.rows_affected() == 0 {
        warn!("🗃️ Promo code {code} no longer exists. Usage not recorded.");
    }
    Ok(())
}

/// Takes up to `amount` from the gift card balance. Returns what was actually debited.
pub async fn debit_gift_card(code: &str, amount: Cents, conn: &mut SqliteConnection) -> Result<Cents, sqlx::Error> {
    let code = normalize_code(code);
    let balance: Option<(Cents,)> =
        sqlx::query_as("SELECT balance FROM gift_cards WHERE code = $1").bind(&code).fetch_optional(&mut *conn).await?;
    let Some((balance,)) = balance else {
        warn!("🗃️ Gift card {code} no longer exists. Nothing debited.");
        return Ok(Cents::ZERO);
    };
    let debit = balance.min(amount).max(Cents::ZERO);
    sqlx::query("UPDATE gift_cards SET balance = balance - $1 WHERE code = $2")
        .bind(debit)
        .bind(&code)
        .execute(conn)
        .await?;
    trace!("🗃️ Debited {debit} from gift card {code}");
    Ok(debit)
}
