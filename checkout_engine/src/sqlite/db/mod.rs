//! # SQLite Database methods
//!
//! This module contains "low-level" SQLite database interactions.
//!
//! All these interaction are maintained by simple functions (rather than stateful structs) that accept a
//! `&mut SqliteConnection` argument. Callers can obtain a connection from a pool,
//! or create an atomic transaction as the need arises and call through to the functions without any other changes.
//!
//! Transactions that modify data issue their first write before any read. SQLite then takes the write lock up front,
//! and concurrent writers queue on the busy timeout instead of failing a lock upgrade.
use std::{env, str::FromStr, time::Duration};

use log::info;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    Error as SqlxError,
    SqlitePool,
};

use crate::traits::CheckoutDbError;

pub mod catalog;
pub mod inventory;
pub mod orders;
pub mod redemptions;

const SQLITE_DB_URL: &str = "sqlite://data/checkout.db";
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

pub fn db_url() -> String {
    let result = env::var("TCG_DATABASE_URL").unwrap_or_else(|_| {
        info!("TCG_DATABASE_URL is not set. Using the default.");
        SQLITE_DB_URL.to_string()
    });
    info!("Using database URL: {result}");
    result
}

pub async fn new_pool(url: &str, max_connections: u32) -> Result<SqlitePool, SqlxError> {
    let options = SqliteConnectOptions::from_str(url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(BUSY_TIMEOUT);
    let pool = SqlitePoolOptions::new().max_connections(max_connections).connect_with(options).await?;
    Ok(pool)
}

/// Maps constraint violations on insert to a domain error, and everything else to a database error.
pub(crate) fn map_insert_error<F>(e: SqlxError, on_duplicate: F) -> CheckoutDbError
where F: FnOnce() -> CheckoutDbError {
    match e.as_database_error() {
        Some(db) if db.is_unique_violation() => on_duplicate(),
        Some(db) if db.is_foreign_key_violation() => CheckoutDbError::InvalidData(db.message().to_string()),
        Some(db) if db.is_check_violation() => CheckoutDbError::InvalidData(db.message().to_string()),
        _ => CheckoutDbError::from(e),
    }
}
