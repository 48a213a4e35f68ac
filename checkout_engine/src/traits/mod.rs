//! # Storage contracts
//!
//! This module defines the behaviour a storage backend must expose to drive the checkout engine.
//!
//! * [`InventoryLedger`] owns the `capacity`/`reserved`/`sold` counters. It is the only shared mutable resource in the
//!   engine, and the only place those counters may change.
//! * [`CatalogManagement`] stores the operator-maintained reference data: events, sellable units, pricing rules, promo
//!   codes and gift cards.
//! * [`CheckoutDatabase`] ties the two together with order storage, and performs every order state transition in the
//!   same atomic unit of work as the matching ledger movement.
//!
//! All methods return `Send` futures so that the checkout API can be driven from spawned tasks.
mod catalog_management;
mod checkout_database;
mod data_objects;
mod inventory_ledger;

pub use catalog_management::CatalogManagement;
pub use checkout_database::{CheckoutDatabase, CheckoutDbError};
pub use data_objects::{ExpiryResult, OrderTransition};
pub use inventory_ledger::InventoryLedger;
