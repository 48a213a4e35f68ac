//! Ticket Checkout Engine
//!
//! The checkout engine reserves ticket inventory, prices it, applies discounts, fees and tax, and tracks each order
//! from the moment inventory is held until it is paid for, cancelled or expires. It is storage-agnostic.
//!
//! The library is divided into these sections:
//! 1. Storage contracts ([`mod@traits`]) and the backends that implement them: [`SqliteDatabase`] for production and
//!    [`MemoryDatabase`] for tests and single-process deployments. The data types that backends persist are defined in
//!    [`mod@db_types`].
//! 2. Pure computation: dynamic pricing ([`mod@pricing`]) and discount resolution ([`mod@discounts`]).
//! 3. The public API ([`mod@checkout_api`]), chiefly [`CheckoutFlowApi`], which creates orders and owns their state
//!    machine, including the expiry pass that the server runs on a timer.
//!
//! The engine also publishes order lifecycle events ([`mod@events`]) that other components can subscribe to.
pub mod checkout_api;
pub mod db_types;
pub mod discounts;
pub mod events;
pub mod helpers;
pub mod memory;
pub mod pricing;
pub mod traits;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

pub use checkout_api::{
    checkout_flow_api::CheckoutFlowApi,
    checkout_objects::{CheckoutPolicy, CheckoutRequest, CheckoutResult, CheckoutSummary, LineItemRequest},
    errors::CheckoutError,
};
pub use memory::MemoryDatabase;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;
pub use traits::{
    CatalogManagement,
    CheckoutDatabase,
    CheckoutDbError,
    ExpiryResult,
    InventoryLedger,
    OrderTransition,
};
