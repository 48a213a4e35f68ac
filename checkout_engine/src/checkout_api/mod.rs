//! # Checkout engine public API
//!
//! [`checkout_flow_api::CheckoutFlowApi`] is the entry point: it creates checkouts and moves orders through their
//! lifecycle. It is generic over a storage backend that implements [`crate::traits::CheckoutDatabase`].
//!
//! ```rust,ignore
//! use checkout_engine::{CheckoutFlowApi, SqliteDatabase, events::EventProducers};
//! let db = SqliteDatabase::new_with_url("sqlite://data/checkout.db", 5).await?;
//! let api = CheckoutFlowApi::new(db, EventProducers::default());
//! let result = api.create_checkout(request).await?;
//! // ... collect payment for result.summary.total_amount, then
//! api.complete(&result.order_id).await?;
//! ```
pub mod checkout_flow_api;
pub mod checkout_objects;
pub mod errors;
