//! Order lifecycle notifications.
//!
//! Collaborators that care about checkout outcomes (receipts, analytics, seat maps) register a hook in [`EventHooks`].
//! The checkout API publishes to the matching [`EventProducers`] after each successful state change. Handlers run on
//! their own tasks and can never fail or slow down a checkout.
mod channel;
mod event_types;
mod hooks;

pub use channel::{EventHandler, EventProducer, Handler};
pub use event_types::*;
pub use hooks::{EventHandlers, EventHooks, EventProducers};
