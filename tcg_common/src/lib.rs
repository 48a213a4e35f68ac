//! Types shared by the checkout engine and the checkout server.
mod cents;

pub mod helpers;
pub mod op;
mod secret;

pub use cents::{Cents, BPS_SCALE};
pub use secret::Secret;
