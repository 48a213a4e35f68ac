//! # Ticket checkout server
//! This crate hosts the HTTP front end of the checkout gateway. It is responsible for:
//! * Accepting checkout requests and turning them into priced, held orders.
//! * Reporting and cancelling orders on request.
//! * Receiving payment confirmations from the payment provider and completing the matching order.
//! * Running the expiry worker that returns abandoned holds to the pool.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
//!
//! ## Routes
//! The server exposes the following routes:
//! * `GET /health`: A health check route that returns a 200 OK response.
//! * `POST /checkout`: Creates a pending order.
//! * `GET /checkout?order_id=..`: Fetches an order, expiring it first if its hold has elapsed.
//! * `POST /checkout/{order_id}/cancel`: Cancels a pending order.
//! * `POST /webhook/payment_confirmed`: HMAC-signed payment notification. Completes the order.

pub mod cli;
pub mod config;
pub mod data_objects;
pub mod errors;
pub mod expiry_worker;
pub mod helpers;
pub mod middleware;
pub mod routes;
pub mod server;

#[cfg(test)]
mod endpoint_tests;
