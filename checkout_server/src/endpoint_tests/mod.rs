pub mod helpers;

mod checkout;
mod payments;
