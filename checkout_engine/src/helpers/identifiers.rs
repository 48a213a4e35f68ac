use chrono::{DateTime, Utc};
use rand::{distributions::Alphanumeric, Rng};

use crate::db_types::{OrderId, ReservationId};

fn random_suffix(len: usize) -> String {
    rand::thread_rng().sample_iter(&Alphanumeric).take(len).map(char::from).collect()
}

pub fn new_order_id() -> OrderId {
    OrderId(format!("ord_{}", random_suffix(20).to_lowercase()))
}

pub fn new_reservation_id() -> ReservationId {
    ReservationId(format!("rsv_{}", random_suffix(20).to_lowercase()))
}

/// Customer-facing order reference: `ORD-{unix millis}-{5 upper-case alphanumerics}`.
pub fn new_order_number(now: DateTime<Utc>) -> String {
    format!("ORD-{}-{}", now.timestamp_millis(), random_suffix(5).to_uppercase())
}
