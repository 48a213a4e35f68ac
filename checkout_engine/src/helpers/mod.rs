mod clock;
mod identifiers;

pub use clock::{Clock, MockClock, SystemClock};
pub use identifiers::{new_order_id, new_order_number, new_reservation_id};
