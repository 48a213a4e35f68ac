use std::future::Future;

use chrono::{DateTime, Utc};

use crate::{
    db_types::{Reservation, ReservationId, ReservationItem, SellableUnit, UnitId},
    traits::CheckoutDbError,
};

/// Authoritative inventory counters with all-or-nothing reservation.
pub trait InventoryLedger: Clone + Send + Sync {
    /// Atomically reserves every item in `items`, or nothing at all.
    ///
    /// Quantities for the same unit are merged before checking. If any unit lacks the capacity, no counter changes and
    /// [`CheckoutDbError::InsufficientInventory`] lists the shortfall for every oversubscribed unit. Unknown units
    /// produce [`CheckoutDbError::UnitNotFound`].
    fn reserve_all(
        &self,
        items: &[ReservationItem],
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<Reservation, CheckoutDbError>> + Send;

    /// Moves the reserved quantities of a held reservation into `sold`.
    ///
    /// Returns `false`, changing nothing, if the reservation is not currently held.
    fn commit(&self, reservation: &ReservationId, at: DateTime<Utc>)
        -> impl Future<Output = Result<bool, CheckoutDbError>> + Send;

    /// Returns the reserved quantities of a held reservation to the available pool.
    ///
    /// Returns `false`, changing nothing, if the reservation is not currently held.
    fn release(
        &self,
        reservation: &ReservationId,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<bool, CheckoutDbError>> + Send;

    fn fetch_reservation(
        &self,
        reservation: &ReservationId,
    ) -> impl Future<Output = Result<Option<Reservation>, CheckoutDbError>> + Send;

    /// A read-only copy of the unit's counters.
    fn unit_snapshot(&self, unit_id: &UnitId) -> impl Future<Output = Result<Option<SellableUnit>, CheckoutDbError>> + Send;

    /// The number of units sold (by completed orders) at or after `since`.
    fn purchases_since(
        &self,
        unit_id: &UnitId,
        since: DateTime<Utc>,
    ) -> impl Future<Output = Result<u32, CheckoutDbError>> + Send;
}
