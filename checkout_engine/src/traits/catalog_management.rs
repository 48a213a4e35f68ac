use std::future::Future;

use crate::{
    db_types::{EventId, GiftCard, NewSellableUnit, PromoCode, SellableUnit, TicketedEvent, UnitId},
    pricing::PricingRule,
    traits::CheckoutDbError,
};

/// Operator-maintained reference data. None of these calls are made while inventory is being reserved.
pub trait CatalogManagement: Clone + Send + Sync {
    /// Creates the event, or replaces its name, status and start time if it exists.
    fn upsert_event(&self, event: TicketedEvent) -> impl Future<Output = Result<TicketedEvent, CheckoutDbError>> + Send;

    fn fetch_event(&self, event_id: &EventId) -> impl Future<Output = Result<Option<TicketedEvent>, CheckoutDbError>> + Send;

    /// Adds a new unit with zero reserved and zero sold. Capacity is fixed from here on.
    fn insert_unit(&self, unit: NewSellableUnit) -> impl Future<Output = Result<SellableUnit, CheckoutDbError>> + Send;

    /// Fetches the given units. Units that do not exist are left out of the result.
    fn fetch_units(&self, ids: &[UnitId]) -> impl Future<Output = Result<Vec<SellableUnit>, CheckoutDbError>> + Send;

    fn fetch_units_for_event(
        &self,
        event_id: &EventId,
    ) -> impl Future<Output = Result<Vec<SellableUnit>, CheckoutDbError>> + Send;

    /// Binds a pricing rule to its unit, replacing any previous rule.
    ///
    /// The rule is validated against the unit's base price first; invalid rules produce
    /// [`CheckoutDbError::InvalidData`].
    fn upsert_pricing_rule(&self, rule: PricingRule) -> impl Future<Output = Result<PricingRule, CheckoutDbError>> + Send;

    fn fetch_pricing_rule(
        &self,
        unit_id: &UnitId,
    ) -> impl Future<Output = Result<Option<PricingRule>, CheckoutDbError>> + Send;

    /// Returns `true` if there was a rule to remove.
    fn remove_pricing_rule(&self, unit_id: &UnitId) -> impl Future<Output = Result<bool, CheckoutDbError>> + Send;

    fn upsert_promo_code(&self, promo: PromoCode) -> impl Future<Output = Result<PromoCode, CheckoutDbError>> + Send;

    /// Looks up a promo code. The code is normalised before the lookup.
    fn fetch_promo_code(&self, code: &str) -> impl Future<Output = Result<Option<PromoCode>, CheckoutDbError>> + Send;

    fn upsert_gift_card(&self, card: GiftCard) -> impl Future<Output = Result<GiftCard, CheckoutDbError>> + Send;

    /// Looks up a gift card. The code is normalised before the lookup.
    fn fetch_gift_card(&self, code: &str) -> impl Future<Output = Result<Option<GiftCard>, CheckoutDbError>> + Send;
}
