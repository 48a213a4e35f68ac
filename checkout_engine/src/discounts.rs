//! # Discount resolution
//!
//! Promo codes and gift cards are applied to the subtotal of a checkout. A code that cannot be honoured never blocks the
//! checkout: the buyer pays full price and the reason is recorded on the order as a note.
//!
//! The resolver only reads. Usage counts and gift card balances change when the order completes, see
//! [`crate::traits::CheckoutDatabase::complete_order`].
use chrono::{DateTime, Utc};
use log::*;
use serde::{Deserialize, Serialize};
use tcg_common::BPS_SCALE;
use thiserror::Error;

use crate::{
    db_types::{normalize_code, Cents, DiscountType, EventId, GiftCard, PromoCode},
    traits::{CatalogManagement, CheckoutDbError},
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiscountError {
    #[error("Promo code {0} does not exist")]
    UnknownPromoCode(String),
    #[error("Promo code {0} is not active")]
    PromoCodeInactive(String),
    #[error("Promo code {0} is not valid yet")]
    PromoCodeNotStarted(String),
    #[error("Promo code {0} has expired")]
    PromoCodeExpired(String),
    #[error("Promo code {0} has reached its usage limit")]
    PromoCodeExhausted(String),
    #[error("Promo code {code} is not valid for event {event_id}")]
    PromoCodeWrongEvent { code: String, event_id: EventId },
    #[error("Promo code {0} is misconfigured")]
    PromoCodeMisconfigured(String),
    #[error("Gift card {0} does not exist")]
    UnknownGiftCard(String),
    #[error("Gift card {0} is not active")]
    GiftCardInactive(String),
    #[error("Gift card {0} has no remaining balance")]
    GiftCardEmpty(String),
}

/// The discounts that will be applied to an order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedDiscounts {
    pub promo_code: Option<String>,
    pub discount_amount: Cents,
    pub gift_card_code: Option<String>,
    pub gift_card_amount: Cents,
    /// Why a requested code was not applied.
    pub notes: Vec<String>,
}

impl AppliedDiscounts {
    pub fn total(&self) -> Cents {
        self.discount_amount + self.gift_card_amount
    }

    fn note(&mut self, err: DiscountError) {
        warn!("🎟️ {err}. Continuing without it.");
        self.notes.push(err.to_string());
    }
}

/// Checks that the promo code can be used for `event_id` at `now`.
pub fn validate_promo_code(promo: &PromoCode, event_id: &EventId, now: DateTime<Utc>) -> Result<(), DiscountError> {
    let code = || promo.code.clone();
    if !promo.is_active {
        return Err(DiscountError::PromoCodeInactive(code()));
    }
    if let Some(scope) = &promo.event_id {
        if scope != event_id {
            return Err(DiscountError::PromoCodeWrongEvent { code: code(), event_id: event_id.clone() });
        }
    }
    if promo.starts_at.is_some_and(|t| now < t) {
        return Err(DiscountError::PromoCodeNotStarted(code()));
    }
    if promo.ends_at.is_some_and(|t| now > t) {
        return Err(DiscountError::PromoCodeExpired(code()));
    }
    if promo.max_uses.is_some_and(|max| promo.times_used >= max) {
        return Err(DiscountError::PromoCodeExhausted(code()));
    }
    let in_range = match promo.discount_type {
        DiscountType::Percentage => (0..=BPS_SCALE).contains(&promo.discount_value),
        DiscountType::FixedAmount => promo.discount_value >= 0,
    };
    if !in_range {
        return Err(DiscountError::PromoCodeMisconfigured(code()));
    }
    Ok(())
}

/// The promo discount on `subtotal`. Never negative and never more than the subtotal.
pub fn promo_discount(promo: &PromoCode, subtotal: Cents) -> Cents {
    let discount = match promo.discount_type {
        DiscountType::Percentage => {
            let bps = u32::try_from(promo.discount_value.clamp(0, BPS_SCALE)).unwrap_or_default();
            subtotal.mul_bps(bps)
        },
        DiscountType::FixedAmount => Cents::from(promo.discount_value),
    };
    discount.clamp(Cents::ZERO, subtotal.max(Cents::ZERO))
}

pub fn validate_gift_card(card: &GiftCard) -> Result<(), DiscountError> {
    if !card.is_active {
        return Err(DiscountError::GiftCardInactive(card.code.clone()));
    }
    if card.balance <= Cents::ZERO {
        return Err(DiscountError::GiftCardEmpty(card.code.clone()));
    }
    Ok(())
}

/// The amount a gift card covers: its balance, up to what is still payable.
pub fn gift_card_amount(card: &GiftCard, payable: Cents) -> Cents {
    card.balance.min(payable).max(Cents::ZERO)
}

/// Applies already-fetched discount records to `subtotal`.
///
/// `promo` and `gift_card` are the lookup results for the requested codes, if any were requested.
pub fn apply_discounts(
    subtotal: Cents,
    event_id: &EventId,
    requested_promo: Option<&str>,
    promo: Option<&PromoCode>,
    requested_gift_card: Option<&str>,
    gift_card: Option<&GiftCard>,
    now: DateTime<Utc>,
) -> AppliedDiscounts {
    let mut result = AppliedDiscounts::default();
    if let Some(code) = requested_promo {
        match promo {
            None => result.note(DiscountError::UnknownPromoCode(normalize_code(code))),
            Some(p) => match validate_promo_code(p, event_id, now) {
                Ok(()) => {
                    result.discount_amount = promo_discount(p, subtotal);
                    result.promo_code = Some(p.code.clone());
                    debug!("🎟️ Promo code {} takes {} off {subtotal}", p.code, result.discount_amount);
                },
                Err(e) => result.note(e),
            },
        }
    }
    if let Some(code) = requested_gift_card {
        match gift_card {
            None => result.note(DiscountError::UnknownGiftCard(normalize_code(code))),
            Some(card) => match validate_gift_card(card) {
                Ok(()) => {
                    let payable = subtotal - result.discount_amount;
                    result.gift_card_amount = gift_card_amount(card, payable);
                    result.gift_card_code = Some(card.code.clone());
                    debug!("🎟️ Gift card {} covers {}", card.code, result.gift_card_amount);
                },
                Err(e) => result.note(e),
            },
        }
    }
    result
}

/// Looks up the requested codes and applies them to `subtotal`.
///
/// Only storage failures are returned as errors. Blank codes are treated as absent.
pub async fn resolve_discounts<B: CatalogManagement>(
    db: &B,
    subtotal: Cents,
    event_id: &EventId,
    promo_code: Option<&str>,
    gift_card_code: Option<&str>,
    now: DateTime<Utc>,
) -> Result<AppliedDiscounts, CheckoutDbError> {
    let promo_code = promo_code.filter(|c| !c.trim().is_empty());
    let gift_card_code = gift_card_code.filter(|c| !c.trim().is_empty());
    let promo = match promo_code {
        Some(code) => db.fetch_promo_code(code).await?,
        None => None,
    };
    let card = match gift_card_code {
        Some(code) => db.fetch_gift_card(code).await?,
        None => None,
    };
    Ok(apply_discounts(subtotal, event_id, promo_code, promo.as_ref(), gift_card_code, card.as_ref(), now))
}

#[cfg(test)]
mod test {
    use chrono::{Duration, TimeZone};

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn event() -> EventId {
        EventId::new("evt-1")
    }

    #[test]
    fn percentage_and_gift_card() {
        let promo = PromoCode::percentage("save10", 1_000);
        let card = GiftCard::new("gc-15", Cents::from_dollars(15));
        let subtotal = Cents::from_dollars(200);
        let applied =
            apply_discounts(subtotal, &event(), Some("save10"), Some(&promo), Some("gc-15"), Some(&card), now());
        assert_eq!(applied.discount_amount, Cents::from_dollars(20));
        assert_eq!(applied.gift_card_amount, Cents::from_dollars(15));
        assert_eq!(subtotal - applied.total(), Cents::from_dollars(165));
        assert!(applied.notes.is_empty());
        assert_eq!(applied.promo_code.as_deref(), Some("SAVE10"));
    }

    #[test]
    fn fixed_discount_is_capped_at_subtotal() {
        let promo = PromoCode::fixed_amount("big", Cents::from_dollars(500));
        let card = GiftCard::new("gc", Cents::from_dollars(50));
        let subtotal = Cents::from_dollars(120);
        let applied = apply_discounts(subtotal, &event(), Some("big"), Some(&promo), Some("gc"), Some(&card), now());
        assert_eq!(applied.discount_amount, subtotal);
        assert_eq!(applied.gift_card_amount, Cents::ZERO);
        assert!(applied.total() <= subtotal);
    }

    #[test]
    fn gift_card_covers_at_most_the_remainder() {
        let card = GiftCard::new("gc", Cents::from_dollars(500));
        let subtotal = Cents::from_dollars(80);
        let applied = apply_discounts(subtotal, &event(), None, None, Some("gc"), Some(&card), now());
        assert_eq!(applied.gift_card_amount, subtotal);
    }

    #[test]
    fn invalid_codes_degrade_to_no_discount() {
        let subtotal = Cents::from_dollars(100);
        let check = |promo: PromoCode, reason: &str| {
            let applied = apply_discounts(subtotal, &event(), Some("x"), Some(&promo), None, None, now());
            assert_eq!(applied.discount_amount, Cents::ZERO);
            assert!(applied.promo_code.is_none());
            assert_eq!(applied.notes.len(), 1);
            assert!(applied.notes[0].contains(reason), "{} does not mention {reason}", applied.notes[0]);
        };
        check(PromoCode::percentage("x", 1_000).inactive(), "not active");
        check(PromoCode::percentage("x", 1_000).for_event("other".into()), "not valid for event");
        check(PromoCode::percentage("x", 1_000).valid_between(Some(now() + Duration::hours(1)), None), "not valid yet");
        check(PromoCode::percentage("x", 1_000).valid_between(None, Some(now() - Duration::hours(1))), "expired");
        let mut used = PromoCode::percentage("x", 1_000).with_max_uses(5);
        used.times_used = 5;
        check(used, "usage limit");
        check(PromoCode::percentage("x", 20_000), "misconfigured");

        let applied = apply_discounts(subtotal, &event(), Some(" nope "), None, Some("gc"), None, now());
        assert_eq!(applied.total(), Cents::ZERO);
        assert_eq!(applied.notes, vec![
            "Promo code NOPE does not exist".to_string(),
            "Gift card GC does not exist".to_string()
        ]);
    }

    #[test]
    fn empty_or_inactive_gift_cards() {
        let subtotal = Cents::from_dollars(100);
        let empty = GiftCard::new("gc", Cents::ZERO);
        let applied = apply_discounts(subtotal, &event(), None, None, Some("gc"), Some(&empty), now());
        assert_eq!(applied.gift_card_amount, Cents::ZERO);
        assert!(applied.notes[0].contains("no remaining balance"));
        let inactive = GiftCard::new("gc", Cents::from_dollars(10)).inactive();
        let applied = apply_discounts(subtotal, &event(), None, None, Some("gc"), Some(&inactive), now());
        assert_eq!(applied.gift_card_amount, Cents::ZERO);
        assert!(applied.gift_card_code.is_none());
    }

    #[test]
    fn scoped_code_for_matching_event() {
        let promo = PromoCode::percentage("x", 2_500).for_event(event()).with_max_uses(3);
        let applied =
            apply_discounts(Cents::from_dollars(40), &event(), Some("x"), Some(&promo), None, None, now());
        assert_eq!(applied.discount_amount, Cents::from_dollars(10));
    }
}
