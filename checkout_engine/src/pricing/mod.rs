//! # Dynamic pricing
//!
//! A pure function from `(base price, rule, snapshot, now)` to a unit price. Nothing in here touches storage; callers
//! collect a [`PricingSnapshot`] from the ledger first and hand it in.
//!
//! Multipliers compose in a fixed order: time to event, then share of capacity sold, then purchase velocity. The product
//! is applied to the base price, rounded to the cent and clamped to the rule's `[min_price, max_price]` band.
mod rules;

use chrono::{DateTime, Utc};
use log::*;
pub use rules::{DemandParams, InventoryBucket, PricingRule, PricingRuleError, PricingStrategy, TimeBucket};
use serde::{Deserialize, Serialize};

use crate::db_types::{Cents, SellableUnit};

const MILLIS_PER_DAY: f64 = 86_400_000.0;
const SURGE_STEP: f64 = 0.1;

/// The read-only view of a unit that pricing depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingSnapshot {
    pub capacity: u32,
    pub sold: u32,
    pub purchases_last_hour: u32,
    pub event_starts_at: DateTime<Utc>,
}

impl PricingSnapshot {
    pub fn for_unit(unit: &SellableUnit, purchases_last_hour: u32, event_starts_at: DateTime<Utc>) -> Self {
        Self { capacity: unit.capacity, sold: unit.sold, purchases_last_hour, event_starts_at }
    }

    /// Share of capacity sold, in percent. A unit with no capacity counts as sold out.
    pub fn percent_sold(&self) -> f64 {
        if self.capacity == 0 {
            return 100.0;
        }
        f64::from(self.sold) * 100.0 / f64::from(self.capacity)
    }

    /// Fractional days until the event starts. Negative once it has started.
    pub fn days_remaining(&self, now: DateTime<Utc>) -> f64 {
        #[allow(clippy::cast_precision_loss)]
        let millis = (self.event_starts_at - now).num_milliseconds() as f64;
        millis / MILLIS_PER_DAY
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub base_price: Cents,
    pub multiplier: f64,
    pub unit_price: Cents,
    /// True if the min/max band changed the scaled price.
    pub clamped: bool,
}

impl PriceQuote {
    pub fn flat(base_price: Cents) -> Self {
        Self { base_price, multiplier: 1.0, unit_price: base_price, clamped: false }
    }
}

/// Prices one unit. With no rule, the base price is returned unchanged.
pub fn quote_price(
    base_price: Cents,
    rule: Option<&PricingRule>,
    snapshot: &PricingSnapshot,
    now: DateTime<Utc>,
) -> PriceQuote {
    let Some(rule) = rule else {
        return PriceQuote::flat(base_price);
    };
    let multiplier = match &rule.strategy {
        PricingStrategy::TimeBased { buckets } => time_multiplier(buckets, snapshot.days_remaining(now)),
        PricingStrategy::InventoryBased { buckets } => inventory_multiplier(buckets, snapshot.percent_sold()),
        PricingStrategy::DemandBased(params) => demand_multiplier(params, snapshot.purchases_last_hour),
        PricingStrategy::Hybrid { time, inventory, demand } => {
            let mut m = 1.0;
            m *= time_multiplier(time, snapshot.days_remaining(now));
            m *= inventory_multiplier(inventory, snapshot.percent_sold());
            if let Some(params) = demand {
                m *= demand_multiplier(params, snapshot.purchases_last_hour);
            }
            m
        },
    };
    let scaled = base_price.scale(multiplier);
    // `max_price` wins over `min_price` if a rule was built with inverted bounds
    let unit_price = scaled.max(rule.min_price).min(rule.max_price);
    let clamped = unit_price != scaled;
    trace!(
        "🏷️ {} rule for {}: {base_price} x {multiplier:.4} = {scaled}, charged {unit_price}",
        rule.strategy.name(),
        rule.unit_id
    );
    PriceQuote { base_price, multiplier, unit_price, clamped }
}

/// The tightest bucket is the one with the smallest threshold that is still at least `days_remaining`.
fn time_multiplier(buckets: &[TimeBucket], days_remaining: f64) -> f64 {
    buckets
        .iter()
        .filter(|b| b.days_before_event >= days_remaining)
        .min_by(|a, b| a.days_before_event.total_cmp(&b.days_before_event))
        .map_or(1.0, |b| b.multiplier)
}

/// The tightest bucket is the one with the largest threshold not exceeding `percent_sold`.
fn inventory_multiplier(buckets: &[InventoryBucket], percent_sold: f64) -> f64 {
    buckets
        .iter()
        .filter(|b| b.percent_sold <= percent_sold)
        .max_by(|a, b| a.percent_sold.total_cmp(&b.percent_sold))
        .map_or(1.0, |b| b.multiplier)
}

fn demand_multiplier(params: &DemandParams, purchases_last_hour: u32) -> f64 {
    let mut m = 1.0;
    if params.surge_threshold > 0 && purchases_last_hour > params.surge_threshold {
        let threshold = f64::from(params.surge_threshold);
        let excess = f64::from(purchases_last_hour) - threshold;
        m *= (1.0 + excess / threshold * SURGE_STEP).min(params.max_surge_multiplier);
    }
    if let Some(flat) = params.demand_multiplier {
        m *= flat;
    }
    m
}

#[cfg(test)]
mod test {
    use chrono::{Duration, TimeZone};

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn snapshot(capacity: u32, sold: u32, pph: u32, days_out: i64) -> PricingSnapshot {
        PricingSnapshot {
            capacity,
            sold,
            purchases_last_hour: pph,
            event_starts_at: now() + Duration::days(days_out),
        }
    }

    fn rule(strategy: PricingStrategy) -> PricingRule {
        PricingRule::new("ga".into(), strategy, Cents::from_dollars(50), Cents::from_dollars(300))
    }

    fn inventory_rule() -> PricingRule {
        rule(PricingStrategy::InventoryBased {
            buckets: vec![InventoryBucket::new(80.0, 1.2), InventoryBucket::new(95.0, 1.5)],
        })
    }

    #[test]
    fn no_rule_means_base_price() {
        let quote = quote_price(Cents::from_dollars(100), None, &snapshot(100, 99, 500, 1), now());
        assert_eq!(quote, PriceQuote::flat(Cents::from_dollars(100)));
    }

    #[test]
    fn inventory_buckets() {
        let r = inventory_rule();
        let base = Cents::from_dollars(100);
        assert_eq!(quote_price(base, Some(&r), &snapshot(100, 85, 0, 30), now()).unit_price, Cents::from_dollars(120));
        assert_eq!(quote_price(base, Some(&r), &snapshot(100, 79, 0, 30), now()).unit_price, base);
        assert_eq!(quote_price(base, Some(&r), &snapshot(100, 80, 0, 30), now()).unit_price, Cents::from_dollars(120));
        assert_eq!(quote_price(base, Some(&r), &snapshot(100, 97, 0, 30), now()).unit_price, Cents::from_dollars(150));
        // No capacity at all counts as fully sold
        assert_eq!(quote_price(base, Some(&r), &snapshot(0, 0, 0, 30), now()).unit_price, Cents::from_dollars(150));
    }

    #[test]
    fn time_buckets_pick_the_tightest_match() {
        let r = rule(PricingStrategy::TimeBased {
            buckets: vec![TimeBucket::new(30.0, 1.1), TimeBucket::new(7.0, 1.25), TimeBucket::new(1.0, 1.5)],
        });
        let base = Cents::from_dollars(100);
        let price = |days| quote_price(base, Some(&r), &snapshot(100, 0, 0, days), now()).unit_price;
        assert_eq!(price(60), base);
        assert_eq!(price(30), Cents::from_dollars(110));
        assert_eq!(price(10), Cents::from_dollars(110));
        assert_eq!(price(5), Cents::from_dollars(125));
        assert_eq!(price(0), Cents::from_dollars(150));
    }

    #[test]
    fn surge_pricing() {
        let r = rule(PricingStrategy::DemandBased(DemandParams::new(10, 1.3)));
        let base = Cents::from_dollars(100);
        let price = |pph| quote_price(base, Some(&r), &snapshot(100, 0, pph, 30), now()).unit_price;
        assert_eq!(price(10), base);
        // 1 + (15 - 10)/10 * 0.1 = 1.05
        assert_eq!(price(15), Cents::from_dollars(105));
        // 1 + (40 - 10)/10 * 0.1 = 1.3, at the cap
        assert_eq!(price(40), Cents::from_dollars(130));
        assert_eq!(price(1_000), Cents::from_dollars(130));
    }

    #[test]
    fn flat_demand_multiplier_applies_without_surge() {
        let r = rule(PricingStrategy::DemandBased(DemandParams::new(10, 2.0).with_demand_multiplier(1.1)));
        let quote = quote_price(Cents::from_dollars(100), Some(&r), &snapshot(100, 0, 0, 30), now());
        assert_eq!(quote.unit_price, Cents::from_dollars(110));
    }

    #[test]
    fn hybrid_composes_in_order() {
        let r = rule(PricingStrategy::Hybrid {
            time: vec![TimeBucket::new(7.0, 1.1)],
            inventory: vec![InventoryBucket::new(50.0, 1.2)],
            demand: Some(DemandParams::new(10, 2.0)),
        });
        // 1.1 * 1.2 * 1.1 = 1.452
        let quote = quote_price(Cents::from_dollars(100), Some(&r), &snapshot(100, 60, 20, 3), now());
        assert_eq!(quote.unit_price, Cents::from(14_520));
        assert!(!quote.clamped);
    }

    #[test]
    fn clamped_to_bounds() {
        let r = PricingRule::new(
            "ga".into(),
            PricingStrategy::InventoryBased { buckets: vec![InventoryBucket::new(0.0, 3.0)] },
            Cents::from_dollars(50),
            Cents::from_dollars(200),
        );
        let quote = quote_price(Cents::from_dollars(100), Some(&r), &snapshot(100, 0, 0, 30), now());
        assert_eq!(quote.unit_price, Cents::from_dollars(200));
        assert!(quote.clamped);
        let r = PricingRule::new(
            "ga".into(),
            PricingStrategy::InventoryBased { buckets: vec![InventoryBucket::new(0.0, 0.1)] },
            Cents::from_dollars(50),
            Cents::from_dollars(200),
        );
        let quote = quote_price(Cents::from_dollars(100), Some(&r), &snapshot(100, 0, 0, 30), now());
        assert_eq!(quote.unit_price, Cents::from_dollars(50));
    }

    #[test]
    fn inverted_bounds_do_not_panic() {
        let r = PricingRule::new(
            "ga".into(),
            PricingStrategy::InventoryBased { buckets: vec![InventoryBucket::new(0.0, 1.0)] },
            Cents::from_dollars(200),
            Cents::from_dollars(50),
        );
        let quote = quote_price(Cents::from_dollars(100), Some(&r), &snapshot(100, 0, 0, 30), now());
        assert_eq!(quote.unit_price, Cents::from_dollars(50));
        assert!(quote.clamped);
    }

    #[test]
    fn deterministic_for_identical_inputs() {
        let r = inventory_rule();
        let snap = snapshot(333, 290, 17, 4);
        let first = quote_price(Cents::from(4_999), Some(&r), &snap, now());
        for _ in 0..100 {
            assert_eq!(quote_price(Cents::from(4_999), Some(&r), &snap, now()), first);
        }
    }
}
