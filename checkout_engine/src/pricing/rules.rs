use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db_types::{Cents, UnitId};

/// Applies `multiplier` when the event is at most `days_before_event` days away.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeBucket {
    pub days_before_event: f64,
    pub multiplier: f64,
}

impl TimeBucket {
    pub fn new(days_before_event: f64, multiplier: f64) -> Self {
        Self { days_before_event, multiplier }
    }
}

/// Applies `multiplier` once at least `percent_sold` percent of capacity has been sold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InventoryBucket {
    pub percent_sold: f64,
    pub multiplier: f64,
}

impl InventoryBucket {
    pub fn new(percent_sold: f64, multiplier: f64) -> Self {
        Self { percent_sold, multiplier }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DemandParams {
    /// Purchases per hour above which the surge multiplier kicks in.
    pub surge_threshold: u32,
    pub max_surge_multiplier: f64,
    /// A flat multiplier applied regardless of purchase velocity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub demand_multiplier: Option<f64>,
}

impl DemandParams {
    pub fn new(surge_threshold: u32, max_surge_multiplier: f64) -> Self {
        Self { surge_threshold, max_surge_multiplier, demand_multiplier: None }
    }

    pub fn with_demand_multiplier(mut self, multiplier: f64) -> Self {
        self.demand_multiplier = Some(multiplier);
        self
    }
}

/// The closed set of pricing strategies. Serialized as `{"strategy": "...", "params": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", content = "params", rename_all = "snake_case")]
pub enum PricingStrategy {
    TimeBased { buckets: Vec<TimeBucket> },
    InventoryBased { buckets: Vec<InventoryBucket> },
    DemandBased(DemandParams),
    /// Time, then inventory, then demand.
    Hybrid {
        #[serde(default)]
        time: Vec<TimeBucket>,
        #[serde(default)]
        inventory: Vec<InventoryBucket>,
        #[serde(default)]
        demand: Option<DemandParams>,
    },
}

impl PricingStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            PricingStrategy::TimeBased { .. } => "time_based",
            PricingStrategy::InventoryBased { .. } => "inventory_based",
            PricingStrategy::DemandBased(_) => "demand_based",
            PricingStrategy::Hybrid { .. } => "hybrid",
        }
    }

    /// Whether the strategy reads purchase velocity, and so needs the trailing-hour sales count.
    pub fn uses_demand(&self) -> bool {
        matches!(self, PricingStrategy::DemandBased(_) | PricingStrategy::Hybrid { demand: Some(_), .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingRule {
    pub unit_id: UnitId,
    #[serde(flatten)]
    pub strategy: PricingStrategy,
    pub min_price: Cents,
    pub max_price: Cents,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PricingRuleError {
    #[error("Price bounds are inconsistent: expected {min} <= {base} <= {max}")]
    InvalidBounds { min: Cents, base: Cents, max: Cents },
    #[error("Multiplier {0} must be a finite, positive number")]
    InvalidMultiplier(f64),
    #[error("Days-before-event threshold {0} must be a finite, non-negative number")]
    InvalidDaysThreshold(f64),
    #[error("Percent-sold threshold {0} must lie between 0 and 100")]
    InvalidPercentThreshold(f64),
    #[error("Surge threshold must be at least one purchase per hour")]
    ZeroSurgeThreshold,
    #[error("Maximum surge multiplier {0} must be at least 1.0")]
    InvalidSurgeCap(f64),
}

impl PricingRule {
    pub fn new(unit_id: UnitId, strategy: PricingStrategy, min_price: Cents, max_price: Cents) -> Self {
        Self { unit_id, strategy, min_price, max_price }
    }

    /// Checks the rule against the base price of the unit it is bound to.
    pub fn validate(&self, base_price: Cents) -> Result<(), PricingRuleError> {
        if self.min_price.is_negative() || self.min_price > base_price || base_price > self.max_price {
            return Err(PricingRuleError::InvalidBounds { min: self.min_price, base: base_price, max: self.max_price });
        }
        match &self.strategy {
            PricingStrategy::TimeBased { buckets } => validate_time(buckets),
            PricingStrategy::InventoryBased { buckets } => validate_inventory(buckets),
            PricingStrategy::DemandBased(params) => validate_demand(params),
            PricingStrategy::Hybrid { time, inventory, demand } => {
                validate_time(time)?;
                validate_inventory(inventory)?;
                demand.as_ref().map(validate_demand).transpose()?;
                Ok(())
            },
        }
    }
}

fn validate_multiplier(m: f64) -> Result<(), PricingRuleError> {
    if m.is_finite() && m > 0.0 {
        Ok(())
    } else {
        Err(PricingRuleError::InvalidMultiplier(m))
    }
}

fn validate_time(buckets: &[TimeBucket]) -> Result<(), PricingRuleError> {
    buckets.iter().try_for_each(|b| {
        if !b.days_before_event.is_finite() || b.days_before_event < 0.0 {
            return Err(PricingRuleError::InvalidDaysThreshold(b.days_before_event));
        }
        validate_multiplier(b.multiplier)
    })
}

fn validate_inventory(buckets: &[InventoryBucket]) -> Result<(), PricingRuleError> {
    buckets.iter().try_for_each(|b| {
        if !(0.0..=100.0).contains(&b.percent_sold) {
            return Err(PricingRuleError::InvalidPercentThreshold(b.percent_sold));
        }
        validate_multiplier(b.multiplier)
    })
}

fn validate_demand(params: &DemandParams) -> Result<(), PricingRuleError> {
    if params.surge_threshold == 0 {
        return Err(PricingRuleError::ZeroSurgeThreshold);
    }
    if !params.max_surge_multiplier.is_finite() || params.max_surge_multiplier < 1.0 {
        return Err(PricingRuleError::InvalidSurgeCap(params.max_surge_multiplier));
    }
    params.demand_multiplier.map(validate_multiplier).transpose()?;
    Ok(())
}
