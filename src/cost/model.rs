//! Cost estimation over a pricing table

use crate::cost::pricing::{PricingTable, ProviderPricing};
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// Hours in the pricing month used to pro-rate storage
pub const HOURS_PER_MONTH: f64 = 730.0;

/// What gets priced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceShape {
    pub instance_class: String,

    #[serde(default = "default_instance_count")]
    pub instance_count: u32,

    #[serde(default)]
    pub storage_gb: f64,

    /// Outbound traffic over the priced period
    #[serde(default)]
    pub egress_gb: f64,
}

fn default_instance_count() -> u32 {
    1
}

impl ResourceShape {
    pub fn new(instance_class: impl Into<String>, instance_count: u32, storage_gb: f64, egress_gb: f64) -> Self {
        Self {
            instance_class: instance_class.into(),
            instance_count,
            storage_gb,
            egress_gb,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub compute: f64,
    pub storage: f64,
    pub network: f64,
}

impl CostBreakdown {
    pub fn total(&self) -> f64 {
        self.compute + self.storage + self.network
    }

    fn rounded(&self) -> Self {
        Self {
            compute: round_cents(self.compute),
            storage: round_cents(self.storage),
            network: round_cents(self.network),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostEstimate {
    pub provider: String,
    pub currency: String,
    pub pricing_version: String,
    pub duration_hours: f64,
    pub shape: ResourceShape,

    /// Total after free-tier deduction, in cents precision
    pub monthly_total: f64,

    /// Per-category cost after deduction
    pub breakdown: CostBreakdown,

    /// Amount removed by the free-tier stage
    pub free_tier_deduction: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostComparison {
    pub provider_a: String,
    pub provider_b: String,
    pub estimate_a: CostEstimate,
    pub estimate_b: CostEstimate,

    /// `a - b`; positive when `b` is cheaper
    pub absolute_diff: f64,

    /// Difference relative to `a`, in percent
    pub percentage_diff: f64,

    /// Cheaper provider, `None` on a tie
    pub cheaper: Option<String>,
}

pub fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Pure cost model over one pricing table
#[derive(Debug, Clone)]
pub struct CostModel {
    table: PricingTable,
}

impl CostModel {
    pub fn new(table: PricingTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &PricingTable {
        &self.table
    }

    /// Estimated cost of running `shape` on `provider` for `duration_hours`
    pub fn estimate(
        &self,
        provider: &str,
        shape: &ResourceShape,
        duration_hours: f64,
    ) -> Result<CostEstimate, ConfigError> {
        if !duration_hours.is_finite() || duration_hours < 0.0 {
            return Err(ConfigError::Invalid(format!("invalid duration: {} hours", duration_hours)));
        }
        if shape.storage_gb < 0.0 || shape.egress_gb < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "resource shape for '{}' has negative storage or egress",
                provider
            )));
        }

        let pricing = self.table.provider(provider)?;
        let gross = Self::raw_cost(pricing, provider, shape, duration_hours)?;
        let deduction = Self::free_tier_deduction(pricing, shape, duration_hours, &gross);

        let net = CostBreakdown {
            compute: (gross.compute - deduction.compute).max(0.0),
            storage: (gross.storage - deduction.storage).max(0.0),
            network: (gross.network - deduction.network).max(0.0),
        };

        Ok(CostEstimate {
            provider: provider.to_string(),
            currency: self.table.currency.clone(),
            pricing_version: self.table.version.clone(),
            duration_hours,
            shape: shape.clone(),
            monthly_total: round_cents(net.total()),
            breakdown: net.rounded(),
            free_tier_deduction: round_cents(gross.total() - net.total()),
        })
    }

    fn raw_cost(
        pricing: &ProviderPricing,
        provider: &str,
        shape: &ResourceShape,
        hours: f64,
    ) -> Result<CostBreakdown, ConfigError> {
        let rate = pricing.compute.get(&shape.instance_class).ok_or_else(|| {
            ConfigError::Invalid(format!(
                "No price for instance class '{}' on provider '{}'",
                shape.instance_class, provider
            ))
        })?;

        Ok(CostBreakdown {
            compute: rate * f64::from(shape.instance_count) * hours,
            storage: shape.storage_gb * pricing.storage_gb_month * hours / HOURS_PER_MONTH,
            network: shape.egress_gb * pricing.egress_gb,
        })
    }

    /// Free allowances valued at the same rates, never more than the gross cost
    fn free_tier_deduction(
        pricing: &ProviderPricing,
        shape: &ResourceShape,
        hours: f64,
        gross: &CostBreakdown,
    ) -> CostBreakdown {
        let Some(free) = &pricing.free_tier else {
            return CostBreakdown::default();
        };
        let rate = pricing.compute.get(&shape.instance_class).copied().unwrap_or(0.0);
        let used_hours = f64::from(shape.instance_count) * hours;

        CostBreakdown {
            compute: (free.compute_hours.min(used_hours) * rate).min(gross.compute),
            storage: (free.storage_gb.min(shape.storage_gb) * pricing.storage_gb_month * hours
                / HOURS_PER_MONTH)
                .min(gross.storage),
            network: (free.egress_gb.min(shape.egress_gb) * pricing.egress_gb).min(gross.network),
        }
    }
}

/// Savings of `b` relative to `a`
pub fn compare(a: &CostEstimate, b: &CostEstimate) -> CostComparison {
    let absolute_diff = round_cents(a.monthly_total - b.monthly_total);
    let percentage_diff = if a.monthly_total == 0.0 {
        0.0
    } else {
        round_cents(absolute_diff / a.monthly_total * 100.0)
    };
    let cheaper = if absolute_diff > 0.0 {
        Some(b.provider.clone())
    } else if absolute_diff < 0.0 {
        Some(a.provider.clone())
    } else {
        None
    };

    CostComparison {
        provider_a: a.provider.clone(),
        provider_b: b.provider.clone(),
        estimate_a: a.clone(),
        estimate_b: b.clone(),
        absolute_diff,
        percentage_diff,
        cheaper,
    }
}
