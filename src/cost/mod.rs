//! Cost estimation and provider comparison
//!
//! Prices come from an external, versioned [`PricingTable`]; nothing in
//! the model itself is provider specific.

pub mod model;
pub mod pricing;

pub use model::{compare, round_cents, CostBreakdown, CostComparison, CostEstimate, CostModel, ResourceShape};
pub use pricing::{FreeTier, PricingTable, ProviderPricing};
