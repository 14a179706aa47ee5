//! Versioned per-provider pricing table

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// Static pricing input, loaded once per session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingTable {
    pub version: String,

    #[serde(default = "default_currency")]
    pub currency: String,

    pub providers: BTreeMap<String, ProviderPricing>,
}

fn default_currency() -> String {
    "USD".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderPricing {
    /// Hourly rate per instance class
    pub compute: BTreeMap<String, f64>,

    /// Price per GB-month of block storage
    #[serde(default)]
    pub storage_gb_month: f64,

    /// Price per GB of outbound traffic
    #[serde(default)]
    pub egress_gb: f64,

    #[serde(default)]
    pub free_tier: Option<FreeTier>,
}

/// Allowances deducted after the raw cost is computed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FreeTier {
    #[serde(default)]
    pub compute_hours: f64,

    #[serde(default)]
    pub storage_gb: f64,

    #[serde(default)]
    pub egress_gb: f64,
}

impl PricingTable {
    /// Load a pricing table, choosing JSON or YAML by file extension
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));

        let table = if is_json {
            Self::from_json(&content)?
        } else {
            Self::from_yaml(&content)?
        };
        debug!(
            "Loaded pricing table {} (version {}, {} providers)",
            path.display(),
            table.version,
            table.providers.len()
        );
        Ok(table)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let table: PricingTable = serde_yaml::from_str(yaml)?;
        table.validate()?;
        Ok(table)
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let table: PricingTable = serde_json::from_str(json)?;
        table.validate()?;
        Ok(table)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version.trim().is_empty() {
            return Err(ConfigError::Invalid("pricing table version must not be empty".to_string()));
        }
        for (name, provider) in &self.providers {
            let rates = provider
                .compute
                .values()
                .chain([&provider.storage_gb_month, &provider.egress_gb]);
            for rate in rates {
                if !rate.is_finite() || *rate < 0.0 {
                    return Err(ConfigError::Invalid(format!(
                        "pricing for '{}' contains an invalid rate ({})",
                        name, rate
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn provider(&self, name: &str) -> Result<&ProviderPricing, ConfigError> {
        self.providers
            .get(name)
            .ok_or_else(|| ConfigError::Invalid(format!("No pricing for provider '{}'", name)))
    }
}
