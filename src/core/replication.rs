//! Cross-target replication settings

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplicationMethod {
    Sync,
    Async,
}

/// Replication between a primary and a secondary target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicationConfig {
    pub method: ReplicationMethod,

    /// Recovery point objective
    pub rpo_minutes: u32,

    /// Recovery time objective
    pub rto_minutes: u32,

    pub primary: String,
    pub secondary: String,
}

impl ReplicationConfig {
    /// RTO objective in seconds
    pub fn rto_seconds(&self) -> u64 {
        u64::from(self.rto_minutes) * 60
    }

    /// Check the values against the set of known target ids
    pub fn validate<'a>(&self, targets: impl IntoIterator<Item = &'a str>) -> Result<(), ConfigError> {
        if self.rpo_minutes == 0 || self.rto_minutes == 0 {
            return Err(ConfigError::Invalid(
                "replication rpo_minutes and rto_minutes must be positive".to_string(),
            ));
        }
        if self.primary == self.secondary {
            return Err(ConfigError::Invalid(format!(
                "replication primary and secondary must differ (both '{}')",
                self.primary
            )));
        }

        let known: Vec<&str> = targets.into_iter().collect();
        for (role, id) in [("primary", &self.primary), ("secondary", &self.secondary)] {
            if !known.contains(&id.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "replication {} '{}' is not a known target",
                    role, id
                )));
            }
        }
        Ok(())
    }

    /// Variables exposed to DR steps as `{{ replication.* }}`
    pub fn variables(&self) -> Vec<(String, String)> {
        let method = match self.method {
            ReplicationMethod::Sync => "sync",
            ReplicationMethod::Async => "async",
        };
        vec![
            ("replication.method".to_string(), method.to_string()),
            ("replication.rpo_minutes".to_string(), self.rpo_minutes.to_string()),
            ("replication.rto_minutes".to_string(), self.rto_minutes.to_string()),
            ("replication.primary".to_string(), self.primary.clone()),
            ("replication.secondary".to_string(), self.secondary.clone()),
        ]
    }
}
