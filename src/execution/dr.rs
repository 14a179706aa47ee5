//! Disaster-recovery test plan and RTO assessment

use crate::core::{
    config::{DrTestConfig, RtoMode},
    CommandSpec, ExecutionContext, FailurePolicy, Pipeline, ReplicationConfig, RetryPolicy, Step,
    StepStatus, DR_TARGET_ID,
};
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const CONFIGURE_REPLICATION: &str = "configure-replication";
pub const SIMULATE_FAILURE: &str = "simulate-primary-failure";
pub const TRIGGER_FAILOVER: &str = "trigger-failover";
pub const VERIFY_SECONDARY: &str = "verify-secondary";
pub const MEASURE_RTO: &str = "measure-rto";

const DEFAULT_DR_TIMEOUT: Duration = Duration::from_secs(600);

/// Whether the measured (or simulated) RTO met the objective
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RtoAchievement {
    Achieved,
    Missed,
    NotMeasured,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RtoAssessment {
    pub mode: RtoMode,
    pub objective_seconds: u64,
    pub measured_seconds: Option<f64>,
    pub achievement: RtoAchievement,
}

/// Compare a recovery time against the objective
pub fn assess_rto(objective_seconds: u64, measured_seconds: Option<f64>, mode: RtoMode) -> RtoAssessment {
    let achievement = match measured_seconds {
        Some(secs) if secs <= objective_seconds as f64 => RtoAchievement::Achieved,
        Some(_) => RtoAchievement::Missed,
        None => RtoAchievement::NotMeasured,
    };
    RtoAssessment {
        mode,
        objective_seconds,
        measured_seconds,
        achievement,
    }
}

/// Ordered DR actions run after the target pipelines
#[derive(Debug, Clone)]
pub struct DrTestPlan {
    pub replication: ReplicationConfig,
    pub steps: Vec<Step>,
    pub rto_mode: RtoMode,
    pub simulated_rto_secs: Option<u64>,
}

impl DrTestPlan {
    pub fn new(replication: ReplicationConfig, steps: Vec<Step>) -> Self {
        Self {
            replication,
            steps,
            rto_mode: RtoMode::Measured,
            simulated_rto_secs: None,
        }
    }

    /// Report a fixed RTO value instead of timing the failover
    pub fn simulated(mut self, seconds: u64) -> Self {
        self.rto_mode = RtoMode::Simulated;
        self.simulated_rto_secs = Some(seconds);
        self
    }

    pub fn from_config(config: &DrTestConfig, replication: &ReplicationConfig) -> Result<Self, ConfigError> {
        let timeout = config
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_DR_TIMEOUT);

        let command = |name: &str, argv: &[String]| {
            CommandSpec::from_argv(argv)
                .ok_or_else(|| ConfigError::Invalid(format!("dr_test {} must be a non-empty argv list", name)))
        };

        let mut steps = Vec::new();
        if let Some(argv) = &config.configure_replication {
            steps.push(Step::new(CONFIGURE_REPLICATION, command(CONFIGURE_REPLICATION, argv)?).mutating(None));
        }
        steps.push(Step::new(SIMULATE_FAILURE, command(SIMULATE_FAILURE, &config.simulate_failure)?).mutating(None));
        steps.push(Step::new(TRIGGER_FAILOVER, command(TRIGGER_FAILOVER, &config.trigger_failover)?).mutating(None));
        steps.push(Step::new(VERIFY_SECONDARY, command(VERIFY_SECONDARY, &config.verify_secondary)?));

        let probe_retry = config
            .measure_rto_retry
            .map(|r| r.to_policy())
            .unwrap_or_else(RetryPolicy::none);
        steps.push(Step::new(MEASURE_RTO, command(MEASURE_RTO, &config.measure_rto)?).with_retry(probe_retry));

        let steps = steps.into_iter().map(|s| s.with_timeout(timeout)).collect();

        Ok(Self {
            replication: replication.clone(),
            steps,
            rto_mode: config.rto_mode,
            simulated_rto_secs: config.simulated_rto_secs,
        })
    }

    /// The fail-fast `dr-test` pipeline for this plan
    pub fn pipeline(&self, mut context: ExecutionContext, dry_run: bool) -> Pipeline {
        context.target = DR_TARGET_ID.to_string();
        context.set_variable("target", DR_TARGET_ID);
        for (key, value) in self.replication.variables() {
            context.set_variable(key, value);
        }

        Pipeline::new(DR_TARGET_ID, self.steps.clone())
            .with_policy(FailurePolicy::FailFast)
            .with_dry_run(dry_run)
            .with_context(context)
    }

    /// RTO from the executed DR pipeline
    ///
    /// Measured mode times from the start of the failure simulation to the
    /// end of a passed readiness probe.
    pub fn assess(&self, pipeline: &Pipeline) -> RtoAssessment {
        let objective = self.replication.rto_seconds();
        let probe = pipeline
            .result(MEASURE_RTO)
            .filter(|r| r.status == StepStatus::Passed);

        let measured = match (self.rto_mode, probe) {
            (_, None) => None,
            (RtoMode::Simulated, Some(_)) => self.simulated_rto_secs.map(|s| s as f64),
            (RtoMode::Measured, Some(probe)) => pipeline
                .result(SIMULATE_FAILURE)
                .filter(|r| r.status == StepStatus::Passed)
                .map(|start| {
                    let elapsed = probe.finished_at() - start.started_at;
                    elapsed.num_milliseconds().max(0) as f64 / 1000.0
                }),
        };

        assess_rto(objective, measured, self.rto_mode)
    }
}
