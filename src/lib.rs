//! dr-orchestrator - multi-cloud deployment and disaster-recovery test orchestration

pub mod cli;
pub mod core;
pub mod cost;
pub mod error;
pub mod execution;
pub mod persistence;
pub mod report;
pub mod runner;

// Re-export commonly used types
pub use core::{Pipeline, PipelineOptions, ProjectConfig, Step, StepResult, StepStatus};
pub use cost::{CostComparison, CostModel, PricingTable};
pub use error::{OrchestratorError, Result};
pub use execution::{OrchestrationSession, SessionBuilder, SessionEvent, SessionKind, SessionOutcome};
pub use report::{ReportFormat, ReportWriter, SessionReport};
pub use runner::{CancellationToken, ProcessRunner, TokioProcessRunner};
