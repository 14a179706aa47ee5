//! Session execution: steps, pipelines, stages and the DR test

pub mod dr;
pub mod engine;
pub mod executor;
pub mod scheduler;
pub mod session;

pub use dr::{assess_rto, DrTestPlan, RtoAchievement, RtoAssessment};
pub use engine::{EventBus, EventHandler, PipelineRunner, SessionEvent};
pub use executor::{parse_outputs, StepExecutor, StepOutcome};
pub use scheduler::{plan_stages, SchedulingStrategy};
pub use session::{
    cost_comparison_from_config, overall_status, OrchestrationSession, SessionBuilder, SessionKind,
    SessionOutcome, SinkFactory,
};
