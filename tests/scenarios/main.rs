//! Scenario-based tests for dr-orchestrator

#[path = "../helpers.rs"]
mod helpers;

mod cancellation;
mod cost_compare;
mod dr_test;
mod dry_run;
mod failure_policy;
mod multicloud;
mod reports;
