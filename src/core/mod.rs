//! Core domain models
//!
//! This module defines the fundamental data structures that represent
//! deployment targets, their steps and pipelines, and project configuration.

pub mod config;
pub mod context;
pub mod pipeline;
pub mod replication;
pub mod state;
pub mod step;

pub use config::{PipelineOptions, ProjectConfig, RtoMode, DR_TARGET_ID};
pub use context::*;
pub use pipeline::*;
pub use replication::*;
pub use state::*;
pub use step::*;
