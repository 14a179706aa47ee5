//! Target scheduler - groups pipelines into dependency stages

use crate::core::config::StrategyKind;
use crate::error::OrchestratorError;
use std::collections::{HashMap, HashSet};

/// Strategy for running the pipelines of one stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedulingStrategy {
    /// One pipeline at a time, in declaration order
    Sequential,

    /// Every pipeline of the stage at once
    #[default]
    Parallel,

    /// Limited parallelism (max N concurrent pipelines)
    LimitedParallel(usize),
}

impl SchedulingStrategy {
    pub fn from_config(kind: StrategyKind, max_parallel: usize) -> Self {
        match kind {
            StrategyKind::Sequential => SchedulingStrategy::Sequential,
            StrategyKind::Parallel => SchedulingStrategy::Parallel,
            StrategyKind::ParallelLimited => SchedulingStrategy::LimitedParallel(max_parallel.max(1)),
        }
    }

    /// Number of pipelines allowed to run at once for a stage of `stage_len`
    pub fn concurrency(&self, stage_len: usize) -> usize {
        match self {
            SchedulingStrategy::Sequential => 1,
            SchedulingStrategy::Parallel => stage_len.max(1),
            SchedulingStrategy::LimitedParallel(n) => (*n).clamp(1, stage_len.max(1)),
        }
    }
}

/// Group targets into stages (Kahn layering)
///
/// Each stage only depends on earlier stages. Order inside a stage follows
/// declaration order. With `reverse`, stages come out last-first, which is
/// the order teardown needs.
pub fn plan_stages(
    targets: &[(String, Vec<String>)],
    reverse: bool,
) -> Result<Vec<Vec<String>>, OrchestratorError> {
    let known: HashSet<&str> = targets.iter().map(|(id, _)| id.as_str()).collect();
    if known.len() != targets.len() {
        return Err(OrchestratorError::config("duplicate target id in session"));
    }

    let mut remaining: HashMap<&str, usize> = HashMap::new();
    for (id, deps) in targets {
        for dep in deps {
            if !known.contains(dep.as_str()) {
                return Err(OrchestratorError::config(format!(
                    "Target '{}' depends on unknown target '{}'",
                    id, dep
                )));
            }
        }
        remaining.insert(id.as_str(), deps.len());
    }

    let mut stages = Vec::new();
    let mut placed: HashSet<String> = HashSet::new();
    while placed.len() < targets.len() {
        let stage: Vec<String> = targets
            .iter()
            .filter(|(id, _)| !placed.contains(id.as_str()) && remaining.get(id.as_str()) == Some(&0))
            .map(|(id, _)| id.clone())
            .collect();

        if stage.is_empty() {
            return Err(OrchestratorError::config("Cycle detected in target dependencies"));
        }

        placed.extend(stage.iter().cloned());
        for (id, deps) in targets {
            let satisfied = deps.iter().filter(|d| stage.contains(d)).count();
            if let Some(count) = remaining.get_mut(id.as_str()) {
                *count -= satisfied;
            }
        }
        stages.push(stage);
    }

    if reverse {
        stages.reverse();
    }
    Ok(stages)
}
