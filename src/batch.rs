//! # Per-Entity Batch Dispatch
//!
//! Entity-level binning, masking, and imputation share no mutable state between
//! entities, so the population is processed as an independent-task batch over
//! the rayon thread pool. Results are collected keyed by entity in population
//! order — never completion order — because row order is part of the feature
//! matrix contract.
//!
//! One entity's failure never tears down another's result: failures are
//! accumulated alongside their entity keys and the caller decides between
//! fail-fast and report-and-skip.

use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;

use crate::error::EngineError;
use crate::types::EntityId;

/// What to do when individual entities fail while the rest of the batch is fine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Abort on the first per-entity failure.
    FailFast,
    /// Keep every successful entity; report the failed keys to the caller.
    ReportAndSkip,
}

/// Runs `f` once per entity across the thread pool, returning one outcome per
/// entity in population order.
pub fn map_entities<T, F>(
    population: &[EntityId],
    show_progress: bool,
    f: F,
) -> Vec<(EntityId, Result<T, EngineError>)>
where
    T: Send,
    F: Fn(&EntityId) -> Result<T, EngineError> + Sync,
{
    log::info!("Dispatching {} entities across the thread pool", population.len());
    let bar = if show_progress {
        let bar = ProgressBar::new(population.len() as u64);
        bar.set_style(
            ProgressStyle::with_template("{bar:40} {pos}/{len} entities ({eta})")
                .expect("static progress template is well-formed"),
        );
        bar
    } else {
        ProgressBar::hidden()
    };

    let outcomes: Vec<(EntityId, Result<T, EngineError>)> = population
        .par_iter()
        .map(|id| {
            let result = f(id).map_err(|e| EngineError::for_entity(id.clone(), e));
            bar.inc(1);
            (id.clone(), result)
        })
        .collect();
    bar.finish_and_clear();
    outcomes
}

/// Splits outcomes into successes and failures, both in population order.
pub fn partition_outcomes<T>(
    outcomes: Vec<(EntityId, Result<T, EngineError>)>,
) -> (Vec<(EntityId, T)>, Vec<(EntityId, EngineError)>) {
    let mut completed = Vec::with_capacity(outcomes.len());
    let mut failures = Vec::new();
    for (id, outcome) in outcomes {
        match outcome {
            Ok(value) => completed.push((id, value)),
            Err(e) => failures.push((id, e)),
        }
    }
    if !failures.is_empty() {
        let keys: Vec<&str> = failures.iter().map(|(id, _)| id.as_str()).collect();
        log::warn!(
            "{} of {} entities failed: {}",
            failures.len(),
            completed.len() + failures.len(),
            keys.join(", ")
        );
    }
    (completed, failures)
}
