//! # Event Pivot
//!
//! Reshapes one entity's long-format event list `(t, variable, value)` into a wide,
//! timestamp-indexed table. Exact `(t, variable)` collisions are resolved by an
//! epsilon perturbation so that every observation keeps its own row while relative
//! order within the duplicate group is preserved.
//!
//! The perturbation is a heuristic, not a guaranteed-unique scheme: with extreme
//! duplicate counts an adjusted timestamp can land on another row's timestamp. That
//! case is detected after adjustment and reported as a hard integrity error rather
//! than silently collapsed by the pivot.

use ahash::AHashMap;
use itertools::Itertools;
use thiserror::Error;

use crate::types::{Event, WideFrame};

/// Spacing applied between same-timestamp observations of one variable.
pub const COLLISION_EPSILON: f64 = 1e-6;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PivotError {
    #[error(
        "Duplicate observation of '{variable}' at t = {t} survived collision resolution. \
         The epsilon perturbation cannot separate this input; refusing to pivot-collapse it."
    )]
    ResidualDuplicate { variable: String, t: f64 },
    #[error("Event for '{variable}' has a non-finite timestamp ({t}).")]
    NonFiniteTimestamp { variable: String, t: f64 },
}

/// Pivots one entity's events into a wide table.
///
/// Post-condition: no two cells of the output share `(timestamp, variable)`.
/// Columns are the sorted distinct variable names; rows are the sorted distinct
/// (possibly adjusted) timestamps.
pub fn pivot_events(events: &[Event]) -> Result<WideFrame, PivotError> {
    if events.is_empty() {
        return Ok(WideFrame::empty(Vec::new()));
    }
    for e in events {
        if !e.t.is_finite() {
            return Err(PivotError::NonFiniteTimestamp {
                variable: e.variable.clone(),
                t: e.t,
            });
        }
    }

    // Mark every member of a (t, variable) group with more than one row.
    let mut group_sizes: AHashMap<(u64, &str), usize> = AHashMap::new();
    for e in events {
        *group_sizes
            .entry((e.t.to_bits(), e.variable.as_str()))
            .or_insert(0) += 1;
    }

    // Perturb duplicated rows: within each variable, every duplicated row gets
    // `eps * ordinal` added, counted over that variable's duplicated rows in
    // original order. Non-duplicated rows keep their exact timestamps.
    let mut adjusted: Vec<f64> = events.iter().map(|e| e.t).collect();
    let mut dup_ordinal: AHashMap<&str, usize> = AHashMap::new();
    for (i, e) in events.iter().enumerate() {
        if group_sizes[&(e.t.to_bits(), e.variable.as_str())] > 1 {
            let k = dup_ordinal.entry(e.variable.as_str()).or_insert(0);
            adjusted[i] = e.t + COLLISION_EPSILON * *k as f64;
            *k += 1;
        }
    }

    // Any collision left after adjustment is a resolution-logic failure.
    let mut seen: AHashMap<(u64, &str), ()> = AHashMap::with_capacity(events.len());
    for (i, e) in events.iter().enumerate() {
        if seen
            .insert((adjusted[i].to_bits(), e.variable.as_str()), ())
            .is_some()
        {
            return Err(PivotError::ResidualDuplicate {
                variable: e.variable.clone(),
                t: adjusted[i],
            });
        }
    }

    let variables: Vec<String> = events
        .iter()
        .map(|e| e.variable.clone())
        .sorted()
        .dedup()
        .collect();
    let times: Vec<f64> = adjusted
        .iter()
        .copied()
        .sorted_by(f64::total_cmp)
        .dedup()
        .collect();

    let row_of: AHashMap<u64, usize> = times
        .iter()
        .enumerate()
        .map(|(i, t)| (t.to_bits(), i))
        .collect();
    let col_of: AHashMap<&str, usize> = variables
        .iter()
        .enumerate()
        .map(|(j, v)| (v.as_str(), j))
        .collect();

    let mut columns = vec![vec![None; times.len()]; variables.len()];
    for (i, e) in events.iter().enumerate() {
        let row = row_of[&adjusted[i].to_bits()];
        let col = col_of[e.variable.as_str()];
        columns[col][row] = e.value.clone();
    }

    Ok(WideFrame::from_parts(times, variables, columns))
}
