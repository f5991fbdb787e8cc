//! # Imputation
//!
//! Fills unobserved bins of an entity's series under a configurable policy, then
//! re-imposes the presence mask so that genuinely observed bins keep their raw
//! rows and only structurally missing bins carry imputed values. Imputed rows are
//! positioned at bin midpoints, never on a boundary, so they cannot collide with
//! a raw observation.
//!
//! Policy semantics:
//! - `ffill`: carry the latest earlier bin value forward. Forward-only.
//! - `mean` / `median`: fill with the column statistic over the raw observations.
//! - `mode`: fill with the most frequent observed value; a column with no
//!   observations stays null.
//! - `linear`: interpolate between observed bins, forward-only (leading bins are
//!   never back-filled; trailing bins hold the last observed value).
//! - `none`: passthrough.
//!
//! The output upholds the imputation frontier invariant: once a column's binned
//! series becomes non-null it stays non-null. [`check_imputed_output`] verifies
//! this and treats any violation as an algorithmic bug — it panics rather than
//! returning a recoverable error.

use thiserror::Error;

use crate::grid::TimeGrid;
use crate::mask::{MaskFrame, presence_mask};
use crate::summarize::{latest_per_bin, median};
use crate::types::{ImputeMethod, Value, WideFrame, cell_is_observed};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ImputeError {
    #[error(
        "Column '{variable}' mixes string and numeric values; the '{method}' policy \
         requires purely numeric observations."
    )]
    NonNumericColumn {
        variable: String,
        method: ImputeMethod,
    },
}

/// Imputes missing bins of one entity's pivoted table.
///
/// Returns a derived copy: the original raw rows merged with imputed rows at bin
/// midpoints, sorted by time, fully-null rows dropped. The input table is never
/// mutated. When `mask` is `None` it is computed from the table.
pub fn impute_values(
    table: &WideFrame,
    variables: &[String],
    grid: &TimeGrid,
    mask: Option<&MaskFrame>,
    method: ImputeMethod,
) -> Result<WideFrame, ImputeError> {
    if table.is_empty() {
        return Ok(WideFrame::empty(variables.to_vec()));
    }

    let owned_mask;
    let mask = match mask {
        Some(m) => m,
        None => {
            owned_mask = presence_mask(table, variables, grid);
            &owned_mask
        }
    };

    // (1)+(2): assign observations to bins, collapsing to the latest per bin.
    let mut binned = latest_per_bin(table, variables, grid);

    // (3)+(4): the reindexed series already has one slot per grid bin; fill the
    // null slots according to the policy.
    for (j, var) in variables.iter().enumerate() {
        let observed = observed_values(table, var);
        match method {
            ImputeMethod::None => {}
            ImputeMethod::Ffill => forward_fill(&mut binned[j]),
            ImputeMethod::Mean => {
                let nums = numeric_observed(&observed, var, method)?;
                if !nums.is_empty() {
                    let mean = nums.iter().sum::<f64>() / nums.len() as f64;
                    fill_nulls(&mut binned[j], Value::Num(mean));
                }
            }
            ImputeMethod::Median => {
                let nums = numeric_observed(&observed, var, method)?;
                if !nums.is_empty() {
                    fill_nulls(&mut binned[j], Value::Num(median(&nums)));
                }
            }
            ImputeMethod::Mode => {
                if let Some(mode) = mode_of(&observed) {
                    fill_nulls(&mut binned[j], mode);
                }
            }
            ImputeMethod::Linear => {
                let _ = numeric_observed(&observed, var, method)?;
                interpolate_forward(&mut binned[j]);
            }
        }
    }

    // (5): null out every bin the mask marks as genuinely observed; those bins
    // are served by the raw rows merged in below.
    for (j, col) in binned.iter_mut().enumerate() {
        for (b, cell) in col.iter_mut().enumerate() {
            if mask.data[[b, j]] {
                *cell = None;
            }
        }
    }

    // (6): merge raw rows with imputed midpoint rows, sort by time, and drop
    // rows that are null across every column.
    let raw_columns: Vec<Option<&[Option<Value>]>> =
        variables.iter().map(|v| table.column(v)).collect();
    let mut rows: Vec<(f64, Vec<Option<Value>>)> = Vec::new();
    for (i, &t) in table.times().iter().enumerate() {
        let cells: Vec<Option<Value>> = raw_columns
            .iter()
            .map(|col| col.map_or(None, |c| c[i].clone()))
            .collect();
        rows.push((t, cells));
    }
    for (b, bin) in grid.bins().iter().enumerate() {
        let cells: Vec<Option<Value>> = binned.iter().map(|col| col[b].clone()).collect();
        rows.push((bin.midpoint(), cells));
    }
    rows.retain(|(_, cells)| cells.iter().any(cell_is_observed));
    // Stable sort keeps raw rows ahead of imputed rows at equal timestamps.
    rows.sort_by(|a, b| a.0.total_cmp(&b.0));

    let times: Vec<f64> = rows.iter().map(|(t, _)| *t).collect();
    let mut columns = vec![Vec::with_capacity(rows.len()); variables.len()];
    for (_, cells) in rows {
        for (j, cell) in cells.into_iter().enumerate() {
            columns[j].push(cell);
        }
    }
    Ok(WideFrame::from_parts(times, variables.to_vec(), columns))
}

/// Asserts the imputation frontier invariant on a grid-aligned value table: per
/// column, nulls may only form a single leading run. A null after the first
/// non-null value means the imputation policy produced a malformed series, and
/// every statistic computed downstream would be corrupt — so this fails loudly
/// instead of returning an error.
pub fn check_imputed_output(frame: &WideFrame) {
    for (j, name) in frame.variables().iter().enumerate() {
        let col = frame.column_at(j);
        let Some(first) = col.iter().position(cell_is_observed) else {
            continue; // all-null column is acceptable
        };
        for (i, cell) in col.iter().enumerate().skip(first) {
            assert!(
                cell_is_observed(cell),
                "imputation frontier violated in column '{name}': null at row {i} \
                 after first value at row {first}"
            );
        }
    }
}

/// Observed (non-null) values of one column in time order.
fn observed_values(table: &WideFrame, var: &str) -> Vec<Value> {
    table
        .column(var)
        .map(|col| {
            col.iter()
                .filter(|c| cell_is_observed(c))
                .map(|c| c.clone().unwrap())
                .collect()
        })
        .unwrap_or_default()
}

fn numeric_observed(
    observed: &[Value],
    variable: &str,
    method: ImputeMethod,
) -> Result<Vec<f64>, ImputeError> {
    observed
        .iter()
        .map(|v| {
            v.as_numeric().ok_or_else(|| ImputeError::NonNumericColumn {
                variable: variable.to_string(),
                method,
            })
        })
        .collect()
}

fn forward_fill(col: &mut [Option<Value>]) {
    let mut last: Option<Value> = None;
    for cell in col.iter_mut() {
        match cell {
            Some(v) => last = Some(v.clone()),
            None => *cell = last.clone(),
        }
    }
}

fn fill_nulls(col: &mut [Option<Value>], value: Value) {
    for cell in col.iter_mut() {
        if cell.is_none() {
            *cell = Some(value.clone());
        }
    }
}

/// Most frequent observed value. Ties break toward the smallest value (numbers
/// before strings, numbers by value, strings lexicographically) so the pick is
/// deterministic.
fn mode_of(observed: &[Value]) -> Option<Value> {
    let mut counts: Vec<(Value, usize)> = Vec::new();
    for v in observed {
        match counts.iter_mut().find(|(seen, _)| seen == v) {
            Some((_, n)) => *n += 1,
            None => counts.push((v.clone(), 1)),
        }
    }
    let best = counts.iter().map(|(_, n)| *n).max()?;
    counts
        .into_iter()
        .filter(|(_, n)| *n == best)
        .map(|(v, _)| v)
        .min_by(|a, b| match (a, b) {
            (Value::Num(x), Value::Num(y)) => x.total_cmp(y),
            (Value::Num(_), Value::Str(_)) => std::cmp::Ordering::Less,
            (Value::Str(_), Value::Num(_)) => std::cmp::Ordering::Greater,
            (Value::Str(x), Value::Str(y)) => x.cmp(y),
        })
}

/// Forward-only linear interpolation over bin positions. Leading nulls are left
/// untouched; nulls past the last observed bin hold that bin's value.
fn interpolate_forward(col: &mut [Option<Value>]) {
    let known: Vec<(usize, f64)> = col
        .iter()
        .enumerate()
        .filter_map(|(b, c)| c.as_ref().and_then(Value::as_numeric).map(|v| (b, v)))
        .collect();
    if known.is_empty() {
        return;
    }
    for (b, cell) in col.iter_mut().enumerate() {
        if cell.is_some() {
            continue;
        }
        // Position among the known bins; leading nulls have no left neighbor.
        let right = known.iter().position(|&(k, _)| k > b);
        match right {
            Some(0) => {} // before the first observation: no backward extrapolation
            Some(r) => {
                let (b0, v0) = known[r - 1];
                let (b1, v1) = known[r];
                let frac = (b - b0) as f64 / (b1 - b0) as f64;
                *cell = Some(Value::Num(v0 + (v1 - v0) * frac));
            }
            None => {
                let (_, last) = *known.last().unwrap();
                *cell = Some(Value::Num(last));
            }
        }
    }
}
