//! # Per-Bin Summaries
//!
//! Two grid-aligned views of an entity's observations: the most recent raw value
//! per bin (`<var>_value` columns) and multi-statistic aggregation of numeric
//! variables (`<var>_<stat>` columns). Both are reindexed onto the full grid so
//! every entity contributes the same row count regardless of how sparse its
//! history is.

use thiserror::Error;

use crate::grid::TimeGrid;
use crate::types::{Stat, Value, WideFrame, cell_is_observed};

pub const VALUE_SUFFIX: &str = "_value";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SummarizeError {
    #[error(
        "Variable '{variable}' was requested for summary statistics but carries \
         non-numeric values. Check the value-type table."
    )]
    NonNumericColumn { variable: String },
}

/// Latest observed (non-null) value per bin, column-major over `variables`.
/// Shared with the imputer, whose bin-collapse step is the same operation.
pub(crate) fn latest_per_bin(
    table: &WideFrame,
    variables: &[String],
    grid: &TimeGrid,
) -> Vec<Vec<Option<Value>>> {
    let mut binned = vec![vec![None; grid.len()]; variables.len()];
    for (j, var) in variables.iter().enumerate() {
        let Some(col) = table.column(var) else {
            continue;
        };
        // Rows are in ascending time order, so later assignments win.
        for (row, &t) in table.times().iter().enumerate() {
            if !cell_is_observed(&col[row]) {
                continue;
            }
            if let Some(b) = grid.bin_index(t) {
                binned[j][b] = col[row].clone();
            }
        }
    }
    binned
}

/// The most recent raw value of each variable in each bin, without imputation.
/// Output rows follow the grid (index = bin start), columns suffixed `_value`;
/// bins with no observation hold null.
pub fn most_recent_values(table: &WideFrame, variables: &[String], grid: &TimeGrid) -> WideFrame {
    let columns = latest_per_bin(table, variables, grid);
    let names = variables
        .iter()
        .map(|v| format!("{v}{VALUE_SUFFIX}"))
        .collect();
    WideFrame::from_parts(grid.starts(), names, columns)
}

/// Per-bin summary statistics for the given numeric variables.
///
/// Output columns are named `<var>_<stat>` in variable-major order and reindexed
/// onto the full grid. An empty variable list yields an empty table still shaped
/// to the grid. `count` and `sum` of an empty bin are 0; the remaining statistics
/// are null there, and `std` needs at least two observations.
pub fn summary_statistics(
    table: &WideFrame,
    variables: &[String],
    stats: &[Stat],
    grid: &TimeGrid,
) -> Result<WideFrame, SummarizeError> {
    let mut names = Vec::with_capacity(variables.len() * stats.len());
    let mut columns = Vec::with_capacity(variables.len() * stats.len());

    for var in variables {
        // All numeric observations per bin, in time order.
        let mut per_bin: Vec<Vec<f64>> = vec![Vec::new(); grid.len()];
        if let Some(col) = table.column(var) {
            for (row, &t) in table.times().iter().enumerate() {
                if !cell_is_observed(&col[row]) {
                    continue;
                }
                let Some(b) = grid.bin_index(t) else {
                    continue;
                };
                let v = col[row]
                    .as_ref()
                    .and_then(Value::as_numeric)
                    .ok_or_else(|| SummarizeError::NonNumericColumn {
                        variable: var.clone(),
                    })?;
                per_bin[b].push(v);
            }
        }
        for &stat in stats {
            names.push(format!("{var}_{stat}"));
            columns.push(
                per_bin
                    .iter()
                    .map(|xs| apply_stat(stat, xs).map(Value::Num))
                    .collect(),
            );
        }
    }

    Ok(WideFrame::from_parts(grid.starts(), names, columns))
}

fn apply_stat(stat: Stat, xs: &[f64]) -> Option<f64> {
    let n = xs.len();
    match stat {
        Stat::Count => Some(n as f64),
        Stat::Sum => Some(xs.iter().sum()),
        Stat::Mean if n > 0 => Some(xs.iter().sum::<f64>() / n as f64),
        Stat::Min if n > 0 => xs.iter().copied().reduce(f64::min),
        Stat::Max if n > 0 => xs.iter().copied().reduce(f64::max),
        Stat::Median if n > 0 => Some(median(xs)),
        // Sample standard deviation; undefined below two observations.
        Stat::Std if n > 1 => {
            let mean = xs.iter().sum::<f64>() / n as f64;
            let ss: f64 = xs.iter().map(|x| (x - mean).powi(2)).sum();
            Some((ss / (n as f64 - 1.0)).sqrt())
        }
        _ => None,
    }
}

pub(crate) fn median(xs: &[f64]) -> f64 {
    let mut sorted = xs.to_vec();
    sorted.sort_by(f64::total_cmp);
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}
