//! # Presence Mask and Delta Time
//!
//! The presence mask records, per bin and per variable, whether at least one real
//! observation fell inside the bin. Delta time counts the bins elapsed since the
//! variable was last observed. Both are derived per entity against the shared
//! [`TimeGrid`](crate::grid::TimeGrid) and keep full grid coverage even for
//! entities with no events at all, so downstream stages never special-case an
//! empty history.

use ndarray::Array2;

use crate::grid::TimeGrid;
use crate::types::{WideFrame, cell_is_observed};

pub const MASK_SUFFIX: &str = "_mask";
pub const DELTA_SUFFIX: &str = "_delta_time";

/// Boolean presence per `(bin, variable)`, columns suffixed `_mask`.
#[derive(Debug, Clone, PartialEq)]
pub struct MaskFrame {
    pub columns: Vec<String>,
    /// Shape `(n_bins, n_variables)`.
    pub data: Array2<bool>,
}

impl MaskFrame {
    /// The variable names with the `_mask` suffix stripped, in column order.
    pub fn base_variables(&self) -> Vec<String> {
        self.columns
            .iter()
            .map(|c| c.strip_suffix(MASK_SUFFIX).unwrap_or(c).to_string())
            .collect()
    }
}

/// Integer bins-since-last-observation per `(bin, variable)`, columns suffixed
/// `_delta_time`.
#[derive(Debug, Clone, PartialEq)]
pub struct DeltaFrame {
    pub columns: Vec<String>,
    /// Shape `(n_bins, n_variables)`.
    pub data: Array2<u32>,
}

/// Computes the presence mask of one entity's pivoted table over the grid.
///
/// Variables requested but absent from the table get an all-false column, so the
/// output always covers `variables` in full. An empty table yields an all-false
/// mask over the complete grid, not an empty one.
pub fn presence_mask(table: &WideFrame, variables: &[String], grid: &TimeGrid) -> MaskFrame {
    let mut data = Array2::from_elem((grid.len(), variables.len()), false);
    for (j, var) in variables.iter().enumerate() {
        let Some(col) = table.column(var) else {
            continue;
        };
        for (row, &t) in table.times().iter().enumerate() {
            if !cell_is_observed(&col[row]) {
                continue;
            }
            if let Some(b) = grid.bin_index(t) {
                data[[b, j]] = true;
            }
        }
    }
    MaskFrame {
        columns: variables.iter().map(|v| format!("{v}{MASK_SUFFIX}")).collect(),
        data,
    }
}

/// Derives delta time from a presence mask.
///
/// Recurrence per column: the counter resets to 0 at a present bin and increments
/// by 1 at an absent bin. Business rule, preserved exactly: while a variable has
/// never been observed (cumulative presence count is zero) the delta is forced to
/// 0 instead of reporting an escalating counter over pure absence.
pub fn delta_time(mask: &MaskFrame) -> DeltaFrame {
    let (n_bins, n_vars) = mask.data.dim();
    let mut data = Array2::zeros((n_bins, n_vars));
    for j in 0..n_vars {
        let mut seen_any = false;
        let mut run: u32 = 0;
        for b in 0..n_bins {
            if mask.data[[b, j]] {
                seen_any = true;
                run = 0;
            } else {
                run += 1;
            }
            data[[b, j]] = if seen_any { run } else { 0 };
        }
    }
    DeltaFrame {
        columns: mask
            .columns
            .iter()
            .map(|c| {
                let base = c.strip_suffix(MASK_SUFFIX).unwrap_or(c);
                format!("{base}{DELTA_SUFFIX}")
            })
            .collect(),
        data,
    }
}
