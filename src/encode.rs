//! # Categorical & Quantile Encoding
//!
//! Turns grid-aligned value columns into numeric feature columns. Numeric
//! variables with more than two distinct values are discretized against
//! population-level quantile edges — either as plain interval dummies or, under
//! ordinal encoding, as cumulative `var>edge` threshold indicators. String
//! levels always become one-hot dummies. Summary-statistic columns get simple
//! mean imputation instead of dummification.
//!
//! Also hosts the frequent-variable screen used to decide which numeric
//! variables earn summary statistics at all.

use ahash::AHashMap;
use itertools::Itertools;
use ndarray::Array2;

use crate::grid::TimeGrid;
use crate::types::{EntityId, Event, Value, ValueType, cell_is_observed};

/// A block of derived numeric feature columns.
#[derive(Debug, Clone, PartialEq)]
pub struct DummyBlock {
    pub names: Vec<String>,
    /// Shape `(n_rows, names.len())`.
    pub data: Array2<f64>,
}

impl DummyBlock {
    pub fn empty(n_rows: usize) -> Self {
        DummyBlock {
            names: Vec::new(),
            data: Array2::zeros((n_rows, 0)),
        }
    }

    /// Concatenates blocks column-wise. All blocks must share a row count.
    pub fn hstack(blocks: &[DummyBlock], n_rows: usize) -> DummyBlock {
        let total: usize = blocks.iter().map(|b| b.names.len()).sum();
        let mut names = Vec::with_capacity(total);
        let mut data = Array2::zeros((n_rows, total));
        let mut at = 0;
        for block in blocks {
            debug_assert_eq!(block.data.nrows(), n_rows);
            for (j, name) in block.names.iter().enumerate() {
                names.push(name.clone());
                data.column_mut(at + j).assign(&block.data.column(j));
            }
            at += block.names.len();
        }
        DummyBlock { names, data }
    }
}

/// Sorted distinct variable names appearing in the event stream.
pub fn unique_variables(events: &[Event]) -> Vec<String> {
    events
        .iter()
        .map(|e| e.variable.clone())
        .sorted()
        .dedup()
        .collect()
}

/// Per-(entity, variable) event counts, reindexed to the population so entities
/// without events still contribute a zero row. Rows follow population order.
pub fn variable_counts(
    events: &[Event],
    population: &[EntityId],
    variables: &[String],
) -> Array2<f64> {
    let row_of: AHashMap<&str, usize> = population
        .iter()
        .enumerate()
        .map(|(i, id)| (id.as_str(), i))
        .collect();
    let col_of: AHashMap<&str, usize> = variables
        .iter()
        .enumerate()
        .map(|(j, v)| (v.as_str(), j))
        .collect();
    let mut counts = Array2::zeros((population.len(), variables.len()));
    for e in events {
        if let (Some(&r), Some(&c)) = (row_of.get(e.entity.as_str()), col_of.get(e.variable.as_str()))
        {
            counts[[r, c]] += 1.0;
        }
    }
    counts
}

/// Numeric variables observed often enough to earn summary statistics: mean
/// per-entity count at least `threshold × ⌊T/dt⌋`.
pub fn frequent_numeric_variables(
    events: &[Event],
    population: &[EntityId],
    value_types: &AHashMap<String, ValueType>,
    threshold: f64,
    grid: &TimeGrid,
) -> Vec<String> {
    let numeric: Vec<String> = unique_variables(events)
        .into_iter()
        .filter(|v| value_types.get(v) == Some(&ValueType::Numeric))
        .collect();
    if population.is_empty() {
        return Vec::new();
    }
    let counts = variable_counts(events, population, &numeric);
    let cutoff = threshold * grid.len() as f64;
    numeric
        .into_iter()
        .enumerate()
        .filter(|(j, _)| counts.column(*j).sum() / population.len() as f64 >= cutoff)
        .map(|(_, v)| v)
        .collect()
}

/// Linear-interpolated percentile of a sorted slice (numpy's default scheme).
pub fn percentile(sorted: &[f64], q: f64) -> f64 {
    debug_assert!(!sorted.is_empty());
    let pos = q / 100.0 * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        sorted[lo] + (pos - lo as f64) * (sorted[hi] - sorted[lo])
    }
}

/// Population-level quantile edges for one value column: `q+1` evenly spaced
/// percentiles, deduplicated. Returns `None` when the column has two or fewer
/// distinct numeric values — those columns are dummified directly.
pub fn compute_bin_edges(values: &[Option<Value>], q: usize) -> Option<Vec<f64>> {
    let mut nums: Vec<f64> = values
        .iter()
        .filter(|c| cell_is_observed(c))
        .filter_map(|c| c.as_ref().and_then(Value::as_numeric))
        .filter(|v| v.is_finite())
        .collect();
    nums.sort_by(f64::total_cmp);
    let distinct = nums.iter().dedup().count();
    if distinct <= 2 {
        return None;
    }
    let edges: Vec<f64> = (0..=q)
        .map(|k| percentile(&nums, 100.0 * k as f64 / q as f64))
        .dedup()
        .collect();
    Some(edges)
}

/// One-hot dummies over the distinct non-null levels of a column, levels in
/// sorted order, named `{prefix}{sep}{level}`.
fn get_dummies(prefix: &str, sep: &str, levels: &[Option<String>]) -> DummyBlock {
    let distinct: Vec<String> = levels
        .iter()
        .flatten()
        .cloned()
        .sorted()
        .dedup()
        .collect();
    let mut data = Array2::zeros((levels.len(), distinct.len()));
    for (r, level) in levels.iter().enumerate() {
        if let Some(l) = level {
            let j = distinct.iter().position(|d| d == l).unwrap();
            data[[r, j]] = 1.0;
        }
    }
    DummyBlock {
        names: distinct
            .iter()
            .map(|l| format!("{prefix}{sep}{l}"))
            .collect(),
        data,
    }
}

/// Discretizes and dummifies one value column.
///
/// - Two or fewer distinct numeric values: plain dummies over the raw levels.
/// - Otherwise, with ordinal encoding: cumulative indicators `{name}>{edge}`
///   over all but the last edge (values above a higher threshold are above
///   every lower one, so the indicators are monotone per row), plus dummies for
///   any string levels.
/// - Otherwise: right-closed interval dummies against the edges (the lowest
///   edge inclusive), plus string-level dummies; out-of-range numerics match no
///   interval.
pub fn qcut_dummify(
    name: &str,
    values: &[Option<Value>],
    edges: Option<&[f64]>,
    use_ordinal_encoding: bool,
) -> DummyBlock {
    let nums: Vec<Option<f64>> = values
        .iter()
        .map(|c| {
            if cell_is_observed(c) {
                c.as_ref().and_then(Value::as_numeric)
            } else {
                None
            }
        })
        .collect();
    let mut distinct: Vec<f64> = nums.iter().flatten().copied().collect();
    distinct.sort_by(f64::total_cmp);
    let n_distinct = distinct.iter().dedup().count();

    let (Some(edges), true) = (edges, n_distinct > 2) else {
        // Few numeric levels (or no edges computed): dummify values as they are.
        let levels: Vec<Option<String>> = values
            .iter()
            .map(|c| {
                if cell_is_observed(c) {
                    c.as_ref().map(ToString::to_string)
                } else {
                    None
                }
            })
            .collect();
        return get_dummies(name, "_", &levels);
    };

    let string_levels: Vec<Option<String>> = values
        .iter()
        .enumerate()
        .map(|(r, c)| match (nums[r], c) {
            (None, Some(Value::Str(s))) if cell_is_observed(c) => Some(s.clone()),
            _ => None,
        })
        .collect();

    if use_ordinal_encoding {
        let cut = &edges[..edges.len() - 1];
        let mut data = Array2::zeros((values.len(), cut.len()));
        for (r, num) in nums.iter().enumerate() {
            if let Some(v) = num {
                for (j, &edge) in cut.iter().enumerate() {
                    if *v > edge {
                        data[[r, j]] = 1.0;
                    }
                }
            }
        }
        let indicators = DummyBlock {
            names: cut.iter().map(|e| format!("{name}>{e}")).collect(),
            data,
        };
        let strings = get_dummies(name, "_", &string_levels);
        DummyBlock::hstack(&[indicators, strings], values.len())
    } else {
        let labels: Vec<Option<String>> = nums
            .iter()
            .enumerate()
            .map(|(r, num)| match num {
                Some(v) => interval_label(*v, edges),
                None => string_levels[r].clone(),
            })
            .collect();
        get_dummies(name, "_", &labels)
    }
}

/// Right-closed interval containing `v`; the first interval includes its lower
/// edge. Out-of-range values match nothing.
fn interval_label(v: f64, edges: &[f64]) -> Option<String> {
    for (i, w) in edges.windows(2).enumerate() {
        let (lo, hi) = (w[0], w[1]);
        let inside = if i == 0 { v >= lo } else { v > lo };
        if inside && v <= hi {
            return Some(if i == 0 {
                format!("[{lo}, {hi}]")
            } else {
                format!("({lo}, {hi}]")
            });
        }
    }
    None
}

/// Summary-statistic columns stay numeric: mean imputation over the missing
/// cells. An all-string column instead becomes `:`-separated dummies.
pub fn dummify_impute(name: &str, values: &[Option<Value>]) -> DummyBlock {
    let nums: Vec<f64> = values
        .iter()
        .filter(|c| cell_is_observed(c))
        .filter_map(|c| c.as_ref().and_then(Value::as_numeric))
        .filter(|v| v.is_finite())
        .collect();
    if nums.is_empty() {
        let levels: Vec<Option<String>> = values
            .iter()
            .map(|c| {
                if cell_is_observed(c) {
                    c.as_ref().map(ToString::to_string)
                } else {
                    None
                }
            })
            .collect();
        return get_dummies(name, ":", &levels);
    }

    let mean = nums.iter().sum::<f64>() / nums.len() as f64;
    let mut data = Array2::zeros((values.len(), 1));
    for (r, cell) in values.iter().enumerate() {
        let v = if cell_is_observed(cell) {
            cell.as_ref().and_then(Value::as_numeric).filter(|v| v.is_finite())
        } else {
            None
        };
        data[[r, 0]] = v.unwrap_or(mean);
    }
    DummyBlock {
        names: vec![name.to_string()],
        data,
    }
}
