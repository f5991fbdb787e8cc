//! # Feature-Matrix Assembly
//!
//! The top-level orchestration: from a long-format event stream and a fixed
//! population to one numeric feature matrix. Per-entity work (pivot, mask,
//! delta time, imputation, summaries) fans out across the thread pool; the
//! fan-in preserves population order, so the matrix rows are in entity-major,
//! bin-minor order with exactly `|entities| × |grid|` rows.
//!
//! Column layout, in order: presence-mask columns, delta-time columns,
//! discretized per-bin value columns, imputed summary-statistic columns. After
//! assembly the temporal frequency filter prunes uninformative mask columns and
//! the correlation deduplicator removes perfectly (anti-)correlated features;
//! both decisions are recorded in the [`FeatureReport`].

use ahash::AHashMap;
use ndarray::Array2;
use std::collections::BTreeMap;

use crate::batch::{self, FailurePolicy};
use crate::config::FeatureConfig;
use crate::encode::{
    DummyBlock, compute_bin_edges, dummify_impute, frequent_numeric_variables, qcut_dummify,
    unique_variables,
};
use crate::error::EngineError;
use crate::grid::TimeGrid;
use crate::impute::{check_imputed_output, impute_values};
use crate::mask::{DeltaFrame, MaskFrame, delta_time, presence_mask};
use crate::pivot::pivot_events;
use crate::select::{
    CorrelationDeduplicator, FeatureStorage, TemporalFrequencyFilter, apply_support,
};
use crate::summarize::{most_recent_values, summary_statistics};
use crate::types::{EntityId, Event, ImputeMethod, Value, ValueType, WideFrame};

/// The assembled feature matrix. Row `e * bins_per_entity + b` belongs to
/// entity `entities[e]`, bin `b`.
#[derive(Debug, Clone)]
pub struct FeatureMatrix {
    pub names: Vec<String>,
    pub data: Array2<f64>,
    pub entities: Vec<EntityId>,
    pub bins_per_entity: usize,
}

impl FeatureMatrix {
    pub fn row_index(&self, entity: usize, bin: usize) -> usize {
        entity * self.bins_per_entity + bin
    }
}

/// What the post-hoc selectors did, for audit and reconstruction.
#[derive(Debug, Clone, Default)]
pub struct FeatureReport {
    /// Columns removed by the temporal frequency filter.
    pub dropped_by_frequency: Vec<String>,
    /// Kept feature -> the dropped features it stands in for (`~{name}` marks
    /// anti-correlation).
    pub aliases: BTreeMap<String, Vec<String>>,
    /// Entities skipped under [`FailurePolicy::ReportAndSkip`].
    pub failed_entities: Vec<EntityId>,
}

/// Grid-aligned intermediate products for a single entity.
#[derive(Debug, Clone)]
pub struct EntityFeatures {
    pub mask: MaskFrame,
    pub delta: DeltaFrame,
    /// Most recent imputed value per bin, columns suffixed `_value`.
    pub values: WideFrame,
    /// Summary statistics of the raw observations, columns `<var>_<stat>`.
    pub stats: WideFrame,
}

/// Runs the per-entity stages in sequence over one entity's events.
///
/// `stat_variables` is the population-level frequent-numeric subset; summary
/// statistics are computed from the raw (pre-imputation) table so imputed
/// values never contaminate an aggregate.
pub fn build_entity_features(
    events: &[Event],
    variables: &[String],
    stat_variables: &[String],
    grid: &TimeGrid,
    config: &FeatureConfig,
) -> Result<EntityFeatures, EngineError> {
    let table = pivot_events(events)?;
    let mask = presence_mask(&table, variables, grid);
    let delta = delta_time(&mask);

    let imputed = impute_values(&table, variables, grid, Some(&mask), config.impute_method)?;
    let values = most_recent_values(&imputed, variables, grid);
    if config.impute_method != ImputeMethod::None {
        check_imputed_output(&values);
    }

    let stats = summary_statistics(&table, stat_variables, &config.stats_functions, grid)?;
    Ok(EntityFeatures {
        mask,
        delta,
        values,
        stats,
    })
}

/// Builds the full feature matrix for a population.
///
/// Under [`FailurePolicy::FailFast`] the first per-entity error aborts the run;
/// under [`FailurePolicy::ReportAndSkip`] failed entities are dropped from the
/// matrix and listed in the report. The returned row order always follows
/// `population` (minus any skipped entities).
pub fn build_feature_matrix(
    events: &[Event],
    population: &[EntityId],
    value_types: &AHashMap<String, ValueType>,
    config: &FeatureConfig,
    policy: FailurePolicy,
    show_progress: bool,
) -> Result<(FeatureMatrix, FeatureReport), EngineError> {
    config.validate()?;
    let grid = config.grid()?;

    let variables = unique_variables(events);
    let stat_variables =
        frequent_numeric_variables(events, population, value_types, config.threshold, &grid);
    log::info!(
        "Building features for {} entities: {} variables, {} with summary statistics, {} bins",
        population.len(),
        variables.len(),
        stat_variables.len(),
        grid.len()
    );

    let mut by_entity: AHashMap<&str, Vec<Event>> = AHashMap::new();
    for e in events {
        by_entity.entry(e.entity.as_str()).or_default().push(e.clone());
    }

    let outcomes = batch::map_entities(population, show_progress, |id| {
        let own = by_entity.get(id.as_str()).map(Vec::as_slice).unwrap_or(&[]);
        build_entity_features(own, &variables, &stat_variables, &grid, config)
    });
    let (completed, failures) = batch::partition_outcomes(outcomes);
    if policy == FailurePolicy::FailFast
        && let Some((_, first)) = failures.into_iter().next()
    {
        return Err(first);
    }
    let failed_entities: Vec<EntityId> = failures_into_ids(&completed, population);

    let entities: Vec<EntityId> = completed.iter().map(|(id, _)| id.clone()).collect();
    let features: Vec<EntityFeatures> = completed.into_iter().map(|(_, f)| f).collect();
    let bins = grid.len();
    let n_rows = entities.len() * bins;

    // Column blocks: masks, deltas, discretized values, imputed statistics.
    let mask_block = DummyBlock {
        names: variables.iter().map(|v| format!("{v}_mask")).collect(),
        data: gather_numeric(&features, n_rows, variables.len(), |f, b, j| {
            if f.mask.data[[b, j]] { 1.0 } else { 0.0 }
        }),
    };
    let delta_block = DummyBlock {
        names: variables
            .iter()
            .map(|v| format!("{v}_delta_time"))
            .collect(),
        data: gather_numeric(&features, n_rows, variables.len(), |f, b, j| {
            f.delta.data[[b, j]] as f64
        }),
    };

    let mut value_blocks = Vec::with_capacity(variables.len());
    for (j, var) in variables.iter().enumerate() {
        let column = gather_cells(&features, bins, |f| f.values.column_at(j));
        let edges = compute_bin_edges(&column, config.quantiles);
        value_blocks.push(qcut_dummify(
            var,
            &column,
            edges.as_deref(),
            config.use_ordinal_encoding,
        ));
    }

    let stat_names: Vec<String> = features
        .first()
        .map(|f| f.stats.variables().to_vec())
        .unwrap_or_default();
    let mut stat_blocks = Vec::with_capacity(stat_names.len());
    for (j, name) in stat_names.iter().enumerate() {
        let column = gather_cells(&features, bins, |f| f.stats.column_at(j));
        stat_blocks.push(dummify_impute(name, &column));
    }

    let mut blocks = vec![mask_block, delta_block];
    blocks.extend(value_blocks);
    blocks.extend(stat_blocks);
    let assembled = DummyBlock::hstack(&blocks, n_rows);

    if entities.is_empty() {
        // Nothing to select against; hand back the empty matrix unfiltered.
        return Ok((
            FeatureMatrix {
                names: assembled.names,
                data: assembled.data,
                entities,
                bins_per_entity: bins,
            },
            FeatureReport {
                failed_entities,
                ..FeatureReport::default()
            },
        ));
    }

    // Selection pass 1: the temporal frequency filter judges mask columns only;
    // every derived column is kept at this stage.
    let n_masks = variables.len();
    let mask_matrix = assembled
        .data
        .slice(ndarray::s![.., 0..n_masks])
        .to_owned();
    let freq =
        TemporalFrequencyFilter::fit(&FeatureStorage::Dense(mask_matrix), bins, config.threshold)?;
    let mut keep_freq = vec![true; assembled.names.len()];
    keep_freq[..n_masks].copy_from_slice(&freq.support_mask());
    let dropped_by_frequency: Vec<String> = assembled
        .names
        .iter()
        .zip(&keep_freq)
        .filter(|&(_, &k)| !k)
        .map(|(n, _)| n.clone())
        .collect();
    let (filtered, filtered_names) = apply_support(&assembled.data, &assembled.names, &keep_freq);

    // Selection pass 2: drop perfect duplicates (and negations) of earlier columns.
    let dedup = CorrelationDeduplicator::fit(&FeatureStorage::Dense(filtered.clone()));
    let aliases = dedup.feature_aliases(&filtered_names);
    let (data, names) = apply_support(&filtered, &filtered_names, dedup.support_mask());

    log::info!(
        "Feature matrix: {} rows x {} columns ({} dropped by frequency, {} deduplicated)",
        data.nrows(),
        data.ncols(),
        dropped_by_frequency.len(),
        filtered_names.len() - data.ncols()
    );

    Ok((
        FeatureMatrix {
            names,
            data,
            entities,
            bins_per_entity: bins,
        },
        FeatureReport {
            dropped_by_frequency,
            aliases,
            failed_entities,
        },
    ))
}

/// Population members missing from the completed set, in population order.
fn failures_into_ids<T>(completed: &[(EntityId, T)], population: &[EntityId]) -> Vec<EntityId> {
    population
        .iter()
        .filter(|id| !completed.iter().any(|(done, _)| done == *id))
        .cloned()
        .collect()
}

/// Stacks a per-entity `(bin, variable)` accessor into the entity-major layout.
fn gather_numeric<F>(
    features: &[EntityFeatures],
    n_rows: usize,
    n_cols: usize,
    at: F,
) -> Array2<f64>
where
    F: Fn(&EntityFeatures, usize, usize) -> f64,
{
    let bins = if features.is_empty() {
        0
    } else {
        n_rows / features.len()
    };
    let mut out = Array2::zeros((n_rows, n_cols));
    for (e, f) in features.iter().enumerate() {
        for b in 0..bins {
            for j in 0..n_cols {
                out[[e * bins + b, j]] = at(f, b, j);
            }
        }
    }
    out
}

/// Concatenates one grid-aligned column across entities, entity-major.
fn gather_cells<'a, F>(
    features: &'a [EntityFeatures],
    bins: usize,
    column: F,
) -> Vec<Option<Value>>
where
    F: Fn(&'a EntityFeatures) -> &'a [Option<Value>],
{
    let mut out = Vec::with_capacity(features.len() * bins);
    for f in features {
        out.extend_from_slice(column(f));
    }
    out
}
