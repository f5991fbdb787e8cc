//! # Error Taxonomy
//!
//! One aggregating error for the orchestration layers. Leaf modules keep their
//! own focused enums; this type exists so the batch and pipeline layers can
//! carry any of them, and so a per-entity failure can be tagged with the entity
//! it came from without losing the underlying cause.
//!
//! Not represented here: the imputation frontier invariant. Its violation is an
//! algorithmic bug, always fatal process-wide, and panics inside
//! [`check_imputed_output`](crate::impute::check_imputed_output) instead of
//! surfacing as a recoverable error.

use thiserror::Error;

use crate::config::ConfigError;
use crate::data::DataError;
use crate::grid::GridError;
use crate::impute::ImputeError;
use crate::pivot::PivotError;
use crate::resolver::CodeResolutionError;
use crate::select::SelectError;
use crate::summarize::SummarizeError;
use crate::types::EntityId;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Grid(#[from] GridError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Data(#[from] DataError),
    #[error(transparent)]
    Pivot(#[from] PivotError),
    #[error(transparent)]
    Impute(#[from] ImputeError),
    #[error(transparent)]
    Summarize(#[from] SummarizeError),
    #[error(transparent)]
    Select(#[from] SelectError),
    #[error(transparent)]
    Resolve(#[from] CodeResolutionError),
    #[error("Processing entity '{entity}' failed: {source}")]
    Entity {
        entity: EntityId,
        #[source]
        source: Box<EngineError>,
    },
}

impl EngineError {
    /// Wraps an error with the entity whose processing produced it.
    pub fn for_entity(entity: EntityId, source: EngineError) -> Self {
        EngineError::Entity {
            entity,
            source: Box::new(source),
        }
    }
}
