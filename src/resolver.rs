//! # Hierarchical Code Resolution
//!
//! Hierarchical variables (diagnosis codes and the like) are expanded into one
//! observation per ancestor level before categorical encoding. The lookup itself
//! is an external concern: this crate only defines the seam — an injected
//! [`HierarchyResolver`] constructed once and passed by reference to every call
//! site, never ambient global state.
//!
//! An unresolvable code propagates as an error. Silently dropping it would
//! corrupt the feature definition for that entity.

use ahash::AHashMap;
use thiserror::Error;

use crate::types::{Event, Value};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CodeResolutionError {
    #[error("Unrecognized hierarchical code '{code}' for variable '{variable}'.")]
    Unrecognized { variable: String, code: String },
    #[error("Hierarchical variable '{variable}' carries a non-string value; codes must be strings.")]
    NonStringCode { variable: String },
}

/// Maps one hierarchical code to its ordered ancestor chain, root first, ending
/// with the code itself.
pub trait HierarchyResolver {
    fn ancestors(&self, code: &str) -> Option<Vec<String>>;
}

/// A resolver backed by a preloaded table. The production dictionary is built
/// elsewhere and injected; tests construct small ones inline.
#[derive(Debug, Default, Clone)]
pub struct TableResolver {
    table: AHashMap<String, Vec<String>>,
}

impl TableResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, code: impl Into<String>, chain: Vec<String>) {
        self.table.insert(code.into(), chain);
    }
}

impl HierarchyResolver for TableResolver {
    fn ancestors(&self, code: &str) -> Option<Vec<String>> {
        self.table.get(code).cloned()
    }
}

/// Expands hierarchical events into one event per ancestor level, leaving all
/// other events untouched. Each expanded event keeps the source timestamp and
/// variable, with the level string as its value, feeding standard categorical
/// dummy-encoding downstream.
pub fn expand_hierarchical(
    events: &[Event],
    hierarchical_variables: &[String],
    resolver: &dyn HierarchyResolver,
) -> Result<Vec<Event>, CodeResolutionError> {
    let mut out = Vec::with_capacity(events.len());
    for e in events {
        if !hierarchical_variables.contains(&e.variable) {
            out.push(e.clone());
            continue;
        }
        let code = match &e.value {
            Some(Value::Str(code)) => code,
            Some(Value::Num(_)) => {
                return Err(CodeResolutionError::NonStringCode {
                    variable: e.variable.clone(),
                });
            }
            None => {
                out.push(e.clone());
                continue;
            }
        };
        let chain = resolver
            .ancestors(code)
            .ok_or_else(|| CodeResolutionError::Unrecognized {
                variable: e.variable.clone(),
                code: code.clone(),
            })?;
        for level in chain {
            out.push(Event {
                entity: e.entity.clone(),
                t: e.t,
                variable: e.variable.clone(),
                value: Some(Value::Str(level)),
            });
        }
    }
    Ok(out)
}
