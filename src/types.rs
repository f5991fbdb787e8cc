// ========================================================================================
//
//                      CORE DATA TYPES FOR THE CHRONOFEAT ENGINE
//
// ========================================================================================
//
// This module is the canonical dictionary for the data structures shared across the
// major architectural boundaries of the crate (`pivot`, `mask`, `impute`, `summarize`,
// `pipeline`). Types used by a single module live with that module.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// The key identifying one subject of observation (e.g., one patient).
pub type EntityId = String;

/// A single observed cell value. Clinical event streams mix numeric measurements
/// (lab values, vitals) with coded or free-text levels, so both are first-class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Num(f64),
    Str(String),
}

impl Value {
    /// Numeric view of the value. Strings holding a parseable number are coerced,
    /// mirroring how raw exports often carry numerics as text.
    pub fn as_numeric(&self) -> Option<f64> {
        match self {
            Value::Num(v) => Some(*v),
            Value::Str(s) => s.trim().parse::<f64>().ok(),
        }
    }

    /// True when the value carries real information. A NaN measurement is a
    /// missing observation, not an observed one.
    pub fn is_present(&self) -> bool {
        match self {
            Value::Num(v) => !v.is_nan(),
            Value::Str(_) => true,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Num(v) => write!(f, "{v}"),
            Value::Str(s) => write!(f, "{s}"),
        }
    }
}

/// True when the cell holds a real observation (non-null and non-NaN).
pub fn cell_is_observed(cell: &Option<Value>) -> bool {
    cell.as_ref().is_some_and(Value::is_present)
}

/// One raw observation in the long-format event stream.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub entity: EntityId,
    /// Time of the observation, in the same unit as the grid's bin width.
    pub t: f64,
    pub variable: String,
    /// `None` models an event row whose value field was empty.
    pub value: Option<Value>,
}

/// A wide, time-indexed table for one entity: rows are timestamps in ascending
/// order, columns are variable names. Produced by the pivot stage and consumed
/// read-only by every downstream stage except the imputer, which produces a
/// derived copy with additional rows at bin midpoints.
#[derive(Debug, Clone, PartialEq)]
pub struct WideFrame {
    times: Vec<f64>,
    variables: Vec<String>,
    /// Column-major cells; `columns[j].len() == times.len()` for every `j`.
    columns: Vec<Vec<Option<Value>>>,
}

impl WideFrame {
    /// A frame with the given columns and no rows.
    pub fn empty(variables: Vec<String>) -> Self {
        let columns = vec![Vec::new(); variables.len()];
        WideFrame {
            times: Vec::new(),
            variables,
            columns,
        }
    }

    /// Assembles a frame from parts. Callers must supply column-major cells with
    /// one entry per timestamp.
    pub fn from_parts(
        times: Vec<f64>,
        variables: Vec<String>,
        columns: Vec<Vec<Option<Value>>>,
    ) -> Self {
        debug_assert_eq!(variables.len(), columns.len());
        debug_assert!(columns.iter().all(|c| c.len() == times.len()));
        WideFrame {
            times,
            variables,
            columns,
        }
    }

    pub fn n_rows(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    pub fn var_index(&self, name: &str) -> Option<usize> {
        self.variables.iter().position(|v| v == name)
    }

    pub fn column(&self, name: &str) -> Option<&[Option<Value>]> {
        self.var_index(name).map(|j| self.columns[j].as_slice())
    }

    pub fn column_at(&self, j: usize) -> &[Option<Value>] {
        &self.columns[j]
    }

    pub fn get(&self, row: usize, col: usize) -> &Option<Value> {
        &self.columns[col][row]
    }
}

/// The imputation policy applied to missing bins. Parsed from the configuration
/// string; an unrecognized name is a validation error, caught before any
/// per-entity work starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImputeMethod {
    Ffill,
    Mean,
    Median,
    Linear,
    Mode,
    None,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown imputation method '{0}'. Expected one of: ffill, mean, median, linear, mode, none.")]
pub struct UnknownImputeMethod(pub String);

impl FromStr for ImputeMethod {
    type Err = UnknownImputeMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ffill" => Ok(ImputeMethod::Ffill),
            "mean" => Ok(ImputeMethod::Mean),
            "median" => Ok(ImputeMethod::Median),
            "linear" => Ok(ImputeMethod::Linear),
            "mode" => Ok(ImputeMethod::Mode),
            "none" => Ok(ImputeMethod::None),
            other => Err(UnknownImputeMethod(other.to_string())),
        }
    }
}

impl fmt::Display for ImputeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ImputeMethod::Ffill => "ffill",
            ImputeMethod::Mean => "mean",
            ImputeMethod::Median => "median",
            ImputeMethod::Linear => "linear",
            ImputeMethod::Mode => "mode",
            ImputeMethod::None => "none",
        };
        f.write_str(s)
    }
}

/// A per-bin summary statistic applied to the raw numeric observations of a bin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stat {
    Mean,
    Min,
    Max,
    Std,
    Count,
    Sum,
    Median,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown summary statistic '{0}'. Expected one of: mean, min, max, std, count, sum, median.")]
pub struct UnknownStatistic(pub String);

impl FromStr for Stat {
    type Err = UnknownStatistic;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mean" => Ok(Stat::Mean),
            "min" => Ok(Stat::Min),
            "max" => Ok(Stat::Max),
            "std" => Ok(Stat::Std),
            "count" => Ok(Stat::Count),
            "sum" => Ok(Stat::Sum),
            "median" => Ok(Stat::Median),
            other => Err(UnknownStatistic(other.to_string())),
        }
    }
}

impl fmt::Display for Stat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stat::Mean => "mean",
            Stat::Min => "min",
            Stat::Max => "max",
            Stat::Std => "std",
            Stat::Count => "count",
            Stat::Sum => "sum",
            Stat::Median => "median",
        };
        f.write_str(s)
    }
}

/// Declared value type of a variable, from the external value-type table.
/// Only `Numeric` variables enter summary statistics and frequency screening.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueType {
    Numeric,
    Categorical,
}

impl ValueType {
    /// Parses the label used by the value-type table. Anything that is not
    /// exactly `Numeric` is treated as categorical.
    pub fn from_label(label: &str) -> Self {
        if label == "Numeric" {
            ValueType::Numeric
        } else {
            ValueType::Categorical
        }
    }
}
