//! # Input Adapters
//!
//! Reads the three external tables the engine consumes — the long-format event
//! stream, the population index, and the per-variable value-type table — from
//! delimited files via Polars, validating them against a strict, predefined
//! schema. Column names are not configurable; this eliminates a class of
//! configuration errors and keeps error messages actionable.
//!
//! All I/O happens here, before the parallel phase. Nothing in the per-entity
//! hot path touches a file.

use ahash::AHashMap;
use polars::prelude::*;
use std::fs::File;
use std::path::Path;
use thiserror::Error;

use crate::types::{EntityId, Event, Value, ValueType};

pub const ID_COL: &str = "ID";
pub const TIME_COL: &str = "t";
pub const VAR_COL: &str = "variable_name";
pub const VAL_COL: &str = "variable_value";
pub const TYPE_COL: &str = "value_type";

/// A comprehensive error type for all loading and validation failures. These
/// are assumed to be user-input errors and worded accordingly.
#[derive(Error, Debug)]
pub enum DataError {
    #[error("Error from the underlying Polars DataFrame library: {0}")]
    PolarsError(#[from] PolarsError),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error(
        "The required column '{0}' was not found in the input file. Please check spelling and case."
    )]
    ColumnNotFound(String),
    #[error(
        "The required column '{column_name}' could not be converted to the expected type \
         '{expected_type}'. (Found type: {found_type})"
    )]
    ColumnWrongType {
        column_name: String,
        expected_type: &'static str,
        found_type: String,
    },
    #[error("Missing or null values were found in the required column '{0}'.")]
    MissingValuesFound(String),
    #[error("Non-finite values (NaN or Infinity) were found in the required column '{0}'.")]
    NonFiniteValuesFound(String),
}

/// Loads the long-format event table: one row per observation, columns
/// `ID`, `t`, `variable_name`, `variable_value`. Values that parse as numbers
/// become numeric; everything else stays a string level. An empty value cell is
/// a null observation.
pub fn load_events(path: &str) -> Result<Vec<Event>, DataError> {
    let df = read_csv(path, &[ID_COL, TIME_COL, VAR_COL, VAL_COL])?;

    let ids = extract_string_column(&df, ID_COL)?;
    let times = extract_numeric_column(&df, TIME_COL)?;
    let variables = extract_string_column(&df, VAR_COL)?;
    let values = extract_optional_string_column(&df, VAL_COL)?;

    let mut events = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        events.push(Event {
            entity: ids[i].clone(),
            t: times[i],
            variable: variables[i].clone(),
            value: values[i].as_ref().map(|raw| match raw.parse::<f64>() {
                Ok(v) => Value::Num(v),
                Err(_) => Value::Str(raw.clone()),
            }),
        });
    }
    Ok(events)
}

/// Loads the population index: the fixed enumeration of all entity keys, in
/// file order. Every entity appears in the feature matrix even with zero events.
pub fn load_population(path: &str) -> Result<Vec<EntityId>, DataError> {
    let df = read_csv(path, &[ID_COL])?;
    extract_string_column(&df, ID_COL)
}

/// Loads the per-variable value-type table (`variable_name`, `value_type`).
pub fn load_value_types(path: &str) -> Result<AHashMap<String, ValueType>, DataError> {
    let df = read_csv(path, &[VAR_COL, TYPE_COL])?;
    let variables = extract_string_column(&df, VAR_COL)?;
    let labels = extract_string_column(&df, TYPE_COL)?;
    Ok(variables
        .into_iter()
        .zip(labels)
        .map(|(v, l)| (v, ValueType::from_label(&l)))
        .collect())
}

fn read_csv(path: &str, required_cols: &[&str]) -> Result<DataFrame, DataError> {
    log::info!("Loading data from '{path}'");
    let df = CsvReader::new(File::open(Path::new(path))?)
        .with_options(
            CsvReadOptions::default()
                .with_has_header(true)
                .with_parse_options(CsvParseOptions::default().with_separator(b',')),
        )
        .finish()?;

    let present: Vec<String> = df
        .get_column_names()
        .into_iter()
        .map(|s| s.to_string())
        .collect();
    for col in required_cols {
        if !present.iter().any(|c| c == col) {
            return Err(DataError::ColumnNotFound(col.to_string()));
        }
    }
    Ok(df)
}

fn extract_numeric_column(df: &DataFrame, column_name: &str) -> Result<Vec<f64>, DataError> {
    let series = df.column(column_name)?;
    if series.null_count() > 0 {
        return Err(DataError::MissingValuesFound(column_name.to_string()));
    }
    let casted = series
        .cast(&DataType::Float64)
        .map_err(|_| DataError::ColumnWrongType {
            column_name: column_name.to_string(),
            expected_type: "f64 (numeric)",
            found_type: format!("{:?}", series.dtype()),
        })?;
    if casted.null_count() > 0 {
        return Err(DataError::ColumnWrongType {
            column_name: column_name.to_string(),
            expected_type: "f64 (numeric)",
            found_type: format!("{:?}", series.dtype()),
        });
    }
    let chunked = casted.f64()?.rechunk();
    let values: Vec<f64> = chunked.into_no_null_iter().collect();
    if values.iter().any(|v| !v.is_finite()) {
        return Err(DataError::NonFiniteValuesFound(column_name.to_string()));
    }
    Ok(values)
}

fn extract_string_column(df: &DataFrame, column_name: &str) -> Result<Vec<String>, DataError> {
    extract_optional_string_column(df, column_name)?
        .into_iter()
        .map(|v| v.ok_or_else(|| DataError::MissingValuesFound(column_name.to_string())))
        .collect()
}

fn extract_optional_string_column(
    df: &DataFrame,
    column_name: &str,
) -> Result<Vec<Option<String>>, DataError> {
    let series = df.column(column_name)?;
    let mut out = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let value = series.get(i).unwrap_or(AnyValue::Null);
        out.push(match value {
            AnyValue::Null => None,
            other => {
                let text = other.to_string();
                // Stringified values come back quoted from some dtypes.
                let trimmed = text.trim_matches('"').to_string();
                if trimmed.is_empty() { None } else { Some(trimmed) }
            }
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, Write};
    use tempfile::NamedTempFile;

    fn create_test_csv(content: &str) -> io::Result<NamedTempFile> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, "{}", content)?;
        file.flush()?;
        Ok(file)
    }

    #[test]
    fn events_load_with_mixed_value_types() {
        let content = "ID,t,variable_name,variable_value\n\
                       p1,0.5,hr,80\n\
                       p1,1.0,rhythm,sinus\n\
                       p2,2.0,hr,";
        let file = create_test_csv(content).unwrap();
        let events = load_events(file.path().to_str().unwrap()).unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].value, Some(Value::Num(80.0)));
        assert_eq!(events[1].value, Some(Value::Str("sinus".into())));
        assert_eq!(events[2].value, None);
        assert_eq!(events[2].entity, "p2");
    }

    #[test]
    fn missing_required_column_is_reported_by_name() {
        let content = "ID,t,variable_name\np1,0.5,hr";
        let file = create_test_csv(content).unwrap();
        let err = load_events(file.path().to_str().unwrap()).unwrap_err();
        match err {
            DataError::ColumnNotFound(col) => assert_eq!(col, VAL_COL),
            other => panic!("Expected ColumnNotFound, got {other:?}"),
        }
    }

    #[test]
    fn non_numeric_time_column_is_rejected() {
        let content = "ID,t,variable_name,variable_value\np1,noon,hr,80";
        let file = create_test_csv(content).unwrap();
        let err = load_events(file.path().to_str().unwrap()).unwrap_err();
        assert!(matches!(err, DataError::ColumnWrongType { .. }));
    }

    #[test]
    fn population_order_is_file_order() {
        let content = "ID\npX\npA\npM";
        let file = create_test_csv(content).unwrap();
        let population = load_population(file.path().to_str().unwrap()).unwrap();
        assert_eq!(population, vec!["pX", "pA", "pM"]);
    }

    #[test]
    fn value_types_parse_numeric_and_other_labels() {
        let content = "variable_name,value_type\nhr,Numeric\nrhythm,String";
        let file = create_test_csv(content).unwrap();
        let types = load_value_types(file.path().to_str().unwrap()).unwrap();
        assert_eq!(types["hr"], ValueType::Numeric);
        assert_eq!(types["rhythm"], ValueType::Categorical);
    }
}
