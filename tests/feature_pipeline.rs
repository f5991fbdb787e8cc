//! End-to-end pipeline test: CSV inputs through loading, per-entity binning,
//! imputation, encoding, and post-hoc selection.

use std::io::Write;

use chronofeat::batch::FailurePolicy;
use chronofeat::config::FeatureConfig;
use chronofeat::data::{load_events, load_population, load_value_types};
use chronofeat::pipeline::build_feature_matrix;
use chronofeat::types::{ImputeMethod, Stat};
use tempfile::NamedTempFile;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn write_file(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{content}").unwrap();
    file.flush().unwrap();
    file
}

fn path(file: &NamedTempFile) -> &str {
    file.path().to_str().unwrap()
}

#[test]
fn csv_to_feature_matrix() {
    init_logging();
    let events_file = write_file(
        "ID,t,variable_name,variable_value\n\
         alice,0.3,hr,62\n\
         alice,1.1,hr,75\n\
         alice,1.8,hr,78\n\
         alice,3.4,hr,91\n\
         alice,0.9,rhythm,sinus\n\
         bob,0.1,hr,110\n\
         bob,2.6,hr,104\n\
         bob,2.9,rhythm,afib\n",
    );
    let population_file = write_file("ID\nalice\nbob\ncarol\n");
    let types_file = write_file("variable_name,value_type\nhr,Numeric\nrhythm,String\n");

    let events = load_events(path(&events_file)).unwrap();
    let population = load_population(path(&population_file)).unwrap();
    let value_types = load_value_types(path(&types_file)).unwrap();
    assert_eq!(population, vec!["alice", "bob", "carol"]);

    let config = FeatureConfig {
        t_max: 4.0,
        dt: 1.0,
        threshold: 0.0,
        impute_method: ImputeMethod::Ffill,
        use_ordinal_encoding: true,
        stats_functions: vec![Stat::Mean, Stat::Min, Stat::Max],
        quantiles: 3,
    };

    let (matrix, report) = build_feature_matrix(
        &events,
        &population,
        &value_types,
        &config,
        FailurePolicy::FailFast,
        false,
    )
    .unwrap();

    // Row contract: every population member contributes one row per bin, in
    // population order, even carol who has no events at all.
    assert_eq!(matrix.bins_per_entity, 4);
    assert_eq!(matrix.data.nrows(), 3 * 4);
    assert_eq!(matrix.entities, population);
    assert_eq!(matrix.names.len(), matrix.data.ncols());
    assert!(matrix.data.iter().all(|v| v.is_finite()));
    assert!(report.failed_entities.is_empty());

    // Presence masks follow the raw observations.
    let hr_mask = matrix.names.iter().position(|n| n == "hr_mask").unwrap();
    assert_eq!(matrix.data[[matrix.row_index(0, 0), hr_mask]], 1.0); // alice, bin 0
    assert_eq!(matrix.data[[matrix.row_index(0, 2), hr_mask]], 0.0); // alice, bin 2
    assert_eq!(matrix.data[[matrix.row_index(1, 1), hr_mask]], 0.0); // bob, bin 1
    for b in 0..4 {
        assert_eq!(matrix.data[[matrix.row_index(2, b), hr_mask]], 0.0); // carol
    }

    // Delta time counts bins since the last observation and stays 0 before the
    // first one. bob observed hr in bins 0 and 2.
    let hr_delta = matrix
        .names
        .iter()
        .position(|n| n == "hr_delta_time")
        .unwrap();
    let bob_delta: Vec<f64> = (0..4)
        .map(|b| matrix.data[[matrix.row_index(1, b), hr_delta]])
        .collect();
    assert_eq!(bob_delta, vec![0.0, 1.0, 0.0, 1.0]);

    // Ordinal encoding yields threshold indicators for hr; each row's
    // indicators are monotone non-increasing.
    let hr_cols: Vec<usize> = matrix
        .names
        .iter()
        .enumerate()
        .filter(|(_, n)| n.starts_with("hr>"))
        .map(|(j, _)| j)
        .collect();
    assert!(!hr_cols.is_empty());
    for r in 0..matrix.data.nrows() {
        for w in hr_cols.windows(2) {
            assert!(matrix.data[[r, w[0]]] >= matrix.data[[r, w[1]]]);
        }
    }

    // The categorical variable becomes one-hot dummies.
    assert!(matrix.names.iter().any(|n| n == "rhythm_afib"));
    assert!(matrix.names.iter().any(|n| n == "rhythm_sinus"));
}

#[test]
fn skipped_entities_do_not_block_the_rest() {
    init_logging();
    // bob's rhythm is a string; the mean policy rejects it, alice is unaffected.
    let events_file = write_file(
        "ID,t,variable_name,variable_value\n\
         alice,0.3,hr,62\n\
         alice,2.1,hr,75\n\
         bob,0.9,rhythm,afib\n",
    );
    let population_file = write_file("ID\nalice\nbob\n");
    let types_file = write_file("variable_name,value_type\nhr,Numeric\nrhythm,String\n");

    let events = load_events(path(&events_file)).unwrap();
    let population = load_population(path(&population_file)).unwrap();
    let value_types = load_value_types(path(&types_file)).unwrap();

    let config = FeatureConfig {
        t_max: 3.0,
        dt: 1.0,
        threshold: 0.0,
        impute_method: ImputeMethod::Mean,
        use_ordinal_encoding: false,
        stats_functions: vec![Stat::Mean],
        quantiles: 5,
    };

    let failed = build_feature_matrix(
        &events,
        &population,
        &value_types,
        &config,
        FailurePolicy::FailFast,
        false,
    );
    assert!(failed.is_err());

    let (matrix, report) = build_feature_matrix(
        &events,
        &population,
        &value_types,
        &config,
        FailurePolicy::ReportAndSkip,
        false,
    )
    .unwrap();
    assert_eq!(matrix.entities, vec!["alice".to_string()]);
    assert_eq!(report.failed_entities, vec!["bob".to_string()]);
    assert_eq!(matrix.data.nrows(), 3);
}
