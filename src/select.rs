//! # Post-Hoc Feature Selection
//!
//! Two selectors run after the feature matrix is assembled. Both are advisory:
//! they learn a boolean support mask over columns and never mutate their input.
//!
//! - [`TemporalFrequencyFilter`] drops variables whose presence mask is constant
//!   across (almost) the whole population — always present or never present —
//!   since such variables carry no discriminative temporal signal.
//! - [`CorrelationDeduplicator`] drops every feature perfectly (anti-)correlated
//!   with an earlier feature, and reports which kept feature each dropped one
//!   aliases to, with a `~{name}` marker for anti-correlation so dropped columns
//!   remain reconstructible.
//!
//! The storage representation is an explicit tagged union: a dense `ndarray`
//! matrix or a CSR sparse matrix, both satisfying the same correlation contract.

use ndarray::Array2;
use std::collections::BTreeMap;
use thiserror::Error;

/// `np.isclose` tolerances; a correlation within this band of ±1 counts as perfect.
const CORR_RTOL: f64 = 1e-5;
const CORR_ATOL: f64 = 1e-8;

fn close_to(x: f64, target: f64) -> bool {
    (x - target).abs() <= CORR_ATOL + CORR_RTOL * target.abs()
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SelectError {
    #[error("Frequency threshold must lie in [0, 1]. Got {0}.")]
    ThresholdOutOfRange(f64),
    #[error("Bins per entity must be strictly positive.")]
    NoBins,
    #[error(
        "Matrix with {rows} rows cannot be split into whole entities of {bins_per_entity} \
         bins each."
    )]
    RaggedPopulation { rows: usize, bins_per_entity: usize },
}

/// Minimal CSR matrix, sufficient for the covariance-based correlation estimator.
#[derive(Debug, Clone, PartialEq)]
pub struct CsrMatrix {
    nrows: usize,
    ncols: usize,
    indptr: Vec<usize>,
    indices: Vec<usize>,
    values: Vec<f64>,
}

impl CsrMatrix {
    /// Builds from (row, col, value) triplets; duplicate coordinates are summed.
    pub fn from_triplets(nrows: usize, ncols: usize, triplets: &[(usize, usize, f64)]) -> Self {
        let mut sorted: Vec<(usize, usize, f64)> = triplets.to_vec();
        sorted.sort_by_key(|&(r, c, _)| (r, c));

        let mut indptr = vec![0usize; nrows + 1];
        let mut indices = Vec::with_capacity(sorted.len());
        let mut values: Vec<f64> = Vec::with_capacity(sorted.len());
        let mut last: Option<(usize, usize)> = None;
        for &(r, c, v) in &sorted {
            assert!(r < nrows && c < ncols, "triplet ({r}, {c}) out of bounds");
            if last == Some((r, c)) {
                *values.last_mut().unwrap() += v;
            } else {
                indices.push(c);
                values.push(v);
                indptr[r + 1] += 1;
                last = Some((r, c));
            }
        }
        // Prefix-sum the per-row counts into offsets.
        for r in 0..nrows {
            indptr[r + 1] += indptr[r];
        }
        CsrMatrix {
            nrows,
            ncols,
            indptr,
            indices,
            values,
        }
    }

    pub fn from_dense(m: &Array2<f64>) -> Self {
        let triplets: Vec<(usize, usize, f64)> = m
            .indexed_iter()
            .filter(|&(_, &v)| v != 0.0)
            .map(|((r, c), &v)| (r, c, v))
            .collect();
        CsrMatrix::from_triplets(m.nrows(), m.ncols(), &triplets)
    }

    pub fn nrows(&self) -> usize {
        self.nrows
    }

    pub fn ncols(&self) -> usize {
        self.ncols
    }

    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    fn row(&self, r: usize) -> (&[usize], &[f64]) {
        let (lo, hi) = (self.indptr[r], self.indptr[r + 1]);
        (&self.indices[lo..hi], &self.values[lo..hi])
    }

    pub fn transpose(&self) -> CsrMatrix {
        let triplets: Vec<(usize, usize, f64)> = (0..self.nrows)
            .flat_map(|r| {
                let (idx, val) = self.row(r);
                idx.iter()
                    .zip(val)
                    .map(move |(&c, &v)| (c, r, v))
                    .collect::<Vec<_>>()
            })
            .collect();
        CsrMatrix::from_triplets(self.ncols, self.nrows, &triplets)
    }

    fn row_sum(&self, r: usize) -> f64 {
        self.row(r).1.iter().sum()
    }

    /// Sparse dot product of two rows (merge walk over sorted column indices).
    fn row_dot(&self, a: usize, b: usize) -> f64 {
        let (ai, av) = self.row(a);
        let (bi, bv) = self.row(b);
        let (mut i, mut j, mut acc) = (0usize, 0usize, 0.0);
        while i < ai.len() && j < bi.len() {
            match ai[i].cmp(&bi[j]) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    acc += av[i] * bv[j];
                    i += 1;
                    j += 1;
                }
            }
        }
        acc
    }
}

/// Feature matrix storage: rows are samples, columns are features.
#[derive(Debug, Clone)]
pub enum FeatureStorage {
    Dense(Array2<f64>),
    Sparse(CsrMatrix),
}

impl FeatureStorage {
    pub fn nrows(&self) -> usize {
        match self {
            FeatureStorage::Dense(m) => m.nrows(),
            FeatureStorage::Sparse(m) => m.nrows(),
        }
    }

    pub fn ncols(&self) -> usize {
        match self {
            FeatureStorage::Dense(m) => m.ncols(),
            FeatureStorage::Sparse(m) => m.ncols(),
        }
    }
}

/// Drops variables whose temporal presence pattern is (near-)constant across the
/// population. Input is the binary mask-derived matrix flattened to
/// `(entities × bins_per_entity, variables)`.
#[derive(Debug, Clone)]
pub struct TemporalFrequencyFilter {
    threshold: f64,
    /// Fraction of entities with the variable present in at least one bin.
    freqs_notalways0: Vec<f64>,
    /// Fraction of entities with the variable absent in at least one bin.
    freqs_notalways1: Vec<f64>,
}

impl TemporalFrequencyFilter {
    pub fn fit(
        x: &FeatureStorage,
        bins_per_entity: usize,
        threshold: f64,
    ) -> Result<Self, SelectError> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(SelectError::ThresholdOutOfRange(threshold));
        }
        if bins_per_entity == 0 {
            return Err(SelectError::NoBins);
        }
        let rows = x.nrows();
        if rows % bins_per_entity != 0 {
            return Err(SelectError::RaggedPopulation {
                rows,
                bins_per_entity,
            });
        }
        let n_entities = rows / bins_per_entity;
        let d = x.ncols();

        // Count present bins per (entity, variable); any nonzero cell counts.
        let mut present = vec![0usize; n_entities * d];
        match x {
            FeatureStorage::Dense(m) => {
                for ((r, c), &v) in m.indexed_iter() {
                    if v != 0.0 {
                        present[(r / bins_per_entity) * d + c] += 1;
                    }
                }
            }
            FeatureStorage::Sparse(m) => {
                for r in 0..m.nrows() {
                    let e = r / bins_per_entity;
                    let (idx, val) = m.row(r);
                    for (&c, &v) in idx.iter().zip(val) {
                        if v != 0.0 {
                            present[e * d + c] += 1;
                        }
                    }
                }
            }
        }

        let mut freqs_notalways0 = vec![0.0; d];
        let mut freqs_notalways1 = vec![0.0; d];
        if n_entities > 0 {
            for c in 0..d {
                let mut n_any = 0usize;
                let mut n_gap = 0usize;
                for e in 0..n_entities {
                    let k = present[e * d + c];
                    if k > 0 {
                        n_any += 1;
                    }
                    if k < bins_per_entity {
                        n_gap += 1;
                    }
                }
                freqs_notalways0[c] = n_any as f64 / n_entities as f64;
                freqs_notalways1[c] = n_gap as f64 / n_entities as f64;
            }
        }

        Ok(TemporalFrequencyFilter {
            threshold,
            freqs_notalways0,
            freqs_notalways1,
        })
    }

    /// Keep iff both fractions strictly exceed the threshold. A variable sitting
    /// exactly at the threshold is dropped.
    pub fn support_mask(&self) -> Vec<bool> {
        self.freqs_notalways0
            .iter()
            .zip(&self.freqs_notalways1)
            .map(|(&a, &b)| a > self.threshold && b > self.threshold)
            .collect()
    }

    pub fn frequencies(&self) -> (&[f64], &[f64]) {
        (&self.freqs_notalways0, &self.freqs_notalways1)
    }
}

/// Keeps only the first feature of each perfectly correlated group.
#[derive(Debug, Clone)]
pub struct CorrelationDeduplicator {
    /// Strictly-lower-triangular correlation matrix (diagonal zeroed).
    corr: Array2<f64>,
    keep: Vec<bool>,
}

impl CorrelationDeduplicator {
    pub fn fit(x: &FeatureStorage) -> Self {
        let mut corr = match x {
            FeatureStorage::Dense(m) => dense_corrcoef(m),
            FeatureStorage::Sparse(m) => sparse_corrcoef(m),
        };
        // Zero the diagonal and the upper triangle: each pair is considered once,
        // from the perspective of the later-indexed feature.
        let d = corr.nrows();
        for i in 0..d {
            for j in i..d {
                corr[[i, j]] = 0.0;
            }
        }
        let keep = (0..d)
            .map(|i| !(0..i).any(|j| close_to(corr[[i, j]].abs(), 1.0)))
            .collect();
        CorrelationDeduplicator { corr, keep }
    }

    pub fn support_mask(&self) -> &[bool] {
        &self.keep
    }

    pub fn correlation_matrix(&self) -> &Array2<f64> {
        &self.corr
    }

    /// Maps each kept feature to the dropped features it stands in for. For every
    /// dropped feature the scan stops at the first (lowest-index) aliased earlier
    /// feature; anti-correlated aliases are wrapped as `~{name}`.
    pub fn feature_aliases(&self, names: &[String]) -> BTreeMap<String, Vec<String>> {
        let d = self.corr.nrows();
        assert_eq!(names.len(), d, "feature name count must match matrix width");
        let mut aliases: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for i in 1..d {
            for j in 0..i {
                let c = self.corr[[i, j]];
                if close_to(c.abs(), 1.0) {
                    let entry = aliases.entry(names[j].clone()).or_default();
                    if close_to(c, 1.0) {
                        entry.push(names[i].clone());
                    } else {
                        entry.push(format!("~{{{}}}", names[i]));
                    }
                    break; // only the first earlier feature is recorded
                }
            }
        }
        aliases
    }
}

/// Applies a support mask, producing the kept columns of `x` (and their names).
pub fn apply_support(
    x: &Array2<f64>,
    names: &[String],
    keep: &[bool],
) -> (Array2<f64>, Vec<String>) {
    assert_eq!(x.ncols(), keep.len());
    let kept_idx: Vec<usize> = keep
        .iter()
        .enumerate()
        .filter_map(|(j, &k)| k.then_some(j))
        .collect();
    let mut out = Array2::zeros((x.nrows(), kept_idx.len()));
    for (dst, &src) in kept_idx.iter().enumerate() {
        out.column_mut(dst).assign(&x.column(src));
    }
    let kept_names = kept_idx.iter().map(|&j| names[j].clone()).collect();
    (out, kept_names)
}

/// Pearson correlation over the columns of a dense matrix.
fn dense_corrcoef(x: &Array2<f64>) -> Array2<f64> {
    let (n, d) = x.dim();
    let denom = (n.max(2) - 1) as f64;
    let means: Vec<f64> = (0..d)
        .map(|j| x.column(j).sum() / n.max(1) as f64)
        .collect();

    let mut cov = Array2::zeros((d, d));
    for i in 0..d {
        for j in 0..=i {
            let mut acc = 0.0;
            for r in 0..n {
                acc += (x[[r, i]] - means[i]) * (x[[r, j]] - means[j]);
            }
            let c = acc / denom;
            cov[[i, j]] = c;
            cov[[j, i]] = c;
        }
    }
    normalize_covariance(cov)
}

/// Correlation of CSR-stored features without densifying: covariance via row
/// sums over the transposed (feature-major) matrix, then per-feature
/// normalization with the variance floored at machine epsilon.
fn sparse_corrcoef(x: &CsrMatrix) -> Array2<f64> {
    let a = x.transpose(); // features × samples
    let d = a.nrows();
    let n = a.ncols() as f64;
    let denom = (a.ncols().max(2) - 1) as f64;

    let rowsum: Vec<f64> = (0..d).map(|i| a.row_sum(i)).collect();
    let mut cov = Array2::zeros((d, d));
    for i in 0..d {
        for j in 0..=i {
            let centering = rowsum[i] * rowsum[j] / n.max(1.0);
            let c = (a.row_dot(i, j) - centering) / denom;
            cov[[i, j]] = c;
            cov[[j, i]] = c;
        }
    }
    normalize_covariance(cov)
}

fn normalize_covariance(cov: Array2<f64>) -> Array2<f64> {
    let d = cov.nrows();
    // Floor variances at machine epsilon so constant features divide cleanly.
    let sd: Vec<f64> = (0..d).map(|i| cov[[i, i]].max(f64::EPSILON).sqrt()).collect();
    let mut corr = cov;
    for i in 0..d {
        for j in 0..d {
            corr[[i, j]] /= sd[i] * sd[j];
        }
    }
    corr
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn frequency_filter_drops_constant_temporal_patterns() {
        // 3 entities x 2 bins, 3 variables:
        //   v0: present somewhere for some entities, absent somewhere -> kept
        //   v1: present in every bin for every entity -> dropped (notalways1 = 0)
        //   v2: never present -> dropped (notalways0 = 0)
        let x = array![
            [1.0, 1.0, 0.0],
            [0.0, 1.0, 0.0],
            [1.0, 1.0, 0.0],
            [1.0, 1.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 1.0, 0.0],
        ];
        let filt = TemporalFrequencyFilter::fit(&FeatureStorage::Dense(x), 2, 0.1).unwrap();
        assert_eq!(filt.support_mask(), vec![true, false, false]);
    }

    #[test]
    fn variable_present_in_exactly_threshold_fraction_is_dropped() {
        // 4 entities x 1 bin; X present for exactly 2 of 4 entities = 0.5.
        // With threshold 0.5 and a strict comparator, X must be dropped.
        let x = array![[1.0], [1.0], [0.0], [0.0]];
        let filt = TemporalFrequencyFilter::fit(&FeatureStorage::Dense(x), 1, 0.5).unwrap();
        let (f0, f1) = filt.frequencies();
        assert_abs_diff_eq!(f0[0], 0.5);
        assert_abs_diff_eq!(f1[0], 0.5);
        assert_eq!(filt.support_mask(), vec![false]);
    }

    #[test]
    fn frequency_filter_validates_its_inputs() {
        let x = array![[1.0], [0.0], [1.0]];
        assert!(matches!(
            TemporalFrequencyFilter::fit(&FeatureStorage::Dense(x.clone()), 2, 0.5),
            Err(SelectError::RaggedPopulation { .. })
        ));
        assert!(matches!(
            TemporalFrequencyFilter::fit(&FeatureStorage::Dense(x.clone()), 0, 0.5),
            Err(SelectError::NoBins)
        ));
        assert!(matches!(
            TemporalFrequencyFilter::fit(&FeatureStorage::Dense(x), 1, 1.5),
            Err(SelectError::ThresholdOutOfRange(_))
        ));
    }

    #[test]
    fn sparse_and_dense_frequency_paths_agree() {
        let x = array![
            [1.0, 0.0],
            [0.0, 0.0],
            [1.0, 1.0],
            [1.0, 1.0],
        ];
        let dense = TemporalFrequencyFilter::fit(&FeatureStorage::Dense(x.clone()), 2, 0.3).unwrap();
        let sparse = TemporalFrequencyFilter::fit(
            &FeatureStorage::Sparse(CsrMatrix::from_dense(&x)),
            2,
            0.3,
        )
        .unwrap();
        assert_eq!(dense.support_mask(), sparse.support_mask());
    }

    #[test]
    fn duplicate_feature_is_dropped_and_aliased() {
        let x = array![
            [1.0, 1.0, 0.5],
            [2.0, 2.0, 1.7],
            [3.0, 3.0, 0.2],
            [4.0, 4.0, 2.9],
        ];
        let dedup = CorrelationDeduplicator::fit(&FeatureStorage::Dense(x));
        assert_eq!(dedup.support_mask(), &[true, false, true]);
        let names = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let aliases = dedup.feature_aliases(&names);
        assert_eq!(aliases["a"], vec!["b".to_string()]);
        assert!(!aliases.contains_key("c"));
    }

    #[test]
    fn negated_feature_gets_a_sign_marker() {
        // y = -x exactly: y is dropped, aliased as ~{y} under x.
        let x = array![[1.0, -1.0], [2.0, -2.0], [5.0, -5.0]];
        let dedup = CorrelationDeduplicator::fit(&FeatureStorage::Dense(x));
        assert_eq!(dedup.support_mask(), &[true, false]);
        let names = vec!["x".to_string(), "y".to_string()];
        let aliases = dedup.feature_aliases(&names);
        assert_eq!(aliases["x"], vec!["~{y}".to_string()]);
    }

    #[test]
    fn alias_scan_stops_at_the_first_earlier_match() {
        // Three identical columns: both b and c alias to a, never to each other.
        let x = array![[1.0, 1.0, 1.0], [2.0, 2.0, 2.0], [4.0, 4.0, 4.0]];
        let dedup = CorrelationDeduplicator::fit(&FeatureStorage::Dense(x));
        assert_eq!(dedup.support_mask(), &[true, false, false]);
        let names = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let aliases = dedup.feature_aliases(&names);
        assert_eq!(aliases["a"], vec!["b".to_string(), "c".to_string()]);
        assert!(!aliases.contains_key("b"));
    }

    #[test]
    fn sparse_correlation_matches_dense() {
        let x = array![
            [1.0, 2.0, 0.0],
            [0.0, 0.0, 1.0],
            [3.0, 6.0, 0.0],
            [1.0, 2.0, 2.0],
        ];
        let dense = CorrelationDeduplicator::fit(&FeatureStorage::Dense(x.clone()));
        let sparse =
            CorrelationDeduplicator::fit(&FeatureStorage::Sparse(CsrMatrix::from_dense(&x)));
        assert_eq!(dense.support_mask(), sparse.support_mask());
        for i in 0..3 {
            for j in 0..3 {
                assert_abs_diff_eq!(
                    dense.correlation_matrix()[[i, j]],
                    sparse.correlation_matrix()[[i, j]],
                    epsilon = 1e-10
                );
            }
        }
    }

    #[test]
    fn constant_column_does_not_divide_by_zero() {
        let x = array![[1.0, 5.0], [1.0, 6.0], [1.0, 7.0]];
        let dedup = CorrelationDeduplicator::fit(&FeatureStorage::Dense(x));
        // The constant column correlates with nothing; both are kept.
        assert_eq!(dedup.support_mask(), &[true, true]);
        assert!(dedup.correlation_matrix().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn apply_support_keeps_selected_columns_in_order() {
        let x = array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]];
        let names = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let (kept, kept_names) = apply_support(&x, &names, &[true, false, true]);
        assert_eq!(kept, array![[1.0, 3.0], [4.0, 6.0]]);
        assert_eq!(kept_names, vec!["a".to_string(), "c".to_string()]);
    }

    #[test]
    fn csr_round_trips_through_transpose() {
        let x = array![[0.0, 1.0, 0.0], [2.0, 0.0, 3.0]];
        let m = CsrMatrix::from_dense(&x);
        assert_eq!(m.nnz(), 3);
        let t = m.transpose();
        assert_eq!(t.nrows(), 3);
        assert_eq!(t.ncols(), 2);
        assert_eq!(t.transpose(), m);
    }
}
