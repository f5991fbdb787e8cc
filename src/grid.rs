//! # Time Grid
//!
//! Derives the sequence of half-open time bins `[k·dt, (k+1)·dt)` covering the
//! observation horizon. The grid is a pure function of `(T, dt)`: it is computed
//! once per run and shared by every entity, so bin boundaries are identical across
//! the whole population by construction.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors for degenerate horizon/bin-width inputs. These fail fast, before any
/// per-entity work starts.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GridError {
    #[error("Bin width must be strictly positive. Got dt = {0}.")]
    NonPositiveBinWidth(f64),
    #[error("Observation horizon must be non-negative. Got T = {0}.")]
    NegativeHorizon(f64),
    #[error("Horizon and bin width must be finite. Got T = {t}, dt = {dt}.")]
    NonFinite { t: f64, dt: f64 },
}

/// One half-open interval `[start, end)` of the grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeBin {
    pub start: f64,
    pub end: f64,
}

impl TimeBin {
    pub fn contains(&self, t: f64) -> bool {
        t >= self.start && t < self.end
    }

    /// Imputed rows are positioned here so they can never collide with a raw
    /// observation sitting exactly on a bin boundary.
    pub fn midpoint(&self) -> f64 {
        self.start + (self.end - self.start) / 2.0
    }
}

/// The ordered sequence of time bins for a given `(T, dt)`.
///
/// There are `⌊T/dt⌋` bins delimited by `⌊T/dt⌋ + 1` boundary points
/// `0, dt, 2·dt, …, dt·⌊T/dt⌋`. Observations at or beyond the last boundary fall
/// outside the grid and are ignored by the binning stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeGrid {
    bins: Vec<TimeBin>,
    dt: f64,
}

impl TimeGrid {
    pub fn new(t_max: f64, dt: f64) -> Result<Self, GridError> {
        if !t_max.is_finite() || !dt.is_finite() {
            return Err(GridError::NonFinite { t: t_max, dt });
        }
        if dt <= 0.0 {
            return Err(GridError::NonPositiveBinWidth(dt));
        }
        if t_max < 0.0 {
            return Err(GridError::NegativeHorizon(t_max));
        }

        let n_bins = (t_max / dt).floor() as usize;
        let bins = (0..n_bins)
            .map(|k| TimeBin {
                start: k as f64 * dt,
                end: (k + 1) as f64 * dt,
            })
            .collect();
        Ok(TimeGrid { bins, dt })
    }

    /// Number of bins (`⌊T/dt⌋`).
    pub fn len(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    pub fn dt(&self) -> f64 {
        self.dt
    }

    pub fn bins(&self) -> &[TimeBin] {
        &self.bins
    }

    /// The `⌊T/dt⌋ + 1` boundary points of the grid.
    pub fn boundaries(&self) -> Vec<f64> {
        let mut edges: Vec<f64> = self.bins.iter().map(|b| b.start).collect();
        edges.push(self.bins.last().map_or(0.0, |b| b.end));
        edges
    }

    /// Bin starts, used as the row index of grid-aligned value tables.
    pub fn starts(&self) -> Vec<f64> {
        self.bins.iter().map(|b| b.start).collect()
    }

    /// Index of the bin containing `t`, or `None` when `t` falls outside the grid.
    pub fn bin_index(&self, t: f64) -> Option<usize> {
        if !t.is_finite() || t < 0.0 || self.bins.is_empty() {
            return None;
        }
        let mut k = ((t / self.dt).floor() as usize).min(self.bins.len() - 1);
        // Float division can land one bin off near a boundary; nudge into place.
        if t < self.bins[k].start && k > 0 {
            k -= 1;
        } else if t >= self.bins[k].end {
            k += 1;
        }
        self.bins.get(k).filter(|b| b.contains(t)).map(|_| k)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_is_deterministic_with_expected_boundary_count() {
        for (t, dt) in [(48.0, 1.0), (48.0, 4.0), (3.0, 1.0), (10.5, 2.0)] {
            let a = TimeGrid::new(t, dt).unwrap();
            let b = TimeGrid::new(t, dt).unwrap();
            assert_eq!(a, b);
            assert_eq!(a.boundaries().len(), (t / dt).floor() as usize + 1);
            assert_eq!(a.len(), (t / dt).floor() as usize);
        }
    }

    #[test]
    fn bins_are_half_open_and_contiguous() {
        let grid = TimeGrid::new(3.0, 1.0).unwrap();
        assert_eq!(grid.len(), 3);
        assert_eq!(grid.bin_index(0.0), Some(0));
        assert_eq!(grid.bin_index(0.999), Some(0));
        assert_eq!(grid.bin_index(1.0), Some(1));
        assert_eq!(grid.bin_index(2.5), Some(2));
        // The last boundary is exclusive; later times fall off the grid.
        assert_eq!(grid.bin_index(3.0), None);
        assert_eq!(grid.bin_index(-0.1), None);
    }

    #[test]
    fn midpoints_sit_between_boundaries() {
        let grid = TimeGrid::new(4.0, 2.0).unwrap();
        let mids: Vec<f64> = grid.bins().iter().map(TimeBin::midpoint).collect();
        assert_eq!(mids, vec![1.0, 3.0]);
    }

    #[test]
    fn degenerate_inputs_are_rejected() {
        assert!(matches!(
            TimeGrid::new(10.0, 0.0),
            Err(GridError::NonPositiveBinWidth(_))
        ));
        assert!(matches!(
            TimeGrid::new(10.0, -1.0),
            Err(GridError::NonPositiveBinWidth(_))
        ));
        assert!(matches!(
            TimeGrid::new(-1.0, 1.0),
            Err(GridError::NegativeHorizon(_))
        ));
        assert!(matches!(
            TimeGrid::new(f64::NAN, 1.0),
            Err(GridError::NonFinite { .. })
        ));
    }

    #[test]
    fn partial_horizon_drops_the_trailing_fragment() {
        // T = 10.5, dt = 4: boundaries 0, 4, 8; observations in [8, 10.5] are off-grid.
        let grid = TimeGrid::new(10.5, 4.0).unwrap();
        assert_eq!(grid.len(), 2);
        assert_eq!(grid.bin_index(9.0), None);
    }
}
