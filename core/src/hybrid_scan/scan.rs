use chrono::NaiveDateTime;
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::math::stats::StatsHelper;
use crate::prelude::{QpeError, QpeResult};

/// Radar site location as recorded in the scan header.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RadarSite {
    /// Degrees east.
    pub longitude: f64,
    /// Degrees north.
    pub latitude: f64,
    /// Metres.
    pub altitude: f64,
}

/// Reflectivity of one hybrid scan in polar coordinates.
///
/// `reflectivity` is indexed `[azimuth, range]` in dBZ; bins without echo are NaN.
#[derive(Debug, Clone)]
pub struct PolarScan {
    pub reflectivity: Array2<f64>,
    pub azimuth: Array1<f64>,
    pub range: Array1<f64>,
    pub elevation: Array1<f64>,
    pub first_gate: f64,
    pub site: RadarSite,
    pub valid_time: NaiveDateTime,
}

impl PolarScan {
    pub fn new(
        reflectivity: Array2<f64>,
        azimuth: Array1<f64>,
        range: Array1<f64>,
        elevation: Array1<f64>,
        site: RadarSite,
        valid_time: NaiveDateTime,
    ) -> QpeResult<Self> {
        let (n_azi, n_rng) = reflectivity.dim();
        if n_azi == 0 || n_rng == 0 {
            return Err(QpeError::InvalidScan("empty reflectivity array".into()));
        }
        if azimuth.len() != n_azi || elevation.len() != n_azi {
            return Err(QpeError::InvalidScan(format!(
                "{} radials but {} azimuths and {} elevations",
                n_azi,
                azimuth.len(),
                elevation.len()
            )));
        }
        if range.len() != n_rng {
            return Err(QpeError::InvalidScan(format!(
                "{} gates but {} ranges",
                n_rng,
                range.len()
            )));
        }
        if range.iter().zip(range.iter().skip(1)).any(|(lo, hi)| hi <= lo) {
            return Err(QpeError::InvalidScan(
                "range must be strictly increasing".into(),
            ));
        }
        let first_gate = range[0];
        Ok(Self {
            reflectivity,
            azimuth,
            range,
            elevation,
            first_gate,
            site,
            valid_time,
        })
    }

    pub fn radials(&self) -> usize {
        self.azimuth.len()
    }

    pub fn gates(&self) -> usize {
        self.range.len()
    }

    pub fn max_range(&self) -> f64 {
        self.range[self.range.len() - 1]
    }

    pub fn mean_elevation(&self) -> f64 {
        self.elevation.mean().unwrap_or(0.0)
    }

    /// Median spacing between consecutive gates.
    pub fn range_step(&self) -> f64 {
        let diffs: Vec<f64> = self
            .range
            .iter()
            .zip(self.range.iter().skip(1))
            .map(|(lo, hi)| hi - lo)
            .collect();
        StatsHelper::median(&diffs).unwrap_or(0.0)
    }

    /// Azimuths (wrapped into `[0, 360)`) in ascending order with the matching rows.
    pub fn sorted_by_azimuth(&self) -> (Array1<f64>, Array2<f64>) {
        let wrapped: Vec<f64> = self.azimuth.iter().map(|a| a.rem_euclid(360.0)).collect();
        let mut order: Vec<usize> = (0..wrapped.len()).collect();
        order.sort_by(|&l, &r| wrapped[l].total_cmp(&wrapped[r]));

        let azimuth = order.iter().map(|&i| wrapped[i]).collect::<Array1<f64>>();
        let reflectivity = self.reflectivity.select(Axis(0), &order);
        (azimuth, reflectivity)
    }
}
