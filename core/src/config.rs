use serde::{Deserialize, Serialize};

use crate::prelude::{QpeError, QpeResult};

/// Interpolation scheme used to bring a polar scan onto the Cartesian grid.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum RemapMethod {
    #[serde(rename = "nearest")]
    Nearest,
    #[default]
    #[serde(rename = "sprint")]
    Sprint,
    #[serde(rename = "cressman2d")]
    Cressman,
}

/// Distance-to-correlation model of the OI stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Correlation {
    /// `exp(-d / a)`
    Exponential,
    /// `exp(-d² / a)`
    Gaussian,
}

impl Correlation {
    pub fn coefficient(self, distance: f64, length: f64) -> f64 {
        match self {
            Correlation::Exponential => (-distance / length).exp(),
            Correlation::Gaussian => (-distance * distance / length).exp(),
        }
    }
}

/// Every recognized option of an hourly QPE run, with its default.
///
/// Field names on the wire follow the operational parameter names
/// (`A`, `b`, `prec_th`, `stn_num`, `K_min`, `gridReso`, ...).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QpeConfig {
    /// Z-R coefficient.
    #[serde(rename = "A")]
    pub a_coefficient: f64,
    /// Z-R exponent.
    pub b: f64,
    /// Minimum hourly gauge total (mm) for a station to take part in calibration.
    pub prec_th: f64,
    /// Minimum number of qualifying gauges for calibration to run.
    pub stn_num: usize,
    /// OI search radius in degrees.
    pub dis: f64,
    #[serde(rename = "K_min")]
    pub k_min: f64,
    #[serde(rename = "K_max")]
    pub k_max: f64,
    /// Cartesian grid spacing in metres.
    #[serde(rename = "gridReso")]
    pub grid_reso: f64,
    #[serde(rename = "stationId")]
    pub station_id: String,
    pub method: RemapMethod,
    /// Beam width in degrees; bracketing radials further apart than twice this are a gap.
    pub beam_width: f64,
    /// Radius of influence (metres) when remapping with `cressman2d`.
    pub cressman_radius: f64,
    /// OI decorrelation length in degrees.
    #[serde(rename = "a")]
    pub decorrelation: f64,
    /// 0: exponential correlation, 1: gaussian correlation.
    pub choice: u8,
    pub min_pts: usize,
    pub calibrate: bool,
    pub workers: Option<usize>,
}

impl Default for QpeConfig {
    fn default() -> Self {
        Self {
            a_coefficient: 300.0,
            b: 1.4,
            prec_th: 0.6,
            stn_num: 30,
            dis: 0.2,
            k_min: 0.5,
            k_max: 2.0,
            grid_reso: 1000.0,
            station_id: "Z9280".to_string(),
            method: RemapMethod::Sprint,
            beam_width: 1.0,
            cressman_radius: 1500.0,
            decorrelation: 0.2,
            choice: 0,
            min_pts: 5,
            calibrate: true,
            workers: None,
        }
    }
}

impl QpeConfig {
    pub fn correlation(&self) -> Correlation {
        match self.choice {
            1 => Correlation::Gaussian,
            _ => Correlation::Exponential,
        }
    }

    pub fn validate(&self) -> QpeResult<()> {
        let positive = [
            ("A", self.a_coefficient),
            ("b", self.b),
            ("gridReso", self.grid_reso),
            ("dis", self.dis),
            ("a", self.decorrelation),
            ("beam_width", self.beam_width),
            ("cressman_radius", self.cressman_radius),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(QpeError::Config(format!(
                    "{name} must be positive, got {value}"
                )));
            }
        }
        if self.k_min > self.k_max {
            return Err(QpeError::Config(format!(
                "K_min {} exceeds K_max {}",
                self.k_min, self.k_max
            )));
        }
        if self.choice > 1 {
            return Err(QpeError::Config(format!(
                "choice must be 0 or 1, got {}",
                self.choice
            )));
        }
        if self.workers == Some(0) {
            return Err(QpeError::Config("workers must be at least 1".into()));
        }
        Ok(())
    }
}
