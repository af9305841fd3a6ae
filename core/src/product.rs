use chrono::NaiveDateTime;
use ndarray::{Array1, Array2, ArrayView2};
use serde::Serialize;

use crate::gauge::record::HourlyGaugeTotal;
use crate::grid::LonLatGrid;
use crate::hybrid_scan::RadarSite;
use crate::math::stats::StatsHelper;
use crate::processing::calibration::{CalibratedFields, CalibrationSummary};

pub const DIMENSIONS: [&str; 2] = ["latitude", "longitude"];

/// Descriptive attributes of an hourly product.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GridAttributes {
    pub radar_id: String,
    pub longitude_min: f64,
    pub longitude_max: f64,
    pub latitude_min: f64,
    pub latitude_max: f64,
    pub grid_spacing: f64,
    pub center_lon: f64,
    pub center_lat: f64,
    pub center_alt: f64,
    pub valid_time: NaiveDateTime,
    pub scan_count: usize,
}

impl GridAttributes {
    pub fn describe(
        radar_id: &str,
        geo: &LonLatGrid,
        site: &RadarSite,
        valid_time: NaiveDateTime,
        scan_count: usize,
    ) -> Self {
        let extent = |axis: &Array1<f64>| {
            StatsHelper::finite_summary(axis.iter())
                .map(|(_, min, max)| (StatsHelper::round_to(min, 3), StatsHelper::round_to(max, 3)))
                .unwrap_or((f64::NAN, f64::NAN))
        };
        let (longitude_min, longitude_max) = extent(&geo.longitude);
        let (latitude_min, latitude_max) = extent(&geo.latitude);
        let grid_spacing = if geo.longitude.len() > 1 {
            StatsHelper::round_to(geo.longitude[1] - geo.longitude[0], 3)
        } else {
            f64::NAN
        };

        Self {
            radar_id: radar_id.to_string(),
            longitude_min,
            longitude_max,
            latitude_min,
            latitude_max,
            grid_spacing,
            center_lon: site.longitude,
            center_lat: site.latitude,
            center_alt: site.altitude,
            valid_time,
            scan_count,
        }
    }
}

/// Agreement of one field with the hourly gauge totals.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldScore {
    pub name: String,
    pub count: usize,
    /// Mean of estimate minus gauge.
    pub bias: f64,
    pub rmse: f64,
}

impl FieldScore {
    pub fn against_gauges(
        name: &str,
        geo: &LonLatGrid,
        field: ArrayView2<f64>,
        gauges: &[HourlyGaugeTotal],
    ) -> Self {
        let errors: Vec<f64> = gauges
            .iter()
            .filter(|gauge| !gauge.rain.is_nan())
            .map(|gauge| geo.sample(field, gauge.longitude, gauge.latitude) - gauge.rain)
            .filter(|error| !error.is_nan())
            .collect();
        let count = errors.len();
        let (bias, rmse) = if count == 0 {
            (f64::NAN, f64::NAN)
        } else {
            let n = count as f64;
            let bias = errors.iter().sum::<f64>() / n;
            let mse = errors.iter().map(|e| e * e).sum::<f64>() / n;
            (bias, mse.sqrt())
        };
        Self {
            name: name.to_string(),
            count,
            bias,
            rmse,
        }
    }
}

/// Per-field statistics of the non-NaN cells.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldStatistics {
    pub name: String,
    pub valid_cells: usize,
    pub mean: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

/// Serializable digest of a [`QpeGrid`].
#[derive(Debug, Clone, Serialize)]
pub struct ProductSummary {
    pub dimensions: [&'static str; 2],
    pub shape: (usize, usize),
    pub data_variables: Vec<&'static str>,
    pub attributes: GridAttributes,
    pub calibration: CalibrationSummary,
    pub fields: Vec<FieldStatistics>,
    pub verification: Vec<FieldScore>,
}

/// Hourly precipitation product on a regular longitude/latitude grid.
#[derive(Debug, Clone)]
pub struct QpeGrid {
    pub longitude: Array1<f64>,
    pub latitude: Array1<f64>,
    /// Raw hourly estimate in mm, indexed `[latitude, longitude]`.
    pub qpe: Array2<f64>,
    pub calibration: Option<CalibratedFields>,
    pub attributes: GridAttributes,
    pub calibration_summary: CalibrationSummary,
    pub verification: Vec<FieldScore>,
}

impl QpeGrid {
    pub fn qpe_g(&self) -> Option<&Array2<f64>> {
        self.calibration.as_ref().map(|c| &c.qpe_g)
    }

    pub fn qpe_oi(&self) -> Option<&Array2<f64>> {
        self.calibration.as_ref().map(|c| &c.qpe_oi)
    }

    pub fn factor(&self) -> Option<f64> {
        self.calibration.as_ref().map(|c| c.factor)
    }

    /// Locally corrected field when calibration ran, otherwise the raw estimate.
    pub fn best_field(&self) -> &Array2<f64> {
        self.qpe_oi().unwrap_or(&self.qpe)
    }

    pub fn field(&self, name: &str) -> Option<&Array2<f64>> {
        match name {
            "qpe" => Some(&self.qpe),
            "qpe_g" => self.qpe_g(),
            "qpe_oi" => self.qpe_oi(),
            _ => None,
        }
    }

    pub fn dimensions(&self) -> [&'static str; 2] {
        DIMENSIONS
    }

    pub fn data_variables(&self) -> Vec<&'static str> {
        if self.calibration.is_some() {
            vec!["qpe", "qpe_g", "qpe_oi"]
        } else {
            vec!["qpe"]
        }
    }

    pub fn geo(&self) -> LonLatGrid {
        LonLatGrid {
            longitude: self.longitude.clone(),
            latitude: self.latitude.clone(),
        }
    }

    pub fn summary(&self) -> ProductSummary {
        let fields = self
            .data_variables()
            .into_iter()
            .filter_map(|name| {
                let field = self.field(name)?;
                let valid_cells = field.iter().filter(|v| !v.is_nan()).count();
                let stats = StatsHelper::finite_summary(field.iter());
                Some(FieldStatistics {
                    name: name.to_string(),
                    valid_cells,
                    mean: stats.map(|s| s.0),
                    min: stats.map(|s| s.1),
                    max: stats.map(|s| s.2),
                })
            })
            .collect();

        ProductSummary {
            dimensions: DIMENSIONS,
            shape: self.qpe.dim(),
            data_variables: self.data_variables(),
            attributes: self.attributes.clone(),
            calibration: self.calibration_summary.clone(),
            fields,
            verification: self.verification.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn time() -> NaiveDateTime {
        NaiveDateTime::parse_from_str("2023-06-01 12:54:00", "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn geo() -> LonLatGrid {
        LonLatGrid {
            longitude: array![103.98765, 104.0, 104.01234],
            latitude: array![29.9912, 30.0, 30.0089],
        }
    }

    fn site() -> RadarSite {
        RadarSite {
            longitude: 104.0,
            latitude: 30.0,
            altitude: 512.0,
        }
    }

    fn product(calibration: Option<CalibratedFields>) -> QpeGrid {
        let geo = geo();
        QpeGrid {
            attributes: GridAttributes::describe("Z9280", &geo, &site(), time(), 10),
            longitude: geo.longitude,
            latitude: geo.latitude,
            qpe: array![[1.0, 2.0, f64::NAN], [1.0, 2.0, 3.0], [1.0, 2.0, 3.0]],
            calibration,
            calibration_summary: CalibrationSummary::default(),
            verification: Vec::new(),
        }
    }

    #[test]
    fn attributes_are_rounded_extrema() {
        let attributes = GridAttributes::describe("Z9280", &geo(), &site(), time(), 10);
        assert_eq!(attributes.longitude_min, 103.988);
        assert_eq!(attributes.longitude_max, 104.012);
        assert_eq!(attributes.latitude_min, 29.991);
        assert_eq!(attributes.latitude_max, 30.009);
        assert_eq!(attributes.grid_spacing, 0.012);
        assert_eq!(attributes.center_alt, 512.0);
    }

    #[test]
    fn best_field_prefers_local_correction() {
        let raw = product(None);
        assert_eq!(raw.best_field(), &raw.qpe);
        assert_eq!(raw.data_variables(), vec!["qpe"]);
        assert!(raw.field("qpe_g").is_none());

        let fields = CalibratedFields {
            factor: 2.0,
            qpe_g: Array2::from_elem((3, 3), 2.0),
            qpe_oi: Array2::from_elem((3, 3), 2.5),
        };
        let calibrated = product(Some(fields));
        assert_eq!(calibrated.best_field()[[0, 0]], 2.5);
        assert_eq!(calibrated.data_variables(), vec!["qpe", "qpe_g", "qpe_oi"]);
        assert_eq!(calibrated.dimensions(), ["latitude", "longitude"]);
    }

    #[test]
    fn scores_against_gauges() {
        let geo = geo();
        let field = Array2::from_elem((3, 3), 2.0);
        let gauges = vec![
            HourlyGaugeTotal {
                station_id: "A".into(),
                longitude: 104.0,
                latitude: 30.0,
                rain: 1.0,
                last_report: time(),
            },
            HourlyGaugeTotal {
                station_id: "B".into(),
                longitude: 104.0,
                latitude: 30.0,
                rain: 5.0,
                last_report: time(),
            },
            HourlyGaugeTotal {
                station_id: "C".into(),
                longitude: 110.0,
                latitude: 30.0,
                rain: 5.0,
                last_report: time(),
            },
        ];
        let score = FieldScore::against_gauges("qpe", &geo, field.view(), &gauges);
        assert_eq!(score.count, 2);
        assert!((score.bias - (-1.0)).abs() < 1e-12);
        assert!((score.rmse - 5.0f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn summary_serializes() {
        let summary = product(None).summary();
        assert_eq!(summary.fields[0].valid_cells, 8);
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["attributes"]["radar_id"], "Z9280");
        assert_eq!(json["dimensions"][0], "latitude");
    }
}
