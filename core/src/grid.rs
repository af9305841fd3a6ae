use ndarray::{Array1, Array2, ArrayView2};

use crate::hybrid_scan::RadarSite;
use crate::math::geo::GeoHelper;
use crate::prelude::{QpeError, QpeResult};

/// Square Cartesian analysis grid centred on the radar, in metres.
#[derive(Debug, Clone, PartialEq)]
pub struct CartesianGrid {
    pub x: Array1<f64>,
    pub y: Array1<f64>,
    pub resolution: f64,
}

impl CartesianGrid {
    /// Grid covering `[-max_range, max_range]` on both axes with spacing `resolution`.
    pub fn centered(max_range: f64, resolution: f64) -> QpeResult<Self> {
        if !(resolution.is_finite() && resolution > 0.0) {
            return Err(QpeError::Config(format!(
                "grid resolution must be positive, got {resolution}"
            )));
        }
        if !(max_range.is_finite() && max_range > 0.0) {
            return Err(QpeError::GridMismatch(format!(
                "grid extent must be positive, got {max_range}"
            )));
        }
        let stop = max_range + resolution / 2.0;
        let count = ((stop + max_range) / resolution).ceil() as usize;
        let axis = Array1::from_iter((0..count).map(|i| -max_range + i as f64 * resolution));
        Ok(Self {
            x: axis.clone(),
            y: axis,
            resolution,
        })
    }

    /// `(rows, columns)`, i.e. `(y, x)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.y.len(), self.x.len())
    }

    /// 2D coordinate arrays `(xx, yy)` indexed `[y, x]`.
    pub fn mesh(&self) -> (Array2<f64>, Array2<f64>) {
        let shape = self.shape();
        let xx = Array2::from_shape_fn(shape, |(_, i)| self.x[i]);
        let yy = Array2::from_shape_fn(shape, |(j, _)| self.y[j]);
        (xx, yy)
    }

    /// Longitude/latitude axes of the grid around `site`.
    pub fn geographic(&self, site: &RadarSite) -> LonLatGrid {
        let longitude = self
            .x
            .mapv(|x| GeoHelper::offset_to_lonlat(x / 1e3, 0.0, site.longitude, site.latitude).0);
        let latitude = self
            .y
            .mapv(|y| GeoHelper::offset_to_lonlat(0.0, y / 1e3, site.longitude, site.latitude).1);
        LonLatGrid {
            longitude,
            latitude,
        }
    }
}

/// Ascending longitude/latitude axes of a field indexed `[latitude, longitude]`.
#[derive(Debug, Clone, PartialEq)]
pub struct LonLatGrid {
    pub longitude: Array1<f64>,
    pub latitude: Array1<f64>,
}

impl LonLatGrid {
    pub fn shape(&self) -> (usize, usize) {
        (self.latitude.len(), self.longitude.len())
    }

    /// Bilinear sample of `field` at `(lon, lat)`.
    ///
    /// NaN outside the grid or when any of the four surrounding nodes is NaN.
    pub fn sample(&self, field: ArrayView2<f64>, lon: f64, lat: f64) -> f64 {
        let (Some((i, tx)), Some((j, ty))) = (
            bracket(&self.longitude, lon),
            bracket(&self.latitude, lat),
        ) else {
            return f64::NAN;
        };
        let v00 = field[[j, i]];
        let v01 = field[[j, i + 1]];
        let v10 = field[[j + 1, i]];
        let v11 = field[[j + 1, i + 1]];
        if [v00, v01, v10, v11].iter().any(|v| v.is_nan()) {
            return f64::NAN;
        }
        let lower = v00 * (1.0 - tx) + v01 * tx;
        let upper = v10 * (1.0 - tx) + v11 * tx;
        lower * (1.0 - ty) + upper * ty
    }
}

/// Lower bracketing index and fractional position of `value` on an ascending axis.
fn bracket(axis: &Array1<f64>, value: f64) -> Option<(usize, f64)> {
    let n = axis.len();
    if n < 2 || !value.is_finite() || value < axis[0] || value > axis[n - 1] {
        return None;
    }
    let above = axis
        .as_slice()
        .map(|s| s.partition_point(|&a| a <= value))
        .unwrap_or_else(|| axis.iter().take_while(|&&a| a <= value).count());
    let lower = above.saturating_sub(1).min(n - 2);
    let t = (value - axis[lower]) / (axis[lower + 1] - axis[lower]);
    Some((lower, t))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn centered_grid_is_symmetric() {
        let grid = CartesianGrid::centered(10_000.0, 1_000.0).unwrap();
        assert_eq!(grid.shape(), (21, 21));
        assert_eq!(grid.x[0], -10_000.0);
        assert_eq!(grid.x[10], 0.0);
        assert_eq!(grid.x[20], 10_000.0);

        let (xx, yy) = grid.mesh();
        assert_eq!(xx[[3, 7]], grid.x[7]);
        assert_eq!(yy[[3, 7]], grid.y[3]);
    }

    #[test]
    fn rejects_non_positive_resolution() {
        assert!(CartesianGrid::centered(10_000.0, 0.0).is_err());
    }

    #[test]
    fn geographic_axes_are_ascending_and_centered() {
        let grid = CartesianGrid::centered(5_000.0, 1_000.0).unwrap();
        let site = RadarSite {
            longitude: 104.0,
            latitude: 30.0,
            altitude: 0.0,
        };
        let geo = grid.geographic(&site);
        assert_eq!(geo.longitude[5], 104.0);
        assert_eq!(geo.latitude[5], 30.0);
        assert!(geo.longitude.iter().zip(geo.longitude.iter().skip(1)).all(|(a, b)| b > a));
        assert!(geo.latitude.iter().zip(geo.latitude.iter().skip(1)).all(|(a, b)| b > a));
    }

    #[test]
    fn bilinear_sample_interpolates_and_masks() {
        let geo = LonLatGrid {
            longitude: array![0.0, 1.0, 2.0],
            latitude: array![10.0, 11.0],
        };
        let field = array![[0.0, 2.0, f64::NAN], [4.0, 6.0, 8.0]];

        assert_eq!(geo.sample(field.view(), 0.5, 10.5), 3.0);
        assert_eq!(geo.sample(field.view(), 0.0, 10.0), 0.0);
        assert_eq!(geo.sample(field.view(), 0.5, 11.0), 5.0);
        assert!(geo.sample(field.view(), 1.5, 10.5).is_nan());
        assert!(geo.sample(field.view(), -0.1, 10.5).is_nan());
        assert!(geo.sample(field.view(), 0.5, 11.5).is_nan());
    }
}
