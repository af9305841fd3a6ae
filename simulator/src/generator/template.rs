use serde::{Deserialize, Serialize};

/// Reflectivity below this is written as "no echo".
const ECHO_FLOOR_DBZ: f64 = 5.0;
const NO_ECHO_DBZ: f64 = -33.0;

/// Analytic reflectivity patterns used to fill synthetic scans.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReflectivityTemplate {
    Uniform {
        dbz: f64,
    },
    /// Gaussian cell centred `east`/`north` metres from the radar.
    StormCell {
        peak_dbz: f64,
        east: f64,
        north: f64,
        radius: f64,
    },
}

impl Default for ReflectivityTemplate {
    fn default() -> Self {
        ReflectivityTemplate::StormCell {
            peak_dbz: 45.0,
            east: 12_000.0,
            north: 8_000.0,
            radius: 10_000.0,
        }
    }
}

impl ReflectivityTemplate {
    pub fn dbz_at(&self, east: f64, north: f64) -> f64 {
        match *self {
            ReflectivityTemplate::Uniform { dbz } => dbz,
            ReflectivityTemplate::StormCell {
                peak_dbz,
                east: cx,
                north: cy,
                radius,
            } => {
                let d2 = (east - cx).powi(2) + (north - cy).powi(2);
                let dbz = peak_dbz * (-d2 / (2.0 * radius * radius)).exp();
                if dbz < ECHO_FLOOR_DBZ {
                    NO_ECHO_DBZ
                } else {
                    dbz
                }
            }
        }
    }

    /// Value at `range` metres along the radial pointing `azimuth` degrees clockwise from north.
    pub fn dbz_polar(&self, azimuth: f64, range: f64) -> f64 {
        let (sin, cos) = azimuth.to_radians().sin_cos();
        self.dbz_at(range * sin, range * cos)
    }

    /// Same pattern displaced by `(de, dn)` metres.
    pub fn shifted(&self, de: f64, dn: f64) -> Self {
        match self.clone() {
            ReflectivityTemplate::StormCell {
                peak_dbz,
                east,
                north,
                radius,
            } => ReflectivityTemplate::StormCell {
                peak_dbz,
                east: east + de,
                north: north + dn,
                radius,
            },
            uniform => uniform,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storm_cell_peaks_at_centre_and_fades_to_no_echo() {
        let cell = ReflectivityTemplate::default();
        assert_eq!(cell.dbz_at(12_000.0, 8_000.0), 45.0);
        assert!(cell.dbz_at(14_000.0, 8_000.0) < 45.0);
        assert_eq!(cell.dbz_at(-40_000.0, -40_000.0), -33.0);
    }

    #[test]
    fn polar_lookup_follows_compass_convention() {
        let cell = ReflectivityTemplate::StormCell {
            peak_dbz: 40.0,
            east: 10_000.0,
            north: 0.0,
            radius: 1_000.0,
        };
        assert!((cell.dbz_polar(90.0, 10_000.0) - 40.0).abs() < 1e-9);
        assert_eq!(cell.dbz_polar(270.0, 10_000.0), -33.0);
        assert_eq!(
            cell.shifted(0.0, 5_000.0).dbz_at(10_000.0, 5_000.0),
            40.0
        );
    }
}
