/// Flat-earth helpers for radar-centred coordinates.
pub struct GeoHelper;

impl GeoHelper {
    /// Longitude and latitude of a point offset `(dx_km, dy_km)` east/north of `(lon0, lat0)`.
    ///
    /// Uses the latitude-dependent length of one degree of latitude and longitude.
    pub fn offset_to_lonlat(dx_km: f64, dy_km: f64, lon0: f64, lat0: f64) -> (f64, f64) {
        let (km_per_deg_lon, km_per_deg_lat) = Self::km_per_degree(lat0);
        (dx_km / km_per_deg_lon + lon0, dy_km / km_per_deg_lat + lat0)
    }

    /// Kilometres per degree of longitude and latitude at `lat0`.
    pub fn km_per_degree(lat0: f64) -> (f64, f64) {
        let phi = lat0.to_radians();
        let lat = 111.13209 - 0.56605 * (2.0 * phi).cos() + 0.00012 * (4.0 * phi).cos()
            - 0.000002 * (6.0 * phi).cos();
        let lon = 111.41513 * phi.cos() - 0.09455 * (3.0 * phi).cos() + 0.00012 * (5.0 * phi).cos();
        (lon, lat)
    }

    /// Compass bearing of `(x, y)` in degrees, clockwise from north in `[0, 360)`.
    pub fn bearing(x: f64, y: f64) -> f64 {
        (90.0 - y.atan2(x).to_degrees()).rem_euclid(360.0)
    }

    /// Magnitude of an azimuth difference, wrapped across north.
    pub fn angular_distance(diff: f64) -> f64 {
        if diff > 180.0 {
            360.0 - diff
        } else if diff < -180.0 {
            360.0 + diff
        } else {
            diff.abs()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearing_is_clockwise_from_north() {
        let close = |x: f64, y: f64, expected: f64| {
            GeoHelper::angular_distance(GeoHelper::bearing(x, y) - expected) < 1e-9
        };
        assert!(close(0.0, 1.0, 0.0));
        assert!(close(1.0, 0.0, 90.0));
        assert!(close(0.0, -1.0, 180.0));
        assert!(close(-1.0, 0.0, 270.0));
        assert!(close(-1.0, 1.0, 315.0));
    }

    #[test]
    fn angular_distance_wraps_across_north() {
        assert_eq!(GeoHelper::angular_distance(358.0), 2.0);
        assert_eq!(GeoHelper::angular_distance(-359.0), 1.0);
        assert_eq!(GeoHelper::angular_distance(-3.0), 3.0);
    }

    #[test]
    fn offset_moves_east_and_north() {
        let (lon, lat) = GeoHelper::offset_to_lonlat(0.0, 0.0, 104.0, 30.0);
        assert_eq!((lon, lat), (104.0, 30.0));

        let (lon, lat) = GeoHelper::offset_to_lonlat(96.0, 110.85, 104.0, 30.0);
        assert!((lon - 105.0).abs() < 0.01);
        assert!((lat - 31.0).abs() < 0.01);
    }
}
