use std::collections::BTreeMap;

use crate::gauge::record::{GaugeReport, HourlyGaugeTotal};
use crate::math::stats::StatsHelper;

/// Reduces sub-hourly gauge reports to per-station hourly totals.
#[derive(Debug, Clone)]
pub struct GaugeAggregator {
    min_rain: f64,
}

impl GaugeAggregator {
    pub fn new(min_rain: f64) -> Self {
        Self { min_rain }
    }

    /// Per-station totals, ordered by station id, without the threshold filter.
    pub fn totals(&self, reports: &[GaugeReport]) -> Vec<HourlyGaugeTotal> {
        let mut groups: BTreeMap<&str, Vec<&GaugeReport>> = BTreeMap::new();
        for report in reports {
            groups.entry(report.station_id.as_str()).or_default().push(report);
        }

        groups
            .into_iter()
            .filter_map(|(station_id, group)| {
                let first = group.first()?;
                let last = group.last()?;
                Some(HourlyGaugeTotal {
                    station_id: station_id.to_string(),
                    longitude: first.longitude,
                    latitude: first.latitude,
                    rain: StatsHelper::nan_sum(group.iter().map(|r| r.rain)),
                    last_report: last.timestamp,
                })
            })
            .collect()
    }

    /// Hourly totals of the stations reaching the minimum rain threshold.
    pub fn aggregate(&self, reports: &[GaugeReport]) -> Vec<HourlyGaugeTotal> {
        let totals = self.totals(reports);
        let station_count = totals.len();
        let kept: Vec<HourlyGaugeTotal> = totals
            .into_iter()
            .filter(|total| total.rain >= self.min_rain)
            .collect();
        log::debug!(
            "gauge aggregation kept {} of {} stations (>= {} mm)",
            kept.len(),
            station_count,
            self.min_rain
        );
        kept
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDateTime};

    fn report(id: &str, lon: f64, minute: i64, rain: f64) -> GaugeReport {
        let base =
            NaiveDateTime::parse_from_str("2023-06-01 12:00:00", "%Y-%m-%d %H:%M:%S").unwrap();
        GaugeReport {
            station_id: id.to_string(),
            longitude: lon,
            latitude: 30.0,
            timestamp: base + Duration::minutes(minute),
            rain,
        }
    }

    #[test]
    fn sums_per_station_skipping_missing() {
        let reports = vec![
            report("B", 104.1, 5, 0.4),
            report("A", 104.0, 5, 0.2),
            report("B", 104.9, 10, f64::NAN),
            report("B", 104.9, 15, 0.6),
        ];
        let totals = GaugeAggregator::new(0.0).totals(&reports);

        assert_eq!(totals.len(), 2);
        assert_eq!(totals[0].station_id, "A");
        assert_eq!(totals[1].station_id, "B");
        assert!((totals[1].rain - 1.0).abs() < 1e-12);
        assert_eq!(totals[1].longitude, 104.1);
        assert_eq!(totals[1].last_report, reports[3].timestamp);
    }

    #[test]
    fn threshold_drops_noise_level_stations() {
        let reports = vec![
            report("A", 104.0, 5, 0.3),
            report("B", 104.1, 5, 0.6),
            report("C", 104.2, 5, 2.0),
        ];
        let kept = GaugeAggregator::new(0.6).aggregate(&reports);
        let ids: Vec<&str> = kept.iter().map(|t| t.station_id.as_str()).collect();
        assert_eq!(ids, vec!["B", "C"]);
    }

    #[test]
    fn all_missing_station_totals_zero() {
        let totals = GaugeAggregator::new(0.6).totals(&[report("A", 104.0, 5, f64::NAN)]);
        assert_eq!(totals[0].rain, 0.0);
        assert!(GaugeAggregator::new(0.6)
            .aggregate(&[report("A", 104.0, 5, f64::NAN)])
            .is_empty());
    }
}
