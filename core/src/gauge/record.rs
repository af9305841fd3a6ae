use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// One sub-hourly rain report of a gauge station.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GaugeReport {
    pub station_id: String,
    pub longitude: f64,
    pub latitude: f64,
    pub timestamp: NaiveDateTime,
    /// Rain increment in mm, NaN when missing.
    pub rain: f64,
}

/// Accumulated rain of one station over the hour.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HourlyGaugeTotal {
    pub station_id: String,
    pub longitude: f64,
    pub latitude: f64,
    pub rain: f64,
    pub last_report: NaiveDateTime,
}
