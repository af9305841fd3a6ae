use std::fs::File;
use std::io::Read;
use std::path::Path;

use anyhow::Context;
use chrono::NaiveDateTime;
use qpecore::gauge::GaugeReport;
use serde::Deserialize;

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const MISSING_SENTINELS: [f64; 2] = [999_998.0, 999_999.0];

#[derive(Debug, Deserialize)]
struct GaugeRow {
    #[serde(rename = "Station_Id_C")]
    station_id: String,
    #[serde(rename = "Lon")]
    longitude: f64,
    #[serde(rename = "Lat")]
    latitude: f64,
    #[serde(rename = "Datetime")]
    datetime: String,
    #[serde(rename = "PRE")]
    rain: Option<f64>,
}

fn missing_as_nan(value: Option<f64>) -> f64 {
    match value {
        Some(v) if !MISSING_SENTINELS.contains(&v) => v,
        _ => f64::NAN,
    }
}

pub fn read_gauge_reports<R: Read>(reader: R) -> anyhow::Result<Vec<GaugeReport>> {
    let mut csv_reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut reports = Vec::new();
    for (line, row) in csv_reader.deserialize::<GaugeRow>().enumerate() {
        let row = row.with_context(|| format!("parsing gauge record {}", line + 1))?;
        let timestamp = NaiveDateTime::parse_from_str(&row.datetime, DATETIME_FORMAT)
            .with_context(|| format!("parsing gauge time {:?}", row.datetime))?;
        reports.push(GaugeReport {
            station_id: row.station_id,
            longitude: row.longitude,
            latitude: row.latitude,
            timestamp,
            rain: missing_as_nan(row.rain),
        });
    }
    Ok(reports)
}

/// Loads gauge reports from a CSV with `Station_Id_C, Lon, Lat, Datetime, PRE` columns.
pub fn load_gauge_reports<P: AsRef<Path>>(path: P) -> anyhow::Result<Vec<GaugeReport>> {
    let path = path.as_ref();
    let file = File::open(path)
        .with_context(|| format!("opening gauge file {}", path.display()))?;
    read_gauge_reports(file).with_context(|| format!("reading gauge file {}", path.display()))
}

pub fn write_gauge_reports<P: AsRef<Path>>(path: P, reports: &[GaugeReport]) -> anyhow::Result<()> {
    let path = path.as_ref();
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("creating gauge file {}", path.display()))?;
    writer.write_record(["Station_Id_C", "Lon", "Lat", "Datetime", "PRE"])?;
    for report in reports {
        let rain = if report.rain.is_nan() {
            MISSING_SENTINELS[1].to_string()
        } else {
            report.rain.to_string()
        };
        writer.write_record([
            report.station_id.clone(),
            report.longitude.to_string(),
            report.latitude.to_string(),
            report.timestamp.format(DATETIME_FORMAT).to_string(),
            rain,
        ])?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
Station_Id_C,Lon,Lat,Datetime,PRE
S001,104.01,30.02,2023-06-01 12:05:00,0.4
S001,104.01,30.02,2023-06-01 12:10:00,999999
S002,104.10,29.95,2023-06-01 12:05:00,999998
S002,104.10,29.95,2023-06-01 12:10:00,
S003,103.90,30.10,2023-06-01 12:10:00,1.2
";

    #[test]
    fn reads_columns_and_sentinels() {
        let reports = read_gauge_reports(SAMPLE.as_bytes()).unwrap();
        assert_eq!(reports.len(), 5);
        assert_eq!(reports[0].station_id, "S001");
        assert_eq!(reports[0].rain, 0.4);
        assert!(reports[1].rain.is_nan());
        assert!(reports[2].rain.is_nan());
        assert!(reports[3].rain.is_nan());
        assert_eq!(reports[4].longitude, 103.9);
        assert_eq!(
            reports[4].timestamp,
            NaiveDateTime::parse_from_str("2023-06-01 12:10:00", DATETIME_FORMAT).unwrap()
        );
    }

    #[test]
    fn bad_timestamp_is_reported() {
        let broken = "Station_Id_C,Lon,Lat,Datetime,PRE\nS001,104.0,30.0,yesterday,0.1\n";
        let err = read_gauge_reports(broken.as_bytes()).unwrap_err();
        assert!(format!("{err:#}").contains("yesterday"));
    }

    #[test]
    fn written_file_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gauges.csv");
        let reports = read_gauge_reports(SAMPLE.as_bytes()).unwrap();
        write_gauge_reports(&path, &reports).unwrap();

        let loaded = load_gauge_reports(&path).unwrap();
        assert_eq!(loaded.len(), reports.len());
        assert_eq!(loaded[4].rain, 1.2);
        assert!(loaded[1].rain.is_nan());
    }
}
