use crate::generator::template::ReflectivityTemplate;
use crate::workflow::gauges::write_gauge_reports;
use anyhow::Context;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use ndarray::Array2;
use qpecore::gauge::GaugeReport;
use qpecore::hybrid_scan::{scan_file_name, write_file, RadarSite, RawHybridScan};
use qpecore::math::GeoHelper;
use qpecore::processing::RainRateConverter;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const SCAN_INTERVAL_MINUTES: i64 = 6;
const GAUGE_INTERVAL_MINUTES: i64 = 5;

/// Configuration for generating a synthetic hour of scans and gauges.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub station_id: String,
    pub site: RadarSite,
    pub start: NaiveDateTime,
    pub scan_count: usize,
    pub radials: usize,
    pub gates: usize,
    pub gate_length: u16,
    pub template: ReflectivityTemplate,
    /// Metres the storm cell travels between consecutive scans (east, north).
    pub motion: (f64, f64),
    pub gauge_count: usize,
    /// Ratio of gauge rain to radar rain, mimicking a radar underestimate.
    pub gauge_bias: f64,
    pub noise: f64,
    pub compress: bool,
    pub seed: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            station_id: "Z9280".to_string(),
            site: RadarSite {
                longitude: 104.0,
                latitude: 30.0,
                altitude: 500.0,
            },
            start: NaiveDate::from_ymd_opt(2023, 6, 1)
                .and_then(|day| day.and_hms_opt(12, 0, 0))
                .unwrap_or_default(),
            scan_count: 10,
            radials: 360,
            gates: 30,
            gate_length: 1000,
            template: ReflectivityTemplate::default(),
            motion: (500.0, 0.0),
            gauge_count: 40,
            gauge_bias: 1.3,
            noise: 0.1,
            compress: true,
            seed: 0,
        }
    }
}

/// Files written for one synthetic hour.
#[derive(Debug, Clone)]
pub struct SyntheticHour {
    pub scans: Vec<PathBuf>,
    pub gauges: Option<PathBuf>,
}

fn build_scan(config: &GeneratorConfig, template: &ReflectivityTemplate) -> RawHybridScan {
    let gate = f64::from(config.gate_length);
    let radials = config.radials.max(1);
    let data = Array2::from_shape_fn((radials, config.gates.max(1)), |(i, k)| {
        let azimuth = i as f64 * 360.0 / radials as f64;
        RawHybridScan::encode_dbz(template.dbz_polar(azimuth, (k + 1) as f64 * gate))
    });
    RawHybridScan {
        site: config.site,
        gate_length: config.gate_length,
        first_gate: config.gate_length,
        data,
    }
}

fn build_gauges(config: &GeneratorConfig) -> Vec<GaugeReport> {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let converter = RainRateConverter::new(300.0, 1.4);
    let extent = 0.8 * config.gates as f64 * f64::from(config.gate_length);
    let reports_per_hour = 60 / GAUGE_INTERVAL_MINUTES;
    let mut reports = Vec::with_capacity(config.gauge_count * reports_per_hour as usize);

    for station in 0..config.gauge_count {
        let east = rng.gen_range(-extent..extent);
        let north = rng.gen_range(-extent..extent);
        let (longitude, latitude) = GeoHelper::offset_to_lonlat(
            east / 1e3,
            north / 1e3,
            config.site.longitude,
            config.site.latitude,
        );

        let steps = config.scan_count.max(1);
        let hourly: f64 = (0..steps)
            .map(|k| {
                let template = config
                    .template
                    .shifted(config.motion.0 * k as f64, config.motion.1 * k as f64);
                let dbz = template.dbz_at(east, north);
                if dbz <= -33.0 {
                    0.0
                } else {
                    converter.rain_rate(dbz)
                }
            })
            .sum::<f64>()
            / steps as f64;

        for slot in 1..=reports_per_hour {
            let jitter = 1.0 + rng.gen_range(-config.noise..=config.noise);
            reports.push(GaugeReport {
                station_id: format!("G{station:04}"),
                longitude,
                latitude,
                timestamp: config.start + Duration::minutes(slot * GAUGE_INTERVAL_MINUTES),
                rain: (hourly * config.gauge_bias * jitter / reports_per_hour as f64).max(0.0),
            });
        }
    }
    reports
}

/// Writes `scan_count` hybrid-scan files (and a gauge CSV when gauges are requested) into `dir`.
pub fn write_synthetic_hour(dir: &Path, config: &GeneratorConfig) -> anyhow::Result<SyntheticHour> {
    fs::create_dir_all(dir)
        .with_context(|| format!("creating output directory {}", dir.display()))?;

    let mut scans = Vec::with_capacity(config.scan_count);
    for k in 0..config.scan_count {
        let template = config
            .template
            .shifted(config.motion.0 * k as f64, config.motion.1 * k as f64);
        let time = config.start + Duration::minutes(SCAN_INTERVAL_MINUTES * k as i64);
        let path = dir.join(scan_file_name(&config.station_id, time, config.compress));
        write_file(&path, &build_scan(config, &template))
            .with_context(|| format!("writing synthetic scan {}", path.display()))?;
        scans.push(path);
    }

    let gauges = if config.gauge_count > 0 {
        let path = dir.join("gauges.csv");
        write_gauge_reports(&path, &build_gauges(config))?;
        Some(path)
    } else {
        None
    };
    log::info!(
        "generated {} scans and {} gauges in {}",
        scans.len(),
        config.gauge_count,
        dir.display()
    );

    Ok(SyntheticHour { scans, gauges })
}
