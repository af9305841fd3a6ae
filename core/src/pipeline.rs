use std::path::Path;

use rayon::prelude::*;
use rayon::ThreadPool;

use crate::gauge::aggregator::GaugeAggregator;
use crate::gauge::record::{GaugeReport, HourlyGaugeTotal};
use crate::hybrid_scan::{decode_file, PolarScan};
use crate::prelude::{ProcessingStage, QpeConfig, QpeError, QpeResult};
use crate::processing::calibration::{CalibrationInput, CalibrationStage};
use crate::processing::rain_rate::RainRateStage;
use crate::processing::remap::RemapStage;
use crate::product::{FieldScore, GridAttributes, QpeGrid};
use crate::telemetry::log::LogManager;
use crate::telemetry::metrics::{MetricsRecorder, MetricsSnapshot};

/// Runs one hour of scans and gauge reports through decode, remap, rain rate and calibration.
pub struct HourlyPipeline {
    config: QpeConfig,
    metrics: MetricsRecorder,
    logger: LogManager,
}

impl HourlyPipeline {
    pub fn new(config: QpeConfig) -> QpeResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            metrics: MetricsRecorder::new(),
            logger: LogManager::new("pipeline"),
        })
    }

    pub fn config(&self) -> &QpeConfig {
        &self.config
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Decodes `paths` in parallel and processes the hour. Any decode failure aborts the run.
    pub fn run<P>(&self, paths: &[P], reports: &[GaugeReport]) -> QpeResult<QpeGrid>
    where
        P: AsRef<Path> + Sync,
    {
        if paths.is_empty() {
            return Err(QpeError::NoScans);
        }
        let decode_pool = self.pool(Some(paths.len()))?;
        let scans = decode_pool.install(|| {
            paths
                .par_iter()
                .map(|path| {
                    let decoded = decode_file(path);
                    match &decoded {
                        Ok(_) => self.metrics.record_decoded(),
                        Err(err) => {
                            self.metrics.record_decode_error();
                            self.logger
                                .warn(&format!("{}: {err}", path.as_ref().display()));
                        }
                    }
                    decoded
                })
                .collect::<QpeResult<Vec<PolarScan>>>()
        })?;
        self.logger.record(&format!("decoded {} scans", scans.len()));
        self.run_scans(scans, reports)
    }

    /// Processes already decoded scans.
    pub fn run_scans(&self, scans: Vec<PolarScan>, reports: &[GaugeReport]) -> QpeResult<QpeGrid> {
        if scans.is_empty() {
            return Err(QpeError::NoScans);
        }
        // remap and the per-cell analysis are not bounded by the file count
        let pool = self.pool(None)?;
        pool.install(|| self.process(scans, reports))
    }

    /// Worker threads for a step; file-bound steps pass their file count as `jobs`.
    pub(crate) fn thread_count(&self, jobs: Option<usize>) -> usize {
        let available = rayon::current_num_threads();
        self.config
            .workers
            .unwrap_or_else(|| jobs.map_or(available, |jobs| jobs.min(available)))
            .max(1)
    }

    fn pool(&self, jobs: Option<usize>) -> QpeResult<ThreadPool> {
        rayon::ThreadPoolBuilder::new()
            .num_threads(self.thread_count(jobs))
            .build()
            .map_err(|e| QpeError::ThreadPool(e.to_string()))
    }

    fn process(&self, scans: Vec<PolarScan>, reports: &[GaugeReport]) -> QpeResult<QpeGrid> {
        let scan_count = scans.len();

        let mut remap_stage = RemapStage::new();
        remap_stage.initialize(&self.config)?;
        let remapped = remap_stage.execute(scans)?;
        remap_stage.cleanup();

        let mut rain_stage = RainRateStage::new();
        rain_stage.initialize(&self.config)?;
        let rain = rain_stage.execute(remapped.value)?;
        rain_stage.cleanup();
        let (hour, qpe) = rain.value;

        let gauges = GaugeAggregator::new(self.config.prec_th).aggregate(reports);

        let mut calibration_stage = CalibrationStage::new();
        calibration_stage.initialize(&self.config)?;
        let calibrated = calibration_stage.execute(CalibrationInput {
            geo: hour.geo.clone(),
            qpe,
            gauges: gauges.clone(),
        })?;
        calibration_stage.cleanup();

        for note in remapped
            .metadata
            .notes
            .iter()
            .chain(&rain.metadata.notes)
            .chain(&calibrated.metadata.notes)
        {
            self.logger.detail(note);
        }

        let outcome = calibrated.value;
        self.metrics.record_correction(
            outcome.summary.cells_corrected,
            outcome.summary.ill_conditioned,
        );
        self.metrics.record_hour();

        let valid_time = hour
            .valid_times
            .last()
            .copied()
            .ok_or(QpeError::NoScans)?;
        let attributes = GridAttributes::describe(
            &self.config.station_id,
            &hour.geo,
            &hour.site,
            valid_time,
            scan_count,
        );

        let mut product = QpeGrid {
            longitude: hour.geo.longitude,
            latitude: hour.geo.latitude,
            qpe: outcome.qpe,
            calibration: outcome.calibrated,
            attributes,
            calibration_summary: outcome.summary,
            verification: Vec::new(),
        };
        product.verification = verify(&product, &gauges);
        Ok(product)
    }
}

fn verify(product: &QpeGrid, gauges: &[HourlyGaugeTotal]) -> Vec<FieldScore> {
    if gauges.is_empty() {
        return Vec::new();
    }
    let geo = product.geo();
    product
        .data_variables()
        .into_iter()
        .filter_map(|name| {
            let field = product.field(name)?;
            Some(FieldScore::against_gauges(name, &geo, field.view(), gauges))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hybrid_scan::{scan_file_name, write_file, RadarSite, RawHybridScan};
    use chrono::{Duration, NaiveDateTime};
    use ndarray::Array2;
    use std::path::PathBuf;

    fn start() -> NaiveDateTime {
        NaiveDateTime::parse_from_str("2023-06-01 12:00:00", "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn raw_scan(byte: u8) -> RawHybridScan {
        RawHybridScan {
            site: RadarSite {
                longitude: 104.0,
                latitude: 30.0,
                altitude: 500.0,
            },
            gate_length: 1000,
            first_gate: 1000,
            data: Array2::from_elem((360, 10), byte),
        }
    }

    fn write_hour(dir: &Path, count: usize, byte: u8) -> Vec<PathBuf> {
        (0..count)
            .map(|k| {
                let time = start() + Duration::minutes(6 * k as i64);
                let path = dir.join(scan_file_name("Z9280", time, k % 2 == 1));
                write_file(&path, &raw_scan(byte)).unwrap();
                path
            })
            .collect()
    }

    fn expected_rate() -> f64 {
        (100.0f64 / 300.0).powf(1.0 / 1.4)
    }

    #[test]
    fn uniform_hour_yields_power_law_rate_inside_coverage() {
        let dir = tempfile::tempdir().unwrap();
        let paths = write_hour(dir.path(), 1, 106);
        let pipeline = HourlyPipeline::new(QpeConfig::default()).unwrap();
        let product = pipeline.run(&paths, &[]).unwrap();

        assert_eq!(product.qpe.dim(), (21, 21));
        assert!(product.qpe_g().is_none());
        assert!(product.qpe_oi().is_none());
        assert_eq!(product.attributes.scan_count, 1);
        assert_eq!(product.attributes.radar_id, "Z9280");

        let coverage = 10_000.0 * 0.5f64.to_radians().cos();
        for ((j, i), &value) in product.qpe.indexed_iter() {
            let x = -10_000.0 + i as f64 * 1_000.0;
            let y = -10_000.0 + j as f64 * 1_000.0;
            if x.hypot(y) < coverage {
                assert!((value - expected_rate()).abs() < 1e-12, "cell ({j}, {i})");
            } else {
                assert!(value.is_nan(), "cell ({j}, {i})");
            }
        }
        assert_eq!(pipeline.metrics().scans_decoded, 1);
    }

    #[test]
    fn hour_of_scans_averages_and_calibrates() {
        let dir = tempfile::tempdir().unwrap();
        let paths = write_hour(dir.path(), 4, 106);
        let reports: Vec<GaugeReport> = (0..35)
            .map(|k| GaugeReport {
                station_id: format!("S{k:02}"),
                longitude: 104.0 + ((k % 7) as f64 - 3.0) * 0.01,
                latitude: 30.0 + ((k / 7) as f64 - 2.0) * 0.01,
                timestamp: start() + Duration::minutes(55),
                rain: 2.0 * expected_rate(),
            })
            .collect();

        let pipeline = HourlyPipeline::new(QpeConfig::default()).unwrap();
        let product = pipeline.run(&paths, &reports).unwrap();

        assert_eq!(product.attributes.scan_count, 4);
        assert_eq!(product.attributes.valid_time, start() + Duration::minutes(18));
        let factor = product.factor().unwrap();
        assert!((factor - 2.0).abs() < 1e-9);
        let qpe_g = product.qpe_g().unwrap();
        assert!((qpe_g[[10, 10]] - 2.0 * product.qpe[[10, 10]]).abs() < 1e-9);
        assert_eq!(product.data_variables(), vec!["qpe", "qpe_g", "qpe_oi"]);
        assert_eq!(product.verification.len(), 3);
        assert_eq!(product.calibration_summary.gauge_count, 35);

        let metrics = pipeline.metrics();
        assert_eq!(metrics.scans_decoded, 4);
        assert!(metrics.cells_corrected > 0);
    }

    #[test]
    fn too_few_gauges_leaves_raw_estimate() {
        let dir = tempfile::tempdir().unwrap();
        let paths = write_hour(dir.path(), 2, 120);
        let reports = vec![GaugeReport {
            station_id: "S00".into(),
            longitude: 104.0,
            latitude: 30.0,
            timestamp: start(),
            rain: 5.0,
        }];
        let product = HourlyPipeline::new(QpeConfig::default())
            .unwrap()
            .run(&paths, &reports)
            .unwrap();
        assert!(product.calibration.is_none());
        assert_eq!(
            product.calibration_summary.skipped.as_deref(),
            Some("gauge count 1 below threshold 30")
        );
        assert_eq!(product.verification.len(), 1);
    }

    #[test]
    fn empty_hour_is_an_error() {
        let pipeline = HourlyPipeline::new(QpeConfig::default()).unwrap();
        let none: [PathBuf; 0] = [];
        assert!(matches!(pipeline.run(&none, &[]), Err(QpeError::NoScans)));
        assert!(matches!(pipeline.run_scans(Vec::new(), &[]), Err(QpeError::NoScans)));
    }

    #[test]
    fn truncated_file_aborts_the_hour() {
        let dir = tempfile::tempdir().unwrap();
        let mut paths = write_hour(dir.path(), 2, 106);
        let broken = dir
            .path()
            .join(scan_file_name("Z9280", start() + Duration::minutes(30), false));
        std::fs::write(&broken, [0u8; 200]).unwrap();
        paths.push(broken);

        let pipeline = HourlyPipeline::new(QpeConfig::default()).unwrap();
        assert!(matches!(
            pipeline.run(&paths, &[]),
            Err(QpeError::Truncated { .. })
        ));
        assert_eq!(pipeline.metrics().decode_errors, 1);
    }

    #[test]
    fn analysis_pool_is_not_limited_by_file_count() {
        let pipeline = HourlyPipeline::new(QpeConfig::default()).unwrap();
        let available = rayon::current_num_threads();
        assert_eq!(pipeline.thread_count(Some(1)), 1);
        assert_eq!(pipeline.thread_count(None), available);

        let pinned = HourlyPipeline::new(QpeConfig {
            workers: Some(3),
            ..QpeConfig::default()
        })
        .unwrap();
        assert_eq!(pinned.thread_count(Some(1)), 3);
        assert_eq!(pinned.thread_count(None), 3);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = QpeConfig {
            grid_reso: 0.0,
            ..QpeConfig::default()
        };
        assert!(matches!(HourlyPipeline::new(config), Err(QpeError::Config(_))));
    }
}
