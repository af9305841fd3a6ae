use ndarray::{Array1, Array2, ArrayView2};
use rayon::prelude::*;
use serde::Serialize;

use crate::config::Correlation;
use crate::gauge::record::HourlyGaugeTotal;
use crate::grid::LonLatGrid;
use crate::math::matrix::MatrixHelper;
use crate::prelude::{
    ProcessingStage, QpeConfig, QpeError, QpeResult, StageMetadata, StageOutput,
};
use crate::telemetry::log::LogManager;

const OBSERVATION_ERROR: f64 = 0.01;

/// Gauge residual against the globally corrected background.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Innovation {
    pub longitude: f64,
    pub latitude: f64,
    pub value: f64,
}

#[derive(Debug, Clone)]
pub struct GlobalCorrection {
    pub factor: f64,
    pub field: Array2<f64>,
    /// Gauges whose background sample was defined.
    pub innovations: Vec<Innovation>,
}

#[derive(Debug, Clone)]
pub struct LocalCorrection {
    pub field: Array2<f64>,
    pub cells_corrected: usize,
    pub ill_conditioned: usize,
}

/// Result of the two calibration stages.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibratedFields {
    pub factor: f64,
    pub qpe_g: Array2<f64>,
    pub qpe_oi: Array2<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CalibrationSummary {
    pub gauge_count: usize,
    pub paired_gauges: usize,
    pub factor: Option<f64>,
    pub cells_corrected: usize,
    pub ill_conditioned: usize,
    pub skipped: Option<String>,
}

/// Global multiplicative bias correction followed by local optimal interpolation.
#[derive(Debug, Clone)]
pub struct Calibrator {
    pub min_gauges: usize,
    pub k_min: f64,
    pub k_max: f64,
    /// Search radius in degrees.
    pub radius: f64,
    pub min_points: usize,
    pub correlation: Correlation,
    /// Decorrelation length in degrees.
    pub length: f64,
}

impl Calibrator {
    pub fn from_config(config: &QpeConfig) -> Self {
        Self {
            min_gauges: config.stn_num,
            k_min: config.k_min,
            k_max: config.k_max,
            radius: config.dis,
            min_points: config.min_pts,
            correlation: config.correlation(),
            length: config.decorrelation,
        }
    }

    /// Ratio of gauge rain to sampled background, clamped, applied to the whole field.
    pub fn global_correction(
        &self,
        geo: &LonLatGrid,
        qpe: ArrayView2<f64>,
        gauges: &[HourlyGaugeTotal],
    ) -> GlobalCorrection {
        let pairs: Vec<(&HourlyGaugeTotal, f64)> = gauges
            .iter()
            .map(|gauge| (gauge, geo.sample(qpe, gauge.longitude, gauge.latitude)))
            .filter(|(gauge, sample)| !sample.is_nan() && !gauge.rain.is_nan())
            .collect();

        let factor = if pairs.is_empty() {
            1.0
        } else {
            let rain: f64 = pairs.iter().map(|(gauge, _)| gauge.rain).sum();
            let radar: f64 = pairs.iter().map(|(_, sample)| sample).sum();
            let raw = rain / radar;
            if raw.is_nan() {
                1.0
            } else {
                raw.clamp(self.k_min, self.k_max)
            }
        };

        let innovations = pairs
            .iter()
            .map(|(gauge, sample)| Innovation {
                longitude: gauge.longitude,
                latitude: gauge.latitude,
                value: gauge.rain - factor * sample,
            })
            .collect();

        GlobalCorrection {
            factor,
            field: qpe.mapv(|v| v * factor),
            innovations,
        }
    }

    /// Optimal-interpolation analysis of `background` from nearby innovations.
    ///
    /// Every cell is solved independently on the current rayon pool. Cells with fewer
    /// than `min_points` innovations inside `radius`, or whose system cannot be solved,
    /// keep their background value.
    pub fn local_correction(
        &self,
        geo: &LonLatGrid,
        background: ArrayView2<f64>,
        innovations: &[Innovation],
    ) -> QpeResult<LocalCorrection> {
        let (ny, nx) = geo.shape();
        if background.dim() != (ny, nx) {
            return Err(QpeError::GridMismatch(format!(
                "background {:?} vs grid {:?}",
                background.dim(),
                (ny, nx)
            )));
        }

        let cells: Vec<CellAnalysis> = (0..ny * nx)
            .into_par_iter()
            .map(|index| {
                let (j, i) = (index / nx, index % nx);
                self.analyse_cell(
                    geo.longitude[i],
                    geo.latitude[j],
                    background[[j, i]],
                    innovations,
                )
            })
            .collect();

        let cells_corrected = cells
            .iter()
            .filter(|cell| matches!(cell, CellAnalysis::Corrected(_)))
            .count();
        let ill_conditioned = cells
            .iter()
            .filter(|cell| matches!(cell, CellAnalysis::Singular(_)))
            .count();
        let values: Vec<f64> = cells.into_iter().map(CellAnalysis::value).collect();
        let field = Array2::from_shape_vec((ny, nx), values)
            .map_err(|e| QpeError::Internal(format!("assembling analysis: {e}")))?;

        Ok(LocalCorrection {
            field,
            cells_corrected,
            ill_conditioned,
        })
    }

    fn analyse_cell(
        &self,
        lon: f64,
        lat: f64,
        background: f64,
        innovations: &[Innovation],
    ) -> CellAnalysis {
        let near: Vec<&Innovation> = innovations
            .iter()
            .filter(|obs| (obs.longitude - lon).hypot(obs.latitude - lat) < self.radius)
            .collect();
        if near.len() < self.min_points {
            return CellAnalysis::Unchanged(background);
        }

        let n = near.len();
        let lhs = Array2::from_shape_fn((n, n), |(p, q)| {
            let d = (near[p].longitude - near[q].longitude).hypot(near[p].latitude - near[q].latitude);
            let nugget = if p == q { OBSERVATION_ERROR } else { 0.0 };
            self.correlation.coefficient(d, self.length) + nugget
        });
        let rhs = Array1::from_iter(near.iter().map(|obs| {
            let d = (obs.longitude - lon).hypot(obs.latitude - lat);
            self.correlation.coefficient(d, self.length)
        }));

        match MatrixHelper::solve_symmetric(lhs.view(), rhs.view()) {
            Some(weights) => {
                let increment: f64 = weights
                    .iter()
                    .zip(&near)
                    .map(|(w, obs)| w * obs.value)
                    .sum();
                CellAnalysis::Corrected(background + increment)
            }
            None => CellAnalysis::Singular(background),
        }
    }
}

enum CellAnalysis {
    Unchanged(f64),
    Corrected(f64),
    Singular(f64),
}

impl CellAnalysis {
    fn value(self) -> f64 {
        match self {
            CellAnalysis::Unchanged(v) | CellAnalysis::Corrected(v) | CellAnalysis::Singular(v) => v,
        }
    }
}

/// Background field and gauges handed to [`CalibrationStage`].
#[derive(Debug, Clone)]
pub struct CalibrationInput {
    pub geo: LonLatGrid,
    pub qpe: Array2<f64>,
    /// Hourly totals that passed the rain threshold.
    pub gauges: Vec<HourlyGaugeTotal>,
}

#[derive(Debug, Clone)]
pub struct CalibrationOutcome {
    pub qpe: Array2<f64>,
    pub calibrated: Option<CalibratedFields>,
    pub summary: CalibrationSummary,
}

pub struct CalibrationStage {
    calibrator: Option<Calibrator>,
    enabled: bool,
    logger: LogManager,
}

impl CalibrationStage {
    pub fn new() -> Self {
        Self {
            calibrator: None,
            enabled: true,
            logger: LogManager::new("calibration"),
        }
    }
}

impl Default for CalibrationStage {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessingStage for CalibrationStage {
    type Input = CalibrationInput;
    type Output = CalibrationOutcome;

    fn initialize(&mut self, config: &QpeConfig) -> QpeResult<()> {
        self.calibrator = Some(Calibrator::from_config(config));
        self.enabled = config.calibrate;
        Ok(())
    }

    fn execute(
        &mut self,
        input: CalibrationInput,
    ) -> QpeResult<StageOutput<CalibrationOutcome>> {
        let calibrator = self
            .calibrator
            .as_ref()
            .ok_or_else(|| QpeError::Internal("calibration stage not initialized".into()))?;
        let mut summary = CalibrationSummary {
            gauge_count: input.gauges.len(),
            ..CalibrationSummary::default()
        };

        if !self.enabled {
            let note = "calibration disabled".to_string();
            self.logger.record(&note);
            summary.skipped = Some(note.clone());
            return Ok(StageOutput::new(
                CalibrationOutcome {
                    qpe: input.qpe,
                    calibrated: None,
                    summary,
                },
                StageMetadata::with_note(note),
            ));
        }
        if input.gauges.len() < calibrator.min_gauges {
            let note = format!(
                "gauge count {} below threshold {}",
                input.gauges.len(),
                calibrator.min_gauges
            );
            self.logger.warn(&note);
            summary.skipped = Some(note.clone());
            return Ok(StageOutput::new(
                CalibrationOutcome {
                    qpe: input.qpe,
                    calibrated: None,
                    summary,
                },
                StageMetadata::with_note(note),
            ));
        }

        let global = calibrator.global_correction(&input.geo, input.qpe.view(), &input.gauges);
        let mut metadata = StageMetadata::with_note(format!(
            "global factor {:.3} from {} gauge pairs",
            global.factor,
            global.innovations.len()
        ));
        self.logger.record(&metadata.notes[0]);

        let local =
            calibrator.local_correction(&input.geo, global.field.view(), &global.innovations)?;
        let note = format!(
            "optimal interpolation corrected {} cells ({} ill-conditioned)",
            local.cells_corrected, local.ill_conditioned
        );
        self.logger.record(&note);
        metadata.push(note);

        summary.paired_gauges = global.innovations.len();
        summary.factor = Some(global.factor);
        summary.cells_corrected = local.cells_corrected;
        summary.ill_conditioned = local.ill_conditioned;

        Ok(StageOutput::new(
            CalibrationOutcome {
                qpe: input.qpe,
                calibrated: Some(CalibratedFields {
                    factor: global.factor,
                    qpe_g: global.field,
                    qpe_oi: local.field,
                }),
                summary,
            },
            metadata,
        ))
    }

    fn cleanup(&mut self) {
        self.calibrator = None;
    }
}
