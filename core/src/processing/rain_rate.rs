use ndarray::{Array2, Array3, ArrayView3, Axis};

use crate::prelude::{
    ProcessingStage, QpeConfig, QpeError, QpeResult, StageMetadata, StageOutput,
};
use crate::processing::remap::RemappedHour;
use crate::telemetry::log::LogManager;

/// Z-R power law `R = (10^(dBZ/10) / A)^(1/b)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RainRateConverter {
    pub a: f64,
    pub b: f64,
}

impl RainRateConverter {
    pub fn new(a: f64, b: f64) -> Self {
        Self { a, b }
    }

    pub fn from_config(config: &QpeConfig) -> Self {
        Self::new(config.a_coefficient, config.b)
    }

    /// Rain rate in mm/h; no echo (NaN) counts as no rain.
    pub fn rain_rate(&self, dbz: f64) -> f64 {
        if dbz.is_nan() {
            return 0.0;
        }
        let z = 10f64.powf(dbz / 10.0);
        (z / self.a).powf(1.0 / self.b)
    }

    pub fn convert(&self, dbz: ArrayView3<f64>) -> Array3<f64> {
        dbz.mapv(|value| self.rain_rate(value))
    }

    /// Mean rain rate over the time axis of `[time, y, x]` reflectivity.
    ///
    /// Cells whose mean is exactly zero become NaN.
    pub fn hourly_mean(&self, dbz: ArrayView3<f64>) -> Option<Array2<f64>> {
        let rates = self.convert(dbz);
        let mean = rates.mean_axis(Axis(0))?;
        Some(mean.mapv(|rate| if rate == 0.0 { f64::NAN } else { rate }))
    }
}

/// Stage averaging rain rate over all remapped scans of the hour.
pub struct RainRateStage {
    converter: Option<RainRateConverter>,
    logger: LogManager,
}

impl RainRateStage {
    pub fn new() -> Self {
        Self {
            converter: None,
            logger: LogManager::new("rain-rate"),
        }
    }
}

impl Default for RainRateStage {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessingStage for RainRateStage {
    type Input = RemappedHour;
    type Output = (RemappedHour, Array2<f64>);

    fn initialize(&mut self, config: &QpeConfig) -> QpeResult<()> {
        self.converter = Some(RainRateConverter::from_config(config));
        Ok(())
    }

    fn execute(
        &mut self,
        hour: RemappedHour,
    ) -> QpeResult<StageOutput<(RemappedHour, Array2<f64>)>> {
        let converter = self
            .converter
            .ok_or_else(|| QpeError::Internal("rain-rate stage not initialized".into()))?;
        let qpe = converter
            .hourly_mean(hour.fields.view())
            .ok_or(QpeError::NoScans)?;

        let wet = qpe.iter().filter(|v| !v.is_nan()).count();
        let note = format!(
            "mean rain rate of {} scans, {} of {} cells wet",
            hour.fields.len_of(Axis(0)),
            wet,
            qpe.len()
        );
        self.logger.record(&note);
        Ok(StageOutput::new((hour, qpe), StageMetadata::with_note(note)))
    }

    fn cleanup(&mut self) {
        self.converter = None;
    }
}
