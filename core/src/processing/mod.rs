pub mod calibration;
pub mod rain_rate;
pub mod remap;

pub use calibration::{
    CalibratedFields, CalibrationInput, CalibrationOutcome, CalibrationStage, CalibrationSummary,
    Calibrator,
};
pub use rain_rate::{RainRateConverter, RainRateStage};
pub use remap::{CartesianRemapper, RemapStage, RemappedHour};
