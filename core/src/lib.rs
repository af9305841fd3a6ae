//! Radar-to-grid remapping and gauge calibration for hourly quantitative
//! precipitation estimation.
//!
//! Hybrid-scan files are decoded into polar reflectivity, remapped onto a
//! radar-centred Cartesian grid, converted to an hourly mean rain rate and
//! calibrated against rain gauges through well-defined processing stages.

pub mod config;
pub mod gauge;
pub mod grid;
pub mod hybrid_scan;
pub mod math;
pub mod pipeline;
pub mod prelude;
pub mod processing;
pub mod product;
pub mod telemetry;

pub use config::{Correlation, QpeConfig, RemapMethod};
pub use pipeline::HourlyPipeline;
pub use prelude::{ProcessingStage, QpeError, QpeResult, StageOutput};
pub use product::QpeGrid;
