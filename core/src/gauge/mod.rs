pub mod aggregator;
pub mod record;

pub use aggregator::GaugeAggregator;
pub use record::{GaugeReport, HourlyGaugeTotal};
