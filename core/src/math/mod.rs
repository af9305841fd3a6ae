pub mod geo;
pub mod matrix;
pub mod stats;

pub use geo::GeoHelper;
pub use matrix::MatrixHelper;
pub use stats::StatsHelper;
