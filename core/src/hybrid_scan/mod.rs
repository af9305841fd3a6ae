pub mod decoder;
pub mod scan;
pub mod writer;

pub use decoder::{decode_file, decode_reader, scan_time_from_name};
pub use scan::{PolarScan, RadarSite};
pub use writer::{scan_file_name, write_file, write_hybrid_scan, RawHybridScan};
