pub mod config;
pub mod gauges;
pub mod runner;
