use anyhow::Context;
use qpecore::product::ProductSummary;
use qpecore::telemetry::MetricsSnapshot;
use serde::Serialize;
use std::fs;
use std::path::Path;

use crate::workflow::runner::WorkflowResult;

/// JSON document written after a run.
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub product: ProductSummary,
    pub gauge_reports: usize,
    pub metrics: MetricsSnapshot,
}

impl RunReport {
    pub fn from_result(result: &WorkflowResult) -> Self {
        Self {
            product: result.product.summary(),
            gauge_reports: result.gauge_reports,
            metrics: result.metrics,
        }
    }

    pub fn headline(&self) -> String {
        let calibration = match self.product.calibration.factor {
            Some(factor) => format!("factor {factor:.3}"),
            None => self
                .product
                .calibration
                .skipped
                .clone()
                .unwrap_or_else(|| "not calibrated".to_string()),
        };
        format!(
            "{} {} -> {}x{} grid from {} scans, {}",
            self.product.attributes.radar_id,
            self.product.attributes.valid_time,
            self.product.shape.0,
            self.product.shape.1,
            self.product.attributes.scan_count,
            calibration
        )
    }

    pub fn write<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating report directory {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self).context("serializing run report")?;
        fs::write(path, json).with_context(|| format!("writing report {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::profile::{write_synthetic_hour, GeneratorConfig};
    use crate::workflow::config::WorkflowConfig;
    use crate::workflow::runner::Runner;

    #[test]
    fn report_serializes_run() {
        let dir = tempfile::tempdir().unwrap();
        let generator = GeneratorConfig {
            scan_count: 1,
            gauge_count: 0,
            ..GeneratorConfig::default()
        };
        let hour = write_synthetic_hour(dir.path(), &generator).unwrap();
        let result = Runner::new(WorkflowConfig::from_args(hour.scans, None, None))
            .execute()
            .unwrap();

        let report = RunReport::from_result(&result);
        assert!(report.headline().contains("gauge count 0 below threshold 30"));

        let path = dir.path().join("out/report.json");
        report.write(&path).unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["product"]["attributes"]["scan_count"], 1);
        assert_eq!(value["metrics"]["scans_decoded"], 1);
    }
}
