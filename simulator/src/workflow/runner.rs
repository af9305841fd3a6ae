use crate::workflow::config::WorkflowConfig;
use crate::workflow::gauges::load_gauge_reports;
use anyhow::{bail, Context};
use qpecore::gauge::GaugeReport;
use qpecore::telemetry::MetricsSnapshot;
use qpecore::{HourlyPipeline, QpeGrid};

pub struct WorkflowResult {
    pub product: QpeGrid,
    pub gauge_reports: usize,
    pub metrics: MetricsSnapshot,
}

#[derive(Clone)]
pub struct Runner {
    config: WorkflowConfig,
}

impl Runner {
    pub fn new(config: WorkflowConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    pub fn execute(&self) -> anyhow::Result<WorkflowResult> {
        let reports = match &self.config.gauges {
            Some(path) => load_gauge_reports(path)?,
            None => Vec::new(),
        };
        self.execute_with(&reports)
    }

    pub fn execute_with(&self, reports: &[GaugeReport]) -> anyhow::Result<WorkflowResult> {
        let scans = &self.config.scans;
        if scans.len() < self.config.min_scans {
            bail!(
                "not enough scan files: {} (need at least {})",
                scans.len(),
                self.config.min_scans
            );
        }

        let pipeline =
            HourlyPipeline::new(self.config.qpe.clone()).context("configuring hourly pipeline")?;
        let product = pipeline
            .run(scans, reports)
            .with_context(|| format!("processing {} scan files", scans.len()))?;
        log::info!(
            "hour {} done: {} scans, {} gauge reports",
            product.attributes.valid_time,
            scans.len(),
            reports.len()
        );

        Ok(WorkflowResult {
            product,
            gauge_reports: reports.len(),
            metrics: pipeline.metrics(),
        })
    }
}
