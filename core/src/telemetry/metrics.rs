use std::sync::Mutex;

use serde::Serialize;

/// Counters collected over one or more hourly runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub scans_decoded: usize,
    pub decode_errors: usize,
    pub hours_processed: usize,
    pub cells_corrected: usize,
    pub ill_conditioned: usize,
}

pub struct MetricsRecorder {
    inner: Mutex<MetricsSnapshot>,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MetricsSnapshot::default()),
        }
    }

    pub fn record_decoded(&self) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.scans_decoded += 1;
        }
    }

    pub fn record_decode_error(&self) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.decode_errors += 1;
        }
    }

    pub fn record_hour(&self) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.hours_processed += 1;
        }
    }

    pub fn record_correction(&self, corrected: usize, ill_conditioned: usize) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.cells_corrected += corrected;
            metrics.ill_conditioned += ill_conditioned;
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        if let Ok(metrics) = self.inner.lock() {
            *metrics
        } else {
            MetricsSnapshot::default()
        }
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let metrics = MetricsRecorder::new();
        metrics.record_decoded();
        metrics.record_decoded();
        metrics.record_decode_error();
        metrics.record_correction(10, 1);
        metrics.record_correction(5, 0);
        metrics.record_hour();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.scans_decoded, 2);
        assert_eq!(snapshot.decode_errors, 1);
        assert_eq!(snapshot.cells_corrected, 15);
        assert_eq!(snapshot.ill_conditioned, 1);
        assert_eq!(snapshot.hours_processed, 1);
    }
}
