use anyhow::Context;
use qpecore::QpeConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

fn default_min_scans() -> usize {
    1
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkflowConfig {
    #[serde(default)]
    pub qpe: QpeConfig,
    #[serde(default)]
    pub scans: Vec<PathBuf>,
    #[serde(default)]
    pub gauges: Option<PathBuf>,
    #[serde(default)]
    pub output: Option<PathBuf>,
    /// Hours with fewer scan files are refused.
    #[serde(default = "default_min_scans")]
    pub min_scans: usize,
}

impl WorkflowConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref)
            .with_context(|| format!("reading workflow config {}", path_ref.display()))?;
        let mut config: WorkflowConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing workflow config {}", path_ref.display()))?;
        if let Some(base) = path_ref.parent() {
            config.resolve_relative(base);
        }
        config
            .qpe
            .validate()
            .with_context(|| format!("validating workflow config {}", path_ref.display()))?;
        Ok(config)
    }

    pub fn from_args(scans: Vec<PathBuf>, gauges: Option<PathBuf>, output: Option<PathBuf>) -> Self {
        Self {
            qpe: QpeConfig::default(),
            scans,
            gauges,
            output,
            min_scans: default_min_scans(),
        }
    }

    /// Scan and gauge paths in the YAML are relative to the file itself.
    fn resolve_relative(&mut self, base: &Path) {
        for scan in &mut self.scans {
            if scan.is_relative() {
                *scan = base.join(&*scan);
            }
        }
        if let Some(gauges) = self.gauges.as_mut().filter(|g| g.is_relative()) {
            *gauges = base.join(&*gauges);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qpecore::RemapMethod;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn config_from_args_uses_defaults() {
        let cfg = WorkflowConfig::from_args(vec![PathBuf::from("a.bin")], None, None);
        assert_eq!(cfg.min_scans, 1);
        assert_eq!(cfg.qpe.stn_num, 30);
        assert_eq!(cfg.scans.len(), 1);
    }

    #[test]
    fn config_load_reads_yaml() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(
            b"qpe:\n  A: 200\n  method: cressman2d\n  gridReso: 500\nscans:\n  - scan.bin\n  - /abs/scan.bin\ngauges: gauges.csv\nmin_scans: 8\n",
        )
        .unwrap();
        let path = temp.into_temp_path();
        let cfg = WorkflowConfig::load(&path).unwrap();
        let base = path.parent().unwrap();

        assert_eq!(cfg.qpe.a_coefficient, 200.0);
        assert_eq!(cfg.qpe.b, 1.4);
        assert_eq!(cfg.qpe.method, RemapMethod::Cressman);
        assert_eq!(cfg.qpe.grid_reso, 500.0);
        assert_eq!(cfg.min_scans, 8);
        assert_eq!(cfg.scans[0], base.join("scan.bin"));
        assert_eq!(cfg.scans[1], PathBuf::from("/abs/scan.bin"));
        assert_eq!(cfg.gauges, Some(base.join("gauges.csv")));
    }

    #[test]
    fn config_load_rejects_invalid_parameters() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(b"qpe:\n  K_min: 3.0\n  K_max: 2.0\n").unwrap();
        let path = temp.into_temp_path();
        assert!(WorkflowConfig::load(&path).is_err());
    }
}
