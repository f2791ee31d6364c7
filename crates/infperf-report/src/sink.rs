//! `ReportSink` reference implementation: writes named JSON blobs to a
//! directory on the local filesystem, the default storage backend before
//! any cloud bucket backend is configured.

use std::fs;
use std::path::{Path, PathBuf};

use infperf_core::traits::ReportSink;
use infperf_core::{Error, Result};
use serde_json::Value;

/// Writes `<prefix><name>.json` under `dir`, creating the directory if it
/// doesn't exist yet. `prefix` mirrors `report_file_prefix` in the storage
/// config, letting one directory hold reports from multiple runs.
pub struct LocalFileReportSink {
    dir: PathBuf,
    prefix: String,
}

impl LocalFileReportSink {
    pub fn new(dir: impl Into<PathBuf>, prefix: Option<String>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(LocalFileReportSink { dir, prefix: prefix.unwrap_or_default() })
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}{name}.json", self.prefix))
    }
}

impl ReportSink for LocalFileReportSink {
    fn write(&self, name: &str, value: &Value) -> Result<()> {
        let path = self.path_for(name);
        let text = serde_json::to_string_pretty(value).map_err(Error::Json)?;
        fs::write(&path, text)?;
        tracing::debug!(path = %path.display(), "wrote report file");
        Ok(())
    }
}

/// True if `dir` exists and is writable enough to hold reports — a light
/// preflight check the CLI runs before starting a load run, so a bad
/// `storage.local_storage.path` fails fast instead of after the run.
pub fn check_writable(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)?;
    let probe = dir.join(".infperf-write-check");
    fs::write(&probe, b"ok")?;
    fs::remove_file(&probe)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn writes_named_json_file_with_prefix() {
        let tmp = tempfile::tempdir().unwrap();
        let sink = LocalFileReportSink::new(tmp.path(), Some("run1_".to_string())).unwrap();
        sink.write("summary_lifecycle_metrics", &json!({"count": 3})).unwrap();
        let contents = fs::read_to_string(tmp.path().join("run1_summary_lifecycle_metrics.json")).unwrap();
        assert!(contents.contains("\"count\": 3"));
    }

    #[test]
    fn check_writable_succeeds_for_new_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("nested");
        check_writable(&nested).unwrap();
        assert!(nested.is_dir());
    }
}
