//! File sink writing records as JSON lines, with size-based rotation.

use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use futures_util::future::BoxFuture;
use serde::Deserialize;

use crate::export::{Sink, SpanRecord};

fn default_rotate_mb() -> u64 {
    100
}

/// File sink settings.
#[derive(Debug, Clone, Deserialize)]
pub struct FileConfig {
    /// Output path for the JSONL file.
    pub path: PathBuf,
    /// Rotate the file to a timestamped sibling once it exceeds this size.
    #[serde(default = "default_rotate_mb")]
    pub rotate_mb: u64,
}

/// Appends one JSON line per record. Rotation renames the active file to
/// `<path>.<YYYYmmdd_HHMMSS>` once it crosses the size threshold.
#[derive(Debug)]
pub struct FileSink {
    config: FileConfig,
    // Serializes the rotation check and the append.
    write_lock: Mutex<()>,
}

impl FileSink {
    /// File sink for the given path with the default rotation threshold.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_config(FileConfig {
            path: path.into(),
            rotate_mb: default_rotate_mb(),
        })
    }

    /// File sink with explicit settings.
    pub fn with_config(config: FileConfig) -> Self {
        Self {
            config,
            write_lock: Mutex::new(()),
        }
    }

    fn rotate_if_needed(&self) -> std::io::Result<()> {
        let metadata = match fs::metadata(&self.config.path) {
            Ok(metadata) => metadata,
            Err(_) => return Ok(()),
        };
        if metadata.len() < self.config.rotate_mb * 1024 * 1024 {
            return Ok(());
        }
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let mut rotated = self.config.path.clone().into_os_string();
        rotated.push(format!(".{stamp}"));
        fs::rename(&self.config.path, rotated)
    }

    fn write_line(&self, record: &SpanRecord) -> bool {
        let line = match serde_json::to_string(record) {
            Ok(line) => line,
            Err(err) => {
                tracing::warn!(error = %err, "failed to serialize span record");
                return false;
            }
        };
        let result = (|| -> std::io::Result<()> {
            let _guard = self
                .write_lock
                .lock()
                .map_err(|_| std::io::Error::other("file sink lock poisoned"))?;
            self.rotate_if_needed()?;
            let mut file = fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.config.path)?;
            writeln!(file, "{line}")
        })();
        match result {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(
                    path = %self.config.path.display(),
                    error = %err,
                    "failed to write span record"
                );
                false
            }
        }
    }
}

impl Sink for FileSink {
    fn export(&self, record: SpanRecord) -> BoxFuture<'_, bool> {
        let ok = self.write_line(&record);
        Box::pin(async move { ok })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::in_memory::test_record;

    #[tokio::test]
    async fn writes_parseable_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("traces.jsonl");
        let sink = FileSink::new(&path);
        assert!(sink.export(test_record("first")).await);
        assert!(sink.export(test_record("second")).await);

        let contents = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: SpanRecord = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.name, "first");
    }

    #[tokio::test]
    async fn rotates_once_over_the_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("traces.jsonl");
        let sink = FileSink::with_config(FileConfig {
            path: path.clone(),
            rotate_mb: 0,
        });
        assert!(sink.export(test_record("a")).await);
        assert!(sink.export(test_record("b")).await);

        let entries = fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(entries, 2);
    }
}
