//! Decision log persistence
//!
//! JSON-lines files, one record per line:
//! - `decisions_current.jsonl` receives appends
//! - rotated to `decisions_<timestamp>.jsonl` by size or age
//! - rotated files older than the retention period are deleted

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::record::{aggregate, recent, LogQuery, LogRecord, MetricsQuery, MetricsSummary};

const CURRENT_FILE: &str = "decisions_current.jsonl";

/// Configuration for decision log persistence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Directory to store log files
    pub log_dir: PathBuf,

    /// Maximum file size before rotation (bytes)
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    /// Maximum age before rotation (seconds)
    #[serde(default = "default_max_file_age")]
    pub max_file_age_secs: u64,

    /// Retain rotated files for this many days
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    /// Flush to disk after this many records
    #[serde(default = "default_flush_interval")]
    pub flush_interval: usize,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("./logs"),
            max_file_size: default_max_file_size(),
            max_file_age_secs: default_max_file_age(),
            retention_days: default_retention_days(),
            flush_interval: default_flush_interval(),
        }
    }
}

fn default_max_file_size() -> u64 {
    50 * 1024 * 1024
}

fn default_max_file_age() -> u64 {
    86400
}

fn default_retention_days() -> u32 {
    30
}

fn default_flush_interval() -> usize {
    1
}

/// Log file writer with rotation support
pub struct LogWriter {
    config: PersistenceConfig,
    current_file: Option<BufWriter<File>>,
    current_size: u64,
    current_start: SystemTime,
    records_since_flush: usize,
    rotations: u32,
}

impl LogWriter {
    /// Create a writer, appending to any existing current file
    pub fn new(config: PersistenceConfig) -> std::io::Result<Self> {
        std::fs::create_dir_all(&config.log_dir)?;

        let mut writer = Self {
            config,
            current_file: None,
            current_size: 0,
            current_start: SystemTime::now(),
            records_since_flush: 0,
            rotations: 0,
        };

        writer.open_current()?;
        Ok(writer)
    }

    pub fn write_record(&mut self, record: &LogRecord) -> std::io::Result<()> {
        if self.should_rotate() {
            self.rotate()?;
        }

        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        if let Some(ref mut file) = self.current_file {
            file.write_all(line.as_bytes())?;
            self.current_size += line.len() as u64;
            self.records_since_flush += 1;

            if self.records_since_flush >= self.config.flush_interval {
                file.flush()?;
                self.records_since_flush = 0;
            }
        }

        Ok(())
    }

    pub fn flush(&mut self) -> std::io::Result<()> {
        if let Some(ref mut file) = self.current_file {
            file.flush()?;
            self.records_since_flush = 0;
        }
        Ok(())
    }

    fn should_rotate(&self) -> bool {
        if self.current_size >= self.config.max_file_size {
            return true;
        }

        let age = SystemTime::now()
            .duration_since(self.current_start)
            .unwrap_or_default();
        age.as_secs() >= self.config.max_file_age_secs
    }

    fn rotate(&mut self) -> std::io::Result<()> {
        if let Some(ref mut file) = self.current_file {
            file.flush()?;
        }
        self.current_file = None;

        self.rotations += 1;
        let current = self.config.log_dir.join(CURRENT_FILE);
        let rotated = self.config.log_dir.join(format!(
            "decisions_{}_{:04}.jsonl",
            Utc::now().format("%Y%m%dT%H%M%S"),
            self.rotations
        ));
        match std::fs::rename(&current, &rotated) {
            Ok(()) => info!(path = %rotated.display(), "Rotated decision log"),
            Err(e) => warn!(error = %e, "Failed to rotate decision log"),
        }

        self.open_current()?;

        if let Err(e) = self.cleanup_old_files() {
            warn!(error = %e, "Failed to clean up old decision logs");
        }

        Ok(())
    }

    fn open_current(&mut self) -> std::io::Result<()> {
        let path = self.config.log_dir.join(CURRENT_FILE);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        self.current_size = file.metadata()?.len();
        self.current_start = SystemTime::now();
        self.current_file = Some(BufWriter::new(file));
        self.records_since_flush = 0;
        Ok(())
    }

    fn cleanup_old_files(&self) -> std::io::Result<()> {
        let retention = Duration::from_secs(self.config.retention_days as u64 * 86400);
        let Some(cutoff) = SystemTime::now().checked_sub(retention) else {
            return Ok(());
        };

        for path in log_files(&self.config.log_dir)? {
            if path.file_name().is_some_and(|n| n == CURRENT_FILE) {
                continue;
            }

            let modified = std::fs::metadata(&path).and_then(|m| m.modified());
            if matches!(modified, Ok(modified) if modified < cutoff) {
                info!(path = %path.display(), "Removing expired decision log");
                std::fs::remove_file(&path)?;
            }
        }

        Ok(())
    }
}

/// Reader over every log file in the directory
#[derive(Debug, Clone)]
pub struct LogReader {
    config: PersistenceConfig,
}

impl LogReader {
    pub fn new(config: PersistenceConfig) -> Self {
        Self { config }
    }

    /// Every parseable record, oldest file first
    pub fn read_all(&self) -> std::io::Result<Vec<LogRecord>> {
        if !self.config.log_dir.exists() {
            return Ok(Vec::new());
        }

        let mut records = Vec::new();
        for path in log_files(&self.config.log_dir)? {
            let reader = BufReader::new(File::open(&path)?);
            for line in reader.lines() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<LogRecord>(&line) {
                    Ok(record) => records.push(record),
                    Err(e) => debug!(path = %path.display(), error = %e, "Skipping unparseable log line"),
                }
            }
        }
        Ok(records)
    }

    pub fn query_logs(&self, query: &LogQuery) -> std::io::Result<Vec<LogRecord>> {
        Ok(recent(self.read_all()?, query))
    }

    pub fn summarize(&self, query: &MetricsQuery) -> std::io::Result<MetricsSummary> {
        Ok(aggregate(&self.read_all()?, query))
    }
}

/// `.jsonl` files in `dir`, rotated files (oldest first) before the current one
fn log_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().is_some_and(|e| e == "jsonl") {
            files.push(path);
        }
    }
    files.sort_by_key(|p| (p.file_name().is_some_and(|n| n == CURRENT_FILE), p.clone()));
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use promptwall_core::{Decision, DecisionStatus};
    use tempfile::TempDir;

    fn test_config(dir: &Path) -> PersistenceConfig {
        PersistenceConfig {
            log_dir: dir.to_path_buf(),
            max_file_size: 1024 * 1024,
            max_file_age_secs: 3600,
            retention_days: 7,
            flush_interval: 1,
        }
    }

    fn blocked(agent: &str) -> LogRecord {
        LogRecord::from_decision(&Decision::blocked_by_intent("jailbreak"), Some(agent))
    }

    #[test]
    fn test_write_and_read_records() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(temp_dir.path());

        {
            let mut writer = LogWriter::new(config.clone()).unwrap();
            writer.write_record(&blocked("a")).unwrap();
            writer.write_record(&blocked("b")).unwrap();
            writer.flush().unwrap();
        }

        let reader = LogReader::new(config);
        let records = reader.read_all().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].agent_id.as_deref(), Some("a"));

        let summary = reader.summarize(&MetricsQuery::new()).unwrap();
        assert_eq!(summary.blocked, 2);
    }

    #[test]
    fn test_rotation_keeps_all_records_readable() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = test_config(temp_dir.path());
        config.max_file_size = 200;

        {
            let mut writer = LogWriter::new(config.clone()).unwrap();
            for i in 0..5 {
                writer.write_record(&blocked(&format!("agent-{}", i))).unwrap();
            }
            writer.flush().unwrap();
        }

        let files = log_files(temp_dir.path()).unwrap();
        assert!(files.len() > 1);
        assert!(files.last().unwrap().ends_with(CURRENT_FILE));

        let reader = LogReader::new(config);
        assert_eq!(reader.read_all().unwrap().len(), 5);
    }

    #[test]
    fn test_query_logs_skips_garbage() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(temp_dir.path());

        {
            let mut writer = LogWriter::new(config.clone()).unwrap();
            writer.write_record(&blocked("a")).unwrap();
        }
        let mut file = OpenOptions::new()
            .append(true)
            .open(temp_dir.path().join(CURRENT_FILE))
            .unwrap();
        writeln!(file, "{{not json").unwrap();

        let reader = LogReader::new(config);
        let logs = reader
            .query_logs(&LogQuery::new().status(DecisionStatus::Blocked))
            .unwrap();
        assert_eq!(logs.len(), 1);
    }

    #[test]
    fn test_missing_directory_reads_empty() {
        let reader = LogReader::new(test_config(Path::new("/nonexistent/promptwall/logs")));
        assert!(reader.read_all().unwrap().is_empty());
    }
}
