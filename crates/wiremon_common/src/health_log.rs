//! Rolling health record log (JSONL).
//!
//! Appended by the health monitor, read by the diagnostics collector and
//! by operators. One line per check result; re-checks after a remediation
//! are their own records, so restart history stays visible across
//! invocations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckResult {
    Pass,
    Fail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthRecord {
    pub timestamp: DateTime<Utc>,
    pub check_name: String,
    pub result: CheckResult,
    /// True when this record's failure triggered a restart attempt
    pub remediation_taken: bool,
    /// True when this record is the re-check that followed a remediation
    #[serde(default)]
    pub recheck: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl HealthRecord {
    pub fn new(check_name: &str, result: CheckResult) -> Self {
        Self {
            timestamp: Utc::now(),
            check_name: check_name.to_string(),
            result,
            remediation_taken: false,
            recheck: false,
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Append one record to the log, creating parent directories as needed
pub fn append(path: &Path, record: &HealthRecord) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string(record)?;
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{}", json)
}

/// Read the last `n` records; a missing log is just empty history
pub fn read_last(path: &Path, n: usize) -> Vec<HealthRecord> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(_) => return Vec::new(),
    };
    let records: Vec<HealthRecord> = content
        .lines()
        .filter_map(|line| serde_json::from_str(line).ok())
        .collect();
    let skip = records.len().saturating_sub(n);
    records.into_iter().skip(skip).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("health.jsonl");

        append(&path, &HealthRecord::new("http-port", CheckResult::Fail)).unwrap();
        let mut recheck = HealthRecord::new("http-port", CheckResult::Pass);
        recheck.recheck = true;
        append(&path, &recheck).unwrap();

        let records = read_last(&path, 10);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].result, CheckResult::Fail);
        assert!(records[1].recheck);
    }

    #[test]
    fn test_read_last_limits() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("health.jsonl");
        for i in 0..20 {
            let rec = HealthRecord::new(&format!("check-{}", i), CheckResult::Pass);
            append(&path, &rec).unwrap();
        }
        let records = read_last(&path, 5);
        assert_eq!(records.len(), 5);
        assert_eq!(records[4].check_name, "check-19");
    }

    #[test]
    fn test_missing_log_is_empty_history() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_last(&dir.path().join("absent.jsonl"), 5).is_empty());
    }

    #[test]
    fn test_garbage_lines_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("health.jsonl");
        append(&path, &HealthRecord::new("disk-space", CheckResult::Pass)).unwrap();
        std::fs::write(
            &path,
            format!(
                "{}\nnot json at all\n",
                std::fs::read_to_string(&path).unwrap().trim()
            ),
        )
        .unwrap();
        assert_eq!(read_last(&path, 10).len(), 1);
    }
}
