//! Operation record log (JSONL).
//!
//! One record per orchestrator run: which plan ran, what it moved the
//! version from and to, and where it stopped if it aborted. The original
//! deployment kept this in the application's database; it lives in a file
//! here because the data store belongs to the managed application.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationRecord {
    /// Run id (UUID)
    pub run_id: String,
    /// Plan mode name (fresh-install, clean-install, upgrade, quick-fix)
    pub mode: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_step: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_from: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_to: Option<String>,
    /// Steps that completed, for operator resumption after an abort
    #[serde(default)]
    pub completed_steps: Vec<String>,
}

impl OperationRecord {
    pub fn generate_run_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

/// Append one record, creating parent directories as needed
pub fn append(path: &Path, record: &OperationRecord) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string(record)?;
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{}", json)
}

/// Read the most recent record, if any
pub fn read_latest(path: &Path) -> Option<OperationRecord> {
    let content = std::fs::read_to_string(path).ok()?;
    content
        .lines()
        .rev()
        .find_map(|line| serde_json::from_str(line).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(mode: &str, success: bool) -> OperationRecord {
        OperationRecord {
            run_id: OperationRecord::generate_run_id(),
            mode: mode.to_string(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            success,
            failed_step: None,
            version_from: None,
            version_to: Some("1.4.0".to_string()),
            completed_steps: vec!["fetch-application".to_string()],
        }
    }

    #[test]
    fn test_append_and_read_latest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ops.jsonl");
        append(&path, &record("upgrade", true)).unwrap();
        append(&path, &record("quick-fix", false)).unwrap();

        let latest = read_latest(&path).unwrap();
        assert_eq!(latest.mode, "quick-fix");
        assert!(!latest.success);
    }

    #[test]
    fn test_read_latest_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_latest(&dir.path().join("none.jsonl")).is_none());
    }
}
