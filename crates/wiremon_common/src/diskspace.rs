//! Disk usage probe for the filesystem holding the install directory.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Command;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DiskUsage {
    pub used_percent: u32,
    pub available_kb: u64,
}

/// Usage of the filesystem containing `path`. Errors degrade to None; the
/// monitor treats an unreadable probe as a skipped check, not a failure.
pub fn usage_for(path: &Path) -> Option<DiskUsage> {
    let output = Command::new("df")
        .args(["-k", &path.display().to_string()])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    parse_df_output(&String::from_utf8_lossy(&output.stdout))
}

/// Parse `df -k` output: header line, then the data line.
/// Columns: filesystem, 1K-blocks, used, available, use%, mountpoint.
pub fn parse_df_output(text: &str) -> Option<DiskUsage> {
    let line = text.lines().nth(1)?;
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 5 {
        return None;
    }
    let available_kb = fields[3].parse::<u64>().ok()?;
    let used_percent = fields[4].trim_end_matches('%').parse::<u32>().ok()?;
    Some(DiskUsage {
        used_percent,
        available_kb,
    })
}
