//! Release checking against the application's GitHub repository.
//!
//! Prefers the latest release tag; when the repository publishes no
//! releases, falls back to comparing the tracked branch's head commit with
//! the local checkout. Used by `status` for display and by the upgrade
//! plan's idempotency check.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateInfo {
    pub current_version: String,
    pub latest_version: String,
    pub is_update_available: bool,
    pub release_notes_url: Option<String>,
    pub published_at: Option<String>,
}

/// Derive the GitHub API base ("owner/repo") from a repository URL
pub fn repo_slug(repo_url: &str) -> Option<String> {
    let trimmed = repo_url.trim_end_matches('/').trim_end_matches(".git");
    let mut parts = trimmed.rsplit('/');
    let repo = parts.next()?;
    let owner = parts.next()?;
    if owner.is_empty() || repo.is_empty() || owner.contains(':') {
        return None;
    }
    Some(format!("{}/{}", owner, repo))
}

/// Check the repository for a newer version than `current_version`,
/// falling back to the head of the tracked `branch` when the repository
/// publishes no releases
pub fn check_for_updates(repo_url: &str, branch: &str, current_version: &str) -> Result<UpdateInfo> {
    let slug = repo_slug(repo_url).context("Unrecognized repository URL")?;
    let client = reqwest::blocking::Client::builder()
        .user_agent("wiremonctl")
        .timeout(Duration::from_secs(10))
        .build()?;

    let url = format!("https://api.github.com/repos/{}/releases/latest", slug);
    let response = client
        .get(&url)
        .send()
        .context("Failed to reach GitHub")?;

    if response.status().is_success() {
        let release: serde_json::Value = response.json().context("Malformed release data")?;
        let latest = release["tag_name"]
            .as_str()
            .context("No tag_name in release")?
            .trim_start_matches('v')
            .to_string();
        info!("Latest release: {}", latest);
        return Ok(UpdateInfo {
            is_update_available: is_newer_version(&latest, current_version),
            current_version: current_version.to_string(),
            latest_version: latest,
            release_notes_url: release["html_url"].as_str().map(|s| s.to_string()),
            published_at: release["published_at"].as_str().map(|s| s.to_string()),
        });
    }

    // No releases published; compare branch head commits instead
    let url = commits_endpoint(&slug, branch);
    let commit: serde_json::Value = client
        .get(&url)
        .send()
        .context("Failed to reach GitHub")?
        .json()
        .context("Malformed commit data")?;
    let head = commit["sha"]
        .as_str()
        .context("No sha in commit data")?
        .chars()
        .take(8)
        .collect::<String>();
    let latest = format!("git-{}", head);
    Ok(UpdateInfo {
        is_update_available: latest != current_version,
        current_version: current_version.to_string(),
        latest_version: latest,
        release_notes_url: commit["html_url"].as_str().map(|s| s.to_string()),
        published_at: None,
    })
}

fn commits_endpoint(slug: &str, branch: &str) -> String {
    format!("https://api.github.com/repos/{}/commits/{}", slug, branch)
}

/// Dotted-numeric version comparison; anything unparseable is "not newer"
pub fn is_newer_version(latest: &str, current: &str) -> bool {
    let parse = |v: &str| -> Option<Vec<u64>> {
        v.trim_start_matches('v')
            .split('.')
            .map(|part| part.parse::<u64>().ok())
            .collect()
    };
    match (parse(latest), parse(current)) {
        (Some(mut l), Some(mut c)) => {
            let len = l.len().max(c.len());
            l.resize(len, 0);
            c.resize(len, 0);
            l > c
        }
        _ => false,
    }
}

/// Record the installed version after a successful install or upgrade
pub fn write_version_info(version_file: &Path, version: &str) -> Result<()> {
    let content = serde_json::to_string_pretty(&serde_json::json!({
        "version": version,
        "updated_at": chrono::Utc::now().to_rfc3339(),
    }))?;
    crate::atomic_write(version_file, &content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_newer_version() {
        assert!(is_newer_version("1.2.0", "1.1.9"));
        assert!(is_newer_version("2.0", "1.9.9"));
        assert!(!is_newer_version("1.2.0", "1.2.0"));
        assert!(!is_newer_version("1.2.0", "1.10.0"));
        // Pads shorter versions with zeros
        assert!(is_newer_version("1.2.1", "1.2"));
        assert!(!is_newer_version("1.2", "1.2.0"));
    }

    #[test]
    fn test_is_newer_version_unparseable() {
        assert!(!is_newer_version("git-a1b2c3d4", "1.0.0"));
        assert!(!is_newer_version("1.0.0", "git-a1b2c3d4"));
    }

    #[test]
    fn test_repo_slug() {
        assert_eq!(
            repo_slug("https://github.com/Drew-CodeRGV/TheWirelessMonitor"),
            Some("Drew-CodeRGV/TheWirelessMonitor".to_string())
        );
        assert_eq!(
            repo_slug("https://github.com/owner/repo.git"),
            Some("owner/repo".to_string())
        );
        assert!(repo_slug("not-a-url").is_none());
    }

    #[test]
    fn test_commit_fallback_tracks_configured_branch() {
        assert_eq!(
            commits_endpoint("owner/repo", "release-2024"),
            "https://api.github.com/repos/owner/repo/commits/release-2024"
        );
    }

    #[test]
    fn test_write_version_info() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("version.json");
        write_version_info(&path, "1.4.0").unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["version"], "1.4.0");
    }
}
