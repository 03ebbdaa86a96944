//! Environment inspector: a point-in-time, read-only view of the host.
//!
//! Both the decision engine and the diagnostics collector read the host
//! through this module, so their view of "what exists" is identical. No
//! probe is allowed to abort the inspection; anything that errors (missing
//! tool, permission denied) degrades its field to absent/false.

use crate::config::OrchestratorConfig;
use crate::paths::HostPaths;
use serde::{Deserialize, Serialize};
use std::process::Command;
use tracing::debug;

/// Summary of what currently exists on the host. Derived fresh on every
/// invocation, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallationState {
    pub install_dir_present: bool,
    pub service_registered: bool,
    pub data_store_present: bool,
    pub runtime_env_present: bool,
    pub host_packages_present: bool,
    pub current_version: Option<String>,
}

impl InstallationState {
    /// True when nothing of the installation exists yet
    pub fn is_fresh_host(&self) -> bool {
        !self.install_dir_present
    }

    /// Lines for operator display
    pub fn summary_lines(&self) -> Vec<(String, bool)> {
        vec![
            ("install directory".to_string(), self.install_dir_present),
            ("systemd unit".to_string(), self.service_registered),
            ("data store".to_string(), self.data_store_present),
            ("runtime environment".to_string(), self.runtime_env_present),
            ("host packages".to_string(), self.host_packages_present),
        ]
    }
}

/// Inspect the host. Read-only and infallible by contract.
pub fn inspect(config: &OrchestratorConfig, paths: &HostPaths) -> InstallationState {
    let install_dir_present = paths.install_dir.is_dir();
    let data_store_present = paths.data_store().is_file();
    let runtime_env_present = paths.venv_python().is_file();
    let service_registered = probe_unit_registered(&config.unit_name());
    let host_packages_present = probe_host_packages(&config.host_packages);
    let current_version = if install_dir_present {
        probe_version(paths)
    } else {
        None
    };

    let state = InstallationState {
        install_dir_present,
        service_registered,
        data_store_present,
        runtime_env_present,
        host_packages_present,
        current_version,
    };
    debug!("Inspected host: {:?}", state);
    state
}

/// Whether systemd knows the unit. Errors degrade to false.
pub fn probe_unit_registered(unit: &str) -> bool {
    Command::new("systemctl")
        .args(["cat", unit])
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Whether every required host package is installed. Errors degrade to false.
fn probe_host_packages(packages: &[String]) -> bool {
    packages.iter().all(|pkg| {
        Command::new("dpkg")
            .args(["-s", pkg])
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    })
}

/// Read the installed version from version.json, falling back to the git
/// head commit. Absence is not an error.
fn probe_version(paths: &HostPaths) -> Option<String> {
    if let Ok(content) = std::fs::read_to_string(paths.version_file()) {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(&content) {
            if let Some(version) = value.get("version").and_then(|v| v.as_str()) {
                return Some(version.to_string());
            }
        }
    }

    let output = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .current_dir(&paths.install_dir)
        .output()
        .ok()?;
    if output.status.success() {
        let head = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if head.is_empty() {
            None
        } else {
            Some(format!("git-{}", head))
        }
    } else {
        None
    }
}
