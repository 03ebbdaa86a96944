//! Orchestrator configuration.
//!
//! Configuration lives in /etc/wiremon/config.toml. Every field has a
//! default so a missing or partial file is never an error; the defaults
//! describe the stock Raspberry Pi deployment the installer targets.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// System configuration directory
pub const SYSTEM_CONFIG_DIR: &str = "/etc/wiremon";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Name of the managed systemd unit (without ".service")
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Loopback port the application binds
    #[serde(default = "default_app_port")]
    pub app_port: u16,

    /// External port the reverse proxy listens on
    #[serde(default = "default_external_port")]
    pub external_port: u16,

    /// Alternate port for foreground diagnostic starts
    #[serde(default = "default_diag_port")]
    pub diag_port: u16,

    /// Unix user the service runs as (and whose crontab carries the jobs)
    #[serde(default = "default_run_user")]
    pub run_user: String,

    /// Git repository the application is fetched from
    #[serde(default = "default_repo_url")]
    pub repo_url: String,

    /// Branch tracked by installs and upgrades
    #[serde(default = "default_branch")]
    pub branch: String,

    /// Override for the install directory (defaults to
    /// /home/<run_user>/rss_aggregator)
    #[serde(default)]
    pub install_dir: Option<PathBuf>,

    /// Disk usage percentage that the monitor reports as a warning
    #[serde(default = "default_disk_warn")]
    pub disk_warn_percent: u32,

    /// Disk usage percentage that the monitor reports as a failure
    #[serde(default = "default_disk_fail")]
    pub disk_fail_percent: u32,

    /// Upstream systemd units the application depends on
    #[serde(default = "default_upstream_services")]
    pub upstream_services: Vec<String>,

    /// Host packages the application needs
    #[serde(default = "default_host_packages")]
    pub host_packages: Vec<String>,

    /// Seconds the monitor waits between a restart and its re-check
    #[serde(default = "default_grace_secs")]
    pub monitor_grace_secs: u64,

    /// Seconds the executor waits for the post-condition port check
    #[serde(default = "default_post_condition_secs")]
    pub post_condition_timeout_secs: u64,
}

fn default_service_name() -> String {
    "rss-aggregator".to_string()
}

fn default_app_port() -> u16 {
    5000
}

fn default_external_port() -> u16 {
    80
}

fn default_diag_port() -> u16 {
    5050
}

fn default_run_user() -> String {
    "pi".to_string()
}

fn default_repo_url() -> String {
    "https://github.com/Drew-CodeRGV/TheWirelessMonitor".to_string()
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_disk_warn() -> u32 {
    80
}

fn default_disk_fail() -> u32 {
    90
}

fn default_upstream_services() -> Vec<String> {
    vec!["nginx".to_string(), "ollama".to_string()]
}

fn default_host_packages() -> Vec<String> {
    vec![
        "python3".to_string(),
        "python3-venv".to_string(),
        "python3-pip".to_string(),
        "git".to_string(),
        "nginx".to_string(),
        "sqlite3".to_string(),
    ]
}

fn default_grace_secs() -> u64 {
    10
}

fn default_post_condition_secs() -> u64 {
    30
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        // serde defaults and Default must agree; parse the empty document
        toml::from_str("").unwrap_or_else(|_| unreachable!("all fields have defaults"))
    }
}

impl OrchestratorConfig {
    /// Path to the config file
    pub fn config_path() -> PathBuf {
        PathBuf::from(SYSTEM_CONFIG_DIR).join(CONFIG_FILE)
    }

    /// Load configuration, falling back to defaults when the file is
    /// missing or unreadable. A malformed file is reported, not fatal.
    pub fn load_or_default() -> Self {
        let path = Self::config_path();
        match fs::read_to_string(&path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!("Malformed {}: {} (using defaults)", path.display(), e);
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    /// Disk warn threshold clamped to a sane range
    pub fn effective_disk_warn(&self) -> u32 {
        self.disk_warn_percent.clamp(50, 99)
    }

    /// Disk fail threshold clamped to a sane range, never below warn
    pub fn effective_disk_fail(&self) -> u32 {
        self.disk_fail_percent
            .clamp(50, 99)
            .max(self.effective_disk_warn())
    }

    /// The systemd unit name with its ".service" suffix
    pub fn unit_name(&self) -> String {
        format!("{}.service", self.service_name)
    }
}
