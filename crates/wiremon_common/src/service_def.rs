//! Service definition writer: renders and installs the artifacts that let
//! the host run the application.
//!
//! Three artifacts, all owned exclusively by this module and overwritten
//! (never merged) on every install: the systemd unit, the nginx site, and
//! this service's section of the user crontab. The crontab rewrite is
//! filter-then-append against a marker comment, so repeated installs never
//! duplicate entries and unrelated entries are never disturbed.

use crate::config::OrchestratorConfig;
use crate::paths::HostPaths;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::process::{Command, Stdio};
use tracing::{info, warn};

/// Generated artifacts for one service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceDefinition {
    pub unit_name: String,
    pub unit_text: String,
    pub nginx_site_text: String,
    pub cron_entries: Vec<String>,
    pub cron_marker: String,
}

/// One scheduled job: cadence plus command line
#[derive(Debug, Clone)]
pub struct CronJob {
    pub cadence: String,
    pub command: String,
}

impl CronJob {
    fn render(&self, marker: &str) -> String {
        format!("{} {} {}", self.cadence, self.command, marker)
    }
}

/// Supervisor-visible activation states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    NotRegistered,
    Stopped,
    Running,
    Failed,
}

/// Render every artifact for the configured service
pub fn write(config: &OrchestratorConfig, paths: &HostPaths) -> ServiceDefinition {
    let marker = cron_marker(&config.service_name);
    let jobs = default_jobs(paths);
    ServiceDefinition {
        unit_name: config.unit_name(),
        unit_text: render_unit(config, paths),
        nginx_site_text: render_nginx_site(config, paths),
        cron_entries: jobs.iter().map(|j| j.render(&marker)).collect(),
        cron_marker: marker,
    }
}

/// Marker comment identifying this service's crontab entries
pub fn cron_marker(service_name: &str) -> String {
    format!("# wiremon:{}", service_name)
}

/// Periodic jobs the managed application needs: the RSS fetch, the update
/// check, and the health monitor itself.
fn default_jobs(paths: &HostPaths) -> Vec<CronJob> {
    let install = paths.install_dir.display().to_string();
    let python = paths.venv_python().display().to_string();
    vec![
        CronJob {
            cadence: "0 */6 * * *".to_string(),
            command: format!("cd {} && {} -m app.rss_fetcher", install, python),
        },
        CronJob {
            cadence: "0 */8 * * *".to_string(),
            command: format!("cd {} && {} scripts/auto_update.py", install, python),
        },
        CronJob {
            cadence: "*/15 * * * *".to_string(),
            command: "/usr/local/bin/wiremonctl monitor".to_string(),
        },
    ]
}

fn render_unit(config: &OrchestratorConfig, paths: &HostPaths) -> String {
    format!(
        "[Unit]\n\
         Description=Wireless Monitor RSS aggregator\n\
         After=network.target\n\
         \n\
         [Service]\n\
         Type=simple\n\
         User={user}\n\
         WorkingDirectory={install}\n\
         Environment=WIREMON_INSTALL_DIR={install}\n\
         ExecStart={python} app/main.py\n\
         Restart=always\n\
         RestartSec=10\n\
         \n\
         [Install]\n\
         WantedBy=multi-user.target\n",
        user = config.run_user,
        install = paths.install_dir.display(),
        python = paths.venv_python().display(),
    )
}

fn render_nginx_site(config: &OrchestratorConfig, paths: &HostPaths) -> String {
    format!(
        "server {{\n\
         \x20   listen {external};\n\
         \x20   server_name _;\n\
         \n\
         \x20   location /static/ {{\n\
         \x20       alias {static_dir}/;\n\
         \x20       expires 30d;\n\
         \x20       add_header Cache-Control \"public\";\n\
         \x20   }}\n\
         \n\
         \x20   location / {{\n\
         \x20       proxy_pass http://127.0.0.1:{app};\n\
         \x20       proxy_set_header Host $host;\n\
         \x20       proxy_set_header X-Real-IP $remote_addr;\n\
         \x20       proxy_set_header X-Forwarded-For $proxy_add_x_forwarded_for;\n\
         \x20       proxy_set_header X-Forwarded-Proto $scheme;\n\
         \x20   }}\n\
         }}\n",
        external = config.external_port,
        app = config.app_port,
        static_dir = paths.static_dir().display(),
    )
}

/// Merge this service's entries into an existing crontab text.
///
/// Pure function: drops every line carrying the marker, keeps everything
/// else untouched, appends the new entries. Running it twice with the same
/// entries yields the same text.
pub fn merge_cron_lines(existing: &str, entries: &[String], marker: &str) -> String {
    let mut lines: Vec<String> = existing
        .lines()
        .filter(|line| !line.contains(marker))
        .map(|line| line.to_string())
        .collect();
    while lines.last().map(|l| l.trim().is_empty()).unwrap_or(false) {
        lines.pop();
    }
    for entry in entries {
        lines.push(entry.clone());
    }
    let mut text = lines.join("\n");
    if !text.is_empty() {
        text.push('\n');
    }
    text
}

/// Read a user's crontab; an empty or missing crontab is just empty text
pub fn read_crontab(user: &str) -> String {
    let output = Command::new("crontab").args(["-l", "-u", user]).output();
    match output {
        Ok(o) if o.status.success() => String::from_utf8_lossy(&o.stdout).to_string(),
        _ => String::new(),
    }
}

/// Replace this service's section of the user's crontab atomically:
/// read full list, filter out marker entries, append, write back.
pub fn write_scheduled_jobs(user: &str, entries: &[String], marker: &str) -> Result<()> {
    let existing = read_crontab(user);
    let merged = merge_cron_lines(&existing, entries, marker);

    let mut child = Command::new("crontab")
        .args(["-u", user, "-"])
        .stdin(Stdio::piped())
        .spawn()
        .context("Failed to invoke crontab")?;
    child
        .stdin
        .as_mut()
        .context("No stdin handle for crontab")?
        .write_all(merged.as_bytes())?;
    let status = child.wait()?;
    if !status.success() {
        bail!("crontab rejected the new job list for user {}", user);
    }
    info!("Installed {} scheduled jobs for {}", entries.len(), user);
    Ok(())
}

/// Write the unit and proxy artifacts to their host-managed locations,
/// reload the supervisor's unit index, and enable the unit for boot.
pub fn install(def: &ServiceDefinition, config: &OrchestratorConfig, paths: &HostPaths) -> Result<()> {
    install_artifact(&def.unit_text, &paths.unit_file)?;
    install_artifact(&def.nginx_site_text, &paths.nginx_site)?;

    let status = elevated(&[
        "ln",
        "-sf",
        &paths.nginx_site.display().to_string(),
        &paths.nginx_site_link.display().to_string(),
    ])?;
    if !status {
        bail!("Failed to enable nginx site");
    }

    if !elevated(&["systemctl", "daemon-reload"])? {
        bail!("systemctl daemon-reload failed");
    }
    if !elevated(&["systemctl", "enable", &def.unit_name])? {
        bail!("Failed to enable {}", def.unit_name);
    }

    // Reload the proxy only if its config validates; a broken nginx config
    // should surface here, not take the front door down.
    if elevated(&["nginx", "-t"])? {
        if !elevated(&["systemctl", "reload", "nginx"])? {
            warn!("nginx reload failed; site installed but not yet live");
        }
    } else {
        bail!("nginx rejected the generated site configuration");
    }

    write_scheduled_jobs(&config.run_user, &def.cron_entries, &def.cron_marker)?;
    info!("Service definition installed for {}", def.unit_name);
    Ok(())
}

/// Remove every artifact this writer owns. Only explicit clean operations
/// call this.
pub fn remove(config: &OrchestratorConfig, paths: &HostPaths) -> Result<()> {
    let unit = config.unit_name();
    let _ = elevated(&["systemctl", "disable", "--now", &unit]);
    for path in [&paths.unit_file, &paths.nginx_site_link, &paths.nginx_site] {
        let _ = elevated(&["rm", "-f", &path.display().to_string()]);
    }
    let _ = elevated(&["systemctl", "daemon-reload"]);
    write_scheduled_jobs(&config.run_user, &[], &cron_marker(&config.service_name))?;
    info!("Service definition removed for {}", unit);
    Ok(())
}

/// Current activation state of a unit
pub fn service_state(unit: &str) -> ServiceState {
    let registered = crate::inspect::probe_unit_registered(unit);
    let is_active = Command::new("systemctl")
        .args(["is-active", unit])
        .output()
        .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string())
        .unwrap_or_default();
    classify_state(registered, &is_active)
}

/// Pure classification of supervisor output into the activation states
pub fn classify_state(registered: bool, is_active_output: &str) -> ServiceState {
    if !registered {
        return ServiceState::NotRegistered;
    }
    match is_active_output {
        "active" | "activating" => ServiceState::Running,
        "failed" => ServiceState::Failed,
        _ => ServiceState::Stopped,
    }
}

/// Start a unit; an already-running unit is success, not an error
pub fn start_service(unit: &str) -> Result<()> {
    if service_state(unit) == ServiceState::Running {
        info!("{} already running", unit);
        return Ok(());
    }
    if !elevated(&["systemctl", "start", unit])? {
        bail!("Failed to start {}", unit);
    }
    Ok(())
}

/// Restart a unit (used by quick fix and the health monitor)
pub fn restart_service(unit: &str) -> Result<()> {
    if !elevated(&["systemctl", "restart", unit])? {
        bail!("Failed to restart {}", unit);
    }
    Ok(())
}

pub fn stop_service(unit: &str) -> Result<()> {
    // Stopping an already-stopped unit succeeds; only a real error fails
    if !elevated(&["systemctl", "stop", unit])? {
        bail!("Failed to stop {}", unit);
    }
    Ok(())
}

fn install_artifact(text: &str, dest: &std::path::Path) -> Result<()> {
    if crate::is_root() {
        crate::atomic_write(dest, text)?;
        return Ok(());
    }
    let tmp = std::env::temp_dir().join(format!(
        "wiremon-artifact-{}",
        dest.file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "unnamed".to_string())
    ));
    std::fs::write(&tmp, text)?;
    if !elevated(&[
        "cp",
        &tmp.display().to_string(),
        &dest.display().to_string(),
    ])? {
        bail!("Failed to install {}", dest.display());
    }
    let _ = std::fs::remove_file(&tmp);
    Ok(())
}

/// Run a host-mutating command, with sudo when not already root
fn elevated(args: &[&str]) -> Result<bool> {
    let status = if crate::is_root() {
        Command::new(args[0]).args(&args[1..]).status()
    } else {
        Command::new("sudo").args(args).status()
    };
    Ok(status
        .with_context(|| format!("Failed to execute {}", args[0]))?
        .success())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_setup() -> (OrchestratorConfig, HostPaths) {
        let config = OrchestratorConfig::default();
        let paths = HostPaths::from_config(&config);
        (config, paths)
    }

    #[test]
    fn test_unit_pins_restart_policy_and_workdir() {
        let (config, paths) = test_setup();
        let def = write(&config, &paths);
        assert!(def.unit_text.contains("Restart=always"));
        assert!(def.unit_text.contains("RestartSec=10"));
        assert!(def.unit_text.contains("After=network.target"));
        assert!(def.unit_text.contains("User=pi"));
        assert!(def
            .unit_text
            .contains("WorkingDirectory=/home/pi/rss_aggregator"));
        assert!(def
            .unit_text
            .contains("Environment=WIREMON_INSTALL_DIR=/home/pi/rss_aggregator"));
    }

    #[test]
    fn test_nginx_site_proxies_and_carves_static() {
        let (config, paths) = test_setup();
        let def = write(&config, &paths);
        assert!(def.nginx_site_text.contains("listen 80;"));
        assert!(def
            .nginx_site_text
            .contains("proxy_pass http://127.0.0.1:5000;"));
        assert!(def.nginx_site_text.contains("X-Forwarded-Proto"));
        assert!(def.nginx_site_text.contains("location /static/"));
        assert!(def.nginx_site_text.contains("expires 30d;"));
    }

    #[test]
    fn test_cron_entries_carry_marker() {
        let (config, paths) = test_setup();
        let def = write(&config, &paths);
        assert!(!def.cron_entries.is_empty());
        for entry in &def.cron_entries {
            assert!(entry.ends_with(&def.cron_marker));
        }
    }

    #[test]
    fn test_merge_cron_idempotent() {
        let marker = cron_marker("rss-aggregator");
        let entries = vec![
            format!("0 */6 * * * run-fetch {}", marker),
            format!("*/15 * * * * wiremonctl monitor {}", marker),
        ];
        let once = merge_cron_lines("", &entries, &marker);
        let twice = merge_cron_lines(&once, &entries, &marker);
        assert_eq!(once, twice);
        assert_eq!(
            twice.matches("run-fetch").count(),
            1,
            "repeated installs must not duplicate entries"
        );
    }

    #[test]
    fn test_merge_cron_preserves_unrelated_lines() {
        let marker = cron_marker("rss-aggregator");
        let existing = "MAILTO=ops@example.com\n0 3 * * * /usr/bin/certbot renew\n";
        let entries = vec![format!("0 */6 * * * run-fetch {}", marker)];
        let merged = merge_cron_lines(existing, &entries, &marker);
        assert!(merged.contains("MAILTO=ops@example.com"));
        assert!(merged.contains("certbot renew"));
        assert!(merged.contains("run-fetch"));
    }

    #[test]
    fn test_merge_cron_empty_entries_removes_section() {
        let marker = cron_marker("rss-aggregator");
        let existing = format!(
            "0 3 * * * certbot renew\n0 */6 * * * run-fetch {}\n",
            marker
        );
        let merged = merge_cron_lines(&existing, &[], &marker);
        assert!(merged.contains("certbot renew"));
        assert!(!merged.contains("run-fetch"));
    }

    #[test]
    fn test_classify_state() {
        assert_eq!(classify_state(false, "inactive"), ServiceState::NotRegistered);
        assert_eq!(classify_state(true, "active"), ServiceState::Running);
        assert_eq!(classify_state(true, "failed"), ServiceState::Failed);
        assert_eq!(classify_state(true, "inactive"), ServiceState::Stopped);
        assert_eq!(classify_state(true, ""), ServiceState::Stopped);
    }

    #[test]
    fn test_default_jobs_include_monitor_and_fetch() {
        let (_, paths) = test_setup();
        let jobs = default_jobs(&paths);
        assert!(jobs.iter().any(|j| j.command.contains("rss_fetcher")));
        assert!(jobs.iter().any(|j| j.command.contains("wiremonctl monitor")));
        assert!(jobs.iter().any(|j| j.command.contains("auto_update")));
    }
}
