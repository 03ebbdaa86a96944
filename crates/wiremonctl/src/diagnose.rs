//! Diagnostics collector behind `wiremonctl diagnose`.
//!
//! Read-mostly: gathers the inspector snapshot, unit states, recent
//! supervisor and application log lines, and recent health records. Its one
//! active probe starts the application in the foreground on the alternate
//! diagnostic port to separate "application is broken" from "service
//! wiring is broken". The managed service itself is never touched.

use anyhow::Result;
use std::io::Read;
use std::net::{SocketAddr, TcpStream};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};
use tracing::info;
use wiremon_common::health_log::{self, HealthRecord};
use wiremon_common::inspect::InstallationState;
use wiremon_common::service_def::{self, ServiceState};
use wiremon_common::{HostPaths, OrchestratorConfig};

/// What the collected evidence points to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Finding {
    /// Everything probed fine; nothing to explain
    NoFaultFound,
    /// Required host packages are missing; install cannot have completed
    HostPackagesMissing,
    /// The application itself will not start; its stderr tail is attached
    AppFailsToStart(String),
    /// The application runs fine in the foreground; the supervisor or
    /// proxy wiring is what is broken
    StandaloneOkServiceBroken,
}

impl Finding {
    pub fn headline(&self) -> String {
        match self {
            Finding::NoFaultFound => "No fault found".to_string(),
            Finding::HostPackagesMissing => {
                "Required host packages are missing; re-run the installer".to_string()
            }
            Finding::AppFailsToStart(_) => {
                "The application fails to start on its own".to_string()
            }
            Finding::StandaloneOkServiceBroken => {
                "The application runs standalone; the service wiring is broken".to_string()
            }
        }
    }
}

/// Everything `diagnose` gathers, for rendering
#[derive(Debug)]
pub struct DiagnosticsReport {
    pub state: InstallationState,
    pub managed_state: ServiceState,
    pub upstream_states: Vec<(String, ServiceState)>,
    pub journal_tail: Vec<String>,
    pub app_log_tail: Vec<String>,
    pub recent_health: Vec<HealthRecord>,
    pub standalone: Option<StandaloneProbe>,
    pub finding: Finding,
}

/// Result of the foreground start probe
#[derive(Debug)]
pub struct StandaloneProbe {
    pub answered: bool,
    pub stderr_tail: String,
}

/// Classify the evidence. Pure, so the triage logic tests without a host.
pub fn classify(
    packages_present: bool,
    managed_state: ServiceState,
    standalone: Option<&StandaloneProbe>,
) -> Finding {
    if !packages_present {
        return Finding::HostPackagesMissing;
    }
    match standalone {
        Some(probe) if !probe.answered => Finding::AppFailsToStart(probe.stderr_tail.clone()),
        Some(_) if managed_state != ServiceState::Running => Finding::StandaloneOkServiceBroken,
        _ => Finding::NoFaultFound,
    }
}

/// Gather the full report
pub fn collect(config: &OrchestratorConfig, paths: &HostPaths) -> Result<DiagnosticsReport> {
    let state = wiremon_common::inspect::inspect(config, paths);
    let managed_state = service_def::service_state(&config.unit_name());
    let upstream_states = config
        .upstream_services
        .iter()
        .map(|s| {
            let unit = format!("{}.service", s);
            let st = service_def::service_state(&unit);
            (unit, st)
        })
        .collect();

    let journal_tail = journal_tail(&config.unit_name(), 30);
    let app_log_tail = app_log_tail(paths, 30);
    let recent_health = health_log::read_last(&paths.health_log, 10);

    // Only probe the foreground start when the service is not running and
    // the runtime exists; starting a second instance of a healthy service
    // helps nobody.
    let standalone = if managed_state != ServiceState::Running && state.runtime_env_present {
        Some(probe_standalone(config, paths)?)
    } else {
        None
    };

    let finding = classify(state.host_packages_present, managed_state, standalone.as_ref());
    Ok(DiagnosticsReport {
        state,
        managed_state,
        upstream_states,
        journal_tail,
        app_log_tail,
        recent_health,
        standalone,
        finding,
    })
}

/// Start the application in the foreground, wait for it to answer TCP on
/// either the diagnostic or its configured port, then kill it. The port
/// override is offered via the environment, but the application may ignore
/// it and bind its configured port; a child that is still running at the
/// deadline started fine either way. This probe only runs while the
/// managed unit is down, so the configured port is free.
pub fn probe_standalone(
    config: &OrchestratorConfig,
    paths: &HostPaths,
) -> Result<StandaloneProbe> {
    info!(
        "Starting foreground probe on port {}",
        config.diag_port
    );
    let mut child = Command::new(paths.venv_python())
        .arg("app/main.py")
        .current_dir(&paths.install_dir)
        .env("PORT", config.diag_port.to_string())
        .env("WIREMON_INSTALL_DIR", &paths.install_dir)
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()?;

    let answered_tcp = wait_for_port(
        &[config.diag_port, config.app_port],
        Duration::from_secs(15),
        &mut child,
    );
    let alive_at_deadline = matches!(child.try_wait(), Ok(None));
    let answered = probe_succeeded(answered_tcp, alive_at_deadline);
    let _ = child.kill();
    let stderr_tail = child
        .stderr
        .take()
        .map(|mut s| {
            let mut buf = String::new();
            let _ = s.read_to_string(&mut buf);
            tail_lines(&buf, 15)
        })
        .unwrap_or_default();
    let _ = child.wait();

    Ok(StandaloneProbe {
        answered,
        stderr_tail,
    })
}

/// The probe succeeds when the application answered TCP, or when it never
/// answered the polled ports but kept running to the deadline (it started;
/// it just bound a port the poll did not cover).
fn probe_succeeded(answered_tcp: bool, alive_at_deadline: bool) -> bool {
    answered_tcp || alive_at_deadline
}

/// Poll loopback ports until one answers, the child exits, or the deadline
/// passes
fn wait_for_port(ports: &[u16], timeout: Duration, child: &mut Child) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        for &port in ports {
            let addr: SocketAddr = ([127, 0, 0, 1], port).into();
            if TcpStream::connect_timeout(&addr, Duration::from_millis(500)).is_ok() {
                return true;
            }
        }
        // A dead child will never answer; stop early
        if matches!(child.try_wait(), Ok(Some(_))) {
            return false;
        }
        std::thread::sleep(Duration::from_millis(500));
    }
    false
}

fn journal_tail(unit: &str, lines: usize) -> Vec<String> {
    let output = Command::new("journalctl")
        .args(["-u", unit, "-n", &lines.to_string(), "--no-pager"])
        .output();
    match output {
        Ok(o) if o.status.success() => String::from_utf8_lossy(&o.stdout)
            .lines()
            .map(|l| l.to_string())
            .collect(),
        _ => Vec::new(),
    }
}

fn app_log_tail(paths: &HostPaths, lines: usize) -> Vec<String> {
    let path = paths.log_dir().join("app.log");
    match std::fs::read_to_string(&path) {
        Ok(content) => tail_lines(&content, lines)
            .lines()
            .map(|l| l.to_string())
            .collect(),
        Err(_) => Vec::new(),
    }
}

fn tail_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let skip = lines.len().saturating_sub(n);
    lines[skip..].join("\n")
}
