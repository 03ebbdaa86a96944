//! Status display: inspector snapshot, service states, recent health
//! records, and an update check.

use anyhow::Result;
use wiremon_common::beautiful::{self, Level};
use wiremon_common::health_log::{self, CheckResult};
use wiremon_common::service_def::{self, ServiceState};
use wiremon_common::{diskspace, inspect, ops_log, update, HostPaths, OrchestratorConfig};

fn state_text(state: ServiceState) -> (&'static str, Level) {
    match state {
        ServiceState::Running => ("running", Level::Success),
        ServiceState::Stopped => ("stopped", Level::Warning),
        ServiceState::Failed => ("failed", Level::Error),
        ServiceState::NotRegistered => ("not registered", Level::Warning),
    }
}

pub fn run(config: &OrchestratorConfig, paths: &HostPaths) -> Result<()> {
    println!("{}", beautiful::header("Wireless Monitor status"));

    let state = inspect::inspect(config, paths);
    println!("{}", beautiful::section("Installation"));
    for (name, present) in state.summary_lines() {
        println!("{}", beautiful::presence(&name, present));
    }
    if let Some(version) = &state.current_version {
        println!("{}", beautiful::kv("  version", version));
    }
    println!();

    println!("{}", beautiful::section("Services"));
    let mut units = vec![config.unit_name()];
    units.extend(
        config
            .upstream_services
            .iter()
            .map(|s| format!("{}.service", s)),
    );
    for unit in &units {
        let (text, level) = state_text(service_def::service_state(unit));
        println!("  {}", beautiful::status(level, &format!("{}: {}", unit, text)));
    }
    println!();

    if let Some(usage) = diskspace::usage_for(&paths.install_dir) {
        let level = if usage.used_percent >= config.effective_disk_fail() {
            Level::Error
        } else if usage.used_percent >= config.effective_disk_warn() {
            Level::Warning
        } else {
            Level::Success
        };
        println!(
            "  {}",
            beautiful::status(level, &format!("disk: {}% used", usage.used_percent))
        );
        println!();
    }

    let recent = health_log::read_last(&paths.health_log, 5);
    if !recent.is_empty() {
        println!("{}", beautiful::section("Recent health checks"));
        for record in &recent {
            let level = match record.result {
                CheckResult::Pass => Level::Success,
                CheckResult::Fail => Level::Error,
            };
            let mut line = format!(
                "{} {}",
                record.timestamp.format("%Y-%m-%d %H:%M"),
                record.check_name
            );
            if record.recheck {
                line.push_str(" (recheck)");
            }
            println!("  {}", beautiful::status(level, &line));
        }
        println!();
    }

    if let Some(record) = ops_log::read_latest(&paths.ops_log) {
        println!("{}", beautiful::section("Last operation"));
        println!("{}", beautiful::kv("  mode", &record.mode));
        println!(
            "{}",
            beautiful::kv("  finished", &record.finished_at.format("%Y-%m-%d %H:%M").to_string())
        );
        println!(
            "{}",
            beautiful::kv("  result", if record.success { "success" } else { "failed" })
        );
        if let Some(step) = &record.failed_step {
            println!("{}", beautiful::kv("  failed step", step));
        }
        println!();
    }

    if let Some(current) = &state.current_version {
        match update::check_for_updates(&config.repo_url, &config.branch, current) {
            Ok(info) if info.is_update_available => {
                println!(
                    "{}",
                    beautiful::status(
                        Level::Warning,
                        &format!(
                            "Update available: {} -> {}",
                            info.current_version, info.latest_version
                        )
                    )
                );
                println!(
                    "  {}",
                    beautiful::kv("upgrade with", "wiremonctl install --mode upgrade")
                );
            }
            Ok(_) => {
                println!("{}", beautiful::status(Level::Success, "Up to date"));
            }
            Err(e) => {
                println!(
                    "{}",
                    beautiful::status(Level::Info, &format!("Update check unavailable: {:#}", e))
                );
            }
        }
    }

    Ok(())
}
