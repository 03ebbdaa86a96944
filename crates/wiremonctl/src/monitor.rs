//! Health monitor: the check battery behind `wiremonctl monitor`.
//!
//! Runs the full battery even when early checks fail, takes at most one
//! remediation (a unit restart) per failing check per invocation, waits a
//! grace period, re-checks once, and appends every result to the health
//! log. There is no retry loop; a host that stays broken after one restart
//! needs an operator, and the cron cadence provides the next attempt.

use anyhow::Result;
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{info, warn};
use wiremon_common::health_log::{self, CheckResult, HealthRecord};
use wiremon_common::{diskspace, service_def, HostPaths, OrchestratorConfig};

/// One executed check
#[derive(Debug, Clone)]
pub struct CheckOutcome {
    pub name: String,
    pub result: CheckResult,
    pub details: Option<String>,
    /// Unit to restart when this check fails; None means no remediation
    /// exists for it (disk space, data store integrity)
    pub remediation_unit: Option<String>,
}

/// Whole-invocation summary for the caller's exit code
#[derive(Debug)]
pub struct MonitorReport {
    pub checks_run: usize,
    pub failures: usize,
    pub remediations: usize,
    pub recovered: usize,
}

impl MonitorReport {
    pub fn all_healthy(&self) -> bool {
        self.failures == 0
    }
}

/// Decide which units to restart for a set of check outcomes.
///
/// Pure function: dedupes units shared by several failing checks, skips
/// checks with no remediation, and never lists a unit twice.
pub fn plan_remediation(outcomes: &[CheckOutcome]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut units = Vec::new();
    for outcome in outcomes {
        if outcome.result != CheckResult::Fail {
            continue;
        }
        if let Some(unit) = &outcome.remediation_unit {
            if seen.insert(unit.clone()) {
                units.push(unit.clone());
            }
        }
    }
    units
}

/// Run the battery, remediate, re-check, and log. Returns the summary.
pub fn run(config: &OrchestratorConfig, paths: &HostPaths) -> Result<MonitorReport> {
    let outcomes = run_battery(config, paths);
    for outcome in &outcomes {
        let mut record = HealthRecord::new(&outcome.name, outcome.result);
        if let Some(details) = &outcome.details {
            record = record.with_details(details.clone());
        }
        record.remediation_taken =
            outcome.result == CheckResult::Fail && outcome.remediation_unit.is_some();
        health_log::append(&paths.health_log, &record)?;
    }

    let failures: Vec<&CheckOutcome> = outcomes
        .iter()
        .filter(|o| o.result == CheckResult::Fail)
        .collect();
    let units = plan_remediation(&outcomes);
    for unit in &units {
        info!("Restarting {} to remediate failed checks", unit);
        if let Err(e) = service_def::restart_service(unit) {
            warn!("Restart of {} failed: {:#}", unit, e);
        }
    }

    let mut recovered = 0;
    if !units.is_empty() {
        std::thread::sleep(Duration::from_secs(config.monitor_grace_secs));
        // One re-check per remediated check; results are their own records
        for failed in failures.iter().filter(|o| o.remediation_unit.is_some()) {
            let result = recheck_one(config, paths, &failed.name);
            let mut record = HealthRecord::new(&failed.name, result);
            record.recheck = true;
            health_log::append(&paths.health_log, &record)?;
            if result == CheckResult::Pass {
                recovered += 1;
                info!("{} recovered after restart", failed.name);
            } else {
                warn!("{} still failing after restart", failed.name);
            }
        }
    }

    Ok(MonitorReport {
        checks_run: outcomes.len(),
        failures: failures.len(),
        remediations: units.len(),
        recovered,
    })
}

/// Execute every check once, managed process first, then its HTTP answer,
/// then the upstream units it depends on. Never short-circuits: a dead
/// service must not hide a full disk.
pub fn run_battery(config: &OrchestratorConfig, paths: &HostPaths) -> Vec<CheckOutcome> {
    let mut outcomes = Vec::new();

    let managed = config.unit_name();
    outcomes.push(unit_check(&managed, Some(managed.clone())));
    outcomes.push(http_check(config));
    for upstream in &config.upstream_services {
        let unit = format!("{}.service", upstream);
        outcomes.push(unit_check(&unit, Some(unit.clone())));
    }

    outcomes.push(data_store_check(paths));
    outcomes.push(disk_check(config, paths));
    outcomes
}

fn unit_check(unit: &str, remediation: Option<String>) -> CheckOutcome {
    let state = service_def::service_state(unit);
    let result = if state == service_def::ServiceState::Running {
        CheckResult::Pass
    } else {
        CheckResult::Fail
    };
    CheckOutcome {
        name: format!("unit:{}", unit),
        result,
        details: Some(format!("{:?}", state)),
        remediation_unit: if result == CheckResult::Fail {
            remediation
        } else {
            None
        },
    }
}

fn http_check(config: &OrchestratorConfig) -> CheckOutcome {
    let url = format!("http://127.0.0.1:{}/", config.app_port);
    let outcome = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .and_then(|client| client.get(&url).send());
    let (result, details) = match outcome {
        Ok(response) if response.status().is_success() || response.status().is_redirection() => {
            (CheckResult::Pass, format!("HTTP {}", response.status()))
        }
        Ok(response) => (CheckResult::Fail, format!("HTTP {}", response.status())),
        Err(e) => (CheckResult::Fail, format!("{}", e)),
    };
    CheckOutcome {
        name: "http-port".to_string(),
        result,
        details: Some(details),
        remediation_unit: if result == CheckResult::Fail {
            Some(config.unit_name())
        } else {
            None
        },
    }
}

/// Open the data store and run a trivial query. An absent file fails too:
/// on a monitored host the store must exist. The query reads the schema
/// table so a corrupt or non-SQLite file fails here instead of at the
/// application's first real read.
fn data_store_check(paths: &HostPaths) -> CheckOutcome {
    let path = paths.data_store();
    let (result, details) = if !path.is_file() {
        (CheckResult::Fail, "data store missing".to_string())
    } else {
        match rusqlite::Connection::open(&path).and_then(|conn| {
            conn.query_row("SELECT count(*) FROM sqlite_master", [], |row| {
                row.get::<_, i64>(0)
            })
        }) {
            Ok(_) => (CheckResult::Pass, "readable".to_string()),
            Err(e) => (CheckResult::Fail, format!("{}", e)),
        }
    };
    CheckOutcome {
        name: "data-store".to_string(),
        result,
        details: Some(details),
        remediation_unit: None,
    }
}

fn disk_check(config: &OrchestratorConfig, paths: &HostPaths) -> CheckOutcome {
    match diskspace::usage_for(&paths.install_dir)
        .or_else(|| diskspace::usage_for(std::path::Path::new("/")))
    {
        Some(usage) => {
            let fail = config.effective_disk_fail();
            let warn_at = config.effective_disk_warn();
            let result = if usage.used_percent >= fail {
                CheckResult::Fail
            } else {
                CheckResult::Pass
            };
            let mut details = format!("{}% used", usage.used_percent);
            if result == CheckResult::Pass && usage.used_percent >= warn_at {
                details.push_str(" (above warning threshold)");
                warn!("Disk usage {}% above warning threshold", usage.used_percent);
            }
            CheckOutcome {
                name: "disk-space".to_string(),
                result,
                details: Some(details),
                remediation_unit: None,
            }
        }
        None => CheckOutcome {
            name: "disk-space".to_string(),
            result: CheckResult::Pass,
            details: Some("probe unavailable".to_string()),
            remediation_unit: None,
        },
    }
}

/// Re-run a single check by name after a remediation
fn recheck_one(config: &OrchestratorConfig, paths: &HostPaths, name: &str) -> CheckResult {
    if name == "http-port" {
        return http_check(config).result;
    }
    if name == "data-store" {
        return data_store_check(paths).result;
    }
    if let Some(unit) = name.strip_prefix("unit:") {
        return unit_check(unit, None).result;
    }
    // Unknown name: re-run nothing, report the remediation as unverified
    CheckResult::Fail
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(name: &str, result: CheckResult, unit: Option<&str>) -> CheckOutcome {
        CheckOutcome {
            name: name.to_string(),
            result,
            details: None,
            remediation_unit: unit.map(|u| u.to_string()),
        }
    }

    #[test]
    fn test_remediation_dedupes_shared_unit() {
        // Dead service fails both its unit check and the HTTP check; one
        // restart covers both.
        let outcomes = vec![
            outcome(
                "unit:rss-aggregator.service",
                CheckResult::Fail,
                Some("rss-aggregator.service"),
            ),
            outcome("http-port", CheckResult::Fail, Some("rss-aggregator.service")),
            outcome("disk-space", CheckResult::Pass, None),
        ];
        assert_eq!(
            plan_remediation(&outcomes),
            vec!["rss-aggregator.service".to_string()]
        );
    }

    #[test]
    fn test_remediation_skips_passing_checks() {
        let outcomes = vec![
            outcome(
                "unit:rss-aggregator.service",
                CheckResult::Pass,
                Some("rss-aggregator.service"),
            ),
            outcome("unit:nginx.service", CheckResult::Fail, Some("nginx.service")),
        ];
        assert_eq!(plan_remediation(&outcomes), vec!["nginx.service".to_string()]);
    }

    #[test]
    fn test_remediation_skips_checks_without_unit() {
        let outcomes = vec![
            outcome("disk-space", CheckResult::Fail, None),
            outcome("data-store", CheckResult::Fail, None),
        ];
        assert!(plan_remediation(&outcomes).is_empty());
    }

    #[test]
    fn test_remediation_separate_units_all_restarted() {
        let outcomes = vec![
            outcome(
                "unit:rss-aggregator.service",
                CheckResult::Fail,
                Some("rss-aggregator.service"),
            ),
            outcome("unit:nginx.service", CheckResult::Fail, Some("nginx.service")),
        ];
        assert_eq!(
            plan_remediation(&outcomes),
            vec![
                "rss-aggregator.service".to_string(),
                "nginx.service".to_string()
            ]
        );
    }

    #[test]
    fn test_data_store_check_absent_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = OrchestratorConfig::default();
        config.install_dir = Some(dir.path().join("rss_aggregator"));
        let paths = HostPaths::from_config(&config);
        let outcome = data_store_check(&paths);
        assert_eq!(outcome.result, CheckResult::Fail);
        assert!(outcome.remediation_unit.is_none());
    }

    #[test]
    fn test_data_store_check_valid_sqlite_passes() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = OrchestratorConfig::default();
        config.install_dir = Some(dir.path().join("rss_aggregator"));
        let paths = HostPaths::from_config(&config);
        std::fs::create_dir_all(paths.data_store().parent().unwrap()).unwrap();
        // Creating via rusqlite writes a valid database file
        rusqlite::Connection::open(paths.data_store()).unwrap();
        assert_eq!(data_store_check(&paths).result, CheckResult::Pass);
    }

    #[test]
    fn test_data_store_check_corrupt_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = OrchestratorConfig::default();
        config.install_dir = Some(dir.path().join("rss_aggregator"));
        let paths = HostPaths::from_config(&config);
        std::fs::create_dir_all(paths.data_store().parent().unwrap()).unwrap();
        std::fs::write(paths.data_store(), b"this is not a database").unwrap();
        assert_eq!(data_store_check(&paths).result, CheckResult::Fail);
    }

    #[test]
    fn test_battery_covers_every_check() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = OrchestratorConfig::default();
        config.install_dir = Some(dir.path().join("rss_aggregator"));
        let paths = HostPaths::from_config(&config);

        let names: Vec<String> = run_battery(&config, &paths)
            .into_iter()
            .map(|o| o.name)
            .collect();
        // Managed process first, its port answer second, then upstreams
        assert_eq!(names[0], "unit:rss-aggregator.service");
        assert_eq!(names[1], "http-port");
        assert_eq!(names[2], "unit:nginx.service");
        assert_eq!(names[3], "unit:ollama.service");
        assert!(names.contains(&"data-store".to_string()));
        assert!(names.contains(&"disk-space".to_string()));
    }
}
