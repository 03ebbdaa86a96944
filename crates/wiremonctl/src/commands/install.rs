//! The install flow: inspect, decide, execute, report.

use crate::decision::{self, OperatorChoice, PlanMode};
use crate::executor::{self, StepOutcome};
use crate::prompt;
use crate::steps::{self, HostStepRunner};
use anyhow::Result;
use chrono::Utc;
use tracing::info;
use wiremon_common::beautiful::{self, Level};
use wiremon_common::ops_log::{self, OperationRecord};
use wiremon_common::{inspect, update, HostPaths, OrchestratorConfig};

/// Explicit mode from the command line, bypassing the menu
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ModeArg {
    Fresh,
    Clean,
    Upgrade,
    Quickfix,
}

pub struct InstallArgs {
    pub mode: Option<ModeArg>,
    /// Back up before destructive steps (clean install)
    pub backup: bool,
    pub non_interactive: bool,
}

pub fn run(config: &OrchestratorConfig, paths: &HostPaths, args: &InstallArgs) -> Result<()> {
    println!("{}", beautiful::header("Wireless Monitor installer"));

    let state = inspect::inspect(config, paths);
    let version_from = state.current_version.clone();

    let choice = match args.mode {
        Some(ModeArg::Fresh) => OperatorChoice::FreshInstall,
        Some(ModeArg::Clean) => OperatorChoice::CleanInstall { backup: args.backup },
        Some(ModeArg::Upgrade) => OperatorChoice::UpgradeInstall,
        Some(ModeArg::Quickfix) => OperatorChoice::QuickFix,
        None if args.non_interactive => OperatorChoice::Unattended,
        None => prompt::choose_operation(&state)?,
    };

    let plan = decision::decide(&state, choice)?;
    if plan.is_empty() {
        println!("{}", beautiful::status(Level::Info, "Cancelled; nothing changed"));
        return Ok(());
    }

    println!();
    println!("{}", beautiful::section(&format!("Plan: {}", plan.mode.as_str())));
    for (i, step) in plan.steps.iter().enumerate() {
        println!("  {}. {}", i + 1, step.name());
    }
    println!();

    let started_at = Utc::now();
    let mut runner = HostStepRunner::new(config.clone(), paths.clone(), &plan);
    let report = executor::run_plan(&plan, &mut runner, &|| {
        steps::service_reachable(config.app_port, config.post_condition_timeout_secs)
    });

    for (i, (step, outcome)) in report.results.iter().enumerate() {
        let (text, ok) = match outcome {
            StepOutcome::Completed => ("done".to_string(), true),
            StepOutcome::Skipped => ("already satisfied".to_string(), true),
            StepOutcome::Warned(msg) => (format!("warning: {}", msg), true),
            StepOutcome::Failed(msg) => (msg.clone(), false),
        };
        println!("{}", beautiful::step_line(i + 1, step.name(), &text, ok));
    }
    println!();

    // Successful installs and upgrades stamp the new version, read back
    // from the checkout the fetch step just placed
    let mut version_to = None;
    if report.is_success() && plan.mode != PlanMode::QuickFix {
        // Drop any stale marker so the probe reads the fresh checkout
        let _ = std::fs::remove_file(paths.version_file());
        let version = inspect::inspect(config, paths)
            .current_version
            .unwrap_or_else(|| format!("installed-{}", Utc::now().format("%Y%m%d")));
        if let Err(e) = update::write_version_info(&paths.version_file(), &version) {
            info!("Could not write version marker: {:#}", e);
        } else {
            version_to = Some(version);
        }
    }

    let outcome = report.outcome(config.app_port, config.post_condition_timeout_secs);
    let record = OperationRecord {
        run_id: OperationRecord::generate_run_id(),
        mode: plan.mode.as_str().to_string(),
        started_at,
        finished_at: Utc::now(),
        success: report.is_success(),
        failed_step: report.failed_step.map(|s| s.name().to_string()),
        version_from,
        version_to,
        completed_steps: report
            .completed_steps()
            .iter()
            .map(|s| s.to_string())
            .collect(),
    };
    if let Err(e) = ops_log::append(&paths.ops_log, &record) {
        info!("Could not append operation record: {}", e);
    }

    match outcome {
        Ok(()) => {
            println!(
                "{}",
                beautiful::status(
                    Level::Success,
                    &format!(
                        "{} complete; service answering on port {}",
                        plan.mode.as_str(),
                        config.app_port
                    )
                )
            );
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
