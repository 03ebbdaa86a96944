//! Decision engine: maps inspector output plus operator intent to an
//! operation plan.
//!
//! Pure function from (state, choice) to plan, decoupled from any input
//! mechanism so it is testable without a terminal. Whether a backup step
//! runs is an explicit property of the chosen plan, never inferred from
//! shared state.

use anyhow::{bail, Result};
use wiremon_common::{InstallationState, OpsError};

/// What the operator asked for, normalized from prompts or flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorChoice {
    FreshInstall,
    CleanInstall { backup: bool },
    UpgradeInstall,
    QuickFix,
    Cancel,
    /// Scripted invocation with no explicit mode
    Unattended,
}

/// Plan mode tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanMode {
    FreshInstall,
    CleanInstall,
    UpgradeInstall,
    QuickFix,
    Cancel,
}

impl PlanMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanMode::FreshInstall => "fresh-install",
            PlanMode::CleanInstall => "clean-install",
            PlanMode::UpgradeInstall => "upgrade",
            PlanMode::QuickFix => "quick-fix",
            PlanMode::Cancel => "cancel",
        }
    }
}

/// Named steps a plan can contain. The executor maps each to its action
/// and idempotency check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepId {
    BackupState,
    WipeInstallDir,
    InstallHostPackages,
    FetchApplication,
    ProvisionRuntime,
    InitDataStore,
    SeedSampleData,
    RestoreState,
    WriteServiceDefinitions,
    ActivateService,
    RerunScheduledJob,
    RestartService,
}

/// What a step failure does to the rest of the plan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    Fatal,
    WarnAndContinue,
}

impl StepId {
    pub fn name(&self) -> &'static str {
        match self {
            StepId::BackupState => "backup-state",
            StepId::WipeInstallDir => "wipe-install-dir",
            StepId::InstallHostPackages => "install-host-packages",
            StepId::FetchApplication => "fetch-application",
            StepId::ProvisionRuntime => "provision-runtime",
            StepId::InitDataStore => "init-data-store",
            StepId::SeedSampleData => "seed-sample-data",
            StepId::RestoreState => "restore-state",
            StepId::WriteServiceDefinitions => "write-service-definitions",
            StepId::ActivateService => "activate-service",
            StepId::RerunScheduledJob => "rerun-scheduled-job",
            StepId::RestartService => "restart-service",
        }
    }

    /// Every suppressed failure is a deliberate policy, never a silent
    /// swallow. Only best-effort steps continue on error.
    pub fn failure_policy(&self) -> FailurePolicy {
        match self {
            StepId::SeedSampleData => FailurePolicy::WarnAndContinue,
            _ => FailurePolicy::Fatal,
        }
    }
}

/// The ordered, immutable sequence of steps for one orchestrator run
#[derive(Debug, Clone)]
pub struct OperationPlan {
    pub mode: PlanMode,
    pub backup_requested: bool,
    pub steps: Vec<StepId>,
}

impl OperationPlan {
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Build the plan for a choice against the observed host state.
///
/// A fresh host admits exactly one plan shape: fresh install. Clean,
/// upgrade, and quick fix all presuppose an installation and are refused
/// without one, whether the choice came from the menu or from a flag.
///
/// Tie-break: unattended invocations default to fresh install on an empty
/// host and refuse (fail closed) on an installed one; a destructive choice
/// is never the non-interactive default.
pub fn decide(state: &InstallationState, choice: OperatorChoice) -> Result<OperationPlan> {
    let installed = !state.is_fresh_host();

    match choice {
        OperatorChoice::Unattended => {
            if installed {
                Err(OpsError::UnattendedRefusal.into())
            } else {
                Ok(fresh_plan())
            }
        }
        OperatorChoice::FreshInstall => {
            if installed {
                bail!(
                    "install directory already exists; choose clean, upgrade, or quickfix instead of fresh"
                );
            }
            Ok(fresh_plan())
        }
        OperatorChoice::CleanInstall { backup } => {
            if !installed {
                bail!("nothing to clean; no installation exists (use a fresh install)");
            }
            // Backup is only meaningful when there is data to protect
            let backup = backup && state.data_store_present;
            let mut steps = Vec::new();
            if backup {
                steps.push(StepId::BackupState);
            }
            steps.push(StepId::WipeInstallDir);
            steps.extend(install_steps());
            Ok(OperationPlan {
                mode: PlanMode::CleanInstall,
                backup_requested: backup,
                steps,
            })
        }
        OperatorChoice::UpgradeInstall => {
            if !installed {
                bail!("nothing to upgrade; no installation exists (use a fresh install)");
            }
            Ok(OperationPlan {
                mode: PlanMode::UpgradeInstall,
                backup_requested: true,
                steps: vec![
                    StepId::BackupState,
                    StepId::FetchApplication,
                    StepId::ProvisionRuntime,
                    StepId::RestoreState,
                    StepId::WriteServiceDefinitions,
                    StepId::ActivateService,
                ],
            })
        }
        OperatorChoice::QuickFix => {
            if !installed {
                bail!("nothing to fix; no installation exists (use a fresh install)");
            }
            Ok(OperationPlan {
                mode: PlanMode::QuickFix,
                backup_requested: false,
                steps: vec![StepId::RerunScheduledJob, StepId::RestartService],
            })
        }
        OperatorChoice::Cancel => Ok(OperationPlan {
            mode: PlanMode::Cancel,
            backup_requested: false,
            steps: Vec::new(),
        }),
    }
}

fn fresh_plan() -> OperationPlan {
    OperationPlan {
        mode: PlanMode::FreshInstall,
        backup_requested: false,
        steps: install_steps(),
    }
}

/// The shared tail of fresh and clean installs
fn install_steps() -> Vec<StepId> {
    vec![
        StepId::InstallHostPackages,
        StepId::FetchApplication,
        StepId::ProvisionRuntime,
        StepId::InitDataStore,
        StepId::SeedSampleData,
        StepId::WriteServiceDefinitions,
        StepId::ActivateService,
    ]
}
