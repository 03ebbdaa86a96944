//! Concrete step implementations against the host.
//!
//! Each step is guarded by an idempotency check (see `StepRunner`), so an
//! interrupted run can be re-invoked and picks up where it left off: a
//! clone that already exists becomes a pull, an existing virtualenv is
//! reused, an initialized data store is left alone.

use crate::decision::{OperationPlan, PlanMode, StepId};
use crate::executor::StepRunner;
use anyhow::{bail, Context, Result};
use std::path::Path;
use std::process::Command;
use tracing::info;
use wiremon_common::backup::{self, Backup, BackupSource, SourceKind};
use wiremon_common::{service_def, HostPaths, OrchestratorConfig};

pub struct HostStepRunner {
    config: OrchestratorConfig,
    paths: HostPaths,
    backup_requested: bool,
    mode: PlanMode,
    /// Set once the backup step has durably completed
    captured_backup: Option<Backup>,
}

impl HostStepRunner {
    pub fn new(config: OrchestratorConfig, paths: HostPaths, plan: &OperationPlan) -> Self {
        Self {
            config,
            paths,
            backup_requested: plan.backup_requested,
            mode: plan.mode,
            captured_backup: None,
        }
    }

    pub fn captured_backup(&self) -> Option<&Backup> {
        self.captured_backup.as_ref()
    }

    fn backup_sources(&self, crontab_dump: &Path) -> Vec<BackupSource> {
        vec![
            BackupSource {
                kind: SourceKind::DataStore,
                path: self.paths.data_store(),
            },
            BackupSource {
                kind: SourceKind::Config,
                path: self.paths.app_config(),
            },
            BackupSource {
                kind: SourceKind::Logs,
                path: self.paths.log_dir(),
            },
            BackupSource {
                kind: SourceKind::ScheduledJobs,
                path: crontab_dump.to_path_buf(),
            },
        ]
    }

    fn run_in_install(&self, program: &Path, args: &[&str]) -> Result<()> {
        let output = Command::new(program)
            .args(args)
            .current_dir(&self.paths.install_dir)
            .output()
            .with_context(|| format!("Failed to execute {}", program.display()))?;
        if !output.status.success() {
            bail!(
                "{} {} failed: {}",
                program.display(),
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }
}

impl StepRunner for HostStepRunner {
    fn already_satisfied(&self, step: StepId) -> bool {
        match step {
            // Always run: these are the steps whose whole point is to
            // refresh or re-assert state.
            StepId::BackupState
            | StepId::FetchApplication
            | StepId::WriteServiceDefinitions
            | StepId::RerunScheduledJob
            | StepId::RestartService => false,
            StepId::WipeInstallDir => !self.paths.install_dir.exists(),
            StepId::InstallHostPackages => packages_installed(&self.config.host_packages),
            // The venv may exist while requirements changed underneath it,
            // and the seed job is cheap; both always run.
            StepId::ProvisionRuntime | StepId::SeedSampleData => false,
            StepId::InitDataStore => self.paths.data_store().is_file(),
            StepId::RestoreState => self.captured_backup.is_none() && !self.backup_requested,
            StepId::ActivateService => {
                service_def::service_state(&self.config.unit_name())
                    == service_def::ServiceState::Running
            }
        }
    }

    fn execute(&mut self, step: StepId) -> Result<()> {
        match step {
            StepId::BackupState => {
                // The scheduled-job list is dumped to a per-run temp file
                // so it can ride along with the filesystem sources. A
                // failed dump fails the backup; a stale or partial job
                // list must never pass as this run's.
                let crontab_dump = tempfile::NamedTempFile::new()
                    .context("Failed to create crontab dump file")?;
                std::fs::write(
                    crontab_dump.path(),
                    service_def::read_crontab(&self.config.run_user),
                )
                .context("Failed to dump crontab for backup")?;
                let sources = self.backup_sources(crontab_dump.path());
                let b = backup::backup(&sources, &self.paths.backup_root)?;
                info!("Backup {} captured", b.timestamp_id);
                self.captured_backup = Some(b);
                Ok(())
            }

            StepId::WipeInstallDir => {
                // Global invariant: data is never deleted unless the
                // operator declined backup or a backup durably exists.
                if self.backup_requested
                    && self.paths.data_store().is_file()
                    && self.captured_backup.is_none()
                {
                    bail!("refusing to wipe: backup was requested but none has been created");
                }
                std::fs::remove_dir_all(&self.paths.install_dir).with_context(|| {
                    format!("Failed to remove {}", self.paths.install_dir.display())
                })?;
                info!("Removed {}", self.paths.install_dir.display());
                Ok(())
            }

            StepId::InstallHostPackages => {
                let mut args = vec!["apt-get", "install", "-y"];
                args.extend(self.config.host_packages.iter().map(|s| s.as_str()));
                let status = Command::new("sudo")
                    .args(&args)
                    .status()
                    .context("Failed to execute apt-get")?;
                if !status.success() {
                    bail!("apt-get install failed");
                }
                Ok(())
            }

            StepId::FetchApplication => {
                if self.paths.install_dir.join(".git").is_dir() {
                    // Existing checkout: refresh instead of re-cloning
                    self.run_in_install(Path::new("git"), &["fetch", "origin"])?;
                    self.run_in_install(
                        Path::new("git"),
                        &["merge", "--ff-only", &format!("origin/{}", self.config.branch)],
                    )?;
                    info!("Updated checkout to origin/{}", self.config.branch);
                } else {
                    let status = Command::new("git")
                        .args(["clone", "--branch"])
                        .arg(&self.config.branch)
                        .arg(&self.config.repo_url)
                        .arg(&self.paths.install_dir)
                        .status()
                        .context("Failed to execute git")?;
                    if !status.success() {
                        bail!("git clone of {} failed", self.config.repo_url);
                    }
                    info!("Cloned {}", self.config.repo_url);
                }
                Ok(())
            }

            StepId::ProvisionRuntime => {
                if !self.paths.venv_python().is_file() {
                    self.run_in_install(Path::new("python3"), &["-m", "venv", "venv"])?;
                }
                self.run_in_install(
                    &self.paths.venv_pip(),
                    &["install", "-r", "requirements.txt"],
                )?;
                Ok(())
            }

            StepId::InitDataStore => {
                if let Some(data_dir) = self.paths.data_store().parent() {
                    std::fs::create_dir_all(data_dir)?;
                }
                self.run_in_install(
                    &self.paths.venv_python(),
                    &["-c", "from app.models import init_db; init_db()"],
                )?;
                if !self.paths.data_store().is_file() {
                    bail!("data initialization ran but produced no data store");
                }
                Ok(())
            }

            StepId::SeedSampleData => {
                self.run_in_install(
                    &self.paths.venv_python(),
                    &["-m", "app.rss_fetcher"],
                )
            }

            StepId::RestoreState => {
                let backup = self
                    .captured_backup
                    .as_ref()
                    .context("no backup captured to restore from")?;
                let include_config = self.mode == PlanMode::UpgradeInstall;
                backup::restore(backup, include_config)?;
                Ok(())
            }

            StepId::WriteServiceDefinitions => {
                let def = service_def::write(&self.config, &self.paths);
                service_def::install(&def, &self.config, &self.paths)
            }

            StepId::ActivateService => service_def::start_service(&self.config.unit_name()),

            StepId::RerunScheduledJob => self.run_in_install(
                &self.paths.venv_python(),
                &["-m", "app.rss_fetcher"],
            ),

            StepId::RestartService => service_def::restart_service(&self.config.unit_name()),
        }
    }
}

fn packages_installed(packages: &[String]) -> bool {
    packages.iter().all(|pkg| {
        Command::new("dpkg")
            .args(["-s", pkg])
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    })
}

/// Post-condition check: the service answers HTTP on its loopback port
/// within a bounded timeout.
pub fn service_reachable(port: u16, timeout_secs: u64) -> bool {
    use std::net::{SocketAddr, TcpStream};
    use std::time::{Duration, Instant};

    let addr: SocketAddr = ([127, 0, 0, 1], port).into();
    let deadline = Instant::now() + Duration::from_secs(timeout_secs);
    loop {
        if TcpStream::connect_timeout(&addr, Duration::from_secs(2)).is_ok() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_secs(1));
    }
}
