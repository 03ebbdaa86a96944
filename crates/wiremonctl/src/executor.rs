//! Operation executor: runs a plan's steps strictly in order.
//!
//! Each step's idempotency check runs first; a step whose effect is
//! already present is skipped, which is also what makes an interrupted run
//! safely re-runnable. A fatal failure aborts the rest of the plan and the
//! report keeps the completed-step list for operator resumption. After the
//! last step the executor always runs the post-condition check; a plan
//! whose steps all "succeeded" can still fail overall if the service never
//! answers.

use crate::decision::{FailurePolicy, OperationPlan, PlanMode, StepId};
use tracing::{error, info, warn};
use wiremon_common::OpsError;

/// How one step ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Completed,
    Skipped,
    Warned(String),
    Failed(String),
}

/// Executes the concrete action behind each step id. Split out as a trait
/// so plan mechanics are testable without touching the host.
pub trait StepRunner {
    /// True when the step's effect is already present
    fn already_satisfied(&self, step: StepId) -> bool;
    /// Perform the step's side effects
    fn execute(&mut self, step: StepId) -> anyhow::Result<()>;
}

/// Result of one plan run
#[derive(Debug)]
pub struct ExecReport {
    pub mode: PlanMode,
    pub results: Vec<(StepId, StepOutcome)>,
    pub failed_step: Option<StepId>,
    /// None when the plan aborted before the check or was a cancel no-op
    pub post_condition_ok: Option<bool>,
}

impl ExecReport {
    pub fn completed_steps(&self) -> Vec<&'static str> {
        self.results
            .iter()
            .filter(|(_, o)| matches!(o, StepOutcome::Completed | StepOutcome::Warned(_)))
            .map(|(s, _)| s.name())
            .collect()
    }

    pub fn is_success(&self) -> bool {
        self.failed_step.is_none() && self.post_condition_ok.unwrap_or(true)
    }

    /// Map the report to the operator-facing error taxonomy
    pub fn outcome(&self, app_port: u16, timeout_secs: u64) -> Result<(), OpsError> {
        if let Some(step) = self.failed_step {
            let reason = self
                .results
                .iter()
                .find_map(|(s, o)| match (s, o) {
                    (s, StepOutcome::Failed(msg)) if *s == step => Some(msg.clone()),
                    _ => None,
                })
                .unwrap_or_else(|| "unknown".to_string());
            return Err(match step {
                StepId::BackupState => OpsError::BackupFailed(reason),
                StepId::RestoreState => OpsError::RestoreFailed(reason),
                _ => OpsError::StepFatal {
                    step: step.name().to_string(),
                    reason,
                },
            });
        }
        if self.post_condition_ok == Some(false) {
            return Err(OpsError::PostConditionFailed {
                port: app_port,
                timeout_secs,
            });
        }
        Ok(())
    }
}

/// Run a plan to completion or first fatal failure.
///
/// An empty (cancel) plan is a no-op success and skips the post-condition
/// check; every other plan ends with it regardless of step outcomes.
pub fn run_plan(
    plan: &OperationPlan,
    runner: &mut dyn StepRunner,
    post_check: &dyn Fn() -> bool,
) -> ExecReport {
    let mut report = ExecReport {
        mode: plan.mode,
        results: Vec::new(),
        failed_step: None,
        post_condition_ok: None,
    };

    if plan.is_empty() {
        info!("Empty plan ({}); nothing to do", plan.mode.as_str());
        return report;
    }

    for &step in &plan.steps {
        if runner.already_satisfied(step) {
            info!("Step {} already satisfied, skipping", step.name());
            report.results.push((step, StepOutcome::Skipped));
            continue;
        }

        info!("Running step {}", step.name());
        match runner.execute(step) {
            Ok(()) => {
                report.results.push((step, StepOutcome::Completed));
            }
            Err(e) => match step.failure_policy() {
                FailurePolicy::WarnAndContinue => {
                    warn!("Step {} failed (continuing): {:#}", step.name(), e);
                    report
                        .results
                        .push((step, StepOutcome::Warned(format!("{:#}", e))));
                }
                FailurePolicy::Fatal => {
                    error!("Step {} failed: {:#}", step.name(), e);
                    report
                        .results
                        .push((step, StepOutcome::Failed(format!("{:#}", e))));
                    report.failed_step = Some(step);
                    return report;
                }
            },
        }
    }

    report.post_condition_ok = Some(post_check());
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::{decide, OperatorChoice};
    use wiremon_common::InstallationState;

    /// Scripted runner: records call order, fails and skips on demand
    struct FakeRunner {
        executed: Vec<StepId>,
        satisfied: Vec<StepId>,
        failing: Vec<StepId>,
    }

    impl FakeRunner {
        fn new() -> Self {
            Self {
                executed: Vec::new(),
                satisfied: Vec::new(),
                failing: Vec::new(),
            }
        }
    }

    impl StepRunner for FakeRunner {
        fn already_satisfied(&self, step: StepId) -> bool {
            self.satisfied.contains(&step)
        }

        fn execute(&mut self, step: StepId) -> anyhow::Result<()> {
            self.executed.push(step);
            if self.failing.contains(&step) {
                anyhow::bail!("injected failure");
            }
            Ok(())
        }
    }

    fn installed_state() -> InstallationState {
        InstallationState {
            install_dir_present: true,
            service_registered: true,
            data_store_present: true,
            runtime_env_present: true,
            host_packages_present: true,
            current_version: Some("1.0.0".to_string()),
        }
    }

    #[test]
    fn test_steps_run_in_plan_order() {
        let plan = decide(&installed_state(), OperatorChoice::UpgradeInstall).unwrap();
        let mut runner = FakeRunner::new();
        let report = run_plan(&plan, &mut runner, &|| true);

        assert_eq!(runner.executed, plan.steps);
        assert!(report.is_success());
        assert_eq!(report.post_condition_ok, Some(true));
    }

    #[test]
    fn test_fatal_failure_aborts_and_keeps_completed_list() {
        let plan = decide(&installed_state(), OperatorChoice::UpgradeInstall).unwrap();
        let mut runner = FakeRunner::new();
        runner.failing.push(StepId::ProvisionRuntime);
        let report = run_plan(&plan, &mut runner, &|| true);

        assert_eq!(report.failed_step, Some(StepId::ProvisionRuntime));
        assert_eq!(
            report.completed_steps(),
            vec!["backup-state", "fetch-application"]
        );
        // Nothing after the failure ran, including the post-condition
        assert!(!runner.executed.contains(&StepId::RestoreState));
        assert!(report.post_condition_ok.is_none());
        assert!(!report.is_success());
    }

    #[test]
    fn test_warn_and_continue_proceeds() {
        let plan = decide(
            &InstallationState {
                install_dir_present: false,
                service_registered: false,
                data_store_present: false,
                runtime_env_present: false,
                host_packages_present: false,
                current_version: None,
            },
            OperatorChoice::FreshInstall,
        )
        .unwrap();
        let mut runner = FakeRunner::new();
        runner.failing.push(StepId::SeedSampleData);
        let report = run_plan(&plan, &mut runner, &|| true);

        assert!(report.failed_step.is_none());
        assert!(runner.executed.contains(&StepId::ActivateService));
        assert!(report
            .results
            .iter()
            .any(|(s, o)| *s == StepId::SeedSampleData && matches!(o, StepOutcome::Warned(_))));
        assert!(report.is_success());
    }

    #[test]
    fn test_satisfied_step_skipped() {
        let plan = decide(&installed_state(), OperatorChoice::UpgradeInstall).unwrap();
        let mut runner = FakeRunner::new();
        runner.satisfied.push(StepId::FetchApplication);
        let report = run_plan(&plan, &mut runner, &|| true);

        assert!(!runner.executed.contains(&StepId::FetchApplication));
        assert!(report
            .results
            .iter()
            .any(|(s, o)| *s == StepId::FetchApplication && *o == StepOutcome::Skipped));
    }

    #[test]
    fn test_empty_plan_is_noop_success() {
        let plan = decide(&installed_state(), OperatorChoice::Cancel).unwrap();
        let mut runner = FakeRunner::new();
        let report = run_plan(&plan, &mut runner, &|| {
            panic!("post-condition must not run for an empty plan")
        });

        assert!(runner.executed.is_empty());
        assert!(report.is_success());
        assert!(report.post_condition_ok.is_none());
    }

    #[test]
    fn test_post_condition_failure_distinct_from_step_failure() {
        let plan = decide(&installed_state(), OperatorChoice::QuickFix).unwrap();
        let mut runner = FakeRunner::new();
        let report = run_plan(&plan, &mut runner, &|| false);

        assert!(report.failed_step.is_none());
        assert_eq!(report.post_condition_ok, Some(false));
        assert!(!report.is_success());
        match report.outcome(5000, 30) {
            Err(OpsError::PostConditionFailed { port, .. }) => assert_eq!(port, 5000),
            other => panic!("expected PostConditionFailed, got {:?}", other),
        }
    }

    #[test]
    fn test_backup_failure_escalates() {
        let plan = decide(&installed_state(), OperatorChoice::UpgradeInstall).unwrap();
        let mut runner = FakeRunner::new();
        runner.failing.push(StepId::BackupState);
        let report = run_plan(&plan, &mut runner, &|| true);

        match report.outcome(5000, 30) {
            Err(OpsError::BackupFailed(_)) => {}
            other => panic!("expected BackupFailed, got {:?}", other),
        }
        // The plan stopped before anything destructive or mutating
        assert_eq!(report.completed_steps().len(), 0);
    }
}
