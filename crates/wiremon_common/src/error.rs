//! Error taxonomy for orchestrator runs.
//!
//! Distinguishes the outcomes an operator must tell apart: a step that
//! killed the plan, a backup or restore that must never be silently
//! skipped, and a plan that finished but left the service unreachable.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OpsError {
    /// A fatal step aborted the plan. Completed steps are listed so the
    /// operator can resume.
    #[error("step '{step}' failed: {reason}")]
    StepFatal { step: String, reason: String },

    /// A requested backup could not be created. Always fatal; destructive
    /// steps must not run after this.
    #[error("backup failed: {0}")]
    BackupFailed(String),

    /// A restore did not complete. The partially-restored state is
    /// reported, never treated as success.
    #[error("restore failed: {0}")]
    RestoreFailed(String),

    /// Every step reported success but the service never answered on its
    /// port. Surfaced separately from StepFatal so operators know the code
    /// landed but activation did not.
    #[error("service did not answer on port {port} within {timeout_secs}s")]
    PostConditionFailed { port: u16, timeout_secs: u64 },

    /// Non-interactive invocation on an already-installed host. Destructive
    /// choices are never the unattended default.
    #[error("host already has an installation; refusing to pick a destructive operation non-interactively (pass --mode)")]
    UnattendedRefusal,
}

impl OpsError {
    /// The step name to report on stderr, when the error is step-scoped
    pub fn step_name(&self) -> Option<&str> {
        match self {
            OpsError::StepFatal { step, .. } => Some(step),
            OpsError::BackupFailed(_) => Some("backup-state"),
            OpsError::RestoreFailed(_) => Some("restore-state"),
            _ => None,
        }
    }

    /// Entry point an operator should reach for next
    pub fn suggested_command(&self) -> &'static str {
        match self {
            OpsError::PostConditionFailed { .. } => "wiremonctl diagnose",
            OpsError::UnattendedRefusal => "wiremonctl install --mode <clean|upgrade|quickfix>",
            _ => "wiremonctl diagnose",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_fatal_names_step() {
        let err = OpsError::StepFatal {
            step: "fetch-application".to_string(),
            reason: "git pull failed".to_string(),
        };
        assert_eq!(err.step_name(), Some("fetch-application"));
        assert!(err.to_string().contains("fetch-application"));
    }

    #[test]
    fn test_post_condition_distinct_from_step_fatal() {
        let err = OpsError::PostConditionFailed {
            port: 5000,
            timeout_secs: 30,
        };
        assert!(err.step_name().is_none());
        assert!(err.to_string().contains("5000"));
        assert_eq!(err.suggested_command(), "wiremonctl diagnose");
    }

    #[test]
    fn test_backup_failure_is_step_scoped() {
        let err = OpsError::BackupFailed("disk full".to_string());
        assert_eq!(err.step_name(), Some("backup-state"));
    }
}
