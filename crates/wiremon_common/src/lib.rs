//! Wiremon Common - Shared types and host access for the Wireless Monitor
//! lifecycle orchestrator.
//!
//! Everything that touches the host lives behind narrow contracts: reads go
//! through the inspector, writes go through the backup manager and the
//! service definition writer. The orchestrator itself keeps no persistent
//! in-process state between invocations.

pub mod backup;
pub mod beautiful;
pub mod diskspace;
pub mod config;
pub mod error;
pub mod health_log;
pub mod inspect;
pub mod ops_log;
pub mod paths;
pub mod service_def;
pub mod update;

pub use config::OrchestratorConfig;
pub use error::OpsError;
pub use inspect::InstallationState;
pub use paths::HostPaths;

use std::io;
use std::path::Path;

/// Write a file atomically: write to a sibling temp file, then rename.
///
/// Interruption leaves either the old content or the new content in place,
/// never a half-written file.
pub fn atomic_write(path: impl AsRef<Path>, content: &str) -> io::Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, content)?;
    std::fs::rename(&tmp, path)
}

/// Check if running with effective root privileges.
pub fn is_root() -> bool {
    #[cfg(unix)]
    {
        use nix::unistd::Uid;
        Uid::effective().is_root()
    }
    #[cfg(not(unix))]
    {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_atomic_write_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/dir/file.json");
        atomic_write(&path, "{}").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{}");
    }

    #[test]
    fn test_atomic_write_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file.txt");
        atomic_write(&path, "first").unwrap();
        atomic_write(&path, "second").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "second");
    }
}
