//! Backup and restore of the mutable state that must survive destructive
//! operations: the data store, the application configuration, the log
//! directory, and a dump of the scheduled-job list.
//!
//! Backups land in a timestamped directory outside the install directory,
//! with a manifest carrying SHA-256 digests of every copied file. Restore
//! is copy-overwrite, so running it twice ends in the same state as once.
//! Nothing here ever deletes a backup; retention is an operator concern.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

const MANIFEST_FILE: &str = "manifest.json";

/// What a backed-up path holds, which decides how restore treats it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    DataStore,
    Config,
    Logs,
    ScheduledJobs,
}

impl SourceKind {
    /// Fixed name the source is stored under inside the backup directory
    fn stored_name(&self) -> &'static str {
        match self {
            SourceKind::DataStore => "news.db",
            SourceKind::Config => "settings.py",
            SourceKind::Logs => "logs",
            SourceKind::ScheduledJobs => "crontab.txt",
        }
    }
}

/// One path requested for backup
#[derive(Debug, Clone)]
pub struct BackupSource {
    pub kind: SourceKind,
    pub path: PathBuf,
}

/// One path actually captured in a backup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupEntry {
    pub kind: SourceKind,
    /// Where the content came from (and where restore puts it back)
    pub original: PathBuf,
    /// Name inside the backup directory
    pub stored: String,
    pub is_dir: bool,
}

/// Digest of one file inside the backup directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileDigest {
    /// Path relative to the backup directory
    pub rel_path: String,
    pub sha256: String,
}

/// A completed backup, also serialized as the on-disk manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Backup {
    pub timestamp_id: String,
    pub location: PathBuf,
    pub created_at: DateTime<Utc>,
    pub entries: Vec<BackupEntry>,
    pub files: Vec<FileDigest>,
}

impl Backup {
    /// Load a backup from its manifest
    pub fn load(location: &Path) -> Result<Self> {
        let manifest = location.join(MANIFEST_FILE);
        let content = fs::read_to_string(&manifest)
            .with_context(|| format!("Failed to read {}", manifest.display()))?;
        serde_json::from_str(&content).context("Malformed backup manifest")
    }

    /// Paths captured for a given kind
    pub fn entry(&self, kind: SourceKind) -> Option<&BackupEntry> {
        self.entries.iter().find(|e| e.kind == kind)
    }
}

/// Create a timestamped backup of every present source under `backup_root`.
///
/// Absent sources are skipped without failing the whole backup. Any error
/// while copying a present source is fatal: a requested backup must never
/// be silently incomplete.
pub fn backup(sources: &[BackupSource], backup_root: &Path) -> Result<Backup> {
    let created_at = Utc::now();
    let timestamp_id = created_at.format("%Y%m%d_%H%M%S").to_string();
    let location = backup_root.join(&timestamp_id);
    fs::create_dir_all(&location)
        .with_context(|| format!("Failed to create {}", location.display()))?;

    let mut entries = Vec::new();
    let mut files = Vec::new();

    for source in sources {
        if !source.path.exists() {
            info!("Backup source absent, skipping: {}", source.path.display());
            continue;
        }

        let stored = source.kind.stored_name().to_string();
        let dest = location.join(&stored);
        let is_dir = source.path.is_dir();

        if is_dir {
            copy_tree(&source.path, &dest, &stored, &mut files)?;
        } else {
            fs::copy(&source.path, &dest)
                .with_context(|| format!("Failed to copy {}", source.path.display()))?;
            files.push(FileDigest {
                rel_path: stored.clone(),
                sha256: file_digest(&dest)?,
            });
        }

        entries.push(BackupEntry {
            kind: source.kind,
            original: source.path.clone(),
            stored,
            is_dir,
        });
    }

    let backup = Backup {
        timestamp_id,
        location: location.clone(),
        created_at,
        entries,
        files,
    };

    let manifest = serde_json::to_string_pretty(&backup)?;
    crate::atomic_write(location.join(MANIFEST_FILE), &manifest)?;

    info!(
        "Backup {} created at {} ({} entries)",
        backup.timestamp_id,
        location.display(),
        backup.entries.len()
    );
    Ok(backup)
}

/// Restore captured paths to their original locations.
///
/// The scheduled-job dump is never restored here (the service definition
/// writer reinstalls jobs); the configuration entry is restored only when
/// `include_config` is set, because a clean install intentionally discards
/// old configuration. Copy-overwrite semantics make this idempotent.
pub fn restore(backup: &Backup, include_config: bool) -> Result<()> {
    for entry in &backup.entries {
        match entry.kind {
            SourceKind::ScheduledJobs => continue,
            SourceKind::Config if !include_config => {
                info!("Skipping configuration restore (clean install)");
                continue;
            }
            _ => {}
        }

        let stored = backup.location.join(&entry.stored);
        if !stored.exists() {
            bail!(
                "backup entry missing on disk: {} (backup {})",
                stored.display(),
                backup.timestamp_id
            );
        }

        verify_entry(backup, entry)?;

        if let Some(parent) = entry.original.parent() {
            fs::create_dir_all(parent)?;
        }

        if entry.is_dir {
            restore_tree(&stored, &entry.original)?;
        } else {
            fs::copy(&stored, &entry.original)
                .with_context(|| format!("Failed to restore {}", entry.original.display()))?;
        }
        info!("Restored {}", entry.original.display());
    }
    Ok(())
}

/// Verify the stored copies of one entry still match the manifest digests
fn verify_entry(backup: &Backup, entry: &BackupEntry) -> Result<()> {
    for digest in backup
        .files
        .iter()
        .filter(|f| f.rel_path == entry.stored || f.rel_path.starts_with(&format!("{}/", entry.stored)))
    {
        let path = backup.location.join(&digest.rel_path);
        let actual = file_digest(&path)?;
        if actual != digest.sha256 {
            bail!(
                "backup file corrupted: {} (digest mismatch)",
                path.display()
            );
        }
    }
    Ok(())
}

fn copy_tree(
    src: &Path,
    dest: &Path,
    stored_prefix: &str,
    files: &mut Vec<FileDigest>,
) -> Result<()> {
    for item in WalkDir::new(src) {
        let item = item?;
        let rel = item
            .path()
            .strip_prefix(src)
            .context("walk item outside its root")?;
        let target = dest.join(rel);
        if item.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else if item.file_type().is_file() {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(item.path(), &target)
                .with_context(|| format!("Failed to copy {}", item.path().display()))?;
            let rel_path = if rel.as_os_str().is_empty() {
                stored_prefix.to_string()
            } else {
                format!("{}/{}", stored_prefix, rel.display())
            };
            files.push(FileDigest {
                rel_path,
                sha256: file_digest(&target)?,
            });
        } else {
            warn!("Skipping special file in backup: {}", item.path().display());
        }
    }
    Ok(())
}

fn restore_tree(stored: &Path, original: &Path) -> Result<()> {
    for item in WalkDir::new(stored) {
        let item = item?;
        let rel = item
            .path()
            .strip_prefix(stored)
            .context("walk item outside its root")?;
        let target = original.join(rel);
        if item.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else if item.file_type().is_file() {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(item.path(), &target)
                .with_context(|| format!("Failed to restore {}", target.display()))?;
        }
    }
    Ok(())
}

fn file_digest(path: &Path) -> Result<String> {
    let content =
        fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let mut hasher = Sha256::new();
    hasher.update(&content);
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sources(base: &Path) -> Vec<BackupSource> {
        vec![
            BackupSource {
                kind: SourceKind::DataStore,
                path: base.join("data/news.db"),
            },
            BackupSource {
                kind: SourceKind::Config,
                path: base.join("config/settings.py"),
            },
            BackupSource {
                kind: SourceKind::Logs,
                path: base.join("logs"),
            },
        ]
    }

    fn seed_install(base: &Path) {
        fs::create_dir_all(base.join("data")).unwrap();
        fs::write(base.join("data/news.db"), b"sqlite-bytes-here").unwrap();
        fs::create_dir_all(base.join("config")).unwrap();
        fs::write(base.join("config/settings.py"), b"PORT = 5000\n").unwrap();
        fs::create_dir_all(base.join("logs/archive")).unwrap();
        fs::write(base.join("logs/app.log"), b"line one\n").unwrap();
        fs::write(base.join("logs/archive/old.log"), b"old\n").unwrap();
    }

    #[test]
    fn test_round_trip_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let install = dir.path().join("install");
        let root = dir.path().join("backups");
        seed_install(&install);

        let b = backup(&sources(&install), &root).unwrap();
        assert_eq!(b.entries.len(), 3);

        // Wipe and restore (upgrade mode restores config too)
        fs::remove_dir_all(&install).unwrap();
        restore(&b, true).unwrap();

        assert_eq!(
            fs::read(install.join("data/news.db")).unwrap(),
            b"sqlite-bytes-here"
        );
        assert_eq!(
            fs::read(install.join("config/settings.py")).unwrap(),
            b"PORT = 5000\n"
        );
        assert_eq!(
            fs::read(install.join("logs/archive/old.log")).unwrap(),
            b"old\n"
        );
    }

    #[test]
    fn test_absent_sources_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let install = dir.path().join("install");
        let root = dir.path().join("backups");
        fs::create_dir_all(install.join("data")).unwrap();
        fs::write(install.join("data/news.db"), b"db").unwrap();
        // No config, no logs

        let b = backup(&sources(&install), &root).unwrap();
        assert_eq!(b.entries.len(), 1);
        assert_eq!(b.entries[0].kind, SourceKind::DataStore);
    }

    #[test]
    fn test_empty_source_set_still_valid_backup() {
        let dir = tempfile::tempdir().unwrap();
        let b = backup(&[], &dir.path().join("backups")).unwrap();
        assert!(b.entries.is_empty());
        assert!(b.location.join("manifest.json").is_file());
    }

    #[test]
    fn test_config_excluded_on_clean_restore() {
        let dir = tempfile::tempdir().unwrap();
        let install = dir.path().join("install");
        let root = dir.path().join("backups");
        seed_install(&install);

        let b = backup(&sources(&install), &root).unwrap();
        fs::remove_dir_all(&install).unwrap();
        restore(&b, false).unwrap();

        assert!(install.join("data/news.db").is_file());
        assert!(!install.join("config/settings.py").exists());
    }

    #[test]
    fn test_restore_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let install = dir.path().join("install");
        let root = dir.path().join("backups");
        seed_install(&install);

        let b = backup(&sources(&install), &root).unwrap();
        fs::remove_dir_all(&install).unwrap();
        restore(&b, true).unwrap();
        restore(&b, true).unwrap();

        assert_eq!(
            fs::read(install.join("logs/app.log")).unwrap(),
            b"line one\n"
        );
    }

    #[test]
    fn test_manifest_reload() {
        let dir = tempfile::tempdir().unwrap();
        let install = dir.path().join("install");
        seed_install(&install);

        let b = backup(&sources(&install), &dir.path().join("backups")).unwrap();
        let reloaded = Backup::load(&b.location).unwrap();
        assert_eq!(reloaded.timestamp_id, b.timestamp_id);
        assert_eq!(reloaded.entries.len(), b.entries.len());
        assert!(reloaded.entry(SourceKind::DataStore).is_some());
    }

    #[test]
    fn test_corrupted_backup_refuses_restore() {
        let dir = tempfile::tempdir().unwrap();
        let install = dir.path().join("install");
        seed_install(&install);

        let b = backup(&sources(&install), &dir.path().join("backups")).unwrap();
        fs::write(b.location.join("news.db"), b"tampered").unwrap();

        let err = restore(&b, true).unwrap_err();
        assert!(err.to_string().contains("corrupted"));
    }
}
