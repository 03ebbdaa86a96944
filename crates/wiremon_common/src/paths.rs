//! Path layout for the managed installation.
//!
//! All host paths are derived once from configuration and passed around as
//! a value, so tests can point the whole orchestrator at a temp directory.

use crate::config::OrchestratorConfig;
use std::path::PathBuf;

/// Concrete host path layout for one managed installation
#[derive(Debug, Clone)]
pub struct HostPaths {
    /// Application install directory
    pub install_dir: PathBuf,
    /// Backup root, a sibling of the install directory so a wipe of the
    /// install directory cannot take the backups with it
    pub backup_root: PathBuf,
    /// Systemd unit file
    pub unit_file: PathBuf,
    /// Nginx site definition
    pub nginx_site: PathBuf,
    /// Nginx enabled-site symlink
    pub nginx_site_link: PathBuf,
    /// Health monitor record log (JSONL)
    pub health_log: PathBuf,
    /// Operation record log (JSONL)
    pub ops_log: PathBuf,
}

impl HostPaths {
    pub fn from_config(config: &OrchestratorConfig) -> Self {
        let home = PathBuf::from(format!("/home/{}", config.run_user));
        let install_dir = config
            .install_dir
            .clone()
            .unwrap_or_else(|| home.join("rss_aggregator"));
        let backup_root = install_dir
            .parent()
            .map(|p| p.join("wiremon_backups"))
            .unwrap_or_else(|| home.join("wiremon_backups"));

        Self {
            install_dir,
            backup_root,
            unit_file: PathBuf::from(format!(
                "/etc/systemd/system/{}.service",
                config.service_name
            )),
            nginx_site: PathBuf::from(format!(
                "/etc/nginx/sites-available/{}",
                config.service_name
            )),
            nginx_site_link: PathBuf::from(format!(
                "/etc/nginx/sites-enabled/{}",
                config.service_name
            )),
            health_log: PathBuf::from("/var/log/wiremon/health.jsonl"),
            ops_log: PathBuf::from("/var/log/wiremon/ops.jsonl"),
        }
    }

    /// SQLite data store inside the install directory
    pub fn data_store(&self) -> PathBuf {
        self.install_dir.join("data/news.db")
    }

    /// Operator-editable application configuration file
    pub fn app_config(&self) -> PathBuf {
        self.install_dir.join("config/settings.py")
    }

    /// Application log directory
    pub fn log_dir(&self) -> PathBuf {
        self.install_dir.join("logs")
    }

    /// Virtualenv python interpreter
    pub fn venv_python(&self) -> PathBuf {
        self.install_dir.join("venv/bin/python")
    }

    /// Virtualenv pip
    pub fn venv_pip(&self) -> PathBuf {
        self.install_dir.join("venv/bin/pip")
    }

    /// Dependency manifest the environment provisioner installs from
    pub fn requirements(&self) -> PathBuf {
        self.install_dir.join("requirements.txt")
    }

    /// Version marker written after installs and upgrades
    pub fn version_file(&self) -> PathBuf {
        self.install_dir.join("version.json")
    }

    /// Static assets served directly by the reverse proxy
    pub fn static_dir(&self) -> PathBuf {
        self.install_dir.join("static")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_follows_run_user() {
        let mut config = OrchestratorConfig::default();
        config.run_user = "monitor".to_string();
        let paths = HostPaths::from_config(&config);
        assert_eq!(
            paths.install_dir,
            PathBuf::from("/home/monitor/rss_aggregator")
        );
        assert_eq!(
            paths.backup_root,
            PathBuf::from("/home/monitor/wiremon_backups")
        );
    }

    #[test]
    fn test_backup_root_outside_install_dir() {
        let paths = HostPaths::from_config(&OrchestratorConfig::default());
        assert!(!paths.backup_root.starts_with(&paths.install_dir));
    }

    #[test]
    fn test_install_dir_override() {
        let mut config = OrchestratorConfig::default();
        config.install_dir = Some(PathBuf::from("/srv/aggregator"));
        let paths = HostPaths::from_config(&config);
        assert_eq!(paths.install_dir, PathBuf::from("/srv/aggregator"));
        assert_eq!(paths.data_store(), PathBuf::from("/srv/aggregator/data/news.db"));
        assert_eq!(paths.backup_root, PathBuf::from("/srv/wiremon_backups"));
    }

    #[test]
    fn test_unit_and_site_names() {
        let paths = HostPaths::from_config(&OrchestratorConfig::default());
        assert_eq!(
            paths.unit_file,
            PathBuf::from("/etc/systemd/system/rss-aggregator.service")
        );
        assert_eq!(
            paths.nginx_site,
            PathBuf::from("/etc/nginx/sites-available/rss-aggregator")
        );
    }
}
