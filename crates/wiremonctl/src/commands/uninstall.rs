//! Uninstall: remove the service artifacts and, when asked, the data.
//!
//! The data store survives by default; only --purge-data deletes it, and
//! the pre-removal backup offer applies the same backup-before-destruction
//! rule the installer follows.

use crate::prompt;
use anyhow::Result;
use tracing::info;
use wiremon_common::backup::{self, BackupSource, SourceKind};
use wiremon_common::beautiful::{self, Level};
use wiremon_common::{service_def, HostPaths, OrchestratorConfig};

pub struct UninstallArgs {
    pub yes: bool,
    pub purge_data: bool,
    pub backup: bool,
}

pub fn run(config: &OrchestratorConfig, paths: &HostPaths, args: &UninstallArgs) -> Result<()> {
    println!("{}", beautiful::header("Wireless Monitor uninstall"));

    if !args.yes {
        let question = if args.purge_data {
            "Remove the service AND delete the news database?"
        } else {
            "Remove the service? (data is kept)"
        };
        if !prompt::confirm(question)? {
            println!("{}", beautiful::status(Level::Info, "Cancelled; nothing changed"));
            return Ok(());
        }
    }

    if args.purge_data && args.backup && paths.data_store().is_file() {
        let sources = vec![
            BackupSource {
                kind: SourceKind::DataStore,
                path: paths.data_store(),
            },
            BackupSource {
                kind: SourceKind::Config,
                path: paths.app_config(),
            },
        ];
        let b = backup::backup(&sources, &paths.backup_root)?;
        println!(
            "{}",
            beautiful::status(
                Level::Success,
                &format!("Backup saved to {}", b.location.display())
            )
        );
    }

    let unit = config.unit_name();
    let _ = service_def::stop_service(&unit);
    service_def::remove(config, paths)?;
    println!("{}", beautiful::status(Level::Success, "Service artifacts removed"));

    if args.purge_data {
        if paths.install_dir.exists() {
            std::fs::remove_dir_all(&paths.install_dir)?;
            info!("Removed {}", paths.install_dir.display());
        }
        println!("{}", beautiful::status(Level::Success, "Installation directory removed"));
    } else {
        println!(
            "{}",
            beautiful::status(
                Level::Info,
                &format!("Data kept at {}", paths.install_dir.display())
            )
        );
    }

    Ok(())
}
