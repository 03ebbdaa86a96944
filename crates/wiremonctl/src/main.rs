//! wiremonctl - lifecycle orchestrator for the Wireless Monitor RSS
//! aggregator.
//!
//! One short-lived invocation per operation: install, monitor, diagnose,
//! status, uninstall. Nothing persists in-process between invocations;
//! every run re-reads the host through the inspector.

mod commands;
mod decision;
mod diagnose;
mod executor;
mod monitor;
mod prompt;
mod steps;

use clap::{Parser, Subcommand};
use commands::install::{InstallArgs, ModeArg};
use commands::uninstall::UninstallArgs;
use tracing_subscriber::EnvFilter;
use wiremon_common::beautiful::{self, Level};
use wiremon_common::{HostPaths, OpsError, OrchestratorConfig};

#[derive(Parser)]
#[command(name = "wiremonctl", version, about = "Wireless Monitor lifecycle orchestrator")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Install, upgrade, or repair the aggregator
    Install {
        /// Operation mode; omit for the interactive menu
        #[arg(long, value_enum)]
        mode: Option<ModeArg>,
        /// Back up existing data before destructive steps
        #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
        backup: bool,
        /// Never prompt; refuses destructive choices on an installed host
        #[arg(long)]
        non_interactive: bool,
    },
    /// Run the health check battery, remediating at most once per check
    Monitor,
    /// Collect diagnostics and triage why the service is down
    Diagnose,
    /// Show installation, service, and update status
    Status,
    /// Remove the service; data is kept unless --purge-data
    Uninstall {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
        /// Also delete the install directory, including the news database
        #[arg(long)]
        purge_data: bool,
        /// Back up data before purging it
        #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
        backup: bool,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = OrchestratorConfig::load_or_default();
    let paths = HostPaths::from_config(&config);

    let result = match cli.command {
        Commands::Install {
            mode,
            backup,
            non_interactive,
        } => commands::install::run(
            &config,
            &paths,
            &InstallArgs {
                mode,
                backup,
                non_interactive,
            },
        ),
        Commands::Monitor => run_monitor(&config, &paths),
        Commands::Diagnose => run_diagnose(&config, &paths),
        Commands::Status => commands::status::run(&config, &paths),
        Commands::Uninstall {
            yes,
            purge_data,
            backup,
        } => commands::uninstall::run(
            &config,
            &paths,
            &UninstallArgs {
                yes,
                purge_data,
                backup,
            },
        ),
    };

    if let Err(e) = result {
        if let Some(ops) = e.downcast_ref::<OpsError>() {
            if let Some(step) = ops.step_name() {
                eprintln!("{}", beautiful::status(Level::Error, &format!("failed at step: {}", step)));
            }
            eprintln!("{}", beautiful::status(Level::Error, &ops.to_string()));
            eprintln!("  next: {}", ops.suggested_command());
        } else {
            eprintln!("{}", beautiful::status(Level::Error, &format!("{:#}", e)));
        }
        std::process::exit(1);
    }
}

fn run_monitor(config: &OrchestratorConfig, paths: &HostPaths) -> anyhow::Result<()> {
    let report = monitor::run(config, paths)?;
    if report.all_healthy() {
        println!(
            "{}",
            beautiful::status(
                Level::Success,
                &format!("All {} checks passed", report.checks_run)
            )
        );
    } else {
        println!(
            "{}",
            beautiful::status(
                Level::Warning,
                &format!(
                    "{} of {} checks failed; {} restart(s), {} recovered",
                    report.failures, report.checks_run, report.remediations, report.recovered
                )
            )
        );
    }
    Ok(())
}

fn run_diagnose(config: &OrchestratorConfig, paths: &HostPaths) -> anyhow::Result<()> {
    println!("{}", beautiful::header("Wireless Monitor diagnostics"));

    let report = diagnose::collect(config, paths)?;

    println!("{}", beautiful::section("Installation"));
    for (name, present) in report.state.summary_lines() {
        println!("{}", beautiful::presence(&name, present));
    }
    println!();

    println!("{}", beautiful::section("Services"));
    println!("{}", beautiful::kv("  managed", &format!("{:?}", report.managed_state)));
    for (unit, state) in &report.upstream_states {
        println!("{}", beautiful::kv(&format!("  {}", unit), &format!("{:?}", state)));
    }
    println!();

    if !report.journal_tail.is_empty() {
        println!("{}", beautiful::section("Recent service log"));
        for line in report.journal_tail.iter().rev().take(10).rev() {
            println!("  {}", line);
        }
        println!();
    }

    if !report.app_log_tail.is_empty() {
        println!("{}", beautiful::section("Recent application log"));
        for line in report.app_log_tail.iter().rev().take(10).rev() {
            println!("  {}", line);
        }
        println!();
    }

    if let Some(probe) = &report.standalone {
        println!("{}", beautiful::section("Foreground start probe"));
        if probe.answered {
            println!(
                "  {}",
                beautiful::status(
                    Level::Success,
                    &format!("application answered on port {}", config.diag_port)
                )
            );
        } else {
            println!(
                "  {}",
                beautiful::status(Level::Error, "application did not answer")
            );
            for line in probe.stderr_tail.lines() {
                println!("    {}", line);
            }
        }
        println!();
    }

    println!("{}", beautiful::status(Level::Info, &report.finding.headline()));
    Ok(())
}
