//! Subcommand entry points.

pub mod install;
pub mod status;
pub mod uninstall;
