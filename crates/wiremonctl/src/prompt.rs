//! Interactive operator prompts for the install flow.
//!
//! Input parsing is split from terminal I/O so the menu semantics test
//! without a tty. An unrecognized answer re-prompts; EOF on stdin is
//! treated as cancel, never as consent.

use crate::decision::OperatorChoice;
use std::io::{BufRead, Write};
use wiremon_common::beautiful::{self, Level};
use wiremon_common::InstallationState;

/// Parse one menu answer. None means re-prompt.
pub fn parse_menu_answer(answer: &str, installed: bool) -> Option<MenuAnswer> {
    match answer.trim() {
        "1" => Some(if installed {
            MenuAnswer::CleanInstall
        } else {
            MenuAnswer::FreshInstall
        }),
        "2" if installed => Some(MenuAnswer::UpgradeInstall),
        "3" if installed => Some(MenuAnswer::QuickFix),
        "q" | "Q" | "4" if installed => Some(MenuAnswer::Cancel),
        "q" | "Q" | "2" => Some(MenuAnswer::Cancel),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuAnswer {
    FreshInstall,
    CleanInstall,
    UpgradeInstall,
    QuickFix,
    Cancel,
}

/// Parse a yes/no answer where refusal is the default. Only an explicit
/// yes consents; everything else, including empty input, is no.
pub fn parse_yes_no(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

/// Show the inspector summary and the mode menu, and read the choice
pub fn choose_operation(state: &InstallationState) -> std::io::Result<OperatorChoice> {
    let installed = !state.is_fresh_host();

    println!("{}", beautiful::section("Current installation"));
    for (name, present) in state.summary_lines() {
        println!("{}", beautiful::presence(&name, present));
    }
    if let Some(version) = &state.current_version {
        println!("{}", beautiful::kv("  version", version));
    }
    println!();

    if installed {
        println!("An existing installation was found. Choose how to proceed:");
        println!("  1) Clean install  (wipe and reinstall; offers a backup first)");
        println!("  2) Upgrade        (refresh code, keep data and settings)");
        println!("  3) Quick fix      (re-run the fetch job and restart the service)");
        println!("  4) Cancel");
    } else {
        println!("No existing installation was found.");
        println!("  1) Fresh install");
        println!("  2) Cancel");
    }

    let stdin = std::io::stdin();
    let mut input = stdin.lock();
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            // EOF: never escalate silence into an action
            return Ok(OperatorChoice::Cancel);
        }
        match parse_menu_answer(&line, installed) {
            Some(MenuAnswer::FreshInstall) => return Ok(OperatorChoice::FreshInstall),
            Some(MenuAnswer::CleanInstall) => {
                let backup = if state.data_store_present {
                    confirm_backup(&mut input)?
                } else {
                    false
                };
                return Ok(OperatorChoice::CleanInstall { backup });
            }
            Some(MenuAnswer::UpgradeInstall) => return Ok(OperatorChoice::UpgradeInstall),
            Some(MenuAnswer::QuickFix) => return Ok(OperatorChoice::QuickFix),
            Some(MenuAnswer::Cancel) => return Ok(OperatorChoice::Cancel),
            None => {
                println!("{}", beautiful::status(Level::Warning, "Unrecognized choice"));
            }
        }
    }
}

/// Offer the pre-wipe backup. Declining prints exactly what will be lost.
fn confirm_backup(input: &mut impl BufRead) -> std::io::Result<bool> {
    print!("Back up the news database and settings before wiping? [Y/n] ");
    std::io::stdout().flush()?;
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(true);
    }
    // Backup is the default; only an explicit no declines
    let declined = matches!(line.trim().to_lowercase().as_str(), "n" | "no");
    if declined {
        println!(
            "{}",
            beautiful::status(
                Level::Warning,
                "Proceeding without backup: the news database, settings, and logs will be deleted"
            )
        );
    }
    Ok(!declined)
}

/// Plain yes/no confirmation used by uninstall
pub fn confirm(question: &str) -> std::io::Result<bool> {
    print!("{} [y/N] ", question);
    std::io::stdout().flush()?;
    let mut line = String::new();
    if std::io::stdin().lock().read_line(&mut line)? == 0 {
        return Ok(false);
    }
    Ok(parse_yes_no(&line))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_menu_installed_host() {
        assert_eq!(parse_menu_answer("1", true), Some(MenuAnswer::CleanInstall));
        assert_eq!(parse_menu_answer("2", true), Some(MenuAnswer::UpgradeInstall));
        assert_eq!(parse_menu_answer("3", true), Some(MenuAnswer::QuickFix));
        assert_eq!(parse_menu_answer("4", true), Some(MenuAnswer::Cancel));
        assert_eq!(parse_menu_answer("q", true), Some(MenuAnswer::Cancel));
        assert_eq!(parse_menu_answer("5", true), None);
    }

    #[test]
    fn test_menu_fresh_host() {
        assert_eq!(parse_menu_answer("1", false), Some(MenuAnswer::FreshInstall));
        assert_eq!(parse_menu_answer("2", false), Some(MenuAnswer::Cancel));
        // Installed-only options are not accepted on a fresh host
        assert_eq!(parse_menu_answer("3", false), None);
        assert_eq!(parse_menu_answer("4", false), None);
    }

    #[test]
    fn test_menu_whitespace_tolerated() {
        assert_eq!(parse_menu_answer(" 1 \n", true), Some(MenuAnswer::CleanInstall));
    }

    #[test]
    fn test_yes_no_defaults_to_no() {
        assert!(parse_yes_no("y"));
        assert!(parse_yes_no("YES"));
        assert!(!parse_yes_no(""));
        assert!(!parse_yes_no("n"));
        assert!(!parse_yes_no("maybe"));
    }
}
