//! Terminal output primitives for operator-facing messages.
//!
//! Pastel ANSI palette and Unicode box drawing, kept separate from the
//! tracing log so scripted invocations can filter one without the other.

/// ANSI color codes - pastel palette
pub struct Colors;

impl Colors {
    pub const RESET: &'static str = "\x1b[0m";
    pub const BLUE: &'static str = "\x1b[38;5;117m";
    pub const GREEN: &'static str = "\x1b[38;5;120m";
    pub const YELLOW: &'static str = "\x1b[38;5;228m";
    pub const RED: &'static str = "\x1b[38;5;210m";
    pub const GRAY: &'static str = "\x1b[38;5;250m";
    pub const CYAN: &'static str = "\x1b[38;5;159m";
    pub const BOLD: &'static str = "\x1b[1m";
}

/// Status level for messages
#[derive(Debug, Clone, Copy)]
pub enum Level {
    Info,
    Success,
    Warning,
    Error,
}

impl Level {
    pub fn symbol(&self) -> &'static str {
        match self {
            Level::Info => "ℹ",
            Level::Success => "✓",
            Level::Warning => "⚠",
            Level::Error => "✗",
        }
    }

    pub fn color(&self) -> &'static str {
        match self {
            Level::Info => Colors::CYAN,
            Level::Success => Colors::GREEN,
            Level::Warning => Colors::YELLOW,
            Level::Error => Colors::RED,
        }
    }
}

/// Format a header sized to its text
pub fn header(text: &str) -> String {
    let width = text.chars().count() + 4;
    format!(
        "{}{}╭{}╮\n│  {}  │\n╰{}╯{}",
        Colors::BOLD,
        Colors::BLUE,
        "─".repeat(width),
        text,
        "─".repeat(width),
        Colors::RESET
    )
}

/// Format a section title
pub fn section(text: &str) -> String {
    format!(
        "{}{}→ {}{}",
        Colors::BOLD,
        Colors::CYAN,
        text,
        Colors::RESET
    )
}

/// Format a status message
pub fn status(level: Level, message: &str) -> String {
    format!(
        "{}{} {}{}",
        level.color(),
        level.symbol(),
        message,
        Colors::RESET
    )
}

/// Format a key-value pair
pub fn kv(key: &str, value: &str) -> String {
    format!("{}{}:{} {}", Colors::GRAY, key, Colors::RESET, value)
}

/// Format one step line of a plan report
pub fn step_line(index: usize, name: &str, outcome: &str, ok: bool) -> String {
    let level = if ok { Level::Success } else { Level::Error };
    format!(
        "  {}{}{} {}. {} {}— {}{}",
        level.color(),
        level.symbol(),
        Colors::RESET,
        index,
        name,
        Colors::GRAY,
        outcome,
        Colors::RESET
    )
}

/// Format a present/absent marker for inspector fields
pub fn presence(name: &str, present: bool) -> String {
    if present {
        format!("  {}{}{} {}", Colors::GREEN, "●", Colors::RESET, name)
    } else {
        format!("  {}{}{} {}", Colors::GRAY, "○", Colors::RESET, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status() {
        let msg = status(Level::Success, "Service started");
        assert!(msg.contains("✓"));
        assert!(msg.contains("Service started"));
    }

    #[test]
    fn test_header_sized_to_text() {
        let short = header("A");
        let long = header("A much longer title");
        assert!(long.len() > short.len());
    }

    #[test]
    fn test_step_line_marks_failure() {
        let line = step_line(3, "fetch-application", "git pull failed", false);
        assert!(line.contains("✗"));
        assert!(line.contains("fetch-application"));
    }
}
