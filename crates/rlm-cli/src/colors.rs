//! Terminal color constants and utilities for CLI output.

use std::io::{self, IsTerminal, Write};

pub const RESET: &str = "\x1b[0m";
pub const BOLD: &str = "\x1b[1m";
pub const DIM: &str = "\x1b[2m";
pub const GREEN: &str = "\x1b[32m";
pub const YELLOW: &str = "\x1b[33m";
pub const RED: &str = "\x1b[31m";

/// Wrap `text` in `color` when stdout is a terminal.
pub fn paint(text: &str, color: &str) -> String {
    if io::stdout().is_terminal() {
        format!("{color}{text}{RESET}")
    } else {
        text.to_string()
    }
}

/// Flush stdout to ensure prompts are visible immediately.
///
/// This is useful when printing a prompt without a trailing newline.
#[inline]
pub fn flush_stdout() {
    io::stdout().flush().ok();
}
