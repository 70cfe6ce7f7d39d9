//! Console output helpers for consistent CLI formatting.

use console::{style, StyledObject};

/// Print a success message with a green checkmark.
pub fn success(msg: impl std::fmt::Display) {
    println!("{} {}", style("✓").green().bold(), msg);
}

/// Print an info/action message with a blue arrow.
pub fn info(msg: impl std::fmt::Display) {
    println!("{} {}", style("→").blue().bold(), msg);
}

/// Print a warning message with a yellow exclamation.
pub fn warn(msg: impl std::fmt::Display) {
    eprintln!("{} {}", style("!").yellow().bold(), msg);
}

/// Print a failure message with a red cross.
pub fn fail(msg: impl std::fmt::Display) {
    eprintln!("{} {}", style("✗").red().bold(), msg);
}

/// Style text as a package/library name (cyan).
pub fn pkg(name: impl std::fmt::Display) -> StyledObject<String> {
    style(name.to_string()).cyan()
}

/// Style text as dimmed/secondary.
pub fn dim(text: impl std::fmt::Display) -> StyledObject<String> {
    style(text.to_string()).dim()
}
