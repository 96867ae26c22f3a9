// Copyright (c) 2024 texer.ai Ltd.

//! Severity-leveled, colorized diagnostics for human-facing output.
//!
//! This is deliberately distinct from the `log` facade used for internal
//! tracing (`log::debug!`/`log::trace!`, initialized once in `main` via
//! `env_logger`): diagnostics are the warnings and notes §7 of the design
//! calls for directly ("a warning is printed and that signal is skipped"),
//! and are always visible regardless of the configured log level.

use std::fmt;

use owo_colors::OwoColorize;

/// Print a fatal error.
#[macro_export]
macro_rules! errorln {
    ($($arg:tt)*) => {
        $crate::diagnostic::print($crate::diagnostic::Severity::Error, &format!($($arg)*))
    }
}

/// Print a non-fatal warning (§7 "a warning is printed and that signal is skipped").
#[macro_export]
macro_rules! warnln {
    ($($arg:tt)*) => {
        $crate::diagnostic::print($crate::diagnostic::Severity::Warning, &format!($($arg)*))
    }
}

/// Print an informational note.
#[macro_export]
macro_rules! noteln {
    ($($arg:tt)*) => {
        $crate::diagnostic::print($crate::diagnostic::Severity::Note, &format!($($arg)*))
    }
}

/// The severity of a diagnostic message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// An informational note.
    Note,
    /// A non-fatal condition that was worked around.
    Warning,
    /// A fatal condition.
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "{}", "error".red().bold()),
            Severity::Warning => write!(f, "{}", "warning".yellow().bold()),
            Severity::Note => write!(f, "{}", "note".bold()),
        }
    }
}

/// Emit a diagnostic message to stderr, prefixed with its colorized severity.
///
/// Prefer the `errorln!`/`warnln!`/`noteln!` macros at call sites.
pub fn print(severity: Severity, msg: &str) {
    eprintln!("{severity}: {msg}");
}
