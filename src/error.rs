// Copyright (c) 2024 texer.ai Ltd.

//! Error types shared across the pipeline.
//!
//! Domain errors are modeled as a [`AlfError`] enum rather than a chain of
//! `Box<dyn Error>`: `thiserror` derives `Display`/`std::error::Error`, and
//! call sites that talk to the filesystem, the regex engine, or the JSON
//! encoder convert into `AlfError` via `#[from]`. The CLI boundary wraps
//! further context onto a `Result` with `miette`'s `IntoDiagnostic`/`Context`
//! extension traits for readable chained reporting.

use std::path::PathBuf;

use thiserror::Error;

/// A result using [`AlfError`].
pub type Result<T> = std::result::Result<T, AlfError>;

/// The three outcomes a pipeline session can produce (§5, §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// The session ran to completion.
    Success,
    /// The session aborted with a fatal error.
    Failure,
    /// The user terminated an interactive selector.
    Terminate,
}

impl ExitStatus {
    /// The process exit code matching this status.
    pub fn code(self) -> i32 {
        match self {
            ExitStatus::Success => 0,
            ExitStatus::Failure => 1,
            ExitStatus::Terminate => 2,
        }
    }
}

/// Errors surfaced by the ALF pipeline.
#[derive(Debug, Error)]
pub enum AlfError {
    /// Missing CLI input, unset environment variable, or other misconfiguration (§7 Configuration).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A required ancestor instance is missing from the flattened hierarchy map (§3 Invariant H1).
    #[error("hierarchy is incomplete: instance '{missing}' was not found under '{parent}'")]
    HierarchyIntegrity {
        /// The instance name that could not be found.
        missing: String,
        /// The dotted path under which it was expected.
        parent: String,
    },

    /// A punch-routing target (instantiation site or module declaration) could not be located (§7).
    #[error("could not route punch '{punch_name}' at '{hierarchy}': {reason}")]
    PunchRoutingFailed {
        /// The punch wire that failed to route.
        punch_name: String,
        /// The instance path being routed through.
        hierarchy: String,
        /// A human-readable explanation.
        reason: String,
    },

    /// The backup file is missing or malformed when `--undo` is requested.
    #[error("cannot undo: {0}")]
    Undo(String),

    /// The user terminated an interactive selector.
    #[error("terminated by user")]
    Terminate,

    /// An underlying I/O failure.
    #[error("I/O error on '{path}': {source}")]
    Io {
        /// The path being read or written.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A regular expression failed to compile. All patterns are crate-internal
    /// constants, so this should never trigger; the fallible constructor is
    /// still the correct API to call.
    #[error(transparent)]
    Regex(#[from] regex::Error),

    /// The backup set or another session artifact failed to (de)serialize.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// The fixed DPI stub template failed to render.
    #[error(transparent)]
    Template(#[from] tera::Error),
}

impl AlfError {
    /// Wrap an I/O error with the path that was being operated on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> AlfError {
        AlfError::Io {
            path: path.into(),
            source,
        }
    }

    /// The [`ExitStatus`] this error maps to.
    pub fn status(&self) -> ExitStatus {
        match self {
            AlfError::Terminate => ExitStatus::Terminate,
            _ => ExitStatus::Failure,
        }
    }
}
