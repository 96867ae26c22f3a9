// Copyright (c) 2024 texer.ai Ltd.

//! The command-line entry point (§4.11): argument parsing, logger setup,
//! and the thin dispatch into `backup::undo` or a full `Session::run`.
//!
//! Argument parsing uses `clap`'s derive API.
//! `-v` is already spoken for by `--vcd`, so verbosity uses a bare
//! `--verbose`/`-q` pair rather than clap's usual `-v`/`-q` convention —
//! see DESIGN.md for the tradeoff.

use std::path::PathBuf;

use clap::Parser;
use miette::{Context, IntoDiagnostic};

use crate::backup;
use crate::config::Config;
use crate::error::{AlfError, ExitStatus, Result};
use crate::model::GateType;
use crate::selection::{CertaintyThreshold, SelectAll, ThresholdSignalOracle};
use crate::sess::Session;

/// Surgically gate and DPI-punch RTL signals for logic fuzzing.
#[derive(Debug, Parser)]
#[command(
    name = "alf",
    version = "0.1.0",
    about = "Surgically gate and DPI-punch RTL signals for logic fuzzing."
)]
struct Args {
    /// Simulation dump (VCD) to mine for the design hierarchy.
    #[arg(short = 'v', long = "vcd", value_name = "PATH")]
    vcd: Option<PathBuf>,

    /// File-list to resolve into source paths.
    #[arg(short = 'f', long = "flist", value_name = "PATH")]
    flist: Option<PathBuf>,

    /// Restore the working tree from `./backup.json` and exit.
    #[arg(short = 'u', long = "undo")]
    undo: bool,

    /// Restrict the default oracle's fuzz candidates to these signal names.
    /// May be given more than once. Absent, every internal signal of a
    /// selected module is offered as a candidate.
    #[arg(long = "oracle-allow", value_name = "NAME")]
    oracle_allow: Vec<String>,

    /// Minimum certainty (0-100) the default signal selector accepts a
    /// candidate at.
    #[arg(long = "certainty-threshold", value_name = "N", default_value_t = 0)]
    certainty_threshold: u8,

    /// Gate operator the default oracle recommends for every candidate.
    #[arg(long = "gate-type", value_enum, default_value_t = GateTypeArg::And)]
    gate_type: GateTypeArg,

    /// Suppress informational notes.
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,

    /// Raise the internal trace log level. Repeatable.
    #[arg(long = "verbose", action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum GateTypeArg {
    And,
    Or,
}

impl From<GateTypeArg> for GateType {
    fn from(value: GateTypeArg) -> Self {
        match value {
            GateTypeArg::And => GateType::And,
            GateTypeArg::Or => GateType::Or,
        }
    }
}

fn init_logger(quiet: bool, verbose: u8) {
    let level = if quiet {
        log::LevelFilter::Error
    } else {
        match verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    };
    env_logger::Builder::new().filter_level(level).init();
}

/// Parse arguments, wire up the default non-interactive collaborators, and
/// run one session. Returns the [`ExitStatus`] the binary should translate
/// into a process exit code.
pub fn main() -> miette::Result<ExitStatus> {
    let args = Args::parse();
    init_logger(args.quiet, args.verbose);

    let cwd = std::env::current_dir()
        .into_diagnostic()
        .context("could not resolve the current working directory")?;

    if args.undo {
        backup::undo(&cwd).into_diagnostic().context("undo failed")?;
        return Ok(ExitStatus::Success);
    }

    let config = build_config(&args, cwd).into_diagnostic()?;

    let oracle = ThresholdSignalOracle {
        allow: config.oracle_allow.clone(),
        gate_type: config.gate_type,
    };
    let module_selector = SelectAll;
    let signal_selector = CertaintyThreshold {
        threshold: config.certainty_threshold,
    };

    let mut session = Session::new(config);
    session
        .run(&oracle, &module_selector, &signal_selector)
        .into_diagnostic()
        .context("pipeline run failed")
}

fn build_config(args: &Args, cwd: PathBuf) -> Result<Config> {
    let vcd_path = args
        .vcd
        .clone()
        .ok_or_else(|| AlfError::Configuration("--vcd is required unless --undo is given".to_string()))?;
    let flist_path = args
        .flist
        .clone()
        .ok_or_else(|| AlfError::Configuration("--flist is required unless --undo is given".to_string()))?;

    Ok(Config {
        cwd,
        vcd_path,
        flist_path,
        oracle_allow: if args.oracle_allow.is_empty() {
            None
        } else {
            Some(args.oracle_allow.clone())
        },
        certainty_threshold: args.certainty_threshold,
        gate_type: args.gate_type.into(),
    })
}
