// Copyright (c) 2024 texer.ai Ltd.

//! The resolved session configuration (§4.11): the parsed, absolute-path
//! form of the CLI arguments, assembled once in `cli::main` before the
//! `Session` is constructed. Kept separate from `Session` itself so the
//! static configuration and the mutable state threaded through a run
//! stay clearly distinct.

use std::path::PathBuf;

use crate::model::GateType;

/// Resolved, validated configuration for one pipeline run.
#[derive(Debug, Clone)]
pub struct Config {
    /// The directory `backup.json` and the generated DPI stubs are read
    /// from / written to (§4.7, §6).
    pub cwd: PathBuf,
    /// `-v/--vcd`: simulation dump to mine for hierarchy.
    pub vcd_path: PathBuf,
    /// `-f/--flist`: file-list to resolve into source paths.
    pub flist_path: PathBuf,
    /// `--oracle-allow`: names the default, non-interactive oracle treats as
    /// candidates. `None` means every internal signal of a selected module
    /// is offered as a candidate.
    pub oracle_allow: Option<Vec<String>>,
    /// `--certainty-threshold`: minimum certainty the default signal
    /// selector accepts a candidate at.
    pub certainty_threshold: u8,
    /// `--gate-type`: gate operator the default oracle recommends for every
    /// candidate it names, so a scriptable run can choose OR-gating without
    /// a real classification oracle attached.
    pub gate_type: GateType,
}
