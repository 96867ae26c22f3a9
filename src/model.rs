// Copyright (c) 2024 texer.ai Ltd.

//! The data model shared by every pipeline stage (§3).
//!
//! Maps that must preserve discovery order (the hierarchy map, and the
//! grouping the patcher builds over it) are backed by `indexmap::IndexMap`
//! rather than `std::collections::HashMap`, so iterating them is
//! deterministic for a given run without an explicit sort step.

use std::path::PathBuf;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A dotted instance path, ancestor-to-descendant (`root.i1.i2`).
///
/// Stored as the plain dotted string: the hierarchy map is keyed by this
/// representation directly (§3), and most consumers only need prefix and
/// component operations, which are cheap over `&str`.
pub type InstancePath = String;

/// One entry of the design hierarchy map (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HierarchyEntry {
    /// Absolute path to the source file that textually declares this instance's module.
    pub declaration_path: PathBuf,
    /// The module identifier.
    pub module_name: String,
    /// Local signal name -> bit width, as recorded from the VCD's `$var` lines.
    pub signal_width_data: IndexMap<String, u32>,
}

/// The design hierarchy map: instance path -> [`HierarchyEntry`].
pub type HierarchyMap = IndexMap<InstancePath, HierarchyEntry>;

/// Validate Invariant H1: every strict prefix of every multi-component path
/// must also be present in `map`.
///
/// Returns the first (parent, missing component) pair encountered, in
/// iteration order of `map`, if the invariant is violated.
pub fn validate_hierarchy(map: &HierarchyMap) -> Result<(), crate::error::AlfError> {
    for path in map.keys() {
        let parts: Vec<&str> = path.split('.').collect();
        for i in 1..parts.len() {
            let prefix = parts[..i].join(".");
            if !map.contains_key(&prefix) {
                let parent = parts[..i - 1].join(".");
                return Err(crate::error::AlfError::HierarchyIntegrity {
                    missing: parts[i - 1].to_string(),
                    parent,
                });
            }
        }
    }
    Ok(())
}

/// Which side of an AND/OR gate the control wire enters on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GateType {
    /// `signal & punch`.
    And,
    /// `signal | punch`.
    Or,
}

impl GateType {
    /// The Verilog operator text for this gate.
    pub fn op(self) -> &'static str {
        match self {
            GateType::And => "&",
            GateType::Or => "|",
        }
    }
}

/// Clock edge polarity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Edge {
    /// `posedge`.
    Posedge,
    /// `negedge`.
    Negedge,
}

impl std::fmt::Display for Edge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Edge::Posedge => write!(f, "posedge"),
            Edge::Negedge => write!(f, "negedge"),
        }
    }
}

/// The clock/reset/edge a selected signal's parent module is driven by.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlSignals {
    /// The clock signal name.
    pub clock: String,
    /// The reset signal name.
    pub reset: String,
    /// The edge the clocked always-block should trigger on.
    pub edge: Edge,
}

/// One (instance-path, local-signal) pair selected for fuzzing (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectedSignal {
    /// The instance path of the module the signal lives in.
    pub hierarchy: InstancePath,
    /// The local identifier inside the declaring module.
    pub name: String,
    /// The declaring module's identifier, inherited from the hierarchy entry.
    pub module_name: String,
    /// The declaring module's source file, inherited from the hierarchy entry.
    pub declaration_path: PathBuf,
    /// Bit width, from `signal_width_data`.
    pub width: u32,
    /// Fuzzing-safety confidence, 0-100. Opaque to the core (§3).
    pub certainty: u8,
    /// Clock/reset/edge of the signal's parent module.
    pub parent_module_control_signals: ControlSignals,
    /// Whether the gate ANDs or ORs the punch wire in.
    pub gate_type: GateType,
    /// Assigned by the patcher once the signal is scheduled for patching: a
    /// globally unique `punch_out_<name>_<k>` identifier (Invariant S1).
    pub punch_name: Option<String>,
}

impl SelectedSignal {
    /// The top instance (first dotted component) this signal is routed to.
    pub fn top_instance(&self) -> &str {
        self.hierarchy
            .split('.')
            .next()
            .expect("instance path is never empty")
    }
}
