// Copyright (c) 2024 texer.ai Ltd.

//! The pipeline driver / session (§4.8): sequences flist resolution,
//! hierarchy indexing, module/signal selection, punch-name assignment,
//! grouping, backup, and the three patcher stages.
//!
//! The session owns exactly two pieces of mutable state — the punch-name
//! counter and the accumulated backup set — as explicit fields, never
//! process-global statics (Design Notes §9).

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use itertools::Itertools;

use crate::backup::BackupSet;
use crate::config::Config;
use crate::dpi::{self, DpiGroup};
use crate::error::{AlfError, ExitStatus, Result};
use crate::flist;
use crate::gate::{self, GateOutcome};
use crate::hierarchy;
use crate::model::{HierarchyMap, SelectedSignal};
use crate::punch;
use crate::selection::{
    ClassifiedSignal, ModuleNode, ModuleSelector, SelectorOutcome, SignalOracle, SignalSelector,
};
use crate::source_model::{ModuleSource, PortKind, SubmoduleUsage};
use crate::{noteln, warnln};

/// A session on the command line: sequences the pipeline of §4.8 for one
/// invocation.
pub struct Session {
    config: Config,
    next_punch_id: u32,
    backup: BackupSet,
    /// Chosen once per session, per §4.6 ("seeded from a random integer
    /// chosen once per session").
    dpi_seed: u32,
}

/// The patcher's working set: one file's worth of signals to gate, grouped
/// by declaring file (§3 "Grouped signals").
struct SignalGroup {
    /// The instance path used to resolve sub-instance lookups for this
    /// group's internal-signal submodule connections (§3).
    module_hierarchy: String,
    declaration_path: PathBuf,
    signals: Vec<SelectedSignal>,
}

impl Session {
    /// Build a new session over `config`, with a fresh punch-name counter
    /// and an empty backup set.
    pub fn new(config: Config) -> Self {
        Session {
            config,
            next_punch_id: 0,
            backup: BackupSet::new(),
            dpi_seed: rand::random(),
        }
    }

    /// Assign the next globally-unique `punch_out_<name>_<k>` identifier
    /// (§3 Invariant S1).
    fn next_punch_name(&mut self, signal_name: &str) -> String {
        let id = self.next_punch_id;
        self.next_punch_id += 1;
        format!("punch_out_{signal_name}_{id}")
    }

    /// Run the full pipeline (§4.8 steps 1-10).
    pub fn run(
        &mut self,
        oracle: &dyn SignalOracle,
        module_selector: &dyn ModuleSelector,
        signal_selector: &dyn SignalSelector,
    ) -> Result<ExitStatus> {
        // Step 1: resolve flist.
        let source_paths = flist::resolve(&self.config.flist_path)?;

        // Step 2: build hierarchy map.
        let hierarchy = hierarchy::build(&self.config.vcd_path, &source_paths)?;
        noteln!("indexed {} hierarchy entries", hierarchy.len());

        // Step 3: elicit selected modules.
        let selected_modules = match module_selector.select(&hierarchy)? {
            SelectorOutcome::Chosen(modules) => modules,
            SelectorOutcome::Terminate => return Ok(ExitStatus::Terminate),
        };

        // Step 4: classify each selected module, validating candidates
        // against the module's own signal_width_data (§9 "Dynamic
        // classification output must be validated").
        let classified = self.classify_modules(oracle, &hierarchy, &selected_modules)?;

        // Step 5: elicit selected signals.
        let mut selected_signals = match signal_selector.select(&classified)? {
            SelectorOutcome::Chosen(signals) => signals,
            SelectorOutcome::Terminate => return Ok(ExitStatus::Terminate),
        };

        for signal in &selected_signals {
            validate_selected_signal(&hierarchy, signal)?;
        }

        // Step 6: assign unique punch names.
        for signal in &mut selected_signals {
            signal.punch_name = Some(self.next_punch_name(&signal.name));
        }

        // Step 7: group by declaration_path.
        let groups = group_signals(&selected_signals);

        // Step 8: compute the full touched-file set up front and snapshot
        // it in a single backup write (§4.7 "the file is written once, at
        // the start of a session").
        let touched = self.touched_paths(&hierarchy, &groups, &selected_signals)?;
        for path in &touched {
            self.backup.capture(path)?;
        }
        self.backup.write_to(&self.config.cwd)?;

        // Step 9: insert gates, route punches, emit DPI.
        let mut buffers: IndexMap<PathBuf, String> = IndexMap::new();
        let result = self.patch_all(&hierarchy, &groups, &selected_signals, &mut buffers);

        // Flush whatever has been accumulated, even on a fatal punch-routing
        // error, so a killed session leaves a tree `--undo` can restore from
        // (§5 "cancellation is best-effort"; §7 "the partially-edited tree
        // is left on disk").
        let flush_result = flush_buffers(&buffers);

        result?;
        flush_result?;

        Ok(ExitStatus::Success)
    }

    fn classify_modules(
        &self,
        oracle: &dyn SignalOracle,
        hierarchy: &HierarchyMap,
        selected_modules: &[String],
    ) -> Result<Vec<ClassifiedSignal>> {
        let mut classified = Vec::new();
        for instance_path in selected_modules {
            let Some(entry) = hierarchy.get(instance_path) else {
                warnln!("selected module '{instance_path}' not found in hierarchy map, skipping");
                continue;
            };
            let node = ModuleNode {
                instance_path,
                module_name: &entry.module_name,
                signal_width_data: &entry.signal_width_data,
            };
            let verdict = oracle.classify(&node)?;
            for candidate in verdict.fuzz_candidates {
                let Some(&width) = entry.signal_width_data.get(&candidate.name) else {
                    warnln!(
                        "oracle candidate '{}' is not a known signal of module '{}', dropping",
                        candidate.name, entry.module_name
                    );
                    continue;
                };
                classified.push(ClassifiedSignal {
                    hierarchy: instance_path.clone(),
                    name: candidate.name,
                    module_name: entry.module_name.clone(),
                    declaration_path: entry.declaration_path.clone(),
                    width,
                    certainty: candidate.certainty,
                    gate_type: candidate.gate_type,
                    control_signals: verdict.control_signals.clone(),
                });
            }
        }
        Ok(classified)
    }

    /// The union of files the gate inserter, punch router, and DPI emitter
    /// will touch, computed before any write (§4.7).
    fn touched_paths(
        &self,
        hierarchy: &HierarchyMap,
        groups: &[SignalGroup],
        selected_signals: &[SelectedSignal],
    ) -> Result<Vec<PathBuf>> {
        let mut touched: Vec<PathBuf> = groups.iter().map(|g| g.declaration_path.clone()).collect();
        for signal in selected_signals {
            for step in punch::route_steps(hierarchy, &signal.hierarchy)? {
                touched.push(step.parent_declaration_path);
                touched.push(step.child_declaration_path);
            }
        }
        for top_instance in dpi_top_instances(selected_signals) {
            if let Some(entry) = hierarchy.get(&top_instance) {
                touched.push(entry.declaration_path.clone());
            }
        }
        Ok(touched.into_iter().unique().collect())
    }

    fn patch_all(
        &self,
        hierarchy: &HierarchyMap,
        groups: &[SignalGroup],
        selected_signals: &[SelectedSignal],
        buffers: &mut IndexMap<PathBuf, String>,
    ) -> Result<()> {
        // §4.8 step 9, first half: insert gates, one file at a time.
        for group in groups {
            self.insert_gates(hierarchy, group, buffers)?;
        }

        // §4.8 step 9, second half: route each signal's punch up to its top
        // instance.
        for signal in selected_signals {
            let punch_name = signal
                .punch_name
                .as_deref()
                .expect("punch names are assigned before grouping (step 6)");
            for step in punch::route_steps(hierarchy, &signal.hierarchy)? {
                ensure_loaded(buffers, &step.parent_declaration_path)?;
                let parent = buffers
                    .get(&step.parent_declaration_path)
                    .expect("just loaded above");
                let patched = punch::route_instance_edit(
                    parent,
                    &step.child_module_name,
                    &step.child_instance_name,
                    punch_name,
                )?;
                buffers.insert(step.parent_declaration_path.clone(), patched);

                ensure_loaded(buffers, &step.child_declaration_path)?;
                let child = buffers
                    .get(&step.child_declaration_path)
                    .expect("just loaded above");
                let patched = punch::route_module_edit(child, &step.child_module_name, punch_name)?;
                buffers.insert(step.child_declaration_path.clone(), patched);
            }
        }

        // DPI emission, grouped by top instance (§4.6).
        self.emit_dpi(hierarchy, selected_signals, buffers)?;

        Ok(())
    }

    fn insert_gates(
        &self,
        hierarchy: &HierarchyMap,
        group: &SignalGroup,
        buffers: &mut IndexMap<PathBuf, String>,
    ) -> Result<()> {
        ensure_loaded(buffers, &group.declaration_path)?;
        let mut content = buffers
            .remove(&group.declaration_path)
            .expect("just loaded above");

        for signal in &group.signals {
            let punch_name = signal
                .punch_name
                .as_deref()
                .expect("punch names are assigned before grouping (step 6)");
            // The control wire is declared locally only when the declaring
            // module is itself the top instance: everywhere else the punch
            // router will promote it to an `input` port of this same module,
            // and a module cannot have both (§4.4).
            let declare_locally = !signal.hierarchy.contains('.');

            let resolve_submodule_port_kind = |usage: &SubmoduleUsage| -> Option<PortKind> {
                let child_path = format!("{}.{}", group.module_hierarchy, usage.instance_name);
                let entry = hierarchy.get(&child_path)?;
                let submodule_content = buffers
                    .get(&entry.declaration_path)
                    .cloned()
                    .or_else(|| std::fs::read_to_string(&entry.declaration_path).ok())?;
                ModuleSource::new(&submodule_content).port_kind(&entry.module_name, &usage.port_name)
            };

            match gate::insert(
                &content,
                &signal.module_name,
                &signal.name,
                punch_name,
                signal.gate_type,
                declare_locally,
                resolve_submodule_port_kind,
            ) {
                GateOutcome::Patched { content: patched, warnings } => {
                    for w in warnings {
                        warnln!("{w}");
                    }
                    content = patched;
                }
                GateOutcome::NotFound(reason) => {
                    warnln!(
                        "gate insertion skipped for '{}.{}': {reason}",
                        signal.hierarchy, signal.name
                    );
                }
            }
        }

        buffers.insert(group.declaration_path.clone(), content);
        Ok(())
    }

    fn emit_dpi(
        &self,
        hierarchy: &HierarchyMap,
        selected_signals: &[SelectedSignal],
        buffers: &mut IndexMap<PathBuf, String>,
    ) -> Result<()> {
        let mut by_top: IndexMap<String, Vec<&SelectedSignal>> = IndexMap::new();
        for signal in selected_signals {
            if signal.punch_name.is_none() {
                continue;
            }
            by_top
                .entry(signal.top_instance().to_string())
                .or_default()
                .push(signal);
        }

        for (top_instance, signals) in by_top {
            let Some(entry) = hierarchy.get(&top_instance) else {
                warnln!("top instance '{top_instance}' not found in hierarchy map, skipping DPI emission");
                continue;
            };
            let punch_names: Vec<String> = signals
                .iter()
                .map(|s| s.punch_name.clone().expect("checked above"))
                .collect();
            let first = signals[0];
            let group = DpiGroup {
                top_instance: &top_instance,
                punch_names: &punch_names,
                clock: &first.parent_module_control_signals.clock,
                edge: first.parent_module_control_signals.edge,
            };

            ensure_loaded(buffers, &entry.declaration_path)?;
            let content = buffers
                .get(&entry.declaration_path)
                .expect("just loaded above");
            let patched = dpi::emit_into_source(content, &entry.module_name, &group)?;
            buffers.insert(entry.declaration_path.clone(), patched);

            let stub = dpi::render_stub(&group, self.dpi_seed)?;
            let stub_path = self.config.cwd.join(dpi::stub_file_name(&top_instance));
            std::fs::write(&stub_path, stub).map_err(|e| AlfError::io(stub_path, e))?;
        }

        Ok(())
    }
}

/// Read `path` into `buffers` if it is not already loaded. The real
/// snapshot already happened up front (§4.8 step 8); this is just the
/// in-memory read, never a second capture.
fn ensure_loaded(buffers: &mut IndexMap<PathBuf, String>, path: &Path) -> Result<()> {
    if buffers.contains_key(path) {
        return Ok(());
    }
    let content = std::fs::read_to_string(path).map_err(|e| AlfError::io(path, e))?;
    buffers.insert(path.to_path_buf(), content);
    Ok(())
}

fn flush_buffers(buffers: &IndexMap<PathBuf, String>) -> Result<()> {
    for (path, content) in buffers {
        std::fs::write(path, content).map_err(|e| AlfError::io(path.clone(), e))?;
    }
    Ok(())
}

/// Group signals by declaring file, preserving first-seen order (§3
/// "Grouped signals").
fn group_signals(signals: &[SelectedSignal]) -> Vec<SignalGroup> {
    let mut groups: IndexMap<PathBuf, SignalGroup> = IndexMap::new();
    for signal in signals {
        groups
            .entry(signal.declaration_path.clone())
            .or_insert_with(|| SignalGroup {
                module_hierarchy: signal.hierarchy.clone(),
                declaration_path: signal.declaration_path.clone(),
                signals: Vec::new(),
            })
            .signals
            .push(signal.clone());
    }
    groups.into_values().collect()
}

fn dpi_top_instances(signals: &[SelectedSignal]) -> Vec<String> {
    signals
        .iter()
        .map(|signal| signal.top_instance().to_string())
        .unique()
        .collect()
}

/// Validate Invariant S2: the signal's `declaration_path` must appear as the
/// `declaration_path` of at least one instance on its own instance path.
fn validate_selected_signal(hierarchy: &HierarchyMap, signal: &SelectedSignal) -> Result<()> {
    let parts: Vec<&str> = signal.hierarchy.split('.').collect();
    for i in 1..=parts.len() {
        let prefix = parts[..i].join(".");
        if let Some(entry) = hierarchy.get(&prefix) {
            if entry.declaration_path == signal.declaration_path {
                return Ok(());
            }
        }
    }
    Err(AlfError::Configuration(format!(
        "selected signal '{}' at '{}': declaration path {} is not on its own instance path",
        signal.name,
        signal.hierarchy,
        signal.declaration_path.display()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ControlSignals, Edge, GateType, HierarchyEntry};
    use crate::selection::{CertaintyThreshold, SelectAll, ThresholdSignalOracle};
    use indexmap::IndexMap as Map;
    use pretty_assertions::assert_eq;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn end_to_end_single_level_session_patches_and_emits_dpi() {
        let dir = tempfile::tempdir().unwrap();

        let top_sv = write(
            dir.path(),
            "top.sv",
            "module top(input clk);\n  logic busy;\n  always_ff @(posedge clk) busy <= 1'b1;\nendmodule\n",
        );

        let vcd = "$scope module top $end\n\
                    $var wire 1 # clk $end\n\
                    $var wire 1 $ busy $end\n\
                    $upscope $end\n";
        let vcd_path = write(dir.path(), "dump.vcd", vcd);

        let flist_path = write(dir.path(), "design.flist", &format!("{}\n", top_sv.display()));

        let config = Config {
            cwd: dir.path().to_path_buf(),
            vcd_path,
            flist_path,
            oracle_allow: Some(vec!["busy".to_string()]),
            certainty_threshold: 0,
            gate_type: GateType::And,
        };
        let mut session = Session::new(config);

        let oracle = ThresholdSignalOracle::new(Some(vec!["busy".to_string()]));
        let module_selector = SelectAll;
        let signal_selector = CertaintyThreshold { threshold: 0 };

        let status = session.run(&oracle, &module_selector, &signal_selector).unwrap();
        assert_eq!(status, ExitStatus::Success);

        assert!(dir.path().join("backup.json").is_file());
        assert!(dir.path().join("top_dpi.cpp").is_file());

        let patched = std::fs::read_to_string(&top_sv).unwrap();
        assert!(patched.contains("import \"DPI-C\" function void init_top();"));
        assert!(patched.contains("assign modified_busy = busy & punch_out_busy_0;"));
        assert!(patched.contains("always_ff @(posedge clk) begin fuzz_top("));
    }

    #[test]
    fn undo_restores_byte_exact_after_a_completed_session() {
        let dir = tempfile::tempdir().unwrap();

        let original = "module top(input clk);\n  logic busy;\n  assign busy = clk;\nendmodule\n";
        let top_sv = write(dir.path(), "top.sv", original);

        let vcd = "$scope module top $end\n\
                    $var wire 1 # clk $end\n\
                    $var wire 1 $ busy $end\n\
                    $upscope $end\n";
        let vcd_path = write(dir.path(), "dump.vcd", vcd);
        let flist_path = write(dir.path(), "design.flist", &format!("{}\n", top_sv.display()));

        let config = Config {
            cwd: dir.path().to_path_buf(),
            vcd_path,
            flist_path,
            oracle_allow: None,
            certainty_threshold: 0,
            gate_type: GateType::And,
        };
        let mut session = Session::new(config);
        session
            .run(&ThresholdSignalOracle::new(None), &SelectAll, &CertaintyThreshold { threshold: 0 })
            .unwrap();

        assert_ne!(std::fs::read_to_string(&top_sv).unwrap(), original);

        crate::backup::undo(dir.path()).unwrap();
        assert_eq!(std::fs::read_to_string(&top_sv).unwrap(), original);
        assert!(!dir.path().join("backup.json").is_file());
    }

    #[test]
    fn multi_level_session_routes_punch_through_ancestors() {
        let dir = tempfile::tempdir().unwrap();

        let root_sv = write(
            dir.path(),
            "root.sv",
            "module root(input clk);\n  mid mid_i (.clk(clk));\nendmodule\n",
        );
        let mid_sv = write(
            dir.path(),
            "mid.sv",
            "module mid(input clk);\n  logic busy;\n  always_ff @(posedge clk) busy <= 1'b1;\nendmodule\n",
        );

        let vcd = "$scope module root $end\n\
                    $var wire 1 # clk $end\n\
                    $scope module mid_i $end\n\
                    $var wire 1 $ clk $end\n\
                    $var wire 1 % busy $end\n\
                    $upscope $end\n\
                    $upscope $end\n";
        let vcd_path = write(dir.path(), "dump.vcd", vcd);
        let flist_path = write(
            dir.path(),
            "design.flist",
            &format!("{}\n{}\n", root_sv.display(), mid_sv.display()),
        );

        let config = Config {
            cwd: dir.path().to_path_buf(),
            vcd_path,
            flist_path,
            oracle_allow: Some(vec!["busy".to_string()]),
            certainty_threshold: 0,
            gate_type: GateType::And,
        };
        let mut session = Session::new(config);
        let status = session
            .run(&ThresholdSignalOracle::new(Some(vec!["busy".to_string()])), &SelectAll, &CertaintyThreshold { threshold: 0 })
            .unwrap();
        assert_eq!(status, ExitStatus::Success);

        let patched_root = std::fs::read_to_string(&root_sv).unwrap();
        assert!(patched_root.contains(".punch_out_busy_0(punch_out_busy_0),"));
        // root is the top instance: its own port list is not touched.
        assert!(patched_root.starts_with("module root(input clk)"));

        let patched_mid = std::fs::read_to_string(&mid_sv).unwrap();
        assert!(patched_mid.starts_with("module mid(input punch_out_busy_0,"));
        assert!(patched_mid.contains("assign modified_busy = busy & punch_out_busy_0;"));
    }

    #[test]
    fn s2_violation_on_hand_built_signal_is_rejected() {
        let mut hierarchy = HierarchyMap::new();
        hierarchy.insert(
            "top".to_string(),
            HierarchyEntry {
                declaration_path: "top.sv".into(),
                module_name: "top".to_string(),
                signal_width_data: Map::new(),
            },
        );
        let bogus = SelectedSignal {
            hierarchy: "top".to_string(),
            name: "x".to_string(),
            module_name: "top".to_string(),
            declaration_path: "elsewhere.sv".into(),
            width: 1,
            certainty: 100,
            parent_module_control_signals: ControlSignals {
                clock: "clk".to_string(),
                reset: "rst_n".to_string(),
                edge: Edge::Posedge,
            },
            gate_type: GateType::And,
            punch_name: None,
        };
        let err = validate_selected_signal(&hierarchy, &bogus).unwrap_err();
        assert!(matches!(err, AlfError::Configuration(_)));
    }
}
