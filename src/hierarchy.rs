// Copyright (c) 2024 texer.ai Ltd.

//! The hierarchy indexer (§4.2): correlates a VCD scope tree with a
//! regex-scanned source tree to build the [`HierarchyMap`](crate::model::HierarchyMap).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use indexmap::IndexMap;
use regex::Regex;

use crate::error::{AlfError, Result};
use crate::model::{HierarchyEntry, HierarchyMap};
use crate::warnln;

fn module_declare_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"module\s+([^\s#(]+)").expect("static pattern"))
}

/// Matches `<ModuleType> [#( ... )] <instance_name> (`. The `module` keyword
/// itself can match this shape too (`module foo (`); callers filter out a
/// captured class of literally `module` rather than relying on a lookbehind,
/// which the `regex` crate does not support.
fn instantiation_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)\b([A-Za-z_]\w*)\s+(?:#\s*\([^;]*?\)\s+)?([A-Za-z_]\w*)\s*\(")
            .expect("static pattern")
    })
}

/// A node of the raw VCD scope tree (Phase A, §4.2), keyed by scope
/// identifier before any correlation with source files has happened.
#[derive(Debug, Default)]
struct ScopeNode {
    signal_width_data: IndexMap<String, u32>,
    children: IndexMap<String, ScopeNode>,
}

/// Phase A: walk the VCD's `$scope`/`$upscope`/`$var` lines into a tree of
/// [`ScopeNode`]s, skipping anything nested under a struct/interface/union
/// scope (§4.2, E2, Testable Property 7).
fn walk_vcd_scopes(vcd_text: &str) -> ScopeNode {
    let mut root = ScopeNode::default();
    let mut path: Vec<String> = Vec::new();
    let mut struct_depth: u32 = 0;

    for raw_line in vcd_text.lines() {
        let line = raw_line.trim();

        if let Some(rest) = line.strip_prefix("$scope module ") {
            if struct_depth == 0 {
                if let Some(id) = rest.strip_suffix(" $end") {
                    path.push(id.trim().to_string());
                    node_at(&mut root, &path);
                }
            }
        } else if is_non_module_scope(line) {
            struct_depth += 1;
        } else if line == "$upscope $end" {
            if struct_depth > 0 {
                struct_depth -= 1;
            } else if !path.is_empty() {
                path.pop();
            }
        } else if struct_depth == 0 {
            if let Some((name, width)) = parse_var_line(line) {
                let node = node_at(&mut root, &path);
                node.signal_width_data.insert(name, width);
            }
        }
    }

    root
}

fn is_non_module_scope(line: &str) -> bool {
    for kind in ["$scope struct ", "$scope interface ", "$scope union "] {
        if line.starts_with(kind) && line.ends_with(" $end") {
            return true;
        }
    }
    false
}

fn parse_var_line(line: &str) -> Option<(String, u32)> {
    let rest = line.strip_prefix("$var wire ")?;
    let rest = rest.strip_suffix(" $end")?;
    let mut parts = rest.splitn(3, ' ');
    let width: u32 = parts.next()?.parse().ok()?;
    let _vcd_id = parts.next()?;
    let name_field = parts.next()?;
    let name = name_field.split('[').next().unwrap_or(name_field);
    Some((name.to_string(), width))
}

fn node_at<'a>(root: &'a mut ScopeNode, path: &[String]) -> &'a mut ScopeNode {
    let mut node = root;
    for part in path {
        node = node.children.entry(part.clone()).or_default();
    }
    node
}

/// Phase B: scan already-resolved source files for module declarations and
/// instantiation sites (§4.2).
struct SourceScan {
    /// module name -> declaring file.
    module_declarations: HashMap<String, PathBuf>,
    /// instance name -> declaring file of its (unresolved) class.
    entity_to_path: HashMap<String, PathBuf>,
    /// instance name -> module class (type) name.
    entity_to_class: HashMap<String, String>,
}

fn scan_sources(source_paths: &str) -> SourceScan {
    let mut scan = SourceScan {
        module_declarations: HashMap::new(),
        entity_to_path: HashMap::new(),
        entity_to_class: HashMap::new(),
    };

    for line in source_paths.lines() {
        let path = line.trim();
        if path.is_empty() {
            continue;
        }
        let file_path = Path::new(path);
        if !file_path.is_file() {
            warnln!("source file not found, skipping: {path}");
            continue;
        }
        let content = match std::fs::read_to_string(file_path) {
            Ok(c) => c,
            Err(e) => {
                warnln!("failed to read {path}: {e}");
                continue;
            }
        };

        for cap in module_declare_re().captures_iter(&content) {
            let module = cap[1].to_string();
            scan.module_declarations
                .insert(module, file_path.to_path_buf());
        }

        for cap in instantiation_re().captures_iter(&content) {
            let module_class = cap[1].to_string();
            if module_class == "module" {
                continue;
            }
            let instance_name = cap[2].to_string();
            scan.entity_to_path
                .insert(instance_name.clone(), file_path.to_path_buf());
            scan.entity_to_class.insert(instance_name, module_class);
        }
    }

    scan
}

/// Phase C: flatten the scope tree into dotted instance paths, collapsing
/// nodes that correlate with neither a module declaration nor a known
/// instantiation, and merging their signals into the nearest kept ancestor
/// (§4.2).
fn flatten(root: &ScopeNode, scan: &SourceScan) -> HierarchyMap {
    let mut design_info: IndexMap<String, IndexMap<String, u32>> = IndexMap::new();

    fn visit(
        node: &ScopeNode,
        current_path: &str,
        scan: &SourceScan,
        design_info: &mut IndexMap<String, IndexMap<String, u32>>,
    ) {
        for (key, child) in &node.children {
            let is_known = scan.module_declarations.contains_key(key)
                || scan.entity_to_path.contains_key(key);

            let full_path = if is_known {
                if current_path.is_empty() {
                    key.clone()
                } else {
                    format!("{current_path}.{key}")
                }
            } else {
                current_path.to_string()
            };

            if is_known {
                design_info
                    .entry(full_path.clone())
                    .or_default()
                    .extend(child.signal_width_data.clone());
            } else {
                // Collapsed: merge into the nearest kept ancestor.
                design_info
                    .entry(full_path.clone())
                    .or_default()
                    .extend(child.signal_width_data.clone());
            }

            visit(child, &full_path, scan, design_info);
        }
    }

    visit(root, "", scan, &mut design_info);
    design_info.shift_remove("");

    let mut map = HierarchyMap::new();
    for (path, signal_width_data) in design_info {
        let module_name = path.rsplit('.').next().unwrap_or(&path).to_string();

        if let Some(decl) = scan.module_declarations.get(&module_name) {
            map.insert(
                path,
                HierarchyEntry {
                    declaration_path: decl.clone(),
                    module_name,
                    signal_width_data,
                },
            );
            continue;
        }

        if let Some(class) = scan.entity_to_class.get(&module_name) {
            if let Some(decl) = scan.module_declarations.get(class) {
                map.insert(
                    path,
                    HierarchyEntry {
                        declaration_path: decl.clone(),
                        module_name: class.clone(),
                        signal_width_data,
                    },
                );
            }
        }
    }

    map
}

/// Build the design hierarchy map from a VCD dump and a newline-joined list
/// of resolved source paths (output of [`crate::flist::resolve`]) (§4.2).
pub fn build(vcd_path: &Path, source_paths: &str) -> Result<HierarchyMap> {
    if !vcd_path.is_file() {
        return Err(AlfError::Configuration(format!(
            "VCD file not found: {}",
            vcd_path.display()
        )));
    }
    let vcd_text =
        std::fs::read_to_string(vcd_path).map_err(|e| AlfError::io(vcd_path, e))?;

    let root = walk_vcd_scopes(&vcd_text);
    let scan = scan_sources(source_paths);
    let map = flatten(&root, &scan);

    crate::model::validate_hierarchy(&map)?;
    Ok(map)
}
