// Copyright (c) 2024 texer.ai Ltd.

//! The punch router (§4.5): routes a control wire from outside a declaring
//! module up to (but not through) the top instance on its path.
//!
//! Each level contributes two independent, byte-exact edits: an *instance
//! edit* in the parent's source (bind the new port at the instantiation
//! site) and a *module edit* in the child's source (declare the new port).
//! Both are expressed as "insert immediately after the opening parenthesis"
//! per §4.5, so both share [`insert_after_open_paren`].

use std::path::PathBuf;

use regex::Regex;

use crate::error::{AlfError, Result};
use crate::model::HierarchyMap;

/// Insert `text` immediately after the first `(` that opens `anchor`'s
/// argument/port list, leaving the rest of `content` byte-exact.
///
/// `anchor` is a regex whose match ends exactly at the opening `(` (i.e. the
/// pattern itself should end in `\(`).
fn insert_after_open_paren(content: &str, anchor: &Regex, text: &str) -> Option<String> {
    let m = anchor.find(content)?;
    let insert_at = m.end();
    let mut out = String::with_capacity(content.len() + text.len());
    out.push_str(&content[..insert_at]);
    out.push_str(text);
    out.push_str(&content[insert_at..]);
    Some(out)
}

fn instantiation_anchor(child_module: &str, instance_name: &str) -> Regex {
    Regex::new(&format!(
        r"\b{}\b\s+(?:#\s*\([^;]*?\)\s+)?{}\s*\(",
        regex::escape(child_module),
        regex::escape(instance_name)
    ))
    .expect("built from escaped identifiers")
}

fn module_declaration_anchor(module_name: &str) -> Regex {
    Regex::new(&format!(r"\bmodule\s+{}\s*\(", regex::escape(module_name)))
        .expect("built from escaped identifier")
}

/// Add `.{punch}({punch}),` immediately after the opening parenthesis of the
/// instantiation `<child_module> <instance_name> (` inside `parent_content`.
pub fn route_instance_edit(
    parent_content: &str,
    child_module: &str,
    instance_name: &str,
    punch_name: &str,
) -> Result<String> {
    let anchor = instantiation_anchor(child_module, instance_name);
    insert_after_open_paren(parent_content, &anchor, &format!(".{punch_name}({punch_name}),")).ok_or_else(|| {
        AlfError::PunchRoutingFailed {
            punch_name: punch_name.to_string(),
            hierarchy: instance_name.to_string(),
            reason: format!("instantiation of '{child_module}' as '{instance_name}' not found"),
        }
    })
}

/// Add `input {punch},` immediately after the opening parenthesis of
/// `module <child_module>(` inside `child_content`.
pub fn route_module_edit(child_content: &str, child_module: &str, punch_name: &str) -> Result<String> {
    let anchor = module_declaration_anchor(child_module);
    insert_after_open_paren(child_content, &anchor, &format!("input {punch_name},")).ok_or_else(|| {
        AlfError::PunchRoutingFailed {
            punch_name: punch_name.to_string(),
            hierarchy: child_module.to_string(),
            reason: format!("declaration of module '{child_module}' not found"),
        }
    })
}

/// One step of the routing walk: an ancestor pair `(parent_instance,
/// child_instance)` together with the files and module names involved.
#[derive(Debug, Clone)]
pub struct RouteStep {
    pub parent_declaration_path: PathBuf,
    pub child_declaration_path: PathBuf,
    pub child_module_name: String,
    pub child_instance_name: String,
}

/// Compute the ordered `(parent_instance, child_instance)` routing steps for
/// `instance_path`. The top instance (`parts[0]`) only ever appears as a
/// parent: its own module declaration is excluded from the module edit,
/// matching §4.5/E4 ("root's module declaration is not edited").
pub fn plan_route(instance_path: &str) -> Vec<(&str, &str)> {
    let parts: Vec<&str> = instance_path.split('.').collect();
    (1..parts.len()).map(|i| (parts[i - 1], parts[i])).collect()
}

/// Resolve [`plan_route`]'s ancestor pairs against the hierarchy map,
/// attaching the declaring file and module name each step needs (§4.5, §4.8
/// step 9). Invariant H1 guarantees every prefix looked up here is present.
pub fn route_steps(hierarchy: &HierarchyMap, instance_path: &str) -> Result<Vec<RouteStep>> {
    let parts: Vec<&str> = instance_path.split('.').collect();
    let mut steps = Vec::with_capacity(parts.len().saturating_sub(1));
    for i in 1..parts.len() {
        let parent_path = parts[..i].join(".");
        let child_path = parts[..=i].join(".");
        let parent_entry = hierarchy.get(&parent_path).ok_or_else(|| AlfError::PunchRoutingFailed {
            punch_name: String::new(),
            hierarchy: instance_path.to_string(),
            reason: format!("no hierarchy entry for ancestor '{parent_path}'"),
        })?;
        let child_entry = hierarchy.get(&child_path).ok_or_else(|| AlfError::PunchRoutingFailed {
            punch_name: String::new(),
            hierarchy: instance_path.to_string(),
            reason: format!("no hierarchy entry for ancestor '{child_path}'"),
        })?;
        steps.push(RouteStep {
            parent_declaration_path: parent_entry.declaration_path.clone(),
            child_declaration_path: child_entry.declaration_path.clone(),
            child_module_name: child_entry.module_name.clone(),
            child_instance_name: parts[i].to_string(),
        });
    }
    Ok(steps)
}
