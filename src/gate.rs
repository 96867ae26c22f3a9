// Copyright (c) 2024 texer.ai Ltd.

//! The gate inserter (§4.4): wraps one local signal of a declaring module
//! with an AND/OR gate fed by a punch wire, renaming the signal's other
//! uses in the body to the new `modified_<signal>` identifier.
//!
//! This module never touches the filesystem or the design hierarchy: the
//! internal-signal case needs to know whether a submodule's port is an
//! input or an output, and that lookup crosses into another file, so
//! callers resolve it and hand the answer in through a closure
//! (`resolve_submodule_port_kind`). That keeps this module testable on bare
//! strings, the same way [`crate::source_model`] is.

use std::ops::Range;

use regex::Regex;

use crate::model::GateType;
use crate::source_model::{ModuleSource, PortKind, SubmoduleUsage};

/// The outcome of a gate-insertion attempt.
pub enum GateOutcome {
    /// The signal was patched; `content` is the full rewritten file.
    Patched { content: String, warnings: Vec<String> },
    /// The module or the signal could not be located; the caller should
    /// warn and leave this signal unpatched (§7 "pattern-not-found ...
    /// non-fatal per signal").
    NotFound(String),
}

/// Insert gating for `signal_name`, declared in `module_name` within
/// `content`, feeding `punch_name` in through `gate_type` (§4.4).
///
/// `resolve_submodule_port_kind` is consulted only for the internal-signal
/// case (§4.4 case 3c), once per submodule connection found in the body.
///
/// `declare_punch_locally` controls whether a bare `logic <punch_name>;` is
/// declared in the body. It should be `false` whenever the punch router will
/// subsequently promote `punch_name` to an `input` port of this same module
/// (every non-top declaring module, per §4.5/E4): a module cannot have both
/// a plain `logic` declaration and a port of the same name. It is `true`
/// only when the declaring module is itself the top instance, where the
/// control wire truly is produced locally, by the DPI pump (§4.4, §4.6).
pub fn insert(
    content: &str,
    module_name: &str,
    signal_name: &str,
    punch_name: &str,
    gate_type: GateType,
    declare_punch_locally: bool,
    resolve_submodule_port_kind: impl Fn(&SubmoduleUsage) -> Option<PortKind>,
) -> GateOutcome {
    let src = ModuleSource::new(content);
    let Some(spans) = src.find_declaration_spans(module_name) else {
        return GateOutcome::NotFound(format!("module '{module_name}' not found"));
    };

    let kind = src.port_kind(module_name, signal_name);
    let body = &content[spans.body.clone()];

    let (new_body, warnings) = match kind {
        Some(PortKind::Output) => (
            patch_output_port(body, signal_name, punch_name, gate_type, declare_punch_locally),
            Vec::new(),
        ),
        Some(PortKind::Input) | Some(PortKind::Inout) => (
            patch_input_port(body, signal_name, punch_name, gate_type, declare_punch_locally),
            Vec::new(),
        ),
        None => match patch_internal_signal(
            &src,
            body,
            signal_name,
            punch_name,
            gate_type,
            declare_punch_locally,
            resolve_submodule_port_kind,
        ) {
            Some(result) => result,
            None => {
                return GateOutcome::NotFound(format!(
                    "signal '{signal_name}' not found in module '{module_name}'"
                ));
            }
        },
    };

    let mut patched = String::with_capacity(content.len() + new_body.len());
    patched.push_str(&content[..spans.body.start]);
    patched.push_str(&new_body);
    patched.push_str(&content[spans.body.end..]);

    GateOutcome::Patched {
        content: patched,
        warnings,
    }
}

fn modified_name(signal_name: &str) -> String {
    format!("modified_{signal_name}")
}

fn word_re(name: &str) -> Regex {
    Regex::new(&format!(r"\b{}\b", regex::escape(name))).expect("built from escaped identifier")
}

/// Rename every whole-word, non-hierarchical occurrence of `name` in `body`
/// to `replacement`, except inside `protect` ranges.
fn rename_whole_word(body: &str, name: &str, replacement: &str, protect: &[Range<usize>]) -> String {
    let re = word_re(name);
    let mut out = String::with_capacity(body.len());
    let mut last = 0;
    for m in re.find_iter(body) {
        let dotted = m.start() > 0 && body.as_bytes()[m.start() - 1] == b'.';
        let protected = dotted || protect.iter().any(|r| r.start <= m.start() && m.end() <= r.end());
        out.push_str(&body[last..m.start()]);
        out.push_str(if protected { m.as_str() } else { replacement });
        last = m.end();
    }
    out.push_str(&body[last..]);
    out
}

fn patch_output_port(
    body: &str,
    signal_name: &str,
    punch_name: &str,
    gate_type: GateType,
    declare_punch_locally: bool,
) -> String {
    let modified = modified_name(signal_name);
    let renamed = rename_whole_word(body, signal_name, &modified, &[]);
    append_gate_declarations(
        &renamed,
        signal_name,
        &modified,
        punch_name,
        gate_type,
        true,
        declare_punch_locally,
    )
}

fn patch_input_port(
    body: &str,
    signal_name: &str,
    punch_name: &str,
    gate_type: GateType,
    declare_punch_locally: bool,
) -> String {
    let modified = modified_name(signal_name);
    let renamed = rename_whole_word(body, signal_name, &modified, &[]);
    append_gate_declarations(
        &renamed,
        signal_name,
        &modified,
        punch_name,
        gate_type,
        false,
        declare_punch_locally,
    )
}

/// Append the punch-wire declaration and the gating assignment to `body`.
///
/// `output_gate` selects case 1's `assign <signal> = <modified> <op> <punch>;`
/// (the original port keeps driving outward through the renamed signal) vs.
/// cases 2/3's `assign <modified> = <signal> <op> <punch>;`.
fn append_gate_declarations(
    body: &str,
    signal_name: &str,
    modified: &str,
    punch_name: &str,
    gate_type: GateType,
    output_gate: bool,
    declare_punch_locally: bool,
) -> String {
    let op = gate_type.op();
    let mut out = body.to_string();
    if !out.ends_with('\n') {
        out.push('\n');
    }
    if declare_punch_locally {
        out.push_str(&format!("  logic {punch_name};\n"));
    }
    if output_gate {
        out.push_str(&format!("  assign {signal_name} = {modified} {op} {punch_name};\n"));
    } else {
        out.push_str(&format!("  wire {modified};\n"));
        out.push_str(&format!("  assign {modified} = {signal_name} {op} {punch_name};\n"));
    }
    out
}

fn own_declaration_range(body: &str, signal_name: &str) -> Option<Range<usize>> {
    let pattern = format!(
        r"(?m)^[ \t]*\b(?:wire|reg|logic)\b[^;\n]*\b{}\b[^;\n]*;",
        regex::escape(signal_name)
    );
    let re = Regex::new(&pattern).expect("built from escaped identifier");
    re.find(body).map(|m| m.range())
}

fn assignment_lhs_ranges(body: &str, signal_name: &str) -> Vec<Range<usize>> {
    let pattern = format!(
        r"(?m)^[ \t]*(?:assign\s+)?({})\s*(?:<=|=)(?!=)",
        regex::escape(signal_name)
    );
    let re = Regex::new(&pattern).expect("built from escaped identifier");
    re.captures_iter(body)
        .filter_map(|cap| cap.get(1).map(|m| m.range()))
        .collect()
}

/// Case 3, §4.4: rename reads of an internal signal while preserving its
/// own declaration, its assignment LHS occurrences, and any submodule
/// connection whose port is not a known input.
fn patch_internal_signal(
    src: &ModuleSource,
    body: &str,
    signal_name: &str,
    punch_name: &str,
    gate_type: GateType,
    declare_punch_locally: bool,
    resolve_submodule_port_kind: impl Fn(&SubmoduleUsage) -> Option<PortKind>,
) -> Option<(String, Vec<String>)> {
    let declaration_range = own_declaration_range(body, signal_name)?;

    let mut protect = vec![declaration_range];
    protect.extend(assignment_lhs_ranges(body, signal_name));

    let mut warnings = Vec::new();
    for usage in src.find_submodule_usages_of(signal_name, body) {
        let keep_unrewritten = match resolve_submodule_port_kind(&usage) {
            Some(PortKind::Input) => false,
            Some(_) => true,
            None => {
                warnings.push(format!(
                    "internal signal '{signal_name}': unknown submodule port direction for instance '{}', port '{}' — connection left unchanged",
                    usage.instance_name, usage.port_name
                ));
                true
            }
        };
        if keep_unrewritten {
            protect.push(usage.signal_range);
        }
    }

    let modified = modified_name(signal_name);
    let renamed = rename_whole_word(body, signal_name, &modified, &protect);
    let patched = append_gate_declarations(
        &renamed,
        signal_name,
        &modified,
        punch_name,
        gate_type,
        false,
        declare_punch_locally,
    );
    Some((patched, warnings))
}
