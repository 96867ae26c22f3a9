// Copyright (c) 2024 texer.ai Ltd.

//! The DPI emitter (§4.6): SystemVerilog-side `import "DPI-C"` declarations
//! plus an `initial`/`always_ff` pump, and the matching C++ stub.
//!
//! The stub's text is a fixed template rendered with `tera`. It is baked
//! into the binary with `include_str!` rather than read from disk at run
//! time, so the emitter has no filesystem dependency on an external
//! template path (§4.6).

use tera::{Context, Tera};

use crate::error::Result;
use crate::model::Edge;
use crate::source_model::ModuleSource;

const STUB_TEMPLATE: &str = include_str!("../templates/dpi_stub.cpp.tera");
const STUB_TEMPLATE_NAME: &str = "dpi_stub.cpp.tera";

/// One group of signals sharing a top instance, as handed to the emitter by
/// the pipeline driver (§4.6, §4.8 step 9).
pub struct DpiGroup<'a> {
    pub top_instance: &'a str,
    pub punch_names: &'a [String],
    pub clock: &'a str,
    pub edge: Edge,
}

/// Rewrite `content` (the top instance's declaring source) to prepend the
/// `import "DPI-C"` declarations and inject the pump blocks before
/// `endmodule` (§4.6).
pub fn emit_into_source(content: &str, module_name: &str, group: &DpiGroup) -> Result<String> {
    let top = group.top_instance;
    let src = ModuleSource::new(content);

    let imports = format!(
        "import \"DPI-C\" function void init_{top}();\nimport \"DPI-C\" function void fuzz_{top}({});\n",
        group
            .punch_names
            .iter()
            .map(|p| format!("output {p}"))
            .collect::<Vec<_>>()
            .join(", ")
    );

    let args = group.punch_names.join(", ");
    let pump = format!(
        "  initial begin init_{top}(); end\n  always_ff @({} {}) begin fuzz_{top}({args}); end\n",
        group.edge, group.clock
    );

    let body_end = match src.find_declaration_spans(module_name) {
        Some(spans) => spans.body.end,
        None => content.len(),
    };

    let mut out = String::with_capacity(content.len() + imports.len() + pump.len());
    out.push_str(&imports);
    out.push_str(&content[..body_end]);
    out.push_str(&pump);
    out.push_str(&content[body_end..]);
    Ok(out)
}

/// Render the `<top>_dpi.cpp` stub for `group`, seeded with `seed` (chosen
/// once per session by the caller, per §4.6).
pub fn render_stub(group: &DpiGroup, seed: u32) -> Result<String> {
    let mut context = Context::new();
    context.insert("top", group.top_instance);
    context.insert("punches", group.punch_names);
    context.insert("seed", &seed);

    let mut tera = Tera::default();
    tera.add_raw_template(STUB_TEMPLATE_NAME, STUB_TEMPLATE)?;
    Ok(tera.render(STUB_TEMPLATE_NAME, &context)?)
}

/// The filename the stub for `top_instance` is written under, in the
/// current working directory (§6 "Generated artifacts").
pub fn stub_file_name(top_instance: &str) -> String {
    format!("{top_instance}_dpi.cpp")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emits_imports_and_pump_blocks() {
        const SRC: &str = "module root(input clk);\n  // body\nendmodule\n";
        let group = DpiGroup {
            top_instance: "root",
            punch_names: &["p1".to_string(), "p2".to_string()],
            clock: "clk",
            edge: Edge::Posedge,
        };
        let patched = emit_into_source(SRC, "root", &group).unwrap();
        assert!(patched.starts_with("import \"DPI-C\" function void init_root();"));
        assert!(patched.contains("import \"DPI-C\" function void fuzz_root(output p1, output p2);"));
        assert!(patched.contains("initial begin init_root(); end"));
        assert!(patched.contains("always_ff @(posedge clk) begin fuzz_root(p1, p2); end"));
        assert!(patched.trim_end().ends_with("endmodule"));
    }

    #[test]
    fn stub_renders_one_fuzzer_per_punch() {
        let group = DpiGroup {
            top_instance: "root",
            punch_names: &["p1".to_string(), "p2".to_string()],
            clock: "clk",
            edge: Edge::Posedge,
        };
        let stub = render_stub(&group, 42).unwrap();
        assert!(stub.contains("extern \"C\" void init_root()"));
        assert!(stub.contains("extern \"C\" void fuzz_root("));
        assert!(stub.contains("unsigned char *p1"));
        assert!(stub.contains("unsigned char *p2"));
        assert!(stub.contains("42U"));
    }

    #[test]
    fn stub_file_name_matches_top_instance() {
        assert_eq!(stub_file_name("root"), "root_dpi.cpp");
    }
}
