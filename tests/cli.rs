// Copyright (c) 2024 texer.ai Ltd.

//! End-to-end regression tests that exercise the real `alf` binary through
//! `assert_cmd`, each against a small fixture tree laid out in a temp
//! directory.

use assert_cmd::cargo;
use pretty_assertions::assert_eq;
use std::path::Path;

fn write(dir: &Path, name: &str, content: &str) {
    std::fs::write(dir.join(name), content).unwrap();
}

/// Lay out a single-module fixture: one top-level source with an internal
/// signal `busy`, and a VCD naming it, in a fresh temp directory.
fn single_module_fixture() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "top.sv",
        "module top(input clk);\n  \
         logic busy;\n  \
         always_ff @(posedge clk) busy <= 1'b1;\n\
         endmodule\n",
    );
    write(
        dir.path(),
        "dump.vcd",
        "$scope module top $end\n\
         $var wire 1 # clk $end\n\
         $var wire 1 $ busy $end\n\
         $upscope $end\n",
    );
    write(dir.path(), "design.flist", "top.sv\n");
    dir
}

#[test]
fn patches_the_tree_and_emits_a_dpi_stub() {
    let dir = single_module_fixture();

    let out = cargo::cargo_bin_cmd!()
        .args(["--vcd", "dump.vcd", "--flist", "design.flist", "--oracle-allow", "busy"])
        .current_dir(dir.path())
        .output()
        .expect("failed to run alf");

    assert!(
        out.status.success(),
        "run failed.\nstdout:\n{}\nstderr:\n{}",
        String::from_utf8_lossy(&out.stdout),
        String::from_utf8_lossy(&out.stderr)
    );

    assert!(dir.path().join("backup.json").is_file());
    assert!(dir.path().join("top_dpi.cpp").is_file());

    let patched = std::fs::read_to_string(dir.path().join("top.sv")).unwrap();
    assert!(patched.contains("import \"DPI-C\" function void init_top();"));
    assert!(patched.contains("assign modified_busy = busy & punch_out_busy_0;"));
    assert!(patched.contains("always_ff @(posedge clk) begin fuzz_top("));
}

#[test]
fn undo_restores_the_original_bytes() {
    let dir = single_module_fixture();
    let original = std::fs::read_to_string(dir.path().join("top.sv")).unwrap();

    let run = cargo::cargo_bin_cmd!()
        .args(["--vcd", "dump.vcd", "--flist", "design.flist", "--oracle-allow", "busy"])
        .current_dir(dir.path())
        .output()
        .expect("failed to run alf");
    assert!(run.status.success());
    assert_ne!(std::fs::read_to_string(dir.path().join("top.sv")).unwrap(), original);

    let undo = cargo::cargo_bin_cmd!()
        .args(["--undo"])
        .current_dir(dir.path())
        .output()
        .expect("failed to run alf --undo");
    assert!(
        undo.status.success(),
        "undo failed.\nstderr:\n{}",
        String::from_utf8_lossy(&undo.stderr)
    );

    assert_eq!(std::fs::read_to_string(dir.path().join("top.sv")).unwrap(), original);
    assert!(!dir.path().join("backup.json").is_file());
}

#[test]
fn missing_vcd_flag_fails_with_a_configuration_message() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "design.flist", "");

    let out = cargo::cargo_bin_cmd!()
        .args(["--flist", "design.flist"])
        .current_dir(dir.path())
        .output()
        .expect("failed to run alf");

    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("--vcd"));
}

#[test]
fn undo_without_a_prior_session_fails() {
    let dir = tempfile::tempdir().unwrap();

    let out = cargo::cargo_bin_cmd!()
        .args(["--undo"])
        .current_dir(dir.path())
        .output()
        .expect("failed to run alf --undo");

    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("no backup found") || stderr.contains("undo failed"));
}
