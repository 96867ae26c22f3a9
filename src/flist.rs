// Copyright (c) 2024 texer.ai Ltd.

//! The flist resolver (§4.1): expands a file-list into absolute source paths.
//!
//! `${VAR}` substitution goes through `subst`, restricted to environment-
//! variable lookups, so an unset variable surfaces as a descriptive error
//! instead of silently becoming an empty string. Recursive `+incdir+` walks
//! use `walkdir::WalkDir`, which gives a directory-walk order that is
//! stable for a given filesystem state without this module sorting
//! anything itself.

use std::collections::HashMap;
use std::path::Path;

use walkdir::WalkDir;

use crate::error::{AlfError, Result};

/// Resolve a file-list at `flist_path` into a newline-joined list of absolute
/// source paths (§4.1, §6).
pub fn resolve(flist_path: &Path) -> Result<String> {
    let mut lines = Vec::new();
    resolve_into(flist_path, &mut lines)?;
    Ok(lines.join("\n"))
}

fn resolve_into(flist_path: &Path, out: &mut Vec<String>) -> Result<()> {
    let content = std::fs::read_to_string(flist_path)
        .map_err(|e| AlfError::io(flist_path, e))?;

    for raw_line in content.lines() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with("//") || line.starts_with('#') {
            continue;
        }

        let expanded = expand_env_vars(line)?;

        if let Some(dir) = expanded.strip_prefix("+incdir+") {
            expand_incdir(Path::new(dir), out)?;
        } else if let Some(rest) = expanded.strip_prefix("-F") {
            let nested = rest.trim();
            let nested_path = Path::new(nested);
            if !nested_path.is_file() {
                return Err(AlfError::Configuration(format!(
                    "flist '-F' target not found: {nested}"
                )));
            }
            resolve_into(nested_path, out)?;
        } else {
            out.push(expanded);
        }
    }

    Ok(())
}

fn expand_incdir(dir: &Path, out: &mut Vec<String>) -> Result<()> {
    if !dir.is_dir() {
        return Err(AlfError::Configuration(format!(
            "+incdir+ directory not found: {}",
            dir.display()
        )));
    }
    for entry in WalkDir::new(dir) {
        let entry = entry.map_err(|e| {
            AlfError::Configuration(format!("failed to walk {}: {e}", dir.display()))
        })?;
        if entry.file_type().is_file() {
            out.push(entry.path().display().to_string());
        }
    }
    Ok(())
}

/// Expand every `${VAR}` reference in `line` against the process environment.
///
/// An unset variable is a fatal [`AlfError::Configuration`] naming the
/// variable, matching §4.1/E1.
fn expand_env_vars(line: &str) -> Result<String> {
    let env: HashMap<String, String> = std::env::vars().collect();
    subst::substitute(line, &env).map_err(|e| {
        AlfError::Configuration(format!("environment substitution failed in '{line}': {e}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn expands_env_var() {
        unsafe {
            std::env::set_var("ALF_TEST_ROOT", "/tmp/a");
        }
        let resolved = expand_env_vars("${ALF_TEST_ROOT}/core/top.sv").unwrap();
        assert_eq!(resolved, "/tmp/a/core/top.sv");
    }

    #[test]
    fn unset_env_var_is_fatal() {
        unsafe {
            std::env::remove_var("ALF_TEST_DOES_NOT_EXIST");
        }
        let err = expand_env_vars("${ALF_TEST_DOES_NOT_EXIST}/top.sv").unwrap_err();
        assert!(matches!(err, AlfError::Configuration(_)));
    }

    #[test]
    fn skips_blank_and_comment_lines() {
        let dir = tempfile::tempdir().unwrap();
        let flist_path = dir.path().join("design.flist");
        let mut f = std::fs::File::create(&flist_path).unwrap();
        writeln!(f, "// a comment").unwrap();
        writeln!(f, "# another comment").unwrap();
        writeln!(f).unwrap();
        writeln!(f, "{}", dir.path().join("top.sv").display()).unwrap();
        drop(f);

        let resolved = resolve(&flist_path).unwrap();
        assert_eq!(resolved, dir.path().join("top.sv").display().to_string());
    }

    #[test]
    fn expands_incdir_recursively() {
        let dir = tempfile::tempdir().unwrap();
        let inc = dir.path().join("inc");
        std::fs::create_dir_all(inc.join("nested")).unwrap();
        std::fs::write(inc.join("a.svh"), "").unwrap();
        std::fs::write(inc.join("nested").join("b.svh"), "").unwrap();

        let flist_path = dir.path().join("design.flist");
        std::fs::write(&flist_path, format!("+incdir+{}\n", inc.display())).unwrap();

        let resolved = resolve(&flist_path).unwrap();
        let lines: Vec<&str> = resolved.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines.iter().any(|l| l.ends_with("a.svh")));
        assert!(lines.iter().any(|l| l.ends_with("b.svh")));
    }

    #[test]
    fn splices_nested_flist() {
        let dir = tempfile::tempdir().unwrap();
        let nested_path = dir.path().join("nested.flist");
        std::fs::write(&nested_path, format!("{}\n", dir.path().join("x.sv").display())).unwrap();

        let flist_path = dir.path().join("top.flist");
        std::fs::write(&flist_path, format!("-F {}\n", nested_path.display())).unwrap();

        let resolved = resolve(&flist_path).unwrap();
        assert_eq!(resolved, dir.path().join("x.sv").display().to_string());
    }

    #[test]
    fn missing_incdir_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let flist_path = dir.path().join("design.flist");
        std::fs::write(
            &flist_path,
            format!("+incdir+{}\n", dir.path().join("does_not_exist").display()),
        )
        .unwrap();

        assert!(resolve(&flist_path).is_err());
    }

    #[test]
    fn idempotent_on_directive_free_output() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.sv");
        let b = dir.path().join("b.sv");
        std::fs::write(&a, "").unwrap();
        std::fs::write(&b, "").unwrap();

        let flist_path = dir.path().join("design.flist");
        std::fs::write(
            &flist_path,
            format!("{}\n{}\n", a.display(), b.display()),
        )
        .unwrap();

        let first = resolve(&flist_path).unwrap();

        let reresolved_path = dir.path().join("reresolved.flist");
        std::fs::write(&reresolved_path, format!("{first}\n")).unwrap();
        let second = resolve(&reresolved_path).unwrap();

        assert_eq!(first, second);
    }
}
