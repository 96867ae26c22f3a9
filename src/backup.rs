// Copyright (c) 2024 texer.ai Ltd.

//! Backup & restore (§4.7): a byte-exact (well, UTF-8-exact) snapshot of
//! every file a session is about to mutate, persisted as `./backup.json`.
//!
//! Serialization goes through `serde`/`serde_json`; file contents are
//! carried as UTF-8 strings, per the Design Notes — Verilog/SystemVerilog
//! source is not expected to carry non-UTF-8 bytes.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AlfError, Result};

/// Name of the backup file, written to the current working directory.
pub const BACKUP_FILE_NAME: &str = "backup.json";

/// A snapshot of every file about to be mutated, keyed by absolute path.
///
/// Backed by a `BTreeMap` rather than the hierarchy map's `IndexMap`: the
/// backup set has no discovery order worth preserving, and a stable sort
/// order makes `backup.json` diff-friendly across runs.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct BackupSet {
    files: BTreeMap<PathBuf, String>,
}

impl BackupSet {
    /// An empty backup set.
    pub fn new() -> Self {
        BackupSet::default()
    }

    /// Snapshot `path`'s current on-disk contents, if not already captured.
    ///
    /// Idempotent per path: the *first* read before any edit is always the
    /// one kept, so patching the same file twice in one session (gate, then
    /// punch, then DPI) never overwrites the pre-session snapshot (§4.7,
    /// Testable Property 2).
    pub fn capture(&mut self, path: &Path) -> Result<()> {
        if self.files.contains_key(path) {
            return Ok(());
        }
        let content = std::fs::read_to_string(path).map_err(|e| AlfError::io(path, e))?;
        self.files.insert(path.to_path_buf(), content);
        Ok(())
    }

    /// Whether `path` has already been captured.
    pub fn contains(&self, path: &Path) -> bool {
        self.files.contains_key(path)
    }

    /// Number of files captured.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether no files have been captured.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Persist this backup set as `<dir>/backup.json`.
    pub fn write_to(&self, dir: &Path) -> Result<()> {
        let path = dir.join(BACKUP_FILE_NAME);
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json).map_err(|e| AlfError::io(path, e))
    }

    /// Load `<dir>/backup.json`.
    pub fn read_from(dir: &Path) -> Result<Self> {
        let path = dir.join(BACKUP_FILE_NAME);
        let json = std::fs::read_to_string(&path).map_err(|e| AlfError::io(&path, e))?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Restore every captured file to its snapshot contents, then delete
    /// `<dir>/backup.json` (§4.7, E6).
    pub fn restore(&self, dir: &Path) -> Result<()> {
        for (path, content) in &self.files {
            std::fs::write(path, content).map_err(|e| AlfError::io(path, e))?;
        }
        let backup_path = dir.join(BACKUP_FILE_NAME);
        std::fs::remove_file(&backup_path).map_err(|e| AlfError::io(&backup_path, e))
    }
}

/// Restore from `<dir>/backup.json` and remove it, the `--undo` entry point
/// (§4.8, §6).
pub fn undo(dir: &Path) -> Result<()> {
    if !dir.join(BACKUP_FILE_NAME).is_file() {
        return Err(AlfError::Undo(format!(
            "no backup found at {}",
            dir.join(BACKUP_FILE_NAME).display()
        )));
    }
    let set = BackupSet::read_from(dir)?;
    set.restore(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn capture_is_idempotent_per_path() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.sv");
        std::fs::write(&file, "original").unwrap();

        let mut set = BackupSet::new();
        set.capture(&file).unwrap();
        std::fs::write(&file, "mutated").unwrap();
        set.capture(&file).unwrap();

        assert_eq!(set.files[&file], "original");
    }

    #[test]
    fn round_trips_through_json() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.sv");
        std::fs::write(&file, "original content").unwrap();

        let mut set = BackupSet::new();
        set.capture(&file).unwrap();
        set.write_to(dir.path()).unwrap();

        let reloaded = BackupSet::read_from(dir.path()).unwrap();
        assert_eq!(reloaded.files[&file], "original content");
    }

    #[test]
    fn restore_writes_back_and_removes_backup_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.sv");
        std::fs::write(&file, "original").unwrap();

        let mut set = BackupSet::new();
        set.capture(&file).unwrap();
        set.write_to(dir.path()).unwrap();

        std::fs::write(&file, "mutated by patching").unwrap();
        undo(dir.path()).unwrap();

        assert_eq!(std::fs::read_to_string(&file).unwrap(), "original");
        assert!(!dir.path().join(BACKUP_FILE_NAME).is_file());
    }

    #[test]
    fn undo_without_backup_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = undo(dir.path()).unwrap_err();
        assert!(matches!(err, AlfError::Undo(_)));
    }
}
