//! Local durable storage slots.
//!
//! `FileLocalStore` maps each fixed key to a file in a directory and writes
//! atomically (temp file, flush, sync, rename) so a crash mid-write never
//! corrupts the one backup slot we depend on for recovery.

use crate::core::{QcError, Result};
use crate::store::LocalStore;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub struct FileLocalStore {
    dir: PathBuf,
}

impl FileLocalStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .map_err(|e| QcError::Storage(format!("Failed to create storage directory: {}", e)))?;
        Ok(Self { dir })
    }

    // Keys are fixed constants, but sanitize anyway so a key can never
    // escape the storage directory.
    fn slot_name(key: &str) -> String {
        key.chars()
            .map(|c| if c.is_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
            .collect()
    }

    fn slot_path(&self, key: &str) -> PathBuf {
        self.dir.join(Self::slot_name(key))
    }

    // Appends to the full slot name rather than replacing the extension, so
    // slots sharing a dotted prefix never share a temp file.
    fn temp_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.tmp", Self::slot_name(key)))
    }
}

impl LocalStore for FileLocalStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.slot_path(key);
        if !path.exists() {
            return Ok(None);
        }
        let value = fs::read_to_string(&path)
            .map_err(|e| QcError::Storage(format!("Failed to read slot '{}': {}", key, e)))?;
        Ok(Some(value))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.slot_path(key);
        let temp_path = self.temp_path(key);
        let temp_file = File::create(&temp_path)
            .map_err(|e| QcError::Storage(format!("Failed to create temp file: {}", e)))?;
        let mut writer = BufWriter::new(temp_file);
        writer
            .write_all(value.as_bytes())
            .map_err(|e| QcError::Storage(format!("Failed to write slot '{}': {}", key, e)))?;
        writer
            .flush()
            .map_err(|e| QcError::Storage(format!("Failed to flush slot '{}': {}", key, e)))?;
        writer
            .get_mut()
            .sync_all()
            .map_err(|e| QcError::Storage(format!("Failed to sync slot '{}': {}", key, e)))?;
        fs::rename(&temp_path, &path)
            .map_err(|e| QcError::Storage(format!("Failed to rename slot '{}': {}", key, e)))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.slot_path(key);
        if path.exists() {
            fs::remove_file(&path)
                .map_err(|e| QcError::Storage(format!("Failed to remove slot '{}': {}", key, e)))?;
        }
        Ok(())
    }
}

/// In-memory slots for tests.
#[derive(Default)]
pub struct MemoryLocalStore {
    slots: Mutex<HashMap<String, String>>,
}

impl MemoryLocalStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LocalStore for MemoryLocalStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.slots.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.slots.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.slots.lock()?.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn file_store_set_get_remove() {
        let dir = TempDir::new().unwrap();
        let store = FileLocalStore::new(dir.path()).unwrap();
        assert_eq!(store.get("loteqc.backup").unwrap(), None);
        store.set("loteqc.backup", "{\"v\":1}").unwrap();
        assert_eq!(store.get("loteqc.backup").unwrap().as_deref(), Some("{\"v\":1}"));
        store.set("loteqc.backup", "{\"v\":2}").unwrap();
        assert_eq!(store.get("loteqc.backup").unwrap().as_deref(), Some("{\"v\":2}"));
        store.remove("loteqc.backup").unwrap();
        assert_eq!(store.get("loteqc.backup").unwrap(), None);
        // removing an absent slot is fine
        store.remove("loteqc.backup").unwrap();
    }

    #[test]
    fn temp_name_derives_from_the_full_slot_name() {
        let dir = TempDir::new().unwrap();
        let store = FileLocalStore::new(dir.path()).unwrap();
        // a sibling slot that an extension-replacing temp name would hit
        fs::write(dir.path().join("loteqc.tmp"), "other slot").unwrap();
        store.set("loteqc.backup", "{\"v\":1}").unwrap();
        store.set("loteqc.view_density", "compact").unwrap();
        assert_eq!(
            fs::read_to_string(dir.path().join("loteqc.tmp")).unwrap(),
            "other slot"
        );
        assert_eq!(store.get("loteqc.backup").unwrap().as_deref(), Some("{\"v\":1}"));
        assert_eq!(store.get("loteqc.view_density").unwrap().as_deref(), Some("compact"));
    }

    #[test]
    fn no_temp_file_left_behind() {
        let dir = TempDir::new().unwrap();
        let store = FileLocalStore::new(dir.path()).unwrap();
        store.set("loteqc.view_density", "compact").unwrap();
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
