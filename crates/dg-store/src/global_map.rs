//! Persistence for the two on-disk global map artifacts (spec §6): before a new
//! `current_global_key_map.json` is written, any existing one is renamed to
//! `old_global_key_map.json` so the previous run's assignment survives for the next
//! run's migration map.

use std::path::{Path, PathBuf};

use crate::error::StoreError;
use crate::key_manager::GlobalMap;

pub struct GlobalMapStore {
    dir: PathBuf,
}

impl GlobalMapStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn current_path(&self) -> PathBuf {
        self.dir.join("current_global_key_map.json")
    }

    pub fn old_path(&self) -> PathBuf {
        self.dir.join("old_global_key_map.json")
    }

    pub fn load_current(&self) -> Result<Option<GlobalMap>, StoreError> {
        Self::load(&self.current_path())
    }

    pub fn load_old(&self) -> Result<Option<GlobalMap>, StoreError> {
        Self::load(&self.old_path())
    }

    fn load(path: &Path) -> Result<Option<GlobalMap>, StoreError> {
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(path)?;
        let map: GlobalMap = serde_json::from_str(&contents)?;
        Ok(Some(map))
    }

    /// Rename the existing current file to `old`, then write `map` as the new current
    /// file. Both steps happen via a temp-file-then-rename so a crash mid-write never
    /// leaves a truncated file in place.
    pub fn persist_current(&self, map: &GlobalMap) -> Result<(), StoreError> {
        std::fs::create_dir_all(&self.dir)?;
        let current = self.current_path();
        if current.exists() {
            std::fs::rename(&current, self.old_path())?;
        }
        Self::write_atomic(&current, map)
    }

    fn write_atomic(path: &Path, map: &GlobalMap) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(map)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}
