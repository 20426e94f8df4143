//! Builds `path -> (old_key?, new_key?)` from two global key maps (spec §4.5).
//!
//! Every grid reader goes through this: keys written into a tracker file are stale
//! labels the moment the filesystem changes underneath them, and only a path survives
//! reorganizations as a stable identity (spec §9, "Path as identity, key as label").

use std::collections::HashMap;

use crate::error::StoreError;
use crate::key_manager::GlobalMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathStatus {
    /// Present in both maps (possibly under a different key).
    Stable,
    /// Present only in the new map.
    Added,
    /// Present only in the old map.
    Removed,
}

pub type MigrationMap = HashMap<String, (Option<String>, Option<String>)>;

pub struct MigrationMapBuilder;

impl MigrationMapBuilder {
    pub fn build(old_map: Option<&GlobalMap>, new_map: &GlobalMap) -> Result<MigrationMap, StoreError> {
        Self::check_key_uniqueness(new_map)?;
        if let Some(old_map) = old_map {
            Self::check_key_uniqueness(old_map)?;
        }

        let mut out: MigrationMap = HashMap::new();
        if let Some(old_map) = old_map {
            for (path, info) in old_map {
                out.insert(path.clone(), (Some(info.key_string.clone()), None));
            }
        }
        for (path, info) in new_map {
            out.entry(path.clone())
                .and_modify(|(_, new_key)| *new_key = Some(info.key_string.clone()))
                .or_insert((None, Some(info.key_string.clone())));
        }
        Ok(out)
    }

    pub fn status(entry: &(Option<String>, Option<String>)) -> PathStatus {
        match entry {
            (Some(_), Some(_)) => PathStatus::Stable,
            (None, Some(_)) => PathStatus::Added,
            (Some(_), None) => PathStatus::Removed,
            (None, None) => unreachable!("migration map entries always have at least one key"),
        }
    }

    fn check_key_uniqueness(map: &GlobalMap) -> Result<(), StoreError> {
        let mut seen: HashMap<&str, &str> = HashMap::new();
        for info in map.values() {
            if let Some(existing_path) = seen.insert(&info.key_string, &info.norm_path) {
                if existing_path != info.norm_path {
                    return Err(StoreError::DuplicatePath {
                        path: info.norm_path.clone(),
                        first: existing_path.to_string(),
                        second: info.key_string.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dg_core::KeyInfo;

    fn info(key: &str, path: &str) -> KeyInfo {
        KeyInfo::new(key, path, None, false, 2, 1)
    }

    #[test]
    fn partitions_stable_added_removed() {
        let mut old_map = GlobalMap::new();
        old_map.insert("a.rs".into(), info("1A", "a.rs"));
        old_map.insert("b.rs".into(), info("1B", "b.rs"));

        let mut new_map = GlobalMap::new();
        new_map.insert("a.rs".into(), info("1A2", "a.rs")); // renamed key, same path
        new_map.insert("c.rs".into(), info("1C", "c.rs")); // added

        let mm = MigrationMapBuilder::build(Some(&old_map), &new_map).unwrap();

        assert_eq!(MigrationMapBuilder::status(&mm["a.rs"]), PathStatus::Stable);
        assert_eq!(mm["a.rs"], (Some("1A".to_string()), Some("1A2".to_string())));
        assert_eq!(MigrationMapBuilder::status(&mm["b.rs"]), PathStatus::Removed);
        assert_eq!(MigrationMapBuilder::status(&mm["c.rs"]), PathStatus::Added);
    }

    #[test]
    fn no_old_map_means_everything_is_added() {
        let mut new_map = GlobalMap::new();
        new_map.insert("a.rs".into(), info("1A", "a.rs"));
        let mm = MigrationMapBuilder::build(None, &new_map).unwrap();
        assert_eq!(MigrationMapBuilder::status(&mm["a.rs"]), PathStatus::Added);
    }

    #[test]
    fn duplicate_key_across_paths_is_rejected() {
        let mut new_map = GlobalMap::new();
        new_map.insert("a.rs".into(), info("1A", "a.rs"));
        new_map.insert("b.rs".into(), info("1A", "b.rs"));
        assert!(MigrationMapBuilder::build(None, &new_map).is_err());
    }
}
