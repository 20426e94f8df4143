//! Hierarchical key assignment over a filesystem tree, with exclusions (spec §4.4).
//!
//! Keys are purely positional: a directory's children are listed in deterministic
//! (case-sensitive lexical) order and labelled consecutively in the tier appropriate to
//! their depth. Nothing here "remembers" a path's previous key — stability is an emergent
//! property of recomputing from the same filesystem state, not a lookup against the old
//! map. The old map is only consulted afterward, to classify which entries are new or
//! reassigned (§4.4 "Outputs").

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use dg_core::{KeyCodec, KeyInfo};

use crate::error::StoreError;
use crate::path_utils::normalize_path;

/// What's excluded from the walk: directory basenames, absolute paths, file
/// extensions (without the leading dot), and filename glob patterns (`*`, `?`).
#[derive(Debug, Clone, Default)]
pub struct Exclusions {
    pub dir_names: HashSet<String>,
    pub abs_paths: HashSet<String>,
    pub extensions: HashSet<String>,
    pub filename_globs: Vec<String>,
}

impl Exclusions {
    /// Public wrapper over the same exclusion logic the walk uses, for callers (like the
    /// mini-tracker relevant-set computation) that need to test an arbitrary path without
    /// walking the filesystem.
    pub fn excludes_path(&self, path: &str, is_dir: bool) -> bool {
        self.excludes(Path::new(path), is_dir)
    }

    fn excludes(&self, path: &Path, is_dir: bool) -> bool {
        let norm = normalize_path(path);
        if self.abs_paths.contains(&norm) {
            return true;
        }
        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(n) => n,
            None => return false,
        };
        if is_dir && self.dir_names.contains(name) {
            return true;
        }
        if !is_dir {
            if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
                if self.extensions.contains(ext) {
                    return true;
                }
            }
        }
        self.filename_globs.iter().any(|pat| glob_match(pat, name))
    }
}

/// Minimal shell-style glob matcher supporting `*` (any run) and `?` (one char).
fn glob_match(pattern: &str, name: &str) -> bool {
    fn rec(p: &[char], n: &[char]) -> bool {
        match (p.first(), n.first()) {
            (None, None) => true,
            (Some('*'), _) => rec(&p[1..], n) || (!n.is_empty() && rec(p, &n[1..])),
            (Some('?'), Some(_)) => rec(&p[1..], &n[1..]),
            (Some(pc), Some(nc)) if pc == nc => rec(&p[1..], &n[1..]),
            _ => false,
        }
    }
    let p: Vec<char> = pattern.chars().collect();
    let n: Vec<char> = name.chars().collect();
    rec(&p, &n)
}

pub type GlobalMap = HashMap<String, KeyInfo>;

pub struct KeyGenerationResult {
    pub current_map: GlobalMap,
    pub new_keys: Vec<KeyInfo>,
}

pub struct KeyManager;

impl KeyManager {
    /// Walk every root, assign keys, then diff against `old_map` to find additions and
    /// reassignments. `roots` is consumed in order: each entry becomes a top-level digit
    /// key ("Root directories each get their own digit", §4.4 step 3).
    pub fn generate(
        roots: &[PathBuf],
        exclusions: &Exclusions,
        old_map: Option<&GlobalMap>,
    ) -> Result<KeyGenerationResult, StoreError> {
        let mut current_map = GlobalMap::new();
        let mut seen_keys = HashSet::new();

        for (i, root) in roots.iter().enumerate() {
            let root_index = (i + 1) as u64;
            let root_key = root_index.to_string();
            let root_norm = normalize_path(root);

            Self::insert_unique(&mut current_map, &mut seen_keys, KeyInfo::new(
                root_key.clone(),
                root_norm.clone(),
                None,
                true,
                1,
                root_index,
            ))?;

            Self::walk_children(root, &root_key, 2, exclusions, &mut current_map, &mut seen_keys)?;
        }

        let new_keys = Self::diff_new_keys(&current_map, old_map);

        Ok(KeyGenerationResult { current_map, new_keys })
    }

    fn insert_unique(
        map: &mut GlobalMap,
        seen_keys: &mut HashSet<String>,
        info: KeyInfo,
    ) -> Result<(), StoreError> {
        if !seen_keys.insert(info.key_string.clone()) {
            return Err(StoreError::DuplicateKey(info.key_string));
        }
        if let Some(existing) = map.get(&info.norm_path) {
            return Err(StoreError::DuplicatePath {
                path: info.norm_path.clone(),
                first: existing.key_string.clone(),
                second: info.key_string.clone(),
            });
        }
        map.insert(info.norm_path.clone(), info);
        Ok(())
    }

    fn walk_children(
        dir: &Path,
        parent_key: &str,
        tier: usize,
        exclusions: &Exclusions,
        map: &mut GlobalMap,
        seen_keys: &mut HashSet<String>,
    ) -> Result<(), StoreError> {
        let tier_is_digit = tier % 2 == 1;
        let mut entries: Vec<PathBuf> = match std::fs::read_dir(dir) {
            Ok(rd) => rd.filter_map(|e| e.ok()).map(|e| e.path()).collect(),
            Err(_) => return Ok(()), // unreadable directory: nothing to assign, not fatal
        };
        entries.sort_by(|a, b| {
            let an = a.file_name().and_then(|n| n.to_str()).unwrap_or_default();
            let bn = b.file_name().and_then(|n| n.to_str()).unwrap_or_default();
            an.cmp(bn)
        });

        let mut index = 0u64;
        for entry in entries {
            let is_dir = entry.is_dir();
            if exclusions.excludes(&entry, is_dir) {
                continue;
            }
            index += 1;
            let label = if tier_is_digit {
                index.to_string()
            } else {
                KeyCodec::letters_for_index(index)
            };
            let key_string = format!("{parent_key}{label}");
            let norm_path = normalize_path(&entry);

            Self::insert_unique(
                map,
                seen_keys,
                KeyInfo::new(key_string.clone(), norm_path, Some(normalize_path(dir)), is_dir, tier, index),
            )?;

            if is_dir {
                Self::walk_children(&entry, &key_string, tier + 1, exclusions, map, seen_keys)?;
            }
        }
        Ok(())
    }

    /// Entries whose path didn't exist in `old_map`, or whose key string changed.
    fn diff_new_keys(current_map: &GlobalMap, old_map: Option<&GlobalMap>) -> Vec<KeyInfo> {
        let old_map = match old_map {
            Some(m) => m,
            None => return current_map.values().cloned().collect(),
        };
        current_map
            .values()
            .filter(|info| match old_map.get(&info.norm_path) {
                None => true,
                Some(old_info) => old_info.key_string != info.key_string,
            })
            .cloned()
            .collect()
    }
}
