//! Per-tracker update algorithm (spec §4.8, "the heart"): migrate the prior grid
//! through the path-keyed migration map, inject structural rules, apply suggestions
//! with reciprocity/mutuality handling, import from related trackers, consolidate
//! against the global aggregate, then write atomically.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use dg_core::{KeyCodec, PriorityTable, RelationChar};
use dg_store::{read_tracker_data, MigrationMap, TrackerFile, TrackerReader};
use tracing::{debug, warn};

use crate::report::UpdateReport;

/// `source_new_key -> [(target_new_key, relation)]`, as produced by external analyzers.
pub type SuggestionMap = HashMap<String, Vec<(String, RelationChar)>>;

/// Structural rules vary only between doc and mini trackers (spec §4.8 step c); `main`
/// trackers never get them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructuralMode {
    None,
    Mini,
    Doc,
}

/// Resolves the "home tracker" for a cross-tracker import pair (spec §4.8 step e). Only
/// meaningful for mini trackers; the orchestrator owns the topology (doc tracker path,
/// module -> mini-tracker-path mapping) needed to answer this.
pub type HomeTrackerResolver<'a> = dyn Fn(&str, &str) -> Option<PathBuf> + 'a;

pub struct UpdateParams<'a> {
    pub tracker: &'a TrackerFile,
    /// Final key set for this update, already computed per tracker type (main: module
    /// roots; doc: everything under doc roots; mini: the relevant-set computation).
    pub final_key_defs: HashMap<String, String>,
    pub is_directory: &'a dyn Fn(&str) -> bool,
    pub migration_map: &'a MigrationMap,
    pub suggestions: &'a SuggestionMap,
    pub force_apply: bool,
    /// Paths of keys newly assigned this run (from `KeyManager::generate`), used only to
    /// phrase the `last_KEY_edit` message.
    pub new_key_paths: &'a [String],
    pub priorities: &'a PriorityTable,
    pub all_tracker_paths: &'a [PathBuf],
    pub structural_mode: StructuralMode,
    pub home_tracker_resolver: Option<&'a HomeTrackerResolver<'a>>,
    /// This tracker's own (native) key set, used to tell native/foreign pairs apart from
    /// foreign/foreign pairs in step (e) below. `None` for doc/main trackers, where
    /// `home_tracker_resolver` is also `None` and the field goes unused.
    pub internal_keys: Option<&'a HashSet<String>>,
    pub preserved_prefix: Option<String>,
    pub preserved_suffix: Option<String>,
}

/// Matrix of the tracker under construction: row-major, indexed through `index_of`.
struct Matrix {
    keys: Vec<String>,
    index_of: HashMap<String, usize>,
    rows: Vec<Vec<RelationChar>>,
}

impl Matrix {
    fn new(mut keys: Vec<String>) -> Self {
        KeyCodec::sort_hierarchical(&mut keys);
        let n = keys.len();
        let index_of: HashMap<String, usize> = keys.iter().enumerate().map(|(i, k)| (k.clone(), i)).collect();
        let rows = (0..n)
            .map(|i| (0..n).map(|j| if i == j { RelationChar::SelfRef } else { RelationChar::Placeholder }).collect())
            .collect();
        Self { keys, index_of, rows }
    }

    fn get(&self, a: &str, b: &str) -> RelationChar {
        self.rows[self.index_of[a]][self.index_of[b]]
    }

    fn set(&mut self, a: &str, b: &str, c: RelationChar) -> bool {
        let (i, j) = (self.index_of[a], self.index_of[b]);
        if self.rows[i][j] == c {
            return false;
        }
        self.rows[i][j] = c;
        true
    }

    fn into_rows_map(self) -> HashMap<String, Vec<RelationChar>> {
        let Matrix { keys, rows, .. } = self;
        keys.into_iter().zip(rows).collect()
    }
}

pub struct TrackerUpdater;

impl TrackerUpdater {
    pub fn update(params: UpdateParams) -> UpdateReport {
        let UpdateParams {
            tracker,
            final_key_defs,
            is_directory,
            migration_map,
            suggestions,
            force_apply,
            new_key_paths,
            priorities,
            all_tracker_paths,
            structural_mode,
            home_tracker_resolver,
            internal_keys,
            preserved_prefix,
            preserved_suffix,
        } = params;

        debug!(tracker = %tracker.path.display(), keys = final_key_defs.len(), "updating tracker");

        let mut report = UpdateReport {
            tracker_path: tracker.path.clone(),
            ..Default::default()
        };

        let final_keys: Vec<String> = final_key_defs.keys().cloned().collect();
        let key_to_path = final_key_defs.clone();

        let prior = tracker.read();

        let mut matrix = Matrix::new(final_keys.clone());

        // (b) migrate the prior grid.
        let mut prior_keys_sorted: Vec<String> = prior.keys.keys().cloned().collect();
        KeyCodec::sort_hierarchical(&mut prior_keys_sorted);

        for (old_row_key, compressed) in &prior.grid {
            let row_path = match prior.keys.get(old_row_key) {
                Some(p) => p,
                None => continue,
            };
            let new_row_key = match migration_map.get(row_path).and_then(|(_, nk)| nk.as_deref()) {
                Some(k) if matrix.index_of.contains_key(k) => k.to_string(),
                _ => {
                    report.unstable_skips += 1;
                    continue;
                }
            };

            let decoded = match dg_core::GridCodec::decompress(compressed) {
                Ok(v) => v,
                Err(e) => {
                    report.warnings.push(format!("malformed row for {old_row_key}: {e}"));
                    continue;
                }
            };
            if decoded.len() != prior_keys_sorted.len() {
                report.warnings.push(format!("row length mismatch for {old_row_key}"));
                continue;
            }

            for (col_idx, v) in decoded.iter().enumerate() {
                if matches!(v, RelationChar::SelfRef | RelationChar::Placeholder | RelationChar::Empty) {
                    continue;
                }
                let old_col_key = &prior_keys_sorted[col_idx];
                let col_path = match prior.keys.get(old_col_key) {
                    Some(p) => p,
                    None => continue,
                };
                let new_col_key = match migration_map.get(col_path).and_then(|(_, nk)| nk.as_deref()) {
                    Some(k) if matrix.index_of.contains_key(k) => k.to_string(),
                    _ => {
                        report.unstable_skips += 1;
                        continue;
                    }
                };

                let current = matrix.get(&new_row_key, &new_col_key);
                if current != RelationChar::Placeholder {
                    report.filled_skips += 1;
                    let winner = priorities.max_of(current, *v);
                    if matrix.set(&new_row_key, &new_col_key, winner) {
                        report.cells_changed += 1;
                    }
                } else if matrix.set(&new_row_key, &new_col_key, *v) {
                    report.cells_changed += 1;
                }
            }
        }

        let migration_changes = report.cells_changed;

        // (c) structural rules.
        if structural_mode != StructuralMode::None {
            for a in &final_keys {
                for b in &final_keys {
                    if a == b {
                        continue;
                    }
                    let path_a = &key_to_path[a];
                    let path_b = &key_to_path[b];
                    let ancestor = is_directory(path_a) && path_b.starts_with(&format!("{path_a}/"));
                    if ancestor && matrix.get(a, b) == RelationChar::Placeholder {
                        if matrix.set(a, b, RelationChar::Mutual) {
                            report.cells_changed += 1;
                        }
                        if matrix.set(b, a, RelationChar::Mutual) {
                            report.cells_changed += 1;
                        }
                    }
                }
            }

            if structural_mode == StructuralMode::Doc {
                for a in &final_keys {
                    for b in &final_keys {
                        if a == b {
                            continue;
                        }
                        let path_a = &key_to_path[a];
                        let path_b = &key_to_path[b];
                        let a_ancestor_of_b = is_directory(path_a) && path_b.starts_with(&format!("{path_a}/"));
                        let b_ancestor_of_a = is_directory(path_b) && path_a.starts_with(&format!("{path_b}/"));
                        if !a_ancestor_of_b && !b_ancestor_of_a && matrix.get(a, b) == RelationChar::Placeholder {
                            if matrix.set(a, b, RelationChar::VerifiedNone) {
                                report.cells_changed += 1;
                            }
                        }
                    }
                }
            }
        }

        let structural_changes = report.cells_changed - migration_changes;

        // (d) apply suggestions.
        let mut suggestions_applied = 0usize;
        let mut forced_single: Option<(String, String, RelationChar)> = None;
        for (src, targets) in suggestions {
            if !matrix.index_of.contains_key(src) {
                continue;
            }
            for (tgt, c) in targets {
                if !matrix.index_of.contains_key(tgt) || src == tgt {
                    continue;
                }
                let current = matrix.get(src, tgt);
                let forced = force_apply && *c != RelationChar::Placeholder && *c != current;
                let fills_placeholder = current == RelationChar::Placeholder && *c != RelationChar::Placeholder;
                let beats_priority = current != RelationChar::SelfRef
                    && current != RelationChar::Placeholder
                    && current != *c
                    && current != RelationChar::VerifiedNone
                    && priorities.priority(*c) > priorities.priority(current);

                if !(forced || fills_placeholder || beats_priority) {
                    continue;
                }

                if matrix.set(src, tgt, *c) {
                    report.cells_changed += 1;
                    suggestions_applied += 1;
                    if forced {
                        forced_single = Some((src.clone(), tgt.clone(), *c));
                    }
                }

                if c.is_directional() {
                    let reverse_current = matrix.get(tgt, src);
                    if reverse_current == *c {
                        if matrix.set(tgt, src, RelationChar::Mutual) {
                            report.cells_changed += 1;
                        }
                        if matrix.set(src, tgt, RelationChar::Mutual) {
                            report.cells_changed += 1;
                        }
                    } else {
                        let reciprocal = c.reversed();
                        let reverse_apply = force_apply
                            || (reverse_current != RelationChar::VerifiedNone
                                && priorities.priority(reciprocal) > priorities.priority(reverse_current));
                        if reverse_apply && matrix.set(tgt, src, reciprocal) {
                            report.cells_changed += 1;
                        }
                    }
                }
            }
        }
        report.suggestions_applied = suggestions_applied;
        let suggestion_changes = report.cells_changed - migration_changes - structural_changes;

        // (e) cross-tracker import, mini trackers only.
        if let Some(resolver) = home_tracker_resolver {
            let mut home_cache: HashMap<PathBuf, dg_core::TrackerData> = HashMap::new();
            for a in &final_keys {
                for b in &final_keys {
                    if a == b {
                        continue;
                    }
                    let path_a = key_to_path[a].clone();
                    let path_b = key_to_path[b].clone();
                    let home_path = match resolver(&path_a, &path_b) {
                        Some(p) => p,
                        None => continue,
                    };
                    if home_path == tracker.path {
                        continue;
                    }
                    let home_data = home_cache.entry(home_path.clone()).or_insert_with(|| read_tracker_data(&home_path));
                    let home_key_a = home_data.keys.iter().find(|(_, p)| **p == path_a).map(|(k, _)| k.clone());
                    let home_key_b = home_data.keys.iter().find(|(_, p)| **p == path_b).map(|(k, _)| k.clone());
                    let (home_key_a, home_key_b) = match (home_key_a, home_key_b) {
                        (Some(a), Some(b)) => (a, b),
                        _ => continue,
                    };
                    let mut home_keys_sorted: Vec<String> = home_data.keys.keys().cloned().collect();
                    KeyCodec::sort_hierarchical(&mut home_keys_sorted);
                    let home_value = home_data
                        .grid
                        .get(&home_key_a)
                        .and_then(|rle| {
                            let idx = home_keys_sorted.iter().position(|k| k == &home_key_b)?;
                            dg_core::GridCodec::get_at(rle, idx).ok()
                        })
                        .unwrap_or(RelationChar::Placeholder);

                    let current = matrix.get(a, b);
                    let loosely_overwritable = matches!(
                        current,
                        RelationChar::Placeholder | RelationChar::SemanticWeak | RelationChar::SemanticStrong | RelationChar::VerifiedNone
                    );
                    let apply = (loosely_overwritable && home_value.is_verified_positive())
                        || (matches!(current, RelationChar::Placeholder | RelationChar::SemanticWeak | RelationChar::SemanticStrong)
                            && home_value == RelationChar::VerifiedNone);
                    if apply && matrix.set(a, b, home_value) {
                        report.cells_changed += 1;
                    } else {
                        // Spec §4.8(e): the both-`p` default-to-`n` rule is for
                        // foreign/foreign pairs only — a native key paired with a foreign
                        // key that simply has no evidence yet is not "verified no
                        // relation," just unexamined.
                        let both_foreign = internal_keys.is_some_and(|native| !native.contains(a) && !native.contains(b));
                        if both_foreign
                            && current == RelationChar::Placeholder
                            && home_value == RelationChar::Placeholder
                            && matrix.set(a, b, RelationChar::VerifiedNone)
                        {
                            report.cells_changed += 1;
                        }
                    }
                }
            }
        }

        // (f) global consolidation.
        let aggregated = TrackerReader::aggregate(all_tracker_paths, migration_map, priorities);
        for a in &final_keys {
            for b in &final_keys {
                if a == b {
                    continue;
                }
                if let Some(link) = aggregated.get(&(a.clone(), b.clone())) {
                    let current = matrix.get(a, b);
                    let replace = priorities.priority(link.relation) > priorities.priority(current)
                        || (link.relation == RelationChar::VerifiedNone
                            && matches!(current, RelationChar::Placeholder | RelationChar::SemanticWeak | RelationChar::SemanticStrong));
                    if replace && matrix.set(a, b, link.relation) {
                        report.cells_changed += 1;
                    }
                }
            }
        }

        let total_other_changes = report.cells_changed - suggestion_changes;

        // (g) metadata.
        let prior_path_set: std::collections::HashSet<&str> = prior.keys.values().map(|p| p.as_str()).collect();
        let final_path_set: std::collections::HashSet<&str> = key_to_path.values().map(|p| p.as_str()).collect();
        let added = final_path_set.iter().filter(|p| !prior_path_set.contains(*p)).count();
        let removed = prior_path_set.iter().filter(|p| !final_path_set.contains(*p)).count();
        let reassigned = new_key_paths.iter().filter(|p| final_path_set.contains(p.as_str()) && prior_path_set.contains(p.as_str())).count();
        report.keys_added = added;
        report.keys_removed = removed;

        report.last_key_edit = if added == 0 && removed == 0 && reassigned == 0 {
            "No key changes".to_string()
        } else {
            format!("Keys added: {added}, removed: {removed}, reassigned: {reassigned}")
        };

        report.last_grid_edit = match forced_single {
            Some((src, tgt, c)) if suggestions_applied == 1 && total_other_changes == 0 && report.cells_changed <= 2 => {
                format!("Forced suggestion applied: {src} -> {tgt} = {}", c.as_char())
            }
            _ if report.cells_changed > 0 => "Grid content updated".to_string(),
            _ if added != 0 || removed != 0 => "Grid structure updated".to_string(),
            _ => prior.last_grid_edit.clone(),
        };
        if report.last_key_edit == "No key changes" && !prior.last_key_edit.is_empty() {
            report.last_key_edit = prior.last_key_edit.clone();
        }

        // (h) write.
        let rows = matrix.into_rows_map();
        if let Err(e) = tracker.write(
            &final_key_defs,
            &rows,
            &report.last_key_edit,
            &report.last_grid_edit,
            preserved_prefix.as_deref(),
            preserved_suffix.as_deref(),
        ) {
            warn!(tracker = %tracker.path.display(), error = %e, "tracker write failed");
            report.warnings.push(format!("write failed: {e}"));
        }

        debug!(
            tracker = %tracker.path.display(),
            cells_changed = report.cells_changed,
            suggestions_applied = report.suggestions_applied,
            "tracker update complete"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dg_core::TrackerKind;
    use tempfile::tempdir;

    fn write_fixture(path: &Path, body: &str) {
        std::fs::write(path, body).unwrap();
    }

    fn mm(entries: &[(&str, Option<&str>, Option<&str>)]) -> MigrationMap {
        entries
            .iter()
            .map(|(p, old, new)| (p.to_string(), (old.map(String::from), new.map(String::from))))
            .collect()
    }

    fn key_defs(entries: &[(&str, &str)]) -> HashMap<String, String> {
        entries.iter().map(|(k, p)| (k.to_string(), p.to_string())).collect()
    }

    #[test]
    fn rename_survives_through_migration_map() {
        let dir = tempdir().unwrap();
        let tracker_path = dir.path().join("main_tracker.md");
        write_fixture(
            &tracker_path,
            "---KEY_DEFINITIONS_START---\n\
Key Definitions:\n\
1A: src/a.rs\n\
1B: src/b.rs\n\
---KEY_DEFINITIONS_END---\n\
\n\
last_KEY_edit: initial\n\
last_GRID_edit: initial\n\
\n\
---GRID_START---\n\
X 1A 1B\n\
1A = ox\n\
1B = xo\n\
---GRID_END---\n",
        );
        let tracker = TrackerFile::new(&tracker_path, TrackerKind::Main, dir.path().join("backups"));

        let migration_map = mm(&[
            ("src/a.rs", Some("1A"), Some("2A")),
            ("src/b.rs", Some("1B"), Some("2B")),
        ]);
        let final_key_defs = key_defs(&[("2A", "src/a.rs"), ("2B", "src/b.rs")]);

        let priorities = PriorityTable::default();
        let suggestions = SuggestionMap::new();
        let new_key_paths = ["src/a.rs".to_string(), "src/b.rs".to_string()];
        let all_paths = [tracker_path.clone()];

        let report = TrackerUpdater::update(UpdateParams {
            tracker: &tracker,
            final_key_defs,
            is_directory: &|_: &str| false,
            migration_map: &migration_map,
            suggestions: &suggestions,
            force_apply: false,
            new_key_paths: &new_key_paths,
            priorities: &priorities,
            all_tracker_paths: &all_paths,
            structural_mode: StructuralMode::None,
            home_tracker_resolver: None,
            internal_keys: None,
            preserved_prefix: None,
            preserved_suffix: None,
        });

        assert!(report.warnings.is_empty());
        let data = tracker.read();
        assert_eq!(data.grid.get("2A").unwrap(), "ox");
        assert_eq!(report.keys_added, 0);
        assert_eq!(report.keys_removed, 0);
    }

    #[test]
    fn verified_none_resists_plain_suggestion_without_force_apply() {
        let dir = tempdir().unwrap();
        let tracker_path = dir.path().join("main_tracker.md");
        write_fixture(
            &tracker_path,
            "---KEY_DEFINITIONS_START---\n\
Key Definitions:\n\
1A: a.rs\n\
1B: b.rs\n\
---KEY_DEFINITIONS_END---\n\
\n\
last_KEY_edit: initial\n\
last_GRID_edit: initial\n\
\n\
---GRID_START---\n\
X 1A 1B\n\
1A = on\n\
1B = no\n\
---GRID_END---\n",
        );
        let tracker = TrackerFile::new(&tracker_path, TrackerKind::Main, dir.path().join("backups"));

        let migration_map = mm(&[("a.rs", Some("1A"), Some("1A")), ("b.rs", Some("1B"), Some("1B"))]);
        let final_key_defs = key_defs(&[("1A", "a.rs"), ("1B", "b.rs")]);

        let mut suggestions = SuggestionMap::new();
        suggestions.insert("1A".to_string(), vec![("1B".to_string(), RelationChar::SemanticStrong)]);

        let priorities = PriorityTable::default();
        let all_paths = [tracker_path.clone()];

        let report = TrackerUpdater::update(UpdateParams {
            tracker: &tracker,
            final_key_defs,
            is_directory: &|_: &str| false,
            migration_map: &migration_map,
            suggestions: &suggestions,
            force_apply: false,
            new_key_paths: &[],
            priorities: &priorities,
            all_tracker_paths: &all_paths,
            structural_mode: StructuralMode::None,
            home_tracker_resolver: None,
            internal_keys: None,
            preserved_prefix: None,
            preserved_suffix: None,
        });

        assert_eq!(report.suggestions_applied, 0);
        let data = tracker.read();
        assert_eq!(data.grid.get("1A").unwrap(), "on");
    }

    #[test]
    fn verified_none_yields_to_forced_suggestion() {
        let dir = tempdir().unwrap();
        let tracker_path = dir.path().join("main_tracker.md");
        write_fixture(
            &tracker_path,
            "---KEY_DEFINITIONS_START---\n\
Key Definitions:\n\
1A: a.rs\n\
1B: b.rs\n\
---KEY_DEFINITIONS_END---\n\
\n\
last_KEY_edit: initial\n\
last_GRID_edit: initial\n\
\n\
---GRID_START---\n\
X 1A 1B\n\
1A = on\n\
1B = no\n\
---GRID_END---\n",
        );
        let tracker = TrackerFile::new(&tracker_path, TrackerKind::Main, dir.path().join("backups"));

        let migration_map = mm(&[("a.rs", Some("1A"), Some("1A")), ("b.rs", Some("1B"), Some("1B"))]);
        let final_key_defs = key_defs(&[("1A", "a.rs"), ("1B", "b.rs")]);

        let mut suggestions = SuggestionMap::new();
        suggestions.insert("1A".to_string(), vec![("1B".to_string(), RelationChar::SemanticStrong)]);

        let priorities = PriorityTable::default();
        let all_paths = [tracker_path.clone()];

        let report = TrackerUpdater::update(UpdateParams {
            tracker: &tracker,
            final_key_defs,
            is_directory: &|_: &str| false,
            migration_map: &migration_map,
            suggestions: &suggestions,
            force_apply: true,
            new_key_paths: &[],
            priorities: &priorities,
            all_tracker_paths: &all_paths,
            structural_mode: StructuralMode::None,
            home_tracker_resolver: None,
            internal_keys: None,
            preserved_prefix: None,
            preserved_suffix: None,
        });

        assert_eq!(report.suggestions_applied, 1);
        let data = tracker.read();
        assert_eq!(data.grid.get("1A").unwrap(), "S");
    }

    #[test]
    fn directional_suggestions_collapse_to_mutual_on_agreement() {
        let dir = tempdir().unwrap();
        let tracker_path = dir.path().join("main_tracker.md");
        let tracker = TrackerFile::new(&tracker_path, TrackerKind::Main, dir.path().join("backups"));

        let migration_map = mm(&[("a.rs", None, Some("1A")), ("b.rs", None, Some("1B"))]);
        let final_key_defs = key_defs(&[("1A", "a.rs"), ("1B", "b.rs")]);

        let mut suggestions = SuggestionMap::new();
        suggestions.insert("1A".to_string(), vec![("1B".to_string(), RelationChar::DependsRow)]);
        suggestions.insert("1B".to_string(), vec![("1A".to_string(), RelationChar::DependsRow)]);

        let priorities = PriorityTable::default();
        let all_paths = [tracker_path.clone()];

        TrackerUpdater::update(UpdateParams {
            tracker: &tracker,
            final_key_defs,
            is_directory: &|_: &str| false,
            migration_map: &migration_map,
            suggestions: &suggestions,
            force_apply: true,
            new_key_paths: &[],
            priorities: &priorities,
            all_tracker_paths: &all_paths,
            structural_mode: StructuralMode::None,
            home_tracker_resolver: None,
            internal_keys: None,
            preserved_prefix: None,
            preserved_suffix: None,
        });

        let data = tracker.read();
        assert_eq!(data.grid.get("1A").unwrap(), "x");
        assert_eq!(data.grid.get("1B").unwrap(), "x");
    }

    #[test]
    fn mini_tracker_marks_ancestor_descendant_mutual() {
        let dir = tempdir().unwrap();
        let tracker_path = dir.path().join("mod_module.md");
        let tracker = TrackerFile::new(&tracker_path, TrackerKind::Mini, dir.path().join("backups"));

        let migration_map = mm(&[("mod", None, Some("1A")), ("mod/file.rs", None, Some("1A1"))]);
        let final_key_defs = key_defs(&[("1A", "mod"), ("1A1", "mod/file.rs")]);

        let priorities = PriorityTable::default();
        let suggestions = SuggestionMap::new();
        let all_paths = [tracker_path.clone()];

        TrackerUpdater::update(UpdateParams {
            tracker: &tracker,
            final_key_defs,
            is_directory: &|p: &str| p == "mod",
            migration_map: &migration_map,
            suggestions: &suggestions,
            force_apply: false,
            new_key_paths: &[],
            priorities: &priorities,
            all_tracker_paths: &all_paths,
            structural_mode: StructuralMode::Mini,
            home_tracker_resolver: None,
            internal_keys: None,
            preserved_prefix: None,
            preserved_suffix: None,
        });

        let data = tracker.read();
        assert_eq!(data.grid.get("1A").unwrap(), "x");
        assert_eq!(data.grid.get("1A1").unwrap(), "x");
    }

    #[test]
    fn cross_tracker_import_only_defaults_foreign_foreign_pairs_to_verified_none() {
        let dir = tempdir().unwrap();

        // The "other" module's own mini tracker, which is the home tracker the resolver
        // hands back for any pair touching one of its foreign keys. It happens to also
        // retain this tracker's native file as one of its own foreign keys (9Z), so every
        // pair here resolves on both ends; every cell is still an unexamined placeholder.
        let home_path = dir.path().join("other_module.md");
        write_fixture(
            &home_path,
            "---KEY_DEFINITIONS_START---\n\
Key Definitions:\n\
2A: other/a.rs\n\
2B: other/b.rs\n\
9Z: mod/file.rs\n\
---KEY_DEFINITIONS_END---\n\
\n\
last_KEY_edit: initial\n\
last_GRID_edit: initial\n\
\n\
---GRID_START---\n\
X 2A 2B 9Z\n\
2A = opp\n\
2B = pop\n\
9Z = ppo\n\
---GRID_END---\n",
        );

        let tracker_path = dir.path().join("mod_module.md");
        let tracker = TrackerFile::new(&tracker_path, TrackerKind::Mini, dir.path().join("backups"));

        // 1A is native to this mini tracker; 2A and 2B are foreign keys retained because
        // of prior evidence (irrelevant to this test, just need them present).
        let migration_map = mm(&[
            ("mod/file.rs", None, Some("1A")),
            ("other/a.rs", None, Some("2A")),
            ("other/b.rs", None, Some("2B")),
        ]);
        let final_key_defs = key_defs(&[("1A", "mod/file.rs"), ("2A", "other/a.rs"), ("2B", "other/b.rs")]);
        let internal_keys: HashSet<String> = ["1A".to_string()].into_iter().collect();

        let resolver = move |_a: &str, _b: &str| -> Option<PathBuf> { Some(home_path.clone()) };

        let priorities = PriorityTable::default();
        let suggestions = SuggestionMap::new();
        let all_paths = [tracker_path.clone()];

        TrackerUpdater::update(UpdateParams {
            tracker: &tracker,
            final_key_defs,
            is_directory: &|_: &str| false,
            migration_map: &migration_map,
            suggestions: &suggestions,
            force_apply: false,
            new_key_paths: &[],
            priorities: &priorities,
            all_tracker_paths: &all_paths,
            structural_mode: StructuralMode::Mini,
            home_tracker_resolver: Some(&resolver),
            internal_keys: Some(&internal_keys),
            preserved_prefix: None,
            preserved_suffix: None,
        });

        let data = tracker.read();
        let mut ordered: Vec<String> = data.keys.keys().cloned().collect();
        KeyCodec::sort_hierarchical(&mut ordered);
        let row_1a = dg_core::GridCodec::decompress(&data.grid["1A"]).unwrap();
        let row_2a = dg_core::GridCodec::decompress(&data.grid["2A"]).unwrap();

        // 1A (native) paired with 2A/2B (foreign): no evidence anywhere, must stay `p`.
        let idx_2a = ordered.iter().position(|k| k == "2A").unwrap();
        let idx_2b = ordered.iter().position(|k| k == "2B").unwrap();
        assert_eq!(row_1a[idx_2a], RelationChar::Placeholder);
        assert_eq!(row_1a[idx_2b], RelationChar::Placeholder);

        // 2A and 2B (foreign/foreign): both unexamined, default to verified-no-relation.
        assert_eq!(row_2a[idx_2b], RelationChar::VerifiedNone);
    }

    #[test]
    fn doc_tracker_defaults_unrelated_pairs_to_verified_none() {
        let dir = tempdir().unwrap();
        let tracker_path = dir.path().join("doc_tracker.md");
        let tracker = TrackerFile::new(&tracker_path, TrackerKind::Doc, dir.path().join("backups"));

        let migration_map = mm(&[("docs/a.md", None, Some("1A")), ("docs/b.md", None, Some("1B"))]);
        let final_key_defs = key_defs(&[("1A", "docs/a.md"), ("1B", "docs/b.md")]);

        let priorities = PriorityTable::default();
        let suggestions = SuggestionMap::new();
        let all_paths = [tracker_path.clone()];

        TrackerUpdater::update(UpdateParams {
            tracker: &tracker,
            final_key_defs,
            is_directory: &|_: &str| false,
            migration_map: &migration_map,
            suggestions: &suggestions,
            force_apply: false,
            new_key_paths: &[],
            priorities: &priorities,
            all_tracker_paths: &all_paths,
            structural_mode: StructuralMode::Doc,
            home_tracker_resolver: None,
            internal_keys: None,
            preserved_prefix: None,
            preserved_suffix: None,
        });

        let data = tracker.read();
        assert_eq!(data.grid.get("1A").unwrap(), "n");
        assert_eq!(data.grid.get("1B").unwrap(), "n");
    }

    #[test]
    fn matrix_set_reports_whether_value_actually_changed() {
        let mut matrix = Matrix::new(vec!["1A".to_string(), "1B".to_string()]);
        assert!(matrix.set("1A", "1B", RelationChar::Mutual));
        assert!(!matrix.set("1A", "1B", RelationChar::Mutual));
        assert_eq!(matrix.get("1A", "1B"), RelationChar::Mutual);
    }
}
