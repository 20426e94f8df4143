//! Multi-tracker operations driven by the CLI but too cross-cutting to live there: a
//! key-removal cascade, tracker-to-tracker merge, and a flattened relation export
//! (SPEC_FULL.md SUPPLEMENTED FEATURES, grounded in the original's
//! `dependency_processor.remove_key_from_tracker` and `tracker_io.export_tracker`'s CSV
//! branch). All three operate purely on the in-memory grid representation via
//! `TrackerReader`/`TrackerFile`, no new core algorithm.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use dg_core::{KeyCodec, PriorityTable, RelationChar, TrackerData, TrackerKind};
use dg_store::{decode_row_or_placeholder, read_tracker_data, TrackerFile};
use tracing::{debug, info};

/// A tracker the multi-tracker operations need to open, identified by path and kind.
#[derive(Debug, Clone)]
pub struct TrackerDescriptor {
    pub path: PathBuf,
    pub kind: TrackerKind,
}

/// One tracker actually touched by [`remove_key`]: its path and the local key string it
/// used for the removed path (key strings aren't unique across trackers).
#[derive(Debug, Clone)]
pub struct RemoveKeyReport {
    pub tracker_path: PathBuf,
    pub local_key: String,
}

/// Strip `key`'s path from every row/column it appears in across `trackers`, not just
/// `primary`, the tracker it was named in (SUPPLEMENTED FEATURES §1). Key strings collide
/// across independently-keyed trackers, so each candidate tracker is matched by the path
/// `key` resolves to in `primary`, not by the key string itself.
pub fn remove_key(
    primary: &TrackerDescriptor,
    key: &str,
    trackers: &[TrackerDescriptor],
    backups_dir: &Path,
) -> Result<Vec<RemoveKeyReport>, String> {
    let primary_tracker = TrackerFile::new(&primary.path, primary.kind, backups_dir);
    let primary_data = primary_tracker.read();
    let target_path = primary_data
        .keys
        .get(key)
        .cloned()
        .ok_or_else(|| format!("key '{key}' not defined in {}", primary.path.display()))?;

    info!(key, path = %target_path, trackers = trackers.len(), "removing key across relevant trackers");

    let mut touched = Vec::new();
    for descriptor in trackers {
        let tracker = TrackerFile::new(&descriptor.path, descriptor.kind, backups_dir);
        let data = tracker.read();
        let Some(local_key) = data.keys.iter().find(|(_, p)| **p == target_path).map(|(k, _)| k.clone()) else {
            continue;
        };
        strip_key(&tracker, &data, &local_key)?;
        debug!(tracker = %descriptor.path.display(), local_key, "stripped row/column");
        touched.push(RemoveKeyReport { tracker_path: descriptor.path.clone(), local_key });
    }

    Ok(touched)
}

fn strip_key(tracker: &TrackerFile, data: &TrackerData, key: &str) -> Result<(), String> {
    let mut remaining_defs = data.keys.clone();
    remaining_defs.remove(key);

    let mut ordered: Vec<String> = remaining_defs.keys().cloned().collect();
    KeyCodec::sort_hierarchical(&mut ordered);
    let mut old_ordered: Vec<String> = data.keys.keys().cloned().collect();
    KeyCodec::sort_hierarchical(&mut old_ordered);

    let rows: HashMap<String, Vec<RelationChar>> = ordered
        .iter()
        .map(|k| {
            let old_row = decode_row_or_placeholder(data, k, &old_ordered);
            let trimmed: Vec<RelationChar> = old_ordered
                .iter()
                .zip(old_row)
                .filter(|(old_key, _)| *old_key != key)
                .map(|(_, c)| c)
                .collect();
            (k.clone(), trimmed)
        })
        .collect();

    tracker
        .write(
            &remaining_defs,
            &rows,
            &format!("engine: remove-key {key}"),
            &format!("engine: remove-key {key}"),
            data.preserved_prefix.as_deref(),
            data.preserved_suffix.as_deref(),
        )
        .map_err(|e| e.to_string())
}

/// Merge one or more source trackers' key definitions and grids into `into` (SUPPLEMENTED
/// FEATURES §2). Relations are keyed by `(source_path, target_path)` rather than key
/// string, since the same key string means different things in different trackers; when
/// two sources disagree on a pair, the higher-priority relation (per `PriorityTable`)
/// wins.
pub fn merge_trackers(
    into: &TrackerDescriptor,
    sources: &[PathBuf],
    backups_dir: &Path,
) -> Result<(), String> {
    let priorities = PriorityTable::default();
    let into_tracker = TrackerFile::new(&into.path, into.kind, backups_dir);
    let into_data = into_tracker.read();

    info!(into = %into.path.display(), sources = sources.len(), "merging trackers");

    let mut merged_defs: HashMap<String, String> = into_data.keys.clone();
    let mut by_path: HashMap<(String, String), RelationChar> = HashMap::new();
    collect_relations_by_path(&into_data, &mut by_path, &priorities);

    for source_path in sources {
        let source_data = read_tracker_data(source_path);
        for (k, p) in &source_data.keys {
            merged_defs.entry(k.clone()).or_insert_with(|| p.clone());
        }
        collect_relations_by_path(&source_data, &mut by_path, &priorities);
    }

    let mut final_ordered: Vec<String> = merged_defs.keys().cloned().collect();
    KeyCodec::sort_hierarchical(&mut final_ordered);
    let n = final_ordered.len();

    let mut rows: HashMap<String, Vec<RelationChar>> = HashMap::new();
    for (i, key) in final_ordered.iter().enumerate() {
        let mut row = vec![RelationChar::Placeholder; n];
        row[i] = RelationChar::SelfRef;
        rows.insert(key.clone(), row);
    }
    for ((path_a, path_b), relation) in &by_path {
        let key_a = final_ordered.iter().find(|k| merged_defs[*k] == *path_a);
        let key_b = final_ordered.iter().find(|k| merged_defs[*k] == *path_b);
        if let (Some(ka), Some(kb)) = (key_a, key_b) {
            let idx_b = final_ordered.iter().position(|k| k == kb).unwrap();
            rows.get_mut(ka).unwrap()[idx_b] = *relation;
        }
    }

    debug!(keys = final_ordered.len(), relations = by_path.len(), "merge produced combined grid");

    into_tracker
        .write(
            &merged_defs,
            &rows,
            "engine: merge-trackers",
            "engine: merge-trackers",
            into_data.preserved_prefix.as_deref(),
            into_data.preserved_suffix.as_deref(),
        )
        .map_err(|e| e.to_string())
}

fn collect_relations_by_path(
    data: &TrackerData,
    by_path: &mut HashMap<(String, String), RelationChar>,
    priorities: &PriorityTable,
) {
    let mut ordered: Vec<String> = data.keys.keys().cloned().collect();
    KeyCodec::sort_hierarchical(&mut ordered);
    for key in &ordered {
        let row = decode_row_or_placeholder(data, key, &ordered);
        for (other_key, c) in ordered.iter().zip(row) {
            if c == RelationChar::SelfRef || other_key == key {
                continue;
            }
            let a = data.keys[key].clone();
            let b = data.keys[other_key].clone();
            insert_if_higher(by_path, a, b, c, priorities);
        }
    }
}

fn insert_if_higher(
    by_path: &mut HashMap<(String, String), RelationChar>,
    a: String,
    b: String,
    c: RelationChar,
    priorities: &PriorityTable,
) {
    let key = (a, b);
    match by_path.get(&key) {
        Some(existing) if priorities.priority(*existing) >= priorities.priority(c) => {}
        _ => {
            by_path.insert(key, c);
        }
    }
}

/// Flatten a tracker's relations into a `Source Key,Source Path,Target Key,Target
/// Path,Dependency Type` CSV table, one row per non-empty relation (SUPPLEMENTED FEATURES
/// §2, grounded in the original's CSV export branch, which skips the diagonal, placeholder
/// and legacy-empty markers the same way).
pub fn export_relations_csv(data: &TrackerData) -> String {
    let mut ordered: Vec<String> = data.keys.keys().cloned().collect();
    KeyCodec::sort_hierarchical(&mut ordered);

    let mut out = String::from("Source Key,Source Path,Target Key,Target Path,Dependency Type\n");
    for source_key in &ordered {
        let row = decode_row_or_placeholder(data, source_key, &ordered);
        for (target_key, c) in ordered.iter().zip(row) {
            if matches!(c, RelationChar::SelfRef | RelationChar::Placeholder | RelationChar::Empty) {
                continue;
            }
            out.push_str(&format!(
                "{source_key},{},{target_key},{},{}\n",
                data.keys[source_key],
                data.keys[target_key],
                c.as_char(),
            ));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_tracker(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    fn sample() -> &'static str {
        "---KEY_DEFINITIONS_START---\n\
Key Definitions:\n\
1A: src/a.rs\n\
1B: src/b.rs\n\
---KEY_DEFINITIONS_END---\n\
\n\
last_KEY_edit: x\n\
last_GRID_edit: x\n\
\n\
---GRID_START---\n\
X 1A 1B\n\
1A = op\n\
1B = po\n\
---GRID_END---\n"
    }

    #[test]
    fn remove_key_cascades_to_every_tracker_with_that_path() {
        let dir = tempdir().unwrap();
        let path_a = write_tracker(dir.path(), "a_module.md", sample());
        let path_b = write_tracker(
            dir.path(),
            "b_module.md",
            "---KEY_DEFINITIONS_START---\n\
Key Definitions:\n\
2A: src/b.rs\n\
2B: src/c.rs\n\
---KEY_DEFINITIONS_END---\n\
\n\
last_KEY_edit: x\n\
last_GRID_edit: x\n\
\n\
---GRID_START---\n\
X 2A 2B\n\
2A = op\n\
2B = po\n\
---GRID_END---\n",
        );

        let primary = TrackerDescriptor { path: path_a.clone(), kind: TrackerKind::Mini };
        let trackers = [
            TrackerDescriptor { path: path_a.clone(), kind: TrackerKind::Mini },
            TrackerDescriptor { path: path_b.clone(), kind: TrackerKind::Mini },
        ];

        // "1B" in a_module.md and "2A" in b_module.md both resolve to src/b.rs.
        let touched = remove_key(&primary, "1B", &trackers, &dir.path().join("backups")).unwrap();
        assert_eq!(touched.len(), 2);

        let data_a = read_tracker_data(&path_a);
        assert!(!data_a.keys.contains_key("1B"));
        let data_b = read_tracker_data(&path_b);
        assert!(!data_b.keys.contains_key("2A"));
        assert!(data_b.keys.contains_key("2B"));
    }

    #[test]
    fn remove_key_errors_when_key_missing_from_primary() {
        let dir = tempdir().unwrap();
        let path = write_tracker(dir.path(), "a_module.md", sample());
        let primary = TrackerDescriptor { path: path.clone(), kind: TrackerKind::Mini };
        let trackers = [TrackerDescriptor { path, kind: TrackerKind::Mini }];
        assert!(remove_key(&primary, "9Z", &trackers, &dir.path().join("backups")).is_err());
    }

    #[test]
    fn merge_trackers_combines_keys_and_prefers_higher_priority_relation() {
        let dir = tempdir().unwrap();
        let into_path = write_tracker(dir.path(), "into.md", sample());
        let source_path = write_tracker(
            dir.path(),
            "source.md",
            "---KEY_DEFINITIONS_START---\n\
Key Definitions:\n\
3A: src/a.rs\n\
3B: src/c.rs\n\
---KEY_DEFINITIONS_END---\n\
\n\
last_KEY_edit: x\n\
last_GRID_edit: x\n\
\n\
---GRID_START---\n\
X 3A 3B\n\
3A = ox\n\
3B = xo\n\
---GRID_END---\n",
        );

        let into = TrackerDescriptor { path: into_path.clone(), kind: TrackerKind::Mini };
        merge_trackers(&into, &[source_path], &dir.path().join("backups")).unwrap();

        let data = read_tracker_data(&into_path);
        assert!(data.keys.contains_key("1A"));
        assert!(data.keys.contains_key("1B"));
        // src/c.rs (new) must appear somewhere in the merged definitions.
        assert!(data.keys.values().any(|p| p == "src/c.rs"));

        let mut ordered: Vec<String> = data.keys.keys().cloned().collect();
        KeyCodec::sort_hierarchical(&mut ordered);
        let idx_a = ordered.iter().position(|k| data.keys[k] == "src/a.rs").unwrap();
        let idx_c = ordered.iter().position(|k| data.keys[k] == "src/c.rs").unwrap();
        let key_a = &ordered[idx_a];
        let row_a = dg_core::GridCodec::decompress(&data.grid[key_a]).unwrap();
        // src/a.rs <-> src/c.rs came in as mutual ('x') from the source tracker; it wasn't
        // present in `into` at all, so it must survive the merge untouched.
        assert_eq!(row_a[idx_c], RelationChar::Mutual);
    }

    #[test]
    fn export_relations_csv_skips_diagonal_and_placeholder() {
        let data = read_tracker_data(&write_tracker(&tempdir().unwrap().into_path(), "t.md", sample()));
        let csv = export_relations_csv(&data);
        assert!(csv.starts_with("Source Key,Source Path,Target Key,Target Path,Dependency Type\n"));
        // Sample tracker has no relations beyond the diagonal and placeholders.
        assert_eq!(csv.lines().count(), 1);
    }

    #[test]
    fn export_relations_csv_includes_verified_relations() {
        let data = read_tracker_data(&write_tracker(
            &tempdir().unwrap().into_path(),
            "t.md",
            "---KEY_DEFINITIONS_START---\n\
Key Definitions:\n\
1A: src/a.rs\n\
1B: src/b.rs\n\
---KEY_DEFINITIONS_END---\n\
\n\
last_KEY_edit: x\n\
last_GRID_edit: x\n\
\n\
---GRID_START---\n\
X 1A 1B\n\
1A = o<\n\
1B = >o\n\
---GRID_END---\n",
        ));
        let csv = export_relations_csv(&data);
        assert_eq!(csv.lines().count(), 2);
        assert!(csv.contains("1A,src/a.rs,1B,src/b.rs,<"));
    }
}
