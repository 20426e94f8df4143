//! Cross-tracker aggregation (spec §4.7): for every ordered pair of *current* keys,
//! find the single highest-priority relation character observed across all trackers,
//! translating each tracker's stale on-disk keys through the migration map first.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use dg_core::{GridCodec, KeyCodec, PriorityTable, RelationChar};

use crate::migration::MigrationMap;
use crate::tracker_file::read_tracker_data;

#[derive(Debug, Clone)]
pub struct AggregatedLink {
    pub relation: RelationChar,
    pub origins: HashSet<PathBuf>,
}

/// (row_new_key, col_new_key) -> winning relation + trackers it was observed in.
pub type AggregationResult = HashMap<(String, String), AggregatedLink>;

pub struct TrackerReader;

impl TrackerReader {
    /// Pure over `(tracker_paths, migration_map, tracker contents on disk)`. Callers
    /// that want deterministic tie-breaks on equal-priority conflicts should pass
    /// `tracker_paths` in a stable order (e.g. sorted).
    pub fn aggregate(
        tracker_paths: &[PathBuf],
        migration_map: &MigrationMap,
        priorities: &PriorityTable,
    ) -> AggregationResult {
        let mut old_key_to_path: HashMap<&str, &str> = HashMap::new();
        for (path, (old_key, _new_key)) in migration_map {
            if let Some(old_key) = old_key {
                if let Some(existing) = old_key_to_path.get(old_key.as_str()) {
                    if *existing != path.as_str() {
                        tracing::error!(old_key, existing, new = %path, "old key maps to multiple paths in migration map");
                    }
                    continue;
                }
                old_key_to_path.insert(old_key.as_str(), path.as_str());
            }
        }

        let mut aggregated: AggregationResult = HashMap::new();

        for tracker_path in tracker_paths {
            let data = read_tracker_data(tracker_path);
            if data.grid.is_empty() || data.keys.is_empty() {
                continue;
            }

            let mut old_keys_in_file: Vec<String> = data.keys.keys().cloned().collect();
            KeyCodec::sort_hierarchical(&mut old_keys_in_file);

            let mut skipped_unstable = 0usize;

            for (old_row_key, compressed_row) in &data.grid {
                let row_path = match old_key_to_path.get(old_row_key.as_str()) {
                    Some(p) => *p,
                    None => {
                        skipped_unstable += 1;
                        continue;
                    }
                };
                let new_row_key = match migration_map.get(row_path).and_then(|(_, new_key)| new_key.as_deref()) {
                    Some(k) => k,
                    None => {
                        skipped_unstable += 1;
                        continue;
                    }
                };

                let decompressed = match GridCodec::decompress(compressed_row) {
                    Ok(row) => row,
                    Err(e) => {
                        tracing::warn!(tracker = %tracker_path.display(), key = old_row_key, error = %e, "skipping malformed row during aggregation");
                        continue;
                    }
                };
                if decompressed.len() != old_keys_in_file.len() {
                    tracing::warn!(tracker = %tracker_path.display(), key = old_row_key, "row length mismatch during aggregation, skipping row");
                    continue;
                }

                for (col_idx, relation) in decompressed.iter().enumerate() {
                    if matches!(relation, RelationChar::SelfRef | RelationChar::Empty) {
                        continue;
                    }
                    let old_col_key = &old_keys_in_file[col_idx];
                    if old_col_key == old_row_key {
                        continue;
                    }
                    let col_path = match old_key_to_path.get(old_col_key.as_str()) {
                        Some(p) => *p,
                        None => {
                            skipped_unstable += 1;
                            continue;
                        }
                    };
                    let new_col_key = match migration_map.get(col_path).and_then(|(_, new_key)| new_key.as_deref()) {
                        Some(k) => k,
                        None => {
                            skipped_unstable += 1;
                            continue;
                        }
                    };

                    let link_key = (new_row_key.to_string(), new_col_key.to_string());
                    Self::merge(&mut aggregated, link_key, *relation, tracker_path, priorities);
                }
            }

            if skipped_unstable > 0 {
                tracing::debug!(tracker = %tracker_path.display(), skipped_unstable, "aggregation skipped unstable cells");
            }
        }

        aggregated
    }

    fn merge(
        aggregated: &mut AggregationResult,
        link_key: (String, String),
        relation: RelationChar,
        tracker_path: &Path,
        priorities: &PriorityTable,
    ) {
        match aggregated.get_mut(&link_key) {
            None => {
                aggregated.insert(
                    link_key,
                    AggregatedLink {
                        relation,
                        origins: HashSet::from([tracker_path.to_path_buf()]),
                    },
                );
            }
            Some(existing) => {
                let existing_priority = priorities.priority(existing.relation);
                let incoming_priority = priorities.priority(relation);
                if incoming_priority > existing_priority {
                    existing.relation = relation;
                    existing.origins = HashSet::from([tracker_path.to_path_buf()]);
                } else if incoming_priority == existing_priority {
                    if relation == existing.relation {
                        existing.origins.insert(tracker_path.to_path_buf());
                    } else {
                        // Same priority, different character: most-recently-seen wins
                        // (spec §9 open question — tie-break made explicit here).
                        existing.relation = relation;
                        existing.origins = HashSet::from([tracker_path.to_path_buf()]);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as Map;
    use tempfile::tempdir;

    fn write_tracker(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn aggregates_highest_priority_stable_links() {
        let dir = tempdir().unwrap();
        let tracker = write_tracker(
            dir.path(),
            "t1.md",
            "---KEY_DEFINITIONS_START---\nKey Definitions:\n1A: a.rs\n1B: b.rs\n---KEY_DEFINITIONS_END---\n\nlast_KEY_edit: x\nlast_GRID_edit: x\n\n---GRID_START---\nX 1A 1B\n1A = ox\n1B = xo\n---GRID_END---\n",
        );

        let mut migration_map: MigrationMap = Map::new();
        migration_map.insert("a.rs".to_string(), (Some("1A".to_string()), Some("2A".to_string())));
        migration_map.insert("b.rs".to_string(), (Some("1B".to_string()), Some("2B".to_string())));

        let priorities = PriorityTable::default();
        let result = TrackerReader::aggregate(&[tracker], &migration_map, &priorities);

        let link = &result[&("2A".to_string(), "2B".to_string())];
        assert_eq!(link.relation, RelationChar::Mutual);
    }

    #[test]
    fn skips_links_whose_path_was_removed() {
        let dir = tempdir().unwrap();
        let tracker = write_tracker(
            dir.path(),
            "t1.md",
            "---KEY_DEFINITIONS_START---\nKey Definitions:\n1A: a.rs\n1B: b.rs\n---KEY_DEFINITIONS_END---\n\nlast_KEY_edit: x\nlast_GRID_edit: x\n\n---GRID_START---\nX 1A 1B\n1A = op\n1B = po\n---GRID_END---\n",
        );

        // b.rs has no new_key: it was removed.
        let mut migration_map: MigrationMap = Map::new();
        migration_map.insert("a.rs".to_string(), (Some("1A".to_string()), Some("2A".to_string())));
        migration_map.insert("b.rs".to_string(), (Some("1B".to_string()), None));

        let priorities = PriorityTable::default();
        let result = TrackerReader::aggregate(&[tracker], &migration_map, &priorities);
        assert!(result.is_empty());
    }

    #[test]
    fn higher_priority_wins_across_two_trackers() {
        let dir = tempdir().unwrap();
        let t1 = write_tracker(
            dir.path(),
            "t1.md",
            "---KEY_DEFINITIONS_START---\nKey Definitions:\n1A: a.rs\n1B: b.rs\n---KEY_DEFINITIONS_END---\n\nlast_KEY_edit: x\nlast_GRID_edit: x\n\n---GRID_START---\nX 1A 1B\n1A = os\n1B = so\n---GRID_END---\n",
        );
        let t2 = write_tracker(
            dir.path(),
            "t2.md",
            "---KEY_DEFINITIONS_START---\nKey Definitions:\n1A: a.rs\n1B: b.rs\n---KEY_DEFINITIONS_END---\n\nlast_KEY_edit: x\nlast_GRID_edit: x\n\n---GRID_START---\nX 1A 1B\n1A = ox\n1B = xo\n---GRID_END---\n",
        );

        let mut migration_map: MigrationMap = Map::new();
        migration_map.insert("a.rs".to_string(), (Some("1A".to_string()), Some("2A".to_string())));
        migration_map.insert("b.rs".to_string(), (Some("1B".to_string()), Some("2B".to_string())));

        let priorities = PriorityTable::default();
        let result = TrackerReader::aggregate(&[t1, t2], &migration_map, &priorities);
        assert_eq!(result[&("2A".to_string(), "2B".to_string())].relation, RelationChar::Mutual);
    }
}
