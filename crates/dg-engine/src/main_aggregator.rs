//! Project-wide inter-module aggregation (spec §4.9): turns file-level links from the
//! cross-tracker aggregator into module-level suggestions for the main tracker.

use std::collections::HashMap;
use std::path::PathBuf;

use dg_core::{PriorityTable, RelationChar};
use dg_store::{MigrationMap, TrackerReader};

use crate::updater::SuggestionMap;

pub struct MainAggregator;

impl MainAggregator {
    /// `file_to_module` maps every file/dir key in the global map to the key of the
    /// top-level module it belongs to. Links within the same module, and `p`/`o`, are
    /// dropped; everything else accumulates into `(module_a, module_b)` under the
    /// priority rule (highest observed character wins).
    pub fn aggregate(
        all_tracker_paths: &[PathBuf],
        migration_map: &MigrationMap,
        priorities: &PriorityTable,
        file_to_module: &HashMap<String, String>,
    ) -> SuggestionMap {
        let file_links = TrackerReader::aggregate(all_tracker_paths, migration_map, priorities);

        let mut by_module: HashMap<(String, String), RelationChar> = HashMap::new();
        for ((a_file, b_file), link) in file_links.iter() {
            if matches!(link.relation, RelationChar::SelfRef | RelationChar::Placeholder | RelationChar::Empty) {
                continue;
            }
            let (mod_a, mod_b) = match (file_to_module.get(a_file), file_to_module.get(b_file)) {
                (Some(a), Some(b)) => (a, b),
                _ => continue,
            };
            if mod_a == mod_b {
                continue;
            }
            let key = (mod_a.clone(), mod_b.clone());
            match by_module.get(&key) {
                None => {
                    by_module.insert(key, link.relation);
                }
                Some(existing) => {
                    if priorities.priority(link.relation) > priorities.priority(*existing) {
                        by_module.insert(key, link.relation);
                    }
                }
            }
        }

        let mut suggestions: SuggestionMap = HashMap::new();
        for ((mod_a, mod_b), relation) in by_module {
            suggestions.entry(mod_a).or_default().push((mod_b, relation));
        }
        suggestions
    }
}
