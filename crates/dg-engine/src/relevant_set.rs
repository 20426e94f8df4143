//! Mini-tracker relevant-set computation (spec §4.8 "Relevant-set computation").
//!
//! A mini tracker's final key set is not just "everything under this module" — it also
//! retains foreign file keys that carry evidence of a real cross-module link, so those
//! links survive a run even though the foreign file itself isn't walked by this tracker.

use std::collections::HashSet;

use dg_core::{GridCodec, KeyCodec, PriorityTable, RelationChar, TrackerData};

/// `internal_keys` must already be sorted/deduplicated new-key strings for paths whose
/// parent is the module root (or that equal it). Returns the final relevant set,
/// internal keys included.
pub fn compute_relevant_set(
    internal_keys: &HashSet<String>,
    prior: &TrackerData,
    migration_map: &dg_store::MigrationMap,
    suggestions: &super::updater::SuggestionMap,
    is_file_key: &dyn Fn(&str) -> bool,
    explicit_removals: &HashSet<String>,
    is_excluded_path: &dyn Fn(&str) -> bool,
    priorities: &PriorityTable,
) -> HashSet<String> {
    let mut relevant: HashSet<String> = internal_keys.clone();

    // Step 2: persisted foreign file links from the existing grid.
    let mut prior_keys_sorted: Vec<String> = prior.keys.keys().cloned().collect();
    KeyCodec::sort_hierarchical(&mut prior_keys_sorted);

    let threshold = priorities.priority(RelationChar::SemanticWeak);

    for (old_row_key, compressed) in &prior.grid {
        let row_path = match prior.keys.get(old_row_key) {
            Some(p) => p,
            None => continue,
        };
        let new_row_key = match migration_map.get(row_path).and_then(|(_, nk)| nk.clone()) {
            Some(k) => k,
            None => continue,
        };
        let decoded = match GridCodec::decompress(compressed) {
            Ok(v) => v,
            Err(_) => continue,
        };
        if decoded.len() != prior_keys_sorted.len() {
            continue;
        }
        for (col_idx, v) in decoded.iter().enumerate() {
            if priorities.priority(*v) < threshold || *v == RelationChar::VerifiedNone {
                continue;
            }
            let old_col_key = &prior_keys_sorted[col_idx];
            let col_path = match prior.keys.get(old_col_key) {
                Some(p) => p,
                None => continue,
            };
            let new_col_key = match migration_map.get(col_path).and_then(|(_, nk)| nk.clone()) {
                Some(k) => k,
                None => continue,
            };

            let row_internal = internal_keys.contains(&new_row_key);
            let col_internal = internal_keys.contains(&new_col_key);
            if row_internal == col_internal {
                continue; // need exactly one endpoint internal
            }
            if !is_file_key(&new_row_key) || !is_file_key(&new_col_key) {
                continue; // both endpoints must be file keys
            }
            let foreign = if row_internal { new_col_key } else { new_row_key.clone() };
            relevant.insert(foreign);
        }
    }

    // Step 3: suggestion-implicated foreign keys.
    for (src, targets) in suggestions {
        for (tgt, c) in targets {
            if priorities.priority(*c) < threshold {
                continue;
            }
            let src_internal = internal_keys.contains(src);
            let tgt_internal = internal_keys.contains(tgt);
            if src_internal && !tgt_internal {
                relevant.insert(tgt.clone());
            } else if tgt_internal && !src_internal {
                relevant.insert(src.clone());
            }
        }
    }

    // Step 4: explicit removals.
    for removed in explicit_removals {
        relevant.remove(removed);
    }

    // Step 5: excluded paths — caller passes key->path resolution via is_excluded_path,
    // which here receives the key string itself; real exclusion filtering happens
    // against the resolved path in the orchestrator before this key ever reaches us,
    // this is a defensive second pass for keys introduced in steps 2-3.
    relevant.retain(|k| !is_excluded_path(k));

    relevant
}
