//! `analyze_project` sequencing (spec §2, §5): KeyManager runs once, then every mini
//! tracker updates, then the doc tracker, then main — in that order, because main and
//! the consolidation step in every update read the trackers written before them.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use dg_core::{KeyCodec, PriorityTable, TrackerKind};
use dg_store::{Exclusions, GlobalMapStore, KeyManager, MigrationMapBuilder, TrackerFile};
use tracing::{debug, info, warn};

use crate::main_aggregator::MainAggregator;
use crate::relevant_set::compute_relevant_set;
use crate::report::{RunReport, RunStatus};
use crate::updater::{StructuralMode, SuggestionMap, TrackerUpdater, UpdateParams};

pub struct ProjectLayout {
    pub code_roots: Vec<PathBuf>,
    pub doc_roots: Vec<PathBuf>,
    pub trackers_dir: PathBuf,
    pub backups_dir: PathBuf,
    pub global_map_dir: PathBuf,
    pub exclusions: Exclusions,
    pub priorities: PriorityTable,
    pub force_apply: bool,
}

pub struct Orchestrator;

impl Orchestrator {
    pub fn analyze_project(
        layout: &ProjectLayout,
        suggestions: &SuggestionMap,
        explicit_removals: &HashSet<String>,
    ) -> RunReport {
        let mut report = RunReport::default();

        info!(code_roots = layout.code_roots.len(), doc_roots = layout.doc_roots.len(), "starting analyze_project run");

        let map_store = GlobalMapStore::new(&layout.global_map_dir);
        let old_map = match map_store.load_current() {
            Ok(m) => m,
            Err(e) => {
                warn!(error = %e, "failed to load prior global map");
                report.errors.push(format!("failed to load prior global map: {e}"));
                return report;
            }
        };

        let mut roots: Vec<PathBuf> = layout.code_roots.clone();
        roots.extend(layout.doc_roots.clone());

        let generation = match KeyManager::generate(&roots, &layout.exclusions, old_map.as_ref()) {
            Ok(g) => g,
            Err(e) => {
                warn!(error = %e, "key generation failed");
                report.errors.push(format!("key generation failed: {e}"));
                return report;
            }
        };
        report.new_keys = generation.new_keys.len();
        debug!(new_keys = report.new_keys, total_keys = generation.current_map.len(), "key generation complete");

        if let Err(e) = map_store.persist_current(&generation.current_map) {
            warn!(error = %e, "failed to persist global map");
            report.errors.push(format!("failed to persist global map: {e}"));
            return report;
        }

        let migration_map = match MigrationMapBuilder::build(old_map.as_ref(), &generation.current_map) {
            Ok(m) => m,
            Err(e) => {
                warn!(error = %e, "migration map build failed");
                report.errors.push(format!("migration map build failed: {e}"));
                return report;
            }
        };

        let current_map = &generation.current_map;
        let is_directory = |path: &str| current_map.get(path).map(|i| i.is_directory).unwrap_or(false);
        let doc_root_strs: Vec<String> = layout.doc_roots.iter().map(|p| dg_store::normalize_path(p)).collect();
        let under_doc = |path: &str| doc_root_strs.iter().any(|r| path == r || path.starts_with(&format!("{r}/")));

        // Main-tracker module set: each code root, plus each direct child of a code root
        // (spec §4.8, "one per code root child plus each code root itself"). Mini trackers
        // exist only for the children — "one per top-level code-root subdirectory" — loose
        // files living directly in a code root are covered by main/doc only.
        let code_root_strs: Vec<String> = layout.code_roots.iter().map(|p| dg_store::normalize_path(p)).collect();
        let mut main_modules: Vec<String> = Vec::new();
        for root in &code_root_strs {
            if current_map.contains_key(root) {
                main_modules.push(root.clone());
            }
        }
        for (path, info) in current_map.iter() {
            if let Some(parent) = &info.parent_path {
                if code_root_strs.contains(parent) {
                    main_modules.push(path.clone());
                }
            }
        }
        let mini_modules: Vec<String> =
            main_modules.iter().filter(|m| !code_root_strs.contains(*m)).cloned().collect();

        // Most-specific-path-first, so a file under "src/mod_a" resolves to "src/mod_a"
        // rather than the "src" root that also prefixes it.
        let mut main_modules_by_specificity = main_modules.clone();
        main_modules_by_specificity.sort_by_key(|m| std::cmp::Reverse(m.len()));

        let module_tracker_path = |module_path: &str| -> PathBuf {
            let name = module_path.rsplit('/').next().unwrap_or(module_path);
            layout.trackers_dir.join(format!("{name}_module.md"))
        };
        let doc_tracker_path = layout.trackers_dir.join("doc_tracker.md");
        let main_tracker_path = layout.trackers_dir.join("main_tracker.md");

        let mut module_tracker_of: HashMap<String, PathBuf> = HashMap::new();
        for m in &mini_modules {
            module_tracker_of.insert(m.clone(), module_tracker_path(m));
        }

        // file_to_module: every key belongs to the key string of the most specific
        // main-tracker module whose path prefixes it, if any. Values are key strings (not
        // paths) so they line up with main_key_defs, which is also keyed by key string.
        // module_of_path instead keeps paths, to resolve mini-tracker homes below.
        let mut file_to_module: HashMap<String, String> = HashMap::new();
        let mut module_of_path: HashMap<String, String> = HashMap::new();
        for (path, info) in current_map.iter() {
            for m in &main_modules_by_specificity {
                if path == m || path.starts_with(&format!("{m}/")) {
                    if let Some(module_info) = current_map.get(m) {
                        file_to_module.insert(info.key_string.clone(), module_info.key_string.clone());
                    }
                    if mini_modules.contains(m) {
                        module_of_path.insert(path.clone(), m.clone());
                    }
                    break;
                }
            }
        }

        let mut all_tracker_paths: Vec<PathBuf> = module_tracker_of.values().cloned().collect();
        all_tracker_paths.push(doc_tracker_path.clone());
        all_tracker_paths.push(main_tracker_path.clone());
        all_tracker_paths.sort();

        let new_key_paths: Vec<String> = generation.new_keys.iter().map(|k| k.norm_path.clone()).collect();

        // --- mini trackers ---
        debug!(modules = mini_modules.len(), "updating mini trackers");
        for module_path in &mini_modules {
            // Internal keys are direct children of the module directory, or the module
            // directory itself (spec §4.8: "paths whose parent is the module directory or
            // that equal it") — not every file recursively nested under it.
            let internal_keys: HashSet<String> = current_map
                .iter()
                .filter(|(path, info)| {
                    **path == *module_path || info.parent_path.as_deref() == Some(module_path.as_str())
                })
                .map(|(_, info)| info.key_string.clone())
                .collect();

            let tracker_path = module_tracker_of[module_path].clone();
            let tracker = TrackerFile::new(&tracker_path, TrackerKind::Mini, &layout.backups_dir);
            let prior = tracker.read();

            let exclusions = &layout.exclusions;
            let key_to_path_all: HashMap<String, String> =
                current_map.iter().map(|(p, i)| (i.key_string.clone(), p.clone())).collect();
            let is_file_key = |k: &str| KeyCodec::looks_like_file(k);
            let is_excluded = |k: &str| {
                key_to_path_all
                    .get(k)
                    .map(|p| exclusions.excludes_path(p, is_directory(p)))
                    .unwrap_or(false)
            };

            let relevant = compute_relevant_set(
                &internal_keys,
                &prior,
                &migration_map,
                suggestions,
                &is_file_key,
                explicit_removals,
                &is_excluded,
                &layout.priorities,
            );

            let final_key_defs: HashMap<String, String> = relevant
                .iter()
                .filter_map(|k| key_to_path_all.get(k).map(|p| (k.clone(), p.clone())))
                .collect();

            let resolver = |path_a: &str, path_b: &str| -> Option<PathBuf> {
                if under_doc(path_a) && under_doc(path_b) {
                    return Some(doc_tracker_path.clone());
                }
                let mod_a = module_of_path.get(path_a).cloned();
                let mod_b = module_of_path.get(path_b).cloned();
                if let (Some(a), Some(b)) = (&mod_a, &mod_b) {
                    if a == b {
                        return module_tracker_of.get(a).cloned();
                    }
                }
                if let Some(b) = mod_b {
                    return module_tracker_of.get(&b).cloned();
                }
                if let Some(a) = mod_a {
                    return module_tracker_of.get(&a).cloned();
                }
                None
            };

            let update_report = TrackerUpdater::update(UpdateParams {
                tracker: &tracker,
                final_key_defs,
                is_directory: &is_directory,
                migration_map: &migration_map,
                suggestions,
                force_apply: layout.force_apply,
                new_key_paths: &new_key_paths,
                priorities: &layout.priorities,
                all_tracker_paths: &all_tracker_paths,
                structural_mode: StructuralMode::Mini,
                home_tracker_resolver: Some(&resolver),
                internal_keys: Some(&internal_keys),
                preserved_prefix: prior.preserved_prefix.clone(),
                preserved_suffix: prior.preserved_suffix.clone(),
            });
            report.tracker_reports.push(update_report);
        }

        // --- doc tracker ---
        debug!("updating doc tracker");
        let doc_key_defs: HashMap<String, String> = current_map
            .iter()
            .filter(|(path, _)| under_doc(path))
            .map(|(path, info)| (info.key_string.clone(), path.clone()))
            .collect();
        let doc_tracker = TrackerFile::new(&doc_tracker_path, TrackerKind::Doc, &layout.backups_dir);
        let doc_report = TrackerUpdater::update(UpdateParams {
            tracker: &doc_tracker,
            final_key_defs: doc_key_defs,
            is_directory: &is_directory,
            migration_map: &migration_map,
            suggestions,
            force_apply: layout.force_apply,
            new_key_paths: &new_key_paths,
            priorities: &layout.priorities,
            all_tracker_paths: &all_tracker_paths,
            structural_mode: StructuralMode::Doc,
            home_tracker_resolver: None,
            internal_keys: None,
            preserved_prefix: None,
            preserved_suffix: None,
        });
        report.tracker_reports.push(doc_report);

        // --- main tracker ---
        debug!(modules = main_modules.len(), "updating main tracker");
        let main_key_defs: HashMap<String, String> = main_modules
            .iter()
            .filter_map(|m| current_map.get(m).map(|i| (i.key_string.clone(), m.clone())))
            .collect();

        let main_suggestions: SuggestionMap = if layout.force_apply {
            suggestions.clone()
        } else {
            MainAggregator::aggregate(&all_tracker_paths, &migration_map, &layout.priorities, &file_to_module)
        };

        let main_tracker = TrackerFile::new(&main_tracker_path, TrackerKind::Main, &layout.backups_dir);
        let main_report = TrackerUpdater::update(UpdateParams {
            tracker: &main_tracker,
            final_key_defs: main_key_defs,
            is_directory: &is_directory,
            migration_map: &migration_map,
            suggestions: &main_suggestions,
            force_apply: layout.force_apply,
            new_key_paths: &new_key_paths,
            priorities: &layout.priorities,
            all_tracker_paths: &all_tracker_paths,
            structural_mode: StructuralMode::None,
            home_tracker_resolver: None,
            internal_keys: None,
            preserved_prefix: None,
            preserved_suffix: None,
        });
        report.tracker_reports.push(main_report);

        info!(status = ?report.status(), trackers = report.tracker_reports.len(), "analyze_project run complete");
        report
    }

    pub fn status(report: &RunReport) -> RunStatus {
        report.status()
    }
}
