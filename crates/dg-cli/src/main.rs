mod config;

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use dg_core::{GridCodec, KeyCodec, RelationChar, TrackerKind};
use dg_engine::{Orchestrator, ProjectLayout, RunStatus, SuggestionMap, TrackerDescriptor};
use dg_store::{decode_row_or_placeholder, read_tracker_data, TrackerFile};

use crate::config::Config;

#[derive(Parser, Debug)]
#[command(name = "depgrid", about = "Dependency grid tracker engine driver")]
struct Args {
    /// Path to a depgrid.toml config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a full key-assignment + tracker-update pass over the project.
    AnalyzeProject {
        #[arg(long)]
        code_root: Vec<PathBuf>,
        #[arg(long)]
        doc_root: Vec<PathBuf>,
        #[arg(long)]
        trackers_dir: Option<PathBuf>,
        #[arg(long)]
        backups_dir: Option<PathBuf>,
        #[arg(long)]
        global_map_dir: Option<PathBuf>,
        #[arg(long)]
        force_apply: bool,
        /// An external suggestion in `src_key:tgt_key:char` form; may be repeated.
        #[arg(long = "suggest", value_parser = parse_suggestion)]
        suggestions: Vec<(String, String, RelationChar)>,
        /// Explicitly remove a key from its relevant set this run; may be repeated.
        #[arg(long = "remove-key")]
        remove_keys: Vec<String>,
    },
    /// Apply (or reapply) one relation directly into a tracker file.
    AddDependency {
        #[arg(long)]
        tracker: PathBuf,
        #[arg(long, value_enum, default_value = "mini")]
        kind: TrackerKindArg,
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
        #[arg(long)]
        char: RelationCharArg,
        /// Also write the reciprocal cell (mutual for symmetric chars, reversed for directional).
        #[arg(long)]
        reciprocal: bool,
        #[arg(long, default_value = ".dependency-grid/backups")]
        backups_dir: PathBuf,
    },
    /// Remove a key (and every relation touching it) from a tracker file, cascading the
    /// removal to every other tracker under `trackers_dir` that shares the same path.
    RemoveKey {
        #[arg(long)]
        tracker: PathBuf,
        #[arg(long, value_enum, default_value = "mini")]
        kind: TrackerKindArg,
        #[arg(long)]
        key: String,
        #[arg(long)]
        trackers_dir: Option<PathBuf>,
        #[arg(long, default_value = ".dependency-grid/backups")]
        backups_dir: PathBuf,
    },
    /// Merge one or more source trackers' key definitions and grids into a target tracker.
    MergeTrackers {
        #[arg(long)]
        into: PathBuf,
        #[arg(long = "from")]
        sources: Vec<PathBuf>,
        #[arg(long, value_enum, default_value = "mini")]
        kind: TrackerKindArg,
        #[arg(long, default_value = ".dependency-grid/backups")]
        backups_dir: PathBuf,
    },
    /// Print a tracker's relations as a flattened `from,to,char` CSV table.
    ExportTracker {
        #[arg(long)]
        tracker: PathBuf,
    },
    /// Print every non-trivial relation a key participates in.
    ShowDependencies {
        #[arg(long)]
        tracker: PathBuf,
        #[arg(long)]
        key: String,
    },
    /// Print a tracker's key definitions, hierarchically sorted.
    ShowKeys {
        #[arg(long)]
        tracker: PathBuf,
    },
    /// RLE-compress a raw relation-character string.
    Compress { raw: String },
    /// RLE-decompress a relation-character string.
    Decompress { rle: String },
    /// Read the character at a raw index in an RLE row.
    GetChar { rle: String, index: usize },
    /// Replace the character at a raw index in an RLE row.
    SetChar {
        rle: String,
        index: usize,
        char: RelationCharArg,
    },
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum TrackerKindArg {
    Main,
    Doc,
    Mini,
}

impl From<TrackerKindArg> for TrackerKind {
    fn from(v: TrackerKindArg) -> Self {
        match v {
            TrackerKindArg::Main => TrackerKind::Main,
            TrackerKindArg::Doc => TrackerKind::Doc,
            TrackerKindArg::Mini => TrackerKind::Mini,
        }
    }
}

/// Thin wrapper so a bare relation character (`x`, `<`, `n`, ...) can be parsed directly
/// off the command line without reaching for `RelationChar`'s `TryFrom<char>` manually.
#[derive(Debug, Clone, Copy)]
struct RelationCharArg(RelationChar);

impl std::str::FromStr for RelationCharArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        let c = chars.next().ok_or("relation character must not be empty")?;
        if chars.next().is_some() {
            return Err(format!("expected a single relation character, got '{s}'"));
        }
        RelationChar::try_from(c).map(RelationCharArg).map_err(|e| e.to_string())
    }
}

fn parse_suggestion(s: &str) -> Result<(String, String, RelationChar), String> {
    let mut parts = s.splitn(3, ':');
    let (src, tgt, c) = match (parts.next(), parts.next(), parts.next()) {
        (Some(src), Some(tgt), Some(c)) => (src, tgt, c),
        _ => return Err(format!("expected 'src_key:tgt_key:char', got '{s}'")),
    };
    let ch = c.chars().next().ok_or("missing relation character")?;
    let relation = RelationChar::try_from(ch).map_err(|e| e.to_string())?;
    Ok((src.to_string(), tgt.to_string(), relation))
}

fn setup_logging(log_level: &str) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}

fn main() -> ExitCode {
    let args = Args::parse();
    let config = match &args.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };
    let log_level = args.log_level.as_deref().unwrap_or(&config.logging.level).to_string();
    setup_logging(&log_level);

    match run(args.command, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Command, config: &Config) -> Result<(), String> {
    match command {
        Command::AnalyzeProject {
            code_root,
            doc_root,
            trackers_dir,
            backups_dir,
            global_map_dir,
            force_apply,
            suggestions,
            remove_keys,
        } => analyze_project(
            config,
            code_root,
            doc_root,
            trackers_dir,
            backups_dir,
            global_map_dir,
            force_apply,
            suggestions,
            remove_keys,
        ),
        Command::AddDependency {
            tracker,
            kind,
            from,
            to,
            char,
            reciprocal,
            backups_dir,
        } => add_dependency(tracker, kind.into(), &from, &to, char.0, reciprocal, backups_dir),
        Command::RemoveKey { tracker, kind, key, trackers_dir, backups_dir } => {
            let trackers_dir = trackers_dir.unwrap_or_else(|| PathBuf::from(&config.project.trackers_dir));
            remove_key(tracker, kind.into(), &key, &trackers_dir, backups_dir)
        }
        Command::MergeTrackers { into, sources, kind, backups_dir } => {
            merge_trackers(into, &sources, kind.into(), backups_dir)
        }
        Command::ExportTracker { tracker } => export_tracker(&tracker),
        Command::ShowDependencies { tracker, key } => show_dependencies(&tracker, &key),
        Command::ShowKeys { tracker } => show_keys(&tracker),
        Command::Compress { raw } => {
            let chars = decode_raw_chars(&raw)?;
            println!("{}", GridCodec::compress(&chars));
            Ok(())
        }
        Command::Decompress { rle } => {
            let raw = GridCodec::decompress(&rle).map_err(|e| e.to_string())?;
            println!("{}", raw.iter().map(|c| c.as_char()).collect::<String>());
            Ok(())
        }
        Command::GetChar { rle, index } => {
            let c = GridCodec::get_at(&rle, index).map_err(|e| e.to_string())?;
            println!("{c}");
            Ok(())
        }
        Command::SetChar { rle, index, char } => {
            let updated = GridCodec::set_at(&rle, index, char.0).map_err(|e| e.to_string())?;
            println!("{updated}");
            Ok(())
        }
    }
}

fn decode_raw_chars(raw: &str) -> Result<Vec<RelationChar>, String> {
    raw.chars()
        .map(|c| RelationChar::try_from(c).map_err(|e| e.to_string()))
        .collect()
}

#[allow(clippy::too_many_arguments)]
fn analyze_project(
    config: &Config,
    code_root: Vec<PathBuf>,
    doc_root: Vec<PathBuf>,
    trackers_dir: Option<PathBuf>,
    backups_dir: Option<PathBuf>,
    global_map_dir: Option<PathBuf>,
    force_apply_flag: bool,
    suggestions_cli: Vec<(String, String, RelationChar)>,
    remove_keys: Vec<String>,
) -> Result<(), String> {
    let code_roots = if code_root.is_empty() {
        config.project.code_roots.iter().map(PathBuf::from).collect()
    } else {
        code_root
    };
    let doc_roots = if doc_root.is_empty() {
        config.project.doc_roots.iter().map(PathBuf::from).collect()
    } else {
        doc_root
    };

    let layout = ProjectLayout {
        code_roots,
        doc_roots,
        trackers_dir: trackers_dir.unwrap_or_else(|| PathBuf::from(&config.project.trackers_dir)),
        backups_dir: backups_dir.unwrap_or_else(|| PathBuf::from(&config.project.backups_dir)),
        global_map_dir: global_map_dir.unwrap_or_else(|| PathBuf::from(&config.project.global_map_dir)),
        exclusions: config.exclusions.to_exclusions(),
        priorities: config.priorities.to_priority_table(),
        force_apply: force_apply_flag || config.project.force_apply,
    };

    let mut suggestions: SuggestionMap = HashMap::new();
    for (src, tgt, c) in suggestions_cli {
        suggestions.entry(src).or_default().push((tgt, c));
    }
    let removals: HashSet<String> = remove_keys.into_iter().collect();

    let report = Orchestrator::analyze_project(&layout, &suggestions, &removals);

    if !report.errors.is_empty() {
        for e in &report.errors {
            eprintln!("error: {e}");
        }
        return Err("run aborted".to_string());
    }

    println!("new keys: {}", report.new_keys);
    for tr in &report.tracker_reports {
        println!(
            "{}: +{} keys, -{} keys, {} cells changed, {} suggestions applied",
            tr.tracker_path.display(),
            tr.keys_added,
            tr.keys_removed,
            tr.cells_changed,
            tr.suggestions_applied,
        );
        for w in &tr.warnings {
            eprintln!("warning ({}): {w}", tr.tracker_path.display());
        }
    }

    match Orchestrator::status(&report) {
        RunStatus::Success => Ok(()),
        RunStatus::Warning => {
            eprintln!("run completed with warnings");
            Ok(())
        }
        RunStatus::Error => Err("run failed".to_string()),
    }
}

fn add_dependency(
    tracker_path: PathBuf,
    kind: TrackerKind,
    from: &str,
    to: &str,
    relation: RelationChar,
    reciprocal: bool,
    backups_dir: PathBuf,
) -> Result<(), String> {
    let tracker = TrackerFile::new(&tracker_path, kind, &backups_dir);
    let data = tracker.read();

    if !data.keys.contains_key(from) {
        return Err(format!("key '{from}' not defined in {}", tracker_path.display()));
    }
    if !data.keys.contains_key(to) {
        return Err(format!("key '{to}' not defined in {}", tracker_path.display()));
    }

    let mut ordered: Vec<String> = data.keys.keys().cloned().collect();
    KeyCodec::sort_hierarchical(&mut ordered);
    let from_idx = ordered.iter().position(|k| k == from).unwrap();
    let to_idx = ordered.iter().position(|k| k == to).unwrap();

    let mut rows: HashMap<String, Vec<RelationChar>> = ordered
        .iter()
        .map(|k| (k.clone(), decode_row_or_placeholder(&data, k, &ordered)))
        .collect();

    rows.get_mut(from).unwrap()[to_idx] = relation;
    if reciprocal {
        rows.get_mut(to).unwrap()[from_idx] = relation.reversed();
    }

    tracker
        .write(
            &data.keys,
            &rows,
            &format!("cli: add-dependency {from}->{to}={relation}"),
            &format!("cli: add-dependency {from}->{to}={relation}"),
            data.preserved_prefix.as_deref(),
            data.preserved_suffix.as_deref(),
        )
        .map_err(|e| e.to_string())
}

/// A tracker is a mini-tracker iff its filename ends in `_module.md`; the doc and main
/// trackers are the two fixed filenames `orchestrator.rs` writes them under (spec §5).
fn classify_tracker_kind(path: &std::path::Path) -> TrackerKind {
    match path.file_name().and_then(|n| n.to_str()) {
        Some("doc_tracker.md") => TrackerKind::Doc,
        Some("main_tracker.md") => TrackerKind::Main,
        _ => TrackerKind::Mini,
    }
}

/// Every `.md` tracker file directly under `trackers_dir`, for operations (like
/// `remove_key`) that need to look across the whole project rather than a single tracker.
fn discover_trackers(trackers_dir: &std::path::Path) -> Vec<TrackerDescriptor> {
    let Ok(entries) = std::fs::read_dir(trackers_dir) else {
        return Vec::new();
    };
    entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("md"))
        .map(|path| {
            let kind = classify_tracker_kind(&path);
            TrackerDescriptor { path, kind }
        })
        .collect()
}

fn remove_key(
    tracker_path: PathBuf,
    kind: TrackerKind,
    key: &str,
    trackers_dir: &std::path::Path,
    backups_dir: PathBuf,
) -> Result<(), String> {
    let primary = TrackerDescriptor { path: tracker_path, kind };
    let mut trackers = discover_trackers(trackers_dir);
    if !trackers.iter().any(|t| t.path == primary.path) {
        trackers.push(primary.clone());
    }

    let touched = dg_engine::remove_key(&primary, key, &trackers, &backups_dir)?;
    for report in &touched {
        println!("{}: removed key '{}'", report.tracker_path.display(), report.local_key);
    }
    Ok(())
}

fn merge_trackers(
    into_path: PathBuf,
    sources: &[PathBuf],
    kind: TrackerKind,
    backups_dir: PathBuf,
) -> Result<(), String> {
    let into = TrackerDescriptor { path: into_path, kind };
    dg_engine::merge_trackers(&into, sources, &backups_dir)
}

fn export_tracker(tracker_path: &std::path::Path) -> Result<(), String> {
    let data = read_tracker_data(tracker_path);
    print!("{}", dg_engine::export_relations_csv(&data));
    Ok(())
}

fn show_dependencies(tracker_path: &std::path::Path, key: &str) -> Result<(), String> {
    let data = read_tracker_data(tracker_path);
    if !data.keys.contains_key(key) {
        return Err(format!("key '{key}' not defined in {}", tracker_path.display()));
    }
    let mut ordered: Vec<String> = data.keys.keys().cloned().collect();
    KeyCodec::sort_hierarchical(&mut ordered);
    let row = decode_row_or_placeholder(&data, key, &ordered);

    for (other, c) in ordered.iter().zip(row) {
        if other == key || matches!(c, RelationChar::SelfRef | RelationChar::Placeholder | RelationChar::Empty) {
            continue;
        }
        println!("{key} {c} {other}  ({})", data.keys[other]);
    }
    Ok(())
}

fn show_keys(tracker_path: &std::path::Path) -> Result<(), String> {
    let data = read_tracker_data(tracker_path);
    let mut ordered: Vec<String> = data.keys.keys().cloned().collect();
    KeyCodec::sort_hierarchical(&mut ordered);
    for key in ordered {
        println!("{key}: {}", data.keys[&key]);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_tracker(dir: &std::path::Path, name: &str, body: &str) -> PathBuf {
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
    fn add_dependency_sets_cell_and_optional_reciprocal() {
        let dir = tempdir().unwrap();
        let path = write_tracker(dir.path(), "t.md", sample());
        add_dependency(path.clone(), TrackerKind::Mini, "1A", "1B", RelationChar::DependsRow, true, dir.path().join("backups"))
            .unwrap();

        let data = read_tracker_data(&path);
        let row_a = GridCodec::decompress(&data.grid["1A"]).unwrap();
        assert_eq!(row_a[1], RelationChar::DependsRow);
        let row_b = GridCodec::decompress(&data.grid["1B"]).unwrap();
        assert_eq!(row_b[0], RelationChar::DependsCol);
    }

    #[test]
    fn remove_key_drops_row_and_column() {
        let dir = tempdir().unwrap();
        let path = write_tracker(dir.path(), "t_module.md", sample());
        remove_key(path.clone(), TrackerKind::Mini, "1B", dir.path(), dir.path().join("backups")).unwrap();

        let data = read_tracker_data(&path);
        assert!(!data.keys.contains_key("1B"));
        assert_eq!(GridCodec::decompress(&data.grid["1A"]).unwrap().len(), 1);
    }

    #[test]
    fn discover_trackers_classifies_by_filename() {
        let dir = tempdir().unwrap();
        write_tracker(dir.path(), "mod_a_module.md", sample());
        write_tracker(dir.path(), "doc_tracker.md", sample());
        write_tracker(dir.path(), "main_tracker.md", sample());
        write_tracker(dir.path(), "notes.txt", "not a tracker");

        let found = discover_trackers(dir.path());
        assert_eq!(found.len(), 3);
        assert!(found.iter().any(|t| t.kind == TrackerKind::Mini && t.path.ends_with("mod_a_module.md")));
        assert!(found.iter().any(|t| t.kind == TrackerKind::Doc));
        assert!(found.iter().any(|t| t.kind == TrackerKind::Main));
    }

    #[test]
    fn parse_suggestion_accepts_well_formed_triplet() {
        let (src, tgt, c) = parse_suggestion("1A:1B:x").unwrap();
        assert_eq!(src, "1A");
        assert_eq!(tgt, "1B");
        assert_eq!(c, RelationChar::Mutual);
    }

    #[test]
    fn parse_suggestion_rejects_missing_fields() {
        assert!(parse_suggestion("1A:1B").is_err());
    }

    #[test]
    fn export_tracker_prints_flattened_csv() {
        let dir = tempdir().unwrap();
        let path = write_tracker(dir.path(), "t.md", sample());
        // Exercises the dg-cli plumbing only; export_relations_csv's own behavior is
        // covered in dg-engine.
        export_tracker(&path).unwrap();
    }
}
