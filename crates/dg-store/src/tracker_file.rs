//! Tracker Markdown read/write (spec §4.6, §6 "Tracker file format").

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use dg_core::{GridCodec, KeyCodec, RelationChar, TrackerData, TrackerKind};
use regex::Regex;

use crate::backup::BackupManager;
use crate::error::StoreError;

pub const MANAGED_START: &str = "<!-- dependency-grid:managed-block:start -->";
pub const MANAGED_END: &str = "<!-- dependency-grid:managed-block:end -->";

pub struct TrackerFile {
    pub path: PathBuf,
    pub kind: TrackerKind,
    backups: BackupManager,
}

impl TrackerFile {
    pub fn new(path: impl Into<PathBuf>, kind: TrackerKind, backups_dir: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind,
            backups: BackupManager::new(backups_dir),
        }
    }

    /// Missing file, unreadable sections, or malformed content all degrade to an empty
    /// `TrackerData` rather than a hard error (spec §7, `TrackerFormatError`: "the run
    /// continues with an empty prior grid, as if new tracker").
    pub fn read(&self) -> TrackerData {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(_) => return TrackerData::default(),
        };
        parse_tracker_content(&content)
    }

    /// Back up the existing file (if any), then atomically write the new contents.
    pub fn write(
        &self,
        final_key_defs: &HashMap<String, String>,
        rows: &HashMap<String, Vec<RelationChar>>,
        last_key_edit: &str,
        last_grid_edit: &str,
        preserved_prefix: Option<&str>,
        preserved_suffix: Option<&str>,
    ) -> Result<(), StoreError> {
        let rendered = render_tracker(
            self.kind,
            final_key_defs,
            rows,
            last_key_edit,
            last_grid_edit,
            preserved_prefix,
            preserved_suffix,
        )?;

        self.backups.backup(&self.path)?;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("md.tmp");
        std::fs::write(&tmp, rendered)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// Read and parse a tracker file without needing a backups directory. Used by read-only
/// consumers like the cross-tracker aggregator.
pub fn read_tracker_data(path: &Path) -> TrackerData {
    match std::fs::read_to_string(path) {
        Ok(content) => parse_tracker_content(&content),
        Err(_) => TrackerData::default(),
    }
}

fn parse_tracker_content(content: &str) -> TrackerData {
    let mut data = TrackerData::default();

    if let (Some(start), Some(end)) = (content.find(MANAGED_START), content.find(MANAGED_END)) {
        data.preserved_prefix = Some(content[..start].to_string());
        let after = end + MANAGED_END.len();
        data.preserved_suffix = Some(content[after..].trim_start_matches('\n').to_string());
    }

    let key_section = Regex::new(r"(?si)---KEY_DEFINITIONS_START---\n(.*?)\n---KEY_DEFINITIONS_END---").unwrap();
    if let Some(caps) = key_section.captures(content) {
        for line in caps[1].lines() {
            let line = line.trim();
            if line.is_empty() || line.to_lowercase().starts_with("key definitions:") {
                continue;
            }
            if let Some((k, v)) = line.split_once(':') {
                let (k, v) = (k.trim(), v.trim());
                if KeyCodec::validate(k) {
                    data.keys.insert(k.to_string(), normalize_forward_slashes(v));
                } else {
                    tracing::warn!(key = k, "skipping invalid key format in key definitions");
                }
            }
        }
    }

    let grid_section = Regex::new(r"(?si)---GRID_START---\n(.*?)\n---GRID_END---").unwrap();
    if let Some(caps) = grid_section.captures(content) {
        let mut lines: Vec<&str> = caps[1].trim_matches('\n').lines().collect();
        if let Some(first) = lines.first() {
            let t = first.trim();
            if t.to_uppercase().starts_with("X ") || t.trim() == "X" {
                lines.remove(0);
            }
        }
        for line in lines {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Some((k, v)) = line.split_once('=') {
                let (k, v) = (k.trim(), v.trim());
                if KeyCodec::validate(k) {
                    data.grid.insert(k.to_string(), v.to_string());
                } else {
                    tracing::warn!(key = k, "grid row key has invalid format, skipping");
                }
            }
        }
    }

    let key_edit = Regex::new(r"(?mi)^last_KEY_edit\s*:\s*(.*)$").unwrap();
    if let Some(c) = key_edit.captures(content) {
        data.last_key_edit = c[1].trim().to_string();
    }
    let grid_edit = Regex::new(r"(?mi)^last_GRID_edit\s*:\s*(.*)$").unwrap();
    if let Some(c) = grid_edit.captures(content) {
        data.last_grid_edit = c[1].trim().to_string();
    }

    data
}

fn normalize_forward_slashes(s: &str) -> String {
    s.replace('\\', "/")
}

/// Build the on-disk text for a tracker. Any row missing from `rows` (or whose length
/// doesn't match `final_key_defs`) is rebuilt as all-placeholders with the diagonal
/// restored, satisfying invariants T1/T2 unconditionally.
fn render_tracker(
    kind: TrackerKind,
    final_key_defs: &HashMap<String, String>,
    rows: &HashMap<String, Vec<RelationChar>>,
    last_key_edit: &str,
    last_grid_edit: &str,
    preserved_prefix: Option<&str>,
    preserved_suffix: Option<&str>,
) -> Result<String, StoreError> {
    let mut sorted_keys: Vec<String> = final_key_defs.keys().cloned().collect();
    KeyCodec::sort_hierarchical(&mut sorted_keys);
    let n = sorted_keys.len();

    let mut out = String::new();

    if kind == TrackerKind::Mini {
        if let Some(prefix) = preserved_prefix {
            out.push_str(prefix);
            if !prefix.ends_with('\n') {
                out.push('\n');
            }
        }
        out.push_str(MANAGED_START);
        out.push('\n');
    }

    out.push_str("---KEY_DEFINITIONS_START---\n");
    out.push_str("Key Definitions:\n");
    for key in &sorted_keys {
        out.push_str(&format!("{key}: {}\n", final_key_defs[key]));
    }
    out.push_str("---KEY_DEFINITIONS_END---\n\n");

    out.push_str(&format!("last_KEY_edit: {last_key_edit}\n"));
    out.push_str(&format!("last_GRID_edit: {last_grid_edit}\n\n"));

    out.push_str("---GRID_START---\n");
    out.push_str("X ");
    out.push_str(&sorted_keys.join(" "));
    out.push('\n');
    for (i, key) in sorted_keys.iter().enumerate() {
        let row = match rows.get(key) {
            Some(row) if row.len() == n && row[i] == RelationChar::SelfRef => row.clone(),
            _ => rebuilt_placeholder_row(n, i),
        };
        out.push_str(&format!("{key} = {}\n", GridCodec::compress(&row)));
    }
    out.push_str("---GRID_END---");

    if kind == TrackerKind::Mini {
        out.push('\n');
        out.push_str(MANAGED_END);
        out.push('\n');
        if let Some(suffix) = preserved_suffix {
            out.push_str(suffix);
        }
    } else {
        out.push('\n');
    }

    Ok(out)
}

fn rebuilt_placeholder_row(n: usize, diagonal_index: usize) -> Vec<RelationChar> {
    (0..n)
        .map(|i| if i == diagonal_index { RelationChar::SelfRef } else { RelationChar::Placeholder })
        .collect()
}

/// Validate invariants T1 (row keys == column keys == definition keys) and T2 (every
/// row decompresses to length N with `o` on the diagonal) against an in-memory grid.
pub fn validate_grid_invariants(
    final_keys: &[String],
    rows: &HashMap<String, Vec<RelationChar>>,
) -> Result<(), StoreError> {
    let n = final_keys.len();
    for (i, key) in final_keys.iter().enumerate() {
        let row = rows
            .get(key)
            .ok_or_else(|| StoreError::InvariantViolation(key.clone(), "missing row".to_string()))?;
        if row.len() != n {
            return Err(StoreError::InvariantViolation(
                key.clone(),
                format!("row length {} != key count {}", row.len(), n),
            ));
        }
        if row[i] != RelationChar::SelfRef {
            return Err(StoreError::InvariantViolation(key.clone(), "diagonal is not self".to_string()));
        }
    }
    Ok(())
}

/// Given a tracker's stale key definitions and grid, return the decoded raw row for a
/// key, rebuilding it as placeholders if it's absent or malformed (spec §4.6 step 2).
pub fn decode_row_or_placeholder(data: &TrackerData, key: &str, ordered_keys: &[String]) -> Vec<RelationChar> {
    let n = ordered_keys.len();
    let diagonal_index = ordered_keys.iter().position(|k| k == key).unwrap_or(0);
    match data.grid.get(key).and_then(|rle| GridCodec::validate_row(rle, n, diagonal_index).ok()) {
        Some(row) => row,
        None => rebuilt_placeholder_row(n, diagonal_index),
    }
}
