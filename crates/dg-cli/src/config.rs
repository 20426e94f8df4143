use std::collections::HashMap;
use std::path::{Path, PathBuf};

use dg_core::{PriorityTable, RelationChar};
use dg_store::Exclusions;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub project: ProjectConfig,
    pub exclusions: ExclusionsConfig,
    pub priorities: PrioritiesConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    pub code_roots: Vec<String>,
    pub doc_roots: Vec<String>,
    pub trackers_dir: String,
    pub backups_dir: String,
    pub global_map_dir: String,
    pub force_apply: bool,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            code_roots: vec!["src".to_string()],
            doc_roots: vec!["docs".to_string()],
            trackers_dir: "trackers".to_string(),
            backups_dir: ".dependency-grid/backups".to_string(),
            global_map_dir: ".dependency-grid".to_string(),
            force_apply: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ExclusionsConfig {
    pub dir_names: Vec<String>,
    pub abs_paths: Vec<String>,
    pub extensions: Vec<String>,
    pub filename_globs: Vec<String>,
}

impl ExclusionsConfig {
    pub fn to_exclusions(&self) -> Exclusions {
        Exclusions {
            dir_names: self.dir_names.iter().cloned().collect(),
            abs_paths: self.abs_paths.iter().cloned().collect(),
            extensions: self.extensions.iter().cloned().collect(),
            filename_globs: self.filename_globs.clone(),
        }
    }
}

/// Overrides onto [`PriorityTable::default`], keyed by the single on-disk grid
/// character (e.g. `"x"`, `"<"`, `"n"`). Unlisted characters keep their default.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PrioritiesConfig {
    pub overrides: HashMap<String, u8>,
}

impl PrioritiesConfig {
    pub fn to_priority_table(&self) -> PriorityTable {
        let mut entries: HashMap<RelationChar, u8> = PriorityTable::default().entries().collect();
        for (ch, value) in &self.overrides {
            if let Some(c) = ch.chars().next().filter(|_| ch.chars().count() == 1) {
                if let Ok(rc) = RelationChar::try_from(c) {
                    entries.insert(rc, *value);
                } else {
                    tracing::warn!(char = ch, "unknown relation character in priority override, ignoring");
                }
            } else {
                tracing::warn!(char = ch, "priority override key must be a single character, ignoring");
            }
        }
        PriorityTable::from_entries(entries)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load config from `./depgrid.toml`, returning defaults if the file is missing.
    pub fn load() -> Self {
        let path = Self::default_path();
        Self::load_from(&path)
    }

    pub fn default_path() -> PathBuf {
        PathBuf::from("depgrid.toml")
    }

    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => {
                    tracing::info!(path = %path.display(), "loaded config");
                    config
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "invalid config file, using defaults");
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    /// Write config to a TOML file.
    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        let toml_str = toml::to_string_pretty(self).map_err(std::io::Error::other)?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, toml_str)
    }

    /// Save config to the default path.
    pub fn save(&self) -> std::io::Result<()> {
        self.save_to(&Self::default_path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_loads_as_default() {
        let dir = tempdir().unwrap();
        let cfg = Config::load_from(&dir.path().join("nope.toml"));
        assert_eq!(cfg.project.code_roots, vec!["src".to_string()]);
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("depgrid.toml");
        let mut cfg = Config::default();
        cfg.project.force_apply = true;
        cfg.priorities.overrides.insert("n".to_string(), 9);
        cfg.save_to(&path).unwrap();

        let loaded = Config::load_from(&path);
        assert!(loaded.project.force_apply);
        assert_eq!(loaded.priorities.overrides.get("n"), Some(&9));
    }

    #[test]
    fn priority_override_replaces_only_named_character() {
        let mut cfg = PrioritiesConfig::default();
        cfg.overrides.insert("n".to_string(), 100);
        let table = cfg.to_priority_table();
        assert_eq!(table.priority(RelationChar::VerifiedNone), 100);
        assert_eq!(table.priority(RelationChar::Mutual), PriorityTable::default().priority(RelationChar::Mutual));
    }

    #[test]
    fn unknown_priority_override_character_is_ignored() {
        let mut cfg = PrioritiesConfig::default();
        cfg.overrides.insert("zz".to_string(), 5);
        let table = cfg.to_priority_table();
        // Falls back to defaults entirely; no panic, no bogus entry.
        assert_eq!(table.priority(RelationChar::Mutual), PriorityTable::default().priority(RelationChar::Mutual));
    }
}
