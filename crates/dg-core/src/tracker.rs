use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Which of the three tracker roles a file plays (spec §2, §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackerKind {
    /// Project-wide inter-module dependency tracker, one per project.
    Main,
    /// Documentation dependency tracker, one per project.
    Doc,
    /// One per top-level code-root subdirectory.
    Mini,
}

/// The parsed contents of a tracker Markdown file, independent of how it was read.
#[derive(Debug, Clone, Default)]
pub struct TrackerData {
    /// key_string -> normalized path, as written in the `KEY_DEFINITIONS` section.
    pub keys: HashMap<String, String>,
    /// key_string -> compressed row, as written in the `GRID` section.
    pub grid: HashMap<String, String>,
    pub last_key_edit: String,
    pub last_grid_edit: String,
    /// Mini-tracker content before the managed-block marker, preserved verbatim.
    pub preserved_prefix: Option<String>,
    /// Mini-tracker content after the managed-block marker, preserved verbatim.
    pub preserved_suffix: Option<String>,
}
